/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A client for sharded counters on a document database.
//!
//! A counter field on a hot document is spread over per-writer leaf
//! shards in a `_counter_shards_` subcollection. A server-side
//! aggregator periodically moves shard values up through four levels of
//! partial aggregates into the counter document. A [`Counter`] binding
//! writes only to its own leaf, and reads by summing the six documents
//! its writes can be in at any time: its leaf, the four partials above
//! it, and the counter document.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use sharded_counter::Counter;
//! # use sharded_counter::MemoryStore;
//! # async fn demo() -> Result<(), sharded_counter::CounterError> {
//! let store = Arc::new(MemoryStore::new());
//! let views = Counter::new(store, "pages/home".parse()?, "stats.views")?;
//! views.increment_by(1.0).await?;
//! let subscription = views.on_snapshot(|total| println!("views: {:?}", total))?;
//! println!("views: {}", views.get().await?);
//! subscription.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod aggregator;
pub mod config;
mod counter;
mod error;
mod increment;
pub mod path;
mod reader;
pub mod shard;
pub mod store;
mod subscription;
pub mod test_utils;
pub mod value;

pub use config::CounterConfig;
pub use counter::Counter;
pub use error::CounterError;
pub use increment::increment_update;
pub use path::DocumentPath;
pub use path::FieldPath;
pub use path::PathError;
pub use shard::ShardId;
pub use shard::ShardSet;
pub use store::DocumentStore;
pub use store::ReadSource;
pub use store::StoreError;
pub use store::memory::MemoryStore;
pub use subscription::Subscription;
