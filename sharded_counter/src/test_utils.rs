/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Test and demo support.

use tracing::Level;

use crate::path::DocumentPath;
use crate::shard::MAX_PARTIAL_DEPTH;
use crate::shard::SHARD_COLLECTION_ID;
use crate::shard::ShardId;
use crate::shard::ShardLevel;
use crate::shard::partial_name;
use crate::store::memory::MemoryStore;
use crate::value::FieldUpdate;
use crate::value::Fields;
use crate::value::MergeUpdate;
use crate::value::Value;
use crate::value::apply_merge;

/// Set up a tracing subscriber with a filter, so that tracing logs at
/// `level` and above are printed.
///
/// Prefer `tracing_test::traced_test` in tests that assert on logs.
pub fn set_tracing_env_filter(level: Level) -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level.as_str()))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {}", err))
}

/// Plays the server-side aggregator for one counter document in a
/// [`MemoryStore`].
///
/// Each [`Aggregator::step`] moves the numeric contents of every shard
/// one level up the aggregation tree (leaf to partial 1, partial 1 to
/// partial 2, ..., partial 4 to the counter document) and deletes the
/// source shard, atomically. Values are moved, never copied, so the
/// total over all documents is preserved and every increment lives in
/// exactly one document at a time.
#[derive(Debug, Clone)]
pub struct Aggregator {
    store: MemoryStore,
    root: DocumentPath,
}

impl Aggregator {
    /// Aggregate the counter on `root`.
    pub fn new(store: MemoryStore, root: DocumentPath) -> Self {
        Self { store, root }
    }

    /// Run one aggregation cycle. Returns the number of shards moved.
    pub fn step(&self) -> usize {
        let collection = format!("{}/{}", self.root.as_str(), SHARD_COLLECTION_ID);
        self.store.modify(|documents| {
            // Take the shards as of the start of the cycle so that each
            // value moves exactly one level.
            let shards: Vec<(DocumentPath, Fields)> = documents
                .iter()
                .filter(|(path, _)| path.collection() == collection)
                .map(|(path, fields)| (path.clone(), fields.clone()))
                .collect();

            for (path, fields) in &shards {
                let Some(parent) = self.parent_of(path) else {
                    continue;
                };
                documents.remove(path);
                apply_merge(
                    documents.entry(parent).or_default(),
                    &numeric_increments(fields),
                );
            }
            shards.len()
        })
    }

    /// Run cycles until every shard has reached the counter document.
    pub fn flush(&self) {
        for _ in 0..=MAX_PARTIAL_DEPTH {
            if self.step() == 0 {
                break;
            }
        }
    }

    fn parent_of(&self, shard: &DocumentPath) -> Option<DocumentPath> {
        let name = shard.id();
        match ShardLevel::of_shard_name(name).parent()? {
            ShardLevel::Root => Some(self.root.clone()),
            ShardLevel::Partial(depth) => {
                let id = ShardId::from(name.trim_start_matches('\t'));
                self.root
                    .child(SHARD_COLLECTION_ID, &partial_name(&id, depth))
                    .ok()
            }
            ShardLevel::Leaf => None,
        }
    }
}

/// Every numeric leaf of `fields` as an increment, preserving nesting.
/// Non-numeric values are dropped.
fn numeric_increments(fields: &Fields) -> MergeUpdate {
    fields
        .iter()
        .filter_map(|(name, value)| {
            let update = match value {
                Value::Map(nested) => FieldUpdate::Nested(numeric_increments(nested)),
                other => FieldUpdate::Increment(other.as_number()?),
            };
            Some((name.clone(), update))
        })
        .collect()
}
