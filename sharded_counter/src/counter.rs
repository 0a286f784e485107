/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::aggregator::LiveAggregator;
use crate::config::CounterConfig;
use crate::error::CounterError;
use crate::increment::increment_update;
use crate::path::DocumentPath;
use crate::path::FieldPath;
use crate::reader::read_total;
use crate::shard::ShardId;
use crate::shard::ShardSet;
use crate::store::DocumentStore;
use crate::store::ReadSource;
use crate::subscription::Subscription;
use crate::value::MergeUpdate;

/// A sharded counter bound to one field of one document.
///
/// Each binding writes only to its own leaf shard, so bindings never
/// contend with each other. Reads and subscriptions sum the binding's
/// leaf, the partial aggregates above it, and the counter document
/// itself; the result includes every write made through this binding
/// plus whatever other writers' increments have been aggregated into
/// the shared documents.
///
/// Clones share the same shard.
#[derive(Debug, Clone)]
pub struct Counter {
    store: Arc<dyn DocumentStore>,
    field: FieldPath,
    shard_id: ShardId,
    shards: Arc<ShardSet>,
    config: CounterConfig,
}

impl Counter {
    /// Bind to `field` (dotted for nested fields) of `document` with a
    /// fresh shard id and the default configuration.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        document: DocumentPath,
        field: &str,
    ) -> Result<Self, CounterError> {
        Self::with_config(store, document, field, CounterConfig::default())
    }

    /// Bind with a fresh shard id and the given configuration.
    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        document: DocumentPath,
        field: &str,
        config: CounterConfig,
    ) -> Result<Self, CounterError> {
        Self::with_shard_id(store, document, field, ShardId::generate(), config)
    }

    /// Bind with a caller-chosen shard id. Two bindings with the same id
    /// write to the same leaf shard.
    pub fn with_shard_id(
        store: Arc<dyn DocumentStore>,
        document: DocumentPath,
        field: &str,
        shard_id: ShardId,
        config: CounterConfig,
    ) -> Result<Self, CounterError> {
        let field: FieldPath = field.parse()?;
        let shards = ShardSet::new(&document, &shard_id)?;
        tracing::debug!(
            document = %document,
            field = %field,
            shard_id = %shard_id,
            "bound sharded counter"
        );
        Ok(Self {
            store,
            field,
            shard_id,
            shards: Arc::new(shards),
            config,
        })
    }

    /// The counter document.
    pub fn document(&self) -> &DocumentPath {
        self.shards.root()
    }

    /// The counter field.
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    /// This binding's shard id.
    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Every document this binding reads.
    pub fn shards(&self) -> &ShardSet {
        &self.shards
    }

    /// This binding's leaf shard. Useful for updating several counters
    /// on the same document in one batch; pair it with
    /// [`Counter::increment_update`].
    pub fn shard(&self) -> &DocumentPath {
        self.shards.leaf()
    }

    /// The binding's configuration.
    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// The merge write that [`Counter::increment_by`] applies to
    /// [`Counter::shard`]. Fails without I/O if `delta` is not finite.
    pub fn increment_update(&self, delta: f64) -> Result<MergeUpdate, CounterError> {
        increment_update(&self.field, delta)
    }

    /// Atomically add `delta` to the counter.
    pub async fn increment_by(&self, delta: f64) -> Result<(), CounterError> {
        let update = self.increment_update(delta)?;
        let shard = self.shard();
        tracing::debug!(shard = %shard, field = %self.field, delta, "incrementing counter");
        self.store
            .merge(shard, update)
            .await
            .map_err(|source| CounterError::Write {
                path: shard.clone(),
                source,
            })
    }

    /// The current value of the counter, reading from the configured
    /// source.
    pub async fn get(&self) -> Result<f64, CounterError> {
        self.get_from(self.config.read_source).await
    }

    /// The current value of the counter, reading from `source`. All
    /// shards are read concurrently; if any read fails, the whole read
    /// fails and the outstanding reads are cancelled.
    ///
    /// A configured read timeout requires a Tokio runtime; without one
    /// the read fails with [`CounterError::Config`].
    pub async fn get_from(&self, source: ReadSource) -> Result<f64, CounterError> {
        let read = read_total(self.store.as_ref(), &self.shards, &self.field, source);
        let total = match self.config.read_timeout {
            Some(timeout) => {
                tokio::runtime::Handle::try_current().map_err(|err| {
                    CounterError::Config(format!("read timeouts require a tokio runtime: {}", err))
                })?;
                tokio::time::timeout(timeout, read)
                    .await
                    .map_err(|_| CounterError::Timeout(timeout))??
            }
            None => read.await?,
        };
        tracing::debug!(document = %self.document(), field = %self.field, total, "read counter");
        Ok(total)
    }

    /// Subscribe to the counter. `listener` is invoked with the running
    /// sum after every snapshot of any shard, and with an error whenever
    /// one shard's subscription fails; the remaining shards keep
    /// delivering. Expect up to six warm-up emissions as the initial
    /// snapshots arrive.
    ///
    /// Listener invocations are serialized. Must be called from within
    /// a Tokio runtime.
    pub fn on_snapshot<F>(&self, listener: F) -> Result<Subscription, CounterError>
    where
        F: FnMut(Result<f64, CounterError>) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| {
            CounterError::Config(format!("subscriptions require a tokio runtime: {}", err))
        })?;
        let subscriptions = self
            .shards
            .paths()
            .map(|path| (path.clone(), self.store.listen(path)))
            .collect();
        let released = Arc::new(AtomicBool::new(false));
        let aggregator = LiveAggregator::new(
            &self.shards,
            self.field.clone(),
            Arc::clone(&released),
            listener,
        );
        tracing::debug!(
            document = %self.document(),
            field = %self.field,
            shards = self.shards.len(),
            "opened counter subscription"
        );
        Ok(Subscription::new(
            released,
            runtime.spawn(aggregator.run(subscriptions)),
        ))
    }
}
