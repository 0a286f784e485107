/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! In-process document store.
//!
//! Documents live in a shared map; listeners are unbounded channels that
//! receive a fresh snapshot whenever their document changes. The store
//! also exposes fault injection hooks so that error paths can be
//! exercised without a real backend.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::DocumentStore;
use super::ReadSource;
use super::SnapshotStream;
use super::StoreError;
use crate::path::DocumentPath;
use crate::value::DocumentSnapshot;
use crate::value::Fields;
use crate::value::MergeUpdate;
use crate::value::apply_merge;

/// All documents held by a [`MemoryStore`].
pub type Documents = BTreeMap<DocumentPath, Fields>;

type Listener = mpsc::UnboundedSender<Result<DocumentSnapshot, StoreError>>;

#[derive(Debug, Default)]
struct State {
    documents: Documents,
    listeners: HashMap<DocumentPath, Vec<Listener>>,
    read_failures: HashMap<DocumentPath, StoreError>,
    write_failures: HashMap<DocumentPath, StoreError>,
    read_delay: Option<Duration>,
    path_read_delays: HashMap<DocumentPath, Duration>,
    reads: usize,
    writes: usize,
}

impl State {
    fn snapshot(&self, path: &DocumentPath) -> DocumentSnapshot {
        match self.documents.get(path) {
            Some(fields) => DocumentSnapshot::new(path.clone(), fields.clone()),
            None => DocumentSnapshot::missing(path.clone()),
        }
    }

    /// Deliver the current state of `path` to its listeners, dropping
    /// listeners whose streams have gone away.
    fn notify(&mut self, path: &DocumentPath) {
        let snapshot = self.snapshot(path);
        if let Some(listeners) = self.listeners.get_mut(path) {
            listeners.retain(|listener| listener.send(Ok(snapshot.clone())).is_ok());
            if listeners.is_empty() {
                self.listeners.remove(path);
            }
        }
    }
}

/// A [`DocumentStore`] backed by process memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a document's fields, creating it if absent.
    pub fn set(&self, path: &DocumentPath, fields: Fields) {
        let mut state = self.state();
        state.documents.insert(path.clone(), fields);
        state.notify(path);
    }

    /// Delete a document.
    pub fn delete(&self, path: &DocumentPath) {
        let mut state = self.state();
        if state.documents.remove(path).is_some() {
            state.notify(path);
        }
    }

    /// The current fields of a document, if it exists.
    pub fn document(&self, path: &DocumentPath) -> Option<Fields> {
        self.state().documents.get(path).cloned()
    }

    /// All documents directly inside the collection at `collection`,
    /// e.g. `rooms/42/_counter_shards_`.
    pub fn list(&self, collection: &str) -> Vec<(DocumentPath, Fields)> {
        self.state()
            .documents
            .iter()
            .filter(|(path, _)| path.collection() == collection)
            .map(|(path, fields)| (path.clone(), fields.clone()))
            .collect()
    }

    /// Run `f` against all documents atomically. Listeners of every
    /// document that `f` changed are notified afterwards.
    pub fn modify<R>(&self, f: impl FnOnce(&mut Documents) -> R) -> R {
        let mut state = self.state();
        let watched: Vec<(DocumentPath, Option<Fields>)> = state
            .listeners
            .keys()
            .map(|path| (path.clone(), state.documents.get(path).cloned()))
            .collect();
        let result = f(&mut state.documents);
        for (path, before) in watched {
            if state.documents.get(&path) != before.as_ref() {
                state.notify(&path);
            }
        }
        result
    }

    /// Fail the next read of `path` with `err`.
    pub fn fail_next_read(&self, path: &DocumentPath, err: StoreError) {
        self.state().read_failures.insert(path.clone(), err);
    }

    /// Fail the next write to `path` with `err`.
    pub fn fail_next_write(&self, path: &DocumentPath, err: StoreError) {
        self.state().write_failures.insert(path.clone(), err);
    }

    /// Deliver `err` to every current listener of `path`, terminating
    /// those subscriptions.
    pub fn fail_listeners(&self, path: &DocumentPath, err: StoreError) {
        if let Some(listeners) = self.state().listeners.remove(path) {
            for listener in listeners {
                let _ = listener.send(Err(err.clone()));
            }
        }
    }

    /// Delay every subsequent read by `delay`, or stop delaying.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.state().read_delay = delay;
    }

    /// Delay every subsequent read of `path` by `delay`. Takes
    /// precedence over [`MemoryStore::set_read_delay`].
    pub fn delay_reads(&self, path: &DocumentPath, delay: Duration) {
        self.state().path_read_delays.insert(path.clone(), delay);
    }

    /// The number of live subscriptions to `path`.
    pub fn listener_count(&self, path: &DocumentPath) -> usize {
        let mut state = self.state();
        let Some(listeners) = state.listeners.get_mut(path) else {
            return 0;
        };
        listeners.retain(|listener| !listener.is_closed());
        listeners.len()
    }

    /// The number of reads served, including failed ones.
    pub fn read_count(&self) -> usize {
        self.state().reads
    }

    /// The number of merge writes applied, including failed ones.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(
        &self,
        path: &DocumentPath,
        _source: ReadSource,
    ) -> Result<DocumentSnapshot, StoreError> {
        let delay = {
            let state = self.state();
            state.path_read_delays.get(path).copied().or(state.read_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.reads += 1;
        if let Some(err) = state.read_failures.remove(path) {
            return Err(err);
        }
        Ok(state.snapshot(path))
    }

    async fn merge(&self, path: &DocumentPath, update: MergeUpdate) -> Result<(), StoreError> {
        let mut state = self.state();
        state.writes += 1;
        if let Some(err) = state.write_failures.remove(path) {
            return Err(err);
        }
        apply_merge(state.documents.entry(path.clone()).or_default(), &update);
        state.notify(path);
        Ok(())
    }

    fn listen(&self, path: &DocumentPath) -> SnapshotStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        // The receiver is alive, so the initial send cannot fail.
        let _ = tx.send(Ok(state.snapshot(path)));
        state.listeners.entry(path.clone()).or_default().push(tx);
        UnboundedReceiverStream::new(rx).boxed()
    }
}
