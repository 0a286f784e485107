/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Live aggregation over a counter's shard subscriptions.
//!
//! All six per-shard streams are merged into a single stream that is
//! drained by one task. That task exclusively owns the per-shard value
//! map, so events from different shards are applied strictly one at a
//! time regardless of which threads the backend delivers them on.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use futures::StreamExt;
use futures::stream;

use crate::error::CounterError;
use crate::path::DocumentPath;
use crate::path::FieldPath;
use crate::reader::shard_value;
use crate::shard::ShardSet;
use crate::store::SnapshotStream;
use crate::store::StoreError;
use crate::value::DocumentSnapshot;

/// The last-known value of every tracked shard.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShardValues {
    values: HashMap<DocumentPath, f64>,
}

impl ShardValues {
    /// All shards start at zero.
    pub(crate) fn new(shards: &ShardSet) -> Self {
        Self {
            values: shards.paths().map(|path| (path.clone(), 0.0)).collect(),
        }
    }

    /// Record the latest value of a tracked shard. Paths outside the set
    /// are ignored so that the key set never changes.
    pub(crate) fn record(&mut self, path: &DocumentPath, value: f64) {
        if let Some(slot) = self.values.get_mut(path) {
            *slot = value;
        }
    }

    pub(crate) fn sum(&self) -> f64 {
        self.values.values().sum()
    }
}

/// Turns per-shard events into aggregate emissions.
pub(crate) struct LiveAggregator<F> {
    field: FieldPath,
    values: ShardValues,
    released: Arc<AtomicBool>,
    listener: F,
}

impl<F> LiveAggregator<F>
where
    F: FnMut(Result<f64, CounterError>) + Send + 'static,
{
    pub(crate) fn new(
        shards: &ShardSet,
        field: FieldPath,
        released: Arc<AtomicBool>,
        listener: F,
    ) -> Self {
        Self {
            field,
            values: ShardValues::new(shards),
            released,
            listener,
        }
    }

    /// Handle one event from the subscription on `path`. Errors are
    /// passed through without touching the value map; snapshots update
    /// the map and emit the new sum.
    pub(crate) fn handle(
        &mut self,
        path: &DocumentPath,
        event: Result<DocumentSnapshot, StoreError>,
    ) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        match event {
            Err(source) => {
                tracing::warn!(shard = %path, "counter subscription error: {}", source);
                (self.listener)(Err(CounterError::Subscription {
                    path: path.clone(),
                    source,
                }));
            }
            Ok(snapshot) => {
                self.values.record(path, shard_value(&snapshot, &self.field));
                let sum = self.values.sum();
                tracing::debug!(shard = %path, sum, "emitting counter value");
                (self.listener)(Ok(sum));
            }
        }
    }

    /// Drain the merged subscriptions until every one of them has ended
    /// or the task is aborted.
    pub(crate) async fn run(mut self, subscriptions: Vec<(DocumentPath, SnapshotStream)>) {
        let mut events = stream::select_all(
            subscriptions
                .into_iter()
                .map(|(path, events)| events.map(move |event| (path.clone(), event))),
        );
        while let Some((path, event)) = events.next().await {
            self.handle(&path, event);
        }
        tracing::debug!("all counter subscriptions ended");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::shard::ShardId;
    use crate::value::Fields;
    use crate::value::Value;

    type Emissions = Arc<Mutex<Vec<Result<f64, String>>>>;

    fn setup() -> (
        ShardSet,
        Arc<AtomicBool>,
        Emissions,
        LiveAggregator<impl FnMut(Result<f64, CounterError>) + Send + 'static>,
    ) {
        let root: DocumentPath = "rooms/42".parse().unwrap();
        let shards = ShardSet::new(&root, &ShardId::from("0123abcd")).unwrap();
        let released = Arc::new(AtomicBool::new(false));
        let emissions: Emissions = Arc::new(Mutex::new(Vec::new()));
        let aggregator = LiveAggregator::new(&shards, "count".parse().unwrap(), Arc::clone(&released), {
            let emissions = Arc::clone(&emissions);
            move |value: Result<f64, CounterError>| {
                emissions
                    .lock()
                    .unwrap()
                    .push(value.map_err(|err| err.to_string()));
            }
        });
        (shards, released, emissions, aggregator)
    }

    fn snapshot(path: &DocumentPath, count: i64) -> DocumentSnapshot {
        DocumentSnapshot::new(
            path.clone(),
            Fields::from([("count".to_string(), Value::Integer(count))]),
        )
    }

    #[test]
    fn test_shard_values() {
        let root: DocumentPath = "rooms/42".parse().unwrap();
        let shards = ShardSet::new(&root, &ShardId::from("0123abcd")).unwrap();
        let mut values = ShardValues::new(&shards);
        assert_eq!(values.sum(), 0.0);
        values.record(shards.leaf(), 2.0);
        values.record(shards.root(), 5.0);
        values.record(shards.leaf(), 3.0);
        assert_eq!(values.sum(), 8.0);

        let stranger: DocumentPath = "rooms/43".parse().unwrap();
        values.record(&stranger, 100.0);
        assert_eq!(values.sum(), 8.0);
        assert_eq!(values.values.len(), 6);
    }

    #[test]
    fn test_emits_running_sum_per_event() {
        let (shards, _released, emissions, mut aggregator) = setup();
        let paths: Vec<DocumentPath> = shards.paths().cloned().collect();

        aggregator.handle(&paths[0], Ok(snapshot(&paths[0], 10)));
        aggregator.handle(&paths[1], Ok(DocumentSnapshot::missing(paths[1].clone())));
        aggregator.handle(&paths[2], Ok(snapshot(&paths[2], 5)));
        // A newer snapshot replaces, not adds.
        aggregator.handle(&paths[0], Ok(snapshot(&paths[0], 12)));

        assert_eq!(
            *emissions.lock().unwrap(),
            vec![Ok(10.0), Ok(10.0), Ok(15.0), Ok(17.0)]
        );
    }

    #[test]
    fn test_error_does_not_touch_values() {
        let (shards, _released, emissions, mut aggregator) = setup();
        let paths: Vec<DocumentPath> = shards.paths().cloned().collect();

        aggregator.handle(&paths[3], Ok(snapshot(&paths[3], 4)));
        aggregator.handle(&paths[3], Err(StoreError::Unavailable("offline".into())));
        aggregator.handle(&paths[4], Ok(snapshot(&paths[4], 1)));

        let emissions = emissions.lock().unwrap();
        assert_eq!(emissions.len(), 3);
        assert_eq!(emissions[0], Ok(4.0));
        assert!(emissions[1].as_ref().unwrap_err().contains("offline"));
        assert_eq!(emissions[2], Ok(5.0));
    }

    #[test]
    fn test_released_aggregator_is_silent() {
        let (shards, released, emissions, mut aggregator) = setup();
        released.store(true, Ordering::SeqCst);
        aggregator.handle(shards.root(), Ok(snapshot(shards.root(), 1)));
        assert!(emissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_all_streams() {
        let (shards, _released, emissions, aggregator) = setup();
        let subscriptions = shards
            .paths()
            .map(|path| {
                let events: Vec<Result<DocumentSnapshot, StoreError>> =
                    vec![Ok(snapshot(path, 1))];
                (path.clone(), stream::iter(events).boxed())
            })
            .collect();
        aggregator.run(subscriptions).await;

        let emissions = emissions.lock().unwrap();
        assert_eq!(emissions.len(), 6);
        // Warm-up emissions are non-decreasing and converge on the total.
        let values: Vec<f64> = emissions.iter().map(|e| *e.as_ref().unwrap()).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last(), Some(&6.0));
    }
}
