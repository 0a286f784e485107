/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use futures::future::try_join_all;

use crate::error::CounterError;
use crate::path::FieldPath;
use crate::shard::ShardSet;
use crate::store::DocumentStore;
use crate::store::ReadSource;
use crate::value::DocumentSnapshot;
use crate::value::Value;

/// The contribution of one shard: the numeric value at `field`, or zero
/// when the document or field is missing. Non-numeric values also count
/// as zero.
pub(crate) fn shard_value(snapshot: &DocumentSnapshot, field: &FieldPath) -> f64 {
    match snapshot.get(field) {
        None | Some(Value::Null) => 0.0,
        Some(value) => value.as_number().unwrap_or_else(|| {
            tracing::warn!(
                shard = %snapshot.path(),
                field = %field,
                "ignoring non-numeric counter value {:?}",
                value
            );
            0.0
        }),
    }
}

/// Read every shard concurrently and sum their values. The first failed
/// read aborts the whole read; the remaining reads are dropped.
pub(crate) async fn read_total(
    store: &dyn DocumentStore,
    shards: &ShardSet,
    field: &FieldPath,
    source: ReadSource,
) -> Result<f64, CounterError> {
    let reads = shards.paths().map(|path| async move {
        let snapshot = store
            .get(path, source)
            .await
            .map_err(|source| CounterError::Read {
                path: path.clone(),
                source,
            })?;
        Ok::<_, CounterError>(shard_value(&snapshot, field))
    });
    let values = try_join_all(reads).await?;
    Ok(values.into_iter().sum())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::path::DocumentPath;
    use crate::shard::ShardId;
    use crate::store::StoreError;
    use crate::store::memory::MemoryStore;
    use crate::value::Fields;

    fn setup() -> (MemoryStore, ShardSet, FieldPath) {
        let root: DocumentPath = "rooms/42".parse().unwrap();
        let shards = ShardSet::new(&root, &ShardId::from("0123abcd")).unwrap();
        (MemoryStore::new(), shards, "count".parse().unwrap())
    }

    fn count(value: Value) -> Fields {
        Fields::from([("count".to_string(), value)])
    }

    #[tokio::test]
    async fn test_all_missing_is_zero() {
        let (store, shards, field) = setup();
        let total = read_total(&store, &shards, &field, ReadSource::Default)
            .await
            .unwrap();
        assert_eq!(total, 0.0);
        assert_eq!(store.read_count(), 6);
    }

    #[tokio::test]
    async fn test_sums_every_level() {
        let (store, shards, field) = setup();
        for (i, path) in shards.paths().enumerate() {
            store.set(path, count(Value::Integer(1 << i)));
        }
        // A shard outside this client's chain is not read.
        store.set(
            &shards.root().child("_counter_shards_", "ffff0000").unwrap(),
            count(Value::Integer(1000)),
        );
        let total = read_total(&store, &shards, &field, ReadSource::Server)
            .await
            .unwrap();
        assert_eq!(total, 63.0);
    }

    #[tokio::test]
    async fn test_non_numeric_values_count_as_zero() {
        let (store, shards, field) = setup();
        store.set(shards.root(), count(Value::from("many")));
        store.set(shards.leaf(), count(Value::Double(1.5)));
        let total = read_total(&store, &shards, &field, ReadSource::Default)
            .await
            .unwrap();
        assert_eq!(total, 1.5);
    }

    #[tokio::test]
    async fn test_first_failure_fails_the_read() {
        let (store, shards, field) = setup();
        store.set(shards.leaf(), count(Value::Integer(4)));
        let failing = shards.paths().nth(3).unwrap().clone();
        store.fail_next_read(&failing, StoreError::Unavailable("offline".into()));

        let err = read_total(&store, &shards, &field, ReadSource::Default)
            .await
            .unwrap_err();
        match err {
            CounterError::Read { path, source } => {
                assert_eq!(path, failing);
                assert_eq!(source, StoreError::Unavailable("offline".into()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cancels_pending_reads() {
        let (store, shards, field) = setup();
        let failing = shards.paths().nth(4).unwrap().clone();
        for path in shards.paths().filter(|path| **path != failing) {
            store.delay_reads(path, Duration::from_secs(60));
        }
        store.fail_next_read(&failing, StoreError::Unavailable("offline".into()));

        let start = tokio::time::Instant::now();
        let err = read_total(&store, &shards, &field, ReadSource::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, CounterError::Read { path, .. } if path == failing));
        // The failure was reported without waiting on the slow reads, and
        // none of them ran to completion afterwards.
        assert_eq!(tokio::time::Instant::now(), start);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_the_read_cancels_it() {
        let (store, shards, field) = setup();
        store.set_read_delay(Some(Duration::from_secs(60)));
        let read = read_total(&store, &shards, &field, ReadSource::Default);
        assert!(
            tokio::time::timeout(Duration::from_secs(1), read)
                .await
                .is_err()
        );
        // None of the delayed reads completed.
        assert_eq!(store.read_count(), 0);
    }
}
