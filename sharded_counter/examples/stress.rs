/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Drive many concurrent writers against one counter while an
//! aggregator rolls shards up in the background, then check that the
//! counter converges on the number of increments issued.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use clap::Parser;
use sharded_counter::Counter;
use sharded_counter::DocumentPath;
use sharded_counter::MemoryStore;
use sharded_counter::test_utils::Aggregator;
use sharded_counter::test_utils::set_tracing_env_filter;
use tokio::time::Duration;
use tokio::time::Instant;

#[derive(Parser)]
struct Cli {
    /// Number of concurrent writers, each with its own binding
    #[arg(long, default_value_t = 100)]
    writers: usize,

    /// Increments issued by each writer
    #[arg(long, default_value_t = 1000)]
    increments: usize,

    /// The counter document
    #[arg(long, default_value = "stress_test/counter")]
    document: DocumentPath,

    /// The counter field; dotted for nested fields
    #[arg(long, default_value = "counter")]
    field: String,

    /// Interval between aggregation cycles
    #[arg(long, default_value = "10ms", value_parser = humantime::parse_duration)]
    aggregate_every: Duration,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Cli::parse();
    set_tracing_env_filter(args.log_level)?;

    let store = MemoryStore::new();
    let aggregator = Aggregator::new(store.clone(), args.document.clone());
    let aggregation = tokio::spawn({
        let aggregator = aggregator.clone();
        let mut ticks = tokio::time::interval(args.aggregate_every);
        async move {
            let mut cycles = 0usize;
            loop {
                ticks.tick().await;
                aggregator.step();
                cycles += 1;
                if cycles % 100 == 0 {
                    tracing::info!(cycles, "aggregated");
                }
            }
        }
    });

    let watcher = Counter::new(Arc::new(store.clone()), args.document.clone(), &args.field)?;
    let emissions = Arc::new(AtomicU64::new(0));
    let subscription = watcher.on_snapshot({
        let emissions = Arc::clone(&emissions);
        move |value| match value {
            Ok(_) => {
                emissions.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tracing::error!("watcher failed: {}", err),
        }
    })?;

    #[allow(clippy::disallowed_methods)]
    let start = Instant::now();
    let mut writers = Vec::with_capacity(args.writers);
    for _ in 0..args.writers {
        let counter = Counter::new(Arc::new(store.clone()), args.document.clone(), &args.field)?;
        let increments = args.increments;
        writers.push(tokio::spawn(async move {
            for _ in 0..increments {
                counter.increment_by(1.0).await?;
                tokio::task::yield_now().await;
            }
            Ok::<_, sharded_counter::CounterError>(())
        }));
    }
    for writer in writers {
        writer.await??;
    }
    let elapsed = start.elapsed();

    aggregation.abort();
    aggregator.flush();

    let expected = (args.writers * args.increments) as f64;
    let total = watcher.get().await?;
    subscription.shutdown().await;

    println!("Results:");
    println!("Writers: {}", args.writers);
    println!("Increments: {}", args.writers * args.increments);
    println!("Total time: {} ms", elapsed.as_millis());
    println!(
        "Throughput: {} increments/sec",
        expected / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("Watcher emissions: {}", emissions.load(Ordering::Relaxed));
    println!("Counter value: {}", total);

    anyhow::ensure!(
        total == expected,
        "counter converged on {} but {} increments were issued",
        total,
        expected
    );
    Ok(())
}
