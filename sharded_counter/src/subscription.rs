/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::task::JoinHandle;

/// A handle to a live counter subscription, returned by
/// [`Counter::on_snapshot`](crate::Counter::on_snapshot).
///
/// The handle owns the aggregation task, which in turn owns every
/// per-shard subscription. Releasing the handle stops emissions and
/// drops all of them. Release is idempotent, and dropping the handle
/// releases it.
#[derive(Debug)]
pub struct Subscription(Option<(Arc<AtomicBool>, JoinHandle<()>)>);

impl Subscription {
    pub(crate) fn new(released: Arc<AtomicBool>, task: JoinHandle<()>) -> Self {
        Self(Some((released, task)))
    }

    /// Release every underlying subscription. The listener is not
    /// invoked for events arriving after this returns; an invocation
    /// already in progress may still complete.
    pub fn release(&mut self) {
        if let Some((released, task)) = self.0.take() {
            released.store(true, Ordering::SeqCst);
            task.abort();
            tracing::debug!("released counter subscription");
        }
    }

    /// Whether [`Subscription::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.0.is_none()
    }

    /// Release the subscription and wait until the underlying
    /// per-shard subscriptions have been dropped.
    pub async fn shutdown(mut self) {
        if let Some((released, task)) = self.0.take() {
            released.store(true, Ordering::SeqCst);
            task.abort();
            // The task was aborted; a cancellation error is expected.
            let _ = task.await;
            tracing::debug!("shut down counter subscription");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
