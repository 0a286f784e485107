/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::time::Duration;

use crate::path::DocumentPath;
use crate::path::PathError;
use crate::store::StoreError;

/// The type of error returned by counter operations.
#[derive(thiserror::Error, Debug)]
pub enum CounterError {
    /// An argument was rejected before any I/O was issued.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The binding could not be set up.
    #[error("invalid counter configuration: {0}")]
    Config(String),

    /// One of the fan-out reads failed; no partial sum is returned.
    #[error("failed to read shard {path}: {source}")]
    Read {
        /// The shard whose read failed first.
        path: DocumentPath,
        /// The backend failure.
        #[source]
        source: StoreError,
    },

    /// The increment write to the leaf shard failed.
    #[error("failed to write shard {path}: {source}")]
    Write {
        /// The leaf shard.
        path: DocumentPath,
        /// The backend failure.
        #[source]
        source: StoreError,
    },

    /// A per-shard subscription reported an error. Other shards keep
    /// delivering.
    #[error("subscription to shard {path} failed: {source}")]
    Subscription {
        /// The shard whose subscription failed.
        path: DocumentPath,
        /// The backend failure.
        #[source]
        source: StoreError,
    },

    /// The fan-out read did not complete in time.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
}

impl From<PathError> for CounterError {
    fn from(err: PathError) -> Self {
        CounterError::Argument(err.to_string())
    }
}

impl CounterError {
    /// The backend failure underlying this error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            CounterError::Read { source, .. }
            | CounterError::Write { source, .. }
            | CounterError::Subscription { source, .. } => Some(source),
            _ => None,
        }
    }
}
