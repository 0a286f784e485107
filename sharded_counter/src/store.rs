/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The document database capabilities a counter depends on.
//!
//! Backends implement [`DocumentStore`]; [`memory::MemoryStore`] is an
//! in-process implementation used for local development and tests.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde::Serialize;

use crate::path::DocumentPath;
use crate::value::DocumentSnapshot;
use crate::value::MergeUpdate;

pub mod memory;

/// The type of error reported by a backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The caller is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The backend gave up waiting.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Some other backend failure.
    #[error("internal: {0}")]
    Internal(String),
}

/// Where a one-shot read may be served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadSource {
    /// The server if reachable, the local cache otherwise.
    #[default]
    Default,
    /// Only the server.
    Server,
    /// Only the local cache.
    Cache,
}

impl FromStr for ReadSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(ReadSource::Default),
            "server" => Ok(ReadSource::Server),
            "cache" => Ok(ReadSource::Cache),
            other => Err(anyhow::anyhow!("unknown read source {:?}", other)),
        }
    }
}

impl fmt::Display for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadSource::Default => write!(f, "default"),
            ReadSource::Server => write!(f, "server"),
            ReadSource::Cache => write!(f, "cache"),
        }
    }
}

/// A live feed of snapshots for one document. The first item reflects
/// the document's state when the subscription was opened. Dropping the
/// stream releases the subscription.
pub type SnapshotStream = BoxStream<'static, Result<DocumentSnapshot, StoreError>>;

/// A document database client.
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Read one document. A missing document is a successful read of a
    /// snapshot that does not exist, never an error.
    async fn get(
        &self,
        path: &DocumentPath,
        source: ReadSource,
    ) -> Result<DocumentSnapshot, StoreError>;

    /// Apply a merge write to one document, creating it if absent.
    /// [`FieldUpdate::Increment`](crate::value::FieldUpdate::Increment)
    /// entries are evaluated atomically by the backend.
    async fn merge(&self, path: &DocumentPath, update: MergeUpdate) -> Result<(), StoreError>;

    /// Subscribe to a document.
    fn listen(&self, path: &DocumentPath) -> SnapshotStream;
}
