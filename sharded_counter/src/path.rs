/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Document and field addressing.
//!
//! A [`DocumentPath`] names a single document as alternating
//! collection and document ids, e.g. `rooms/42` or
//! `rooms/42/_counter_shards_/<id>`. A [`FieldPath`] names a (possibly
//! nested) field inside a document using dotted notation, e.g.
//! `stats.views`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// The type of error encountered while parsing paths.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path had no segments.
    #[error("empty path")]
    Empty,

    /// Document paths alternate collection and document ids, so they
    /// must have an even number of segments.
    #[error("path {0:?} does not name a document (odd number of segments)")]
    NotADocument(String),

    /// A path segment was empty, e.g. `rooms//42`.
    #[error("path {0:?} contains an empty segment")]
    EmptySegment(String),

    /// A dotted field path had an empty component, e.g. `a..b`.
    #[error("field path {0:?} contains an empty component")]
    EmptyFieldComponent(String),

    /// A collection or document id was not usable as a single segment.
    #[error("invalid id {0:?}")]
    InvalidId(String),
}

/// The path of a single document. Always an even, non-zero number of
/// non-empty segments. A single leading or trailing `/` is tolerated
/// when parsing and is not part of the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

impl DocumentPath {
    /// The path of document `doc` in collection `collection` directly
    /// beneath this document.
    pub fn child(&self, collection: &str, doc: &str) -> Result<DocumentPath, PathError> {
        validate_id(collection)?;
        validate_id(doc)?;
        Ok(DocumentPath(format!("{}/{}/{}", self.0, collection, doc)))
    }

    /// The id of the document: the last path segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The path of the collection containing this document.
    pub fn collection(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(collection, _)| collection)
    }

    /// The parent document of this document's collection, if this is
    /// not a top-level document.
    pub fn parent(&self) -> Option<DocumentPath> {
        let (parent, _) = self.collection().rsplit_once('/')?;
        Some(DocumentPath(parent.to_string()))
    }

    /// The path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_id(id: &str) -> Result<(), PathError> {
    if id.is_empty() || id.contains('/') {
        return Err(PathError::InvalidId(id.to_string()));
    }
    Ok(())
}

impl FromStr for DocumentPath {
    type Err = PathError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        let mut count = 0;
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(path.to_string()));
            }
            count += 1;
        }
        if count % 2 != 0 {
            return Err(PathError::NotADocument(path.to_string()));
        }
        Ok(DocumentPath(trimmed.to_string()))
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = PathError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        path.parse()
    }
}

impl From<DocumentPath> for String {
    fn from(path: DocumentPath) -> Self {
        path.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tabs are significant in shard names; escape them so that log
        // lines stay readable.
        write!(f, "{}", self.0.escape_debug())
    }
}

/// A dotted path to a field within a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// The path components, outermost first.
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// The number of components. A field path always has at least one.
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        let components: Vec<String> = path.split('.').map(str::to_string).collect();
        if components.iter().any(String::is_empty) {
            return Err(PathError::EmptyFieldComponent(path.to_string()));
        }
        Ok(FieldPath(components))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}
