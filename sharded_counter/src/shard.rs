/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Shard addressing.
//!
//! A counter on document `D` is materialized as the sum of documents in
//! the `D/_counter_shards_` collection plus `D` itself. Writers each own
//! a leaf shard named after their [`ShardId`]. A server-side aggregator
//! moves leaf values up a fixed tree of partial aggregates toward `D`:
//!
//! | Level     | Document id under `D/_counter_shards_` |
//! |-----------|----------------------------------------|
//! | leaf      | `<id>`                                 |
//! | partial 1 | `\t` + first 4 chars of `<id>`         |
//! | partial 2 | `\t\t` + first 3 chars of `<id>`       |
//! | partial 3 | `\t\t\t` + first 2 chars of `<id>`     |
//! | partial 4 | `\t\t\t\t` + first char of `<id>`      |
//! | root      | (`D` itself)                           |
//!
//! Each increment lives in exactly one document along this chain at any
//! time, so a client that reads its own six documents sees its own
//! writes plus whatever other writers' values have been rolled into the
//! shared partials. The names are a protocol with the aggregator and
//! must be preserved byte-for-byte.

use std::fmt;

use enum_as_inner::EnumAsInner;
use serde::Deserialize;
use serde::Serialize;

use crate::error::CounterError;
use crate::path::DocumentPath;

/// The subcollection, under the counter document, holding all shards.
pub const SHARD_COLLECTION_ID: &str = "_counter_shards_";

/// The deepest partial aggregation level.
pub const MAX_PARTIAL_DEPTH: usize = 4;

/// The number of documents a client tracks for one counter.
pub const SHARD_PATH_COUNT: usize = MAX_PARTIAL_DEPTH + 2;

const PARTIAL_MARKER: char = '\t';

/// The identifier of a writer's leaf shard. Generated fresh for every
/// binding and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardId(String);

impl ShardId {
    /// Generate a new random shard id: a lowercase, hyphenated v4 UUID.
    pub fn generate() -> Self {
        ShardId(uuid::Uuid::new_v4().to_string())
    }

    /// The id as rendered in document names.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `len` characters of the id.
    fn prefix(&self, len: usize) -> &str {
        match self.0.char_indices().nth(len) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl From<String> for ShardId {
    fn from(id: String) -> Self {
        ShardId(id)
    }
}

impl From<&str> for ShardId {
    fn from(id: &str) -> Self {
        ShardId(id.to_string())
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The position of a document in the aggregation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumAsInner)]
pub enum ShardLevel {
    /// The counter document itself.
    Root,
    /// A writer-owned leaf shard.
    Leaf,
    /// An intermediate aggregate at the given depth (1 to 4).
    Partial(usize),
}

impl ShardLevel {
    /// Classify a document id within the shard collection. Partials are
    /// recognized by their leading tabs; anything else is a leaf.
    pub fn of_shard_name(name: &str) -> ShardLevel {
        let depth = name.chars().take_while(|c| *c == PARTIAL_MARKER).count();
        if depth == 0 {
            ShardLevel::Leaf
        } else {
            ShardLevel::Partial(depth)
        }
    }

    /// The level values at this level are moved into by the aggregator.
    pub fn parent(&self) -> Option<ShardLevel> {
        match self {
            ShardLevel::Root => None,
            ShardLevel::Leaf => Some(ShardLevel::Partial(1)),
            ShardLevel::Partial(depth) if *depth >= MAX_PARTIAL_DEPTH => Some(ShardLevel::Root),
            ShardLevel::Partial(depth) => Some(ShardLevel::Partial(depth + 1)),
        }
    }
}

/// The name of the partial aggregate at `depth` covering `shard_id`.
pub fn partial_name(shard_id: &ShardId, depth: usize) -> String {
    let mut name = PARTIAL_MARKER.to_string().repeat(depth);
    name.push_str(shard_id.prefix(MAX_PARTIAL_DEPTH + 1 - depth));
    name
}

/// One of the documents a client tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardPath {
    level: ShardLevel,
    path: DocumentPath,
}

impl ShardPath {
    /// Where this document sits in the aggregation tree.
    pub fn level(&self) -> ShardLevel {
        self.level
    }

    /// The document path.
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }
}

/// The fixed set of six documents a client reads and listens to for a
/// counter: root, own leaf, and the four partials above the leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSet {
    shards: Vec<ShardPath>,
}

impl ShardSet {
    /// Derive the shard set for a counter on `root` written through
    /// `shard_id`. Deterministic and free of I/O.
    pub fn new(root: &DocumentPath, shard_id: &ShardId) -> Result<Self, CounterError> {
        let id = shard_id.as_str();
        if id.chars().count() < MAX_PARTIAL_DEPTH {
            return Err(CounterError::Config(format!(
                "shard id {:?} is shorter than {} characters",
                id, MAX_PARTIAL_DEPTH
            )));
        }
        if id.starts_with(PARTIAL_MARKER) {
            return Err(CounterError::Config(format!(
                "shard id {:?} would be mistaken for a partial aggregate",
                id
            )));
        }

        let shard = |name: &str, level| {
            root.child(SHARD_COLLECTION_ID, name)
                .map(|path| ShardPath { level, path })
                .map_err(|err| CounterError::Config(format!("shard id {:?}: {}", id, err)))
        };

        let mut shards = Vec::with_capacity(SHARD_PATH_COUNT);
        shards.push(ShardPath {
            level: ShardLevel::Root,
            path: root.clone(),
        });
        shards.push(shard(id, ShardLevel::Leaf)?);
        for depth in 1..=MAX_PARTIAL_DEPTH {
            shards.push(shard(
                &partial_name(shard_id, depth),
                ShardLevel::Partial(depth),
            )?);
        }
        Ok(Self { shards })
    }

    /// The counter document.
    pub fn root(&self) -> &DocumentPath {
        &self.shards[0].path
    }

    /// The leaf shard owned by this client; the only document it writes.
    pub fn leaf(&self) -> &DocumentPath {
        &self.shards[1].path
    }

    /// All tracked shards, root first.
    pub fn iter(&self) -> impl Iterator<Item = &ShardPath> {
        self.shards.iter()
    }

    /// All tracked document paths, root first.
    pub fn paths(&self) -> impl Iterator<Item = &DocumentPath> {
        self.shards.iter().map(ShardPath::path)
    }

    /// The number of tracked documents; always [`SHARD_PATH_COUNT`].
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Never true; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn root() -> DocumentPath {
        "rooms/42".parse().unwrap()
    }

    #[test]
    fn test_shard_set_layout() {
        let id = ShardId::from("a1b2c3d4-0000-4000-8000-000000000000");
        let shards = ShardSet::new(&root(), &id).unwrap();
        let paths: Vec<&str> = shards.paths().map(DocumentPath::as_str).collect();
        assert_eq!(
            paths,
            vec![
                "rooms/42",
                "rooms/42/_counter_shards_/a1b2c3d4-0000-4000-8000-000000000000",
                "rooms/42/_counter_shards_/\ta1b2",
                "rooms/42/_counter_shards_/\t\ta1b",
                "rooms/42/_counter_shards_/\t\t\ta1",
                "rooms/42/_counter_shards_/\t\t\t\ta",
            ]
        );
        assert_eq!(shards.root(), &root());
        assert_eq!(
            shards.leaf().id(),
            "a1b2c3d4-0000-4000-8000-000000000000"
        );
        let levels: Vec<ShardLevel> = shards.iter().map(ShardPath::level).collect();
        assert_eq!(
            levels,
            vec![
                ShardLevel::Root,
                ShardLevel::Leaf,
                ShardLevel::Partial(1),
                ShardLevel::Partial(2),
                ShardLevel::Partial(3),
                ShardLevel::Partial(4),
            ]
        );
    }

    #[test]
    fn test_generated_shard_sets_are_distinct() {
        for _ in 0..100 {
            let id = ShardId::generate();
            assert_eq!(id.as_str().len(), 36);
            assert_eq!(id.as_str(), id.as_str().to_lowercase());
            let shards = ShardSet::new(&root(), &id).unwrap();
            assert_eq!(shards.len(), SHARD_PATH_COUNT);
            let distinct: HashSet<&DocumentPath> = shards.paths().collect();
            assert_eq!(distinct.len(), SHARD_PATH_COUNT);
        }
    }

    #[test]
    fn test_short_shard_id_is_rejected() {
        let err = ShardSet::new(&root(), &ShardId::from("abc")).unwrap_err();
        assert!(matches!(err, CounterError::Config(_)));

        // Exactly four characters is enough.
        let shards = ShardSet::new(&root(), &ShardId::from("abcd")).unwrap();
        assert_eq!(shards.len(), SHARD_PATH_COUNT);
    }

    #[test]
    fn test_unusable_shard_ids_are_rejected() {
        assert!(matches!(
            ShardSet::new(&root(), &ShardId::from("\tabcd")),
            Err(CounterError::Config(_))
        ));
        assert!(matches!(
            ShardSet::new(&root(), &ShardId::from("ab/cd")),
            Err(CounterError::Config(_))
        ));
    }

    #[test]
    fn test_levels() {
        assert_eq!(ShardLevel::of_shard_name("a1b2"), ShardLevel::Leaf);
        assert_eq!(ShardLevel::of_shard_name("\ta1b2"), ShardLevel::Partial(1));
        assert_eq!(ShardLevel::of_shard_name("\t\t\t\ta"), ShardLevel::Partial(4));

        assert_eq!(ShardLevel::Leaf.parent(), Some(ShardLevel::Partial(1)));
        assert_eq!(ShardLevel::Partial(3).parent(), Some(ShardLevel::Partial(4)));
        assert_eq!(ShardLevel::Partial(4).parent(), Some(ShardLevel::Root));
        assert_eq!(ShardLevel::Root.parent(), None);
    }

    #[test]
    fn test_partial_names_nest() {
        let id = ShardId::from("f00dcafe");
        assert_eq!(partial_name(&id, 1), "\tf00d");
        assert_eq!(partial_name(&id, 4), "\t\t\t\tf");
        // A partial's parent name is a prefix-extension of the tab run
        // over a shorter id prefix.
        for depth in 1..MAX_PARTIAL_DEPTH {
            let child = partial_name(&id, depth);
            let parent = partial_name(&id, depth + 1);
            assert!(child.trim_start_matches('\t').starts_with(parent.trim_start_matches('\t')));
        }
    }
}
