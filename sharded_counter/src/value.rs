/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Document field values, snapshots, and merge updates.

use std::collections::BTreeMap;

use enum_as_inner::EnumAsInner;
use serde::Deserialize;
use serde::Serialize;

use crate::path::DocumentPath;
use crate::path::FieldPath;

/// The fields of a document.
pub type Fields = BTreeMap<String, Value>;

/// A document field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
#[serde(untagged)]
pub enum Value {
    /// An explicit null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A double-precision float.
    Double(f64),
    /// A UTF-8 string.
    String(String),
    /// A nested map.
    Map(Fields),
}

impl Value {
    /// The numeric value of this field as a double, if it is numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Double(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/// Look up a (possibly nested) field. Returns `None` if any component
/// along the path is missing or is not a map.
pub fn lookup<'a>(fields: &'a Fields, path: &FieldPath) -> Option<&'a Value> {
    let (last, parents) = path.components().split_last()?;
    let mut current = fields;
    for component in parents {
        current = current.get(component)?.as_map()?;
    }
    current.get(last)
}

/// A point-in-time view of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    path: DocumentPath,
    fields: Option<Fields>,
}

impl DocumentSnapshot {
    /// A snapshot of an existing document.
    pub fn new(path: DocumentPath, fields: Fields) -> Self {
        Self {
            path,
            fields: Some(fields),
        }
    }

    /// A snapshot reporting that the document does not exist.
    pub fn missing(path: DocumentPath) -> Self {
        Self { path, fields: None }
    }

    /// The path of the document.
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Whether the document exists.
    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    /// The document's fields, if it exists.
    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }

    /// The value at `field`, if the document exists and has it.
    pub fn get(&self, field: &FieldPath) -> Option<&Value> {
        lookup(self.fields.as_ref()?, field)
    }
}

/// One entry of a merge write.
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum FieldUpdate {
    /// Replace the field with a value.
    Set(Value),
    /// Server-side atomic numeric increment.
    Increment(f64),
    /// Descend into a nested map, creating it if absent.
    Nested(MergeUpdate),
}

/// The payload of a merge write: only the mentioned fields are touched.
pub type MergeUpdate = BTreeMap<String, FieldUpdate>;

/// Apply a merge write to a document's fields, the way the database
/// evaluates it server-side:
///
/// - `Set` replaces the field.
/// - `Increment` adds to a numeric field. Integer plus an integral delta
///   stays an integer; anything else becomes a double. A missing or
///   non-numeric field is replaced by the delta.
/// - `Nested` descends into a map, replacing a non-map field with an
///   empty map first.
pub fn apply_merge(fields: &mut Fields, update: &MergeUpdate) {
    for (name, entry) in update {
        match entry {
            FieldUpdate::Set(value) => {
                fields.insert(name.clone(), value.clone());
            }
            FieldUpdate::Increment(delta) => {
                let incremented = increment(fields.get(name), *delta);
                fields.insert(name.clone(), incremented);
            }
            FieldUpdate::Nested(nested) => {
                let slot = fields
                    .entry(name.clone())
                    .or_insert_with(|| Value::Map(Fields::new()));
                if !slot.is_map() {
                    *slot = Value::Map(Fields::new());
                }
                if let Value::Map(inner) = slot {
                    apply_merge(inner, nested);
                }
            }
        }
    }
}

// Deltas beyond this magnitude cannot be represented exactly as both
// f64 and i64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn as_exact_integer(delta: f64) -> Option<i64> {
    if delta.fract() == 0.0 && delta.abs() <= MAX_EXACT_INTEGER {
        Some(delta as i64)
    } else {
        None
    }
}

fn increment(current: Option<&Value>, delta: f64) -> Value {
    match (current, as_exact_integer(delta)) {
        (Some(Value::Integer(value)), Some(delta)) => match value.checked_add(delta) {
            Some(sum) => Value::Integer(sum),
            None => Value::Double(*value as f64 + delta as f64),
        },
        (Some(Value::Integer(value)), None) => Value::Double(*value as f64 + delta),
        (Some(Value::Double(value)), _) => Value::Double(value + delta),
        (_, Some(delta)) => Value::Integer(delta),
        (_, None) => Value::Double(delta),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: serde_json::Value) -> Fields {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deserialize_fields() {
        let fields = fields(json!({
            "count": 3,
            "ratio": 0.5,
            "name": "lobby",
            "stats": {"views": 7, "open": true, "note": null},
        }));
        assert_eq!(fields["count"], Value::Integer(3));
        assert_eq!(fields["ratio"], Value::Double(0.5));
        assert_eq!(fields["name"], Value::from("lobby"));
        let stats = fields["stats"].as_map().unwrap();
        assert_eq!(stats["views"], Value::Integer(7));
        assert_eq!(stats["open"], Value::Bool(true));
        assert_eq!(stats["note"], Value::Null);
    }

    #[test]
    fn test_lookup() {
        let fields = fields(json!({"a": {"b": {"c": 2.5}}, "x": 1}));
        let path = |s: &str| s.parse::<FieldPath>().unwrap();
        assert_eq!(
            lookup(&fields, &path("a.b.c")).and_then(Value::as_number),
            Some(2.5)
        );
        assert_eq!(lookup(&fields, &path("x")), Some(&Value::Integer(1)));
        assert_eq!(lookup(&fields, &path("a.b.missing")), None);
        // Descending through a non-map yields nothing.
        assert_eq!(lookup(&fields, &path("x.y")), None);
    }

    #[test]
    fn test_snapshot_missing() {
        let path: DocumentPath = "rooms/1".parse().unwrap();
        let snapshot = DocumentSnapshot::missing(path.clone());
        assert!(!snapshot.exists());
        assert_eq!(snapshot.get(&"count".parse().unwrap()), None);
        assert_eq!(snapshot.path(), &path);
    }

    #[test]
    fn test_apply_merge_increments() {
        let mut doc = fields(json!({"count": 2, "ratio": 1.5, "label": "x"}));
        let update = MergeUpdate::from([
            ("count".to_string(), FieldUpdate::Increment(3.0)),
            ("ratio".to_string(), FieldUpdate::Increment(1.0)),
            ("label".to_string(), FieldUpdate::Increment(4.0)),
            ("fresh".to_string(), FieldUpdate::Increment(0.25)),
        ]);
        apply_merge(&mut doc, &update);
        assert_eq!(doc["count"], Value::Integer(5));
        assert_eq!(doc["ratio"], Value::Double(2.5));
        assert_eq!(doc["label"], Value::Integer(4));
        assert_eq!(doc["fresh"], Value::Double(0.25));

        apply_merge(
            &mut doc,
            &MergeUpdate::from([("count".to_string(), FieldUpdate::Increment(0.5))]),
        );
        assert_eq!(doc["count"], Value::Double(5.5));
    }

    #[test]
    fn test_apply_merge_preserves_unmentioned_fields() {
        let mut doc = fields(json!({"stats": {"views": 1, "likes": 9}, "other": "kept"}));
        let update = MergeUpdate::from([(
            "stats".to_string(),
            FieldUpdate::Nested(MergeUpdate::from([(
                "views".to_string(),
                FieldUpdate::Increment(1.0),
            )])),
        )]);
        apply_merge(&mut doc, &update);
        assert_eq!(
            doc,
            fields(json!({"stats": {"views": 2, "likes": 9}, "other": "kept"}))
        );
    }

    #[test]
    fn test_apply_merge_creates_and_replaces_parents() {
        let mut doc = fields(json!({"stats": 4}));
        let update = MergeUpdate::from([(
            "stats".to_string(),
            FieldUpdate::Nested(MergeUpdate::from([(
                "views".to_string(),
                FieldUpdate::Increment(1.0),
            )])),
        )]);
        apply_merge(&mut doc, &update);
        assert_eq!(doc, fields(json!({"stats": {"views": 1}})));

        let mut empty = Fields::new();
        apply_merge(&mut empty, &update);
        assert_eq!(empty, fields(json!({"stats": {"views": 1}})));
    }

    #[test]
    fn test_integer_overflow_falls_back_to_double() {
        let mut doc = Fields::from([("n".to_string(), Value::Integer(i64::MAX))]);
        apply_merge(
            &mut doc,
            &MergeUpdate::from([("n".to_string(), FieldUpdate::Increment(1.0))]),
        );
        assert!(doc["n"].is_double());
    }
}
