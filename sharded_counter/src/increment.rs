/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::error::CounterError;
use crate::path::FieldPath;
use crate::value::FieldUpdate;
use crate::value::MergeUpdate;

/// Build the merge write that adds `delta` to `field`: one single-entry
/// map per parent component wrapping an increment at the leaf, so
/// `a.b.c` becomes `{a: {b: {c: Increment(delta)}}}`.
pub fn increment_update(field: &FieldPath, delta: f64) -> Result<MergeUpdate, CounterError> {
    if !delta.is_finite() {
        return Err(CounterError::Argument(format!(
            "increment must be finite, got {}",
            delta
        )));
    }
    let (leaf, parents) = field
        .components()
        .split_last()
        .ok_or_else(|| CounterError::Argument("empty field path".to_string()))?;

    let mut update = MergeUpdate::from([(leaf.clone(), FieldUpdate::Increment(delta))]);
    for component in parents.iter().rev() {
        update = MergeUpdate::from([(component.clone(), FieldUpdate::Nested(update))]);
    }
    Ok(update)
}
