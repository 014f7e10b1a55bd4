// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Re-anchor Procedure
// ─────────────────────────────────────────────────────────────────────
//! Reinitializes the model around new pivot values and rebases the
//! envelope of every dependent variable on the model's resting state.
//!
//! The new state is assembled on a detached copy and only returned when
//! every step succeeded; the caller's state is never touched, so a
//! failing reinitializer leaves the committed anchor wholly intact.

use std::collections::BTreeMap;

use snd_types::{TwinError, TwinResult, ValidationMode, ValueMap, ValueRange, Variable};

use crate::model::ModelBackend;
use crate::reference::ReferenceState;

/// Compute the reference state anchored at `new_pivots`.
///
/// Every dependent variable ends with `default = resting` and
/// `range = [resting - tolerance, resting + tolerance]`; every variable
/// (pivots included) ends in `warn` mode.
pub fn reanchor<M: ModelBackend + ?Sized>(
    reference: &ReferenceState,
    model: &M,
    new_pivots: &ValueMap,
    tolerance: f64,
) -> TwinResult<ReferenceState> {
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return Err(TwinError::Reanchor(format!(
            "tolerance must be > 0, got {tolerance}"
        )));
    }

    let mut pivot_values = ValueMap::new();
    for name in reference.pivot_names() {
        let value = *new_pivots
            .get(name)
            .ok_or_else(|| TwinError::Reanchor(format!("new anchor is missing pivot '{name}'")))?;
        if !value.is_finite() {
            return Err(TwinError::Reanchor(format!(
                "new anchor for '{name}' is not finite: {value}"
            )));
        }
        pivot_values.insert(name.to_string(), value);
    }

    // Relaxed working copy: values move far outside the old envelope here.
    let mut variables: BTreeMap<String, Variable> = reference
        .variables()
        .map(|v| {
            (
                v.name.clone(),
                v.clone().with_mode(ValidationMode::None),
            )
        })
        .collect();

    let resting = model.initialize(&pivot_values).map_err(|e| {
        TwinError::Reanchor(format!(
            "model reinitialization failed moving anchor {:?} -> {pivot_values:?}: {e}",
            reference.pivot_values()
        ))
    })?;

    for name in reference.dependent_names() {
        let position = *resting.get(&name).ok_or_else(|| {
            TwinError::Reanchor(format!("model returned no resting position for '{name}'"))
        })?;
        if !position.is_finite() {
            return Err(TwinError::Reanchor(format!(
                "resting position for '{name}' is not finite: {position}"
            )));
        }
        if let Some(var) = variables.get_mut(&name) {
            var.default_value = position;
            var.value_range = ValueRange::around(position, tolerance);
        }
    }
    for name in resting.keys() {
        if !variables.contains_key(name) {
            log::debug!("ignoring resting position for undeclared '{name}'");
        }
    }

    for (name, &value) in &pivot_values {
        if let Some(var) = variables.get_mut(name) {
            var.default_value = value;
            var.value_range = var.value_range.hull(value);
        }
    }

    for var in variables.values_mut() {
        var.validation_mode = ValidationMode::Warn;
    }

    Ok(ReferenceState::from_parts(pivot_values, variables))
}
