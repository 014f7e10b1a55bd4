// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Reference State
// ─────────────────────────────────────────────────────────────────────
//! The committed anchor point of the model: pivot values plus the
//! validated envelope of every variable.
//!
//! A `ReferenceState` is an immutable value. Re-anchoring builds a new
//! one next to the old and the owner swaps it in; nothing mutates the
//! envelope of a committed state field by field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use snd_types::{TwinError, TwinResult, ValueMap, Variable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceState {
    pivot_values: ValueMap,
    variables: BTreeMap<String, Variable>,
}

impl ReferenceState {
    /// Build the initial state from the model's built-in variables.
    ///
    /// Pivot values start at the pivots' default values.
    pub fn from_variables(variables: Vec<Variable>, pivots: &[String]) -> TwinResult<Self> {
        if pivots.is_empty() {
            return Err(TwinError::Configuration(
                "model declares no pivot variables".to_string(),
            ));
        }
        let mut by_name = BTreeMap::new();
        for var in variables {
            var.check_invariant()?;
            let name = var.name.clone();
            if by_name.insert(name.clone(), var).is_some() {
                return Err(TwinError::Configuration(format!(
                    "variable '{name}' declared twice"
                )));
            }
        }
        let mut pivot_values = ValueMap::new();
        for pivot in pivots {
            let var = by_name.get(pivot).ok_or_else(|| {
                TwinError::Configuration(format!("pivot '{pivot}' is not a model variable"))
            })?;
            pivot_values.insert(pivot.clone(), var.default_value);
        }
        Ok(Self {
            pivot_values,
            variables: by_name,
        })
    }

    /// Assemble a state from already-validated parts. Used by re-anchoring.
    pub(crate) fn from_parts(pivot_values: ValueMap, variables: BTreeMap<String, Variable>) -> Self {
        Self {
            pivot_values,
            variables,
        }
    }

    pub fn pivot_values(&self) -> &ValueMap {
        &self.pivot_values
    }

    pub fn pivot_value(&self, name: &str) -> Option<f64> {
        self.pivot_values.get(name).copied()
    }

    pub fn pivot_names(&self) -> impl Iterator<Item = &str> {
        self.pivot_values.keys().map(String::as_str)
    }

    pub fn is_pivot(&self, name: &str) -> bool {
        self.pivot_values.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Every declared input name, pivots included.
    pub fn input_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    /// Non-pivot variables whose envelope follows the model's resting state.
    pub fn dependent_names(&self) -> Vec<String> {
        self.variables
            .keys()
            .filter(|n| !self.is_pivot(n))
            .cloned()
            .collect()
    }

    /// Validate a full input set against the envelope.
    ///
    /// Returns the names that fell outside a `warn` envelope; a `strict`
    /// violation or an undeclared name is an error.
    pub fn validate_inputs(&self, inputs: &ValueMap) -> TwinResult<Vec<String>> {
        let mut outside = Vec::new();
        for (name, value) in inputs {
            let var = self.variables.get(name).ok_or_else(|| {
                TwinError::Configuration(format!("input '{name}' is not a model variable"))
            })?;
            if !var.validate(*value)? {
                outside.push(name.clone());
            }
        }
        Ok(outside)
    }
}

#[cfg(test)]
mod tests {
    use snd_types::{ValidationMode, ValueRange};

    use super::*;

    fn vars() -> Vec<Variable> {
        vec![
            Variable::new("angle", 0.0, ValueRange::new(-1.0, 1.0)),
            Variable::new("m1", 4.0, ValueRange::new(3.0, 6.0)),
            Variable::new("m2", -3.0, ValueRange::new(-4.0, -2.0))
                .with_mode(ValidationMode::Strict),
        ]
    }

    #[test]
    fn test_from_variables() {
        let state = ReferenceState::from_variables(vars(), &["angle".to_string()]).unwrap();
        assert_eq!(state.pivot_value("angle"), Some(0.0));
        assert_eq!(state.dependent_names(), vec!["m1", "m2"]);
        assert_eq!(state.input_names().len(), 3);
        assert!(state.is_pivot("angle"));
        assert!(!state.is_pivot("m1"));
    }

    #[test]
    fn test_unknown_pivot() {
        let err = ReferenceState::from_variables(vars(), &["energy".to_string()]).unwrap_err();
        assert!(matches!(err, TwinError::Configuration(_)));
    }

    #[test]
    fn test_no_pivots() {
        assert!(ReferenceState::from_variables(vars(), &[]).is_err());
    }

    #[test]
    fn test_duplicate_variable() {
        let mut v = vars();
        v.push(Variable::new("m1", 0.0, ValueRange::new(-1.0, 1.0)));
        assert!(ReferenceState::from_variables(v, &["angle".to_string()]).is_err());
    }

    #[test]
    fn test_invariant_checked() {
        let v = vec![Variable::new("angle", 5.0, ValueRange::new(-1.0, 1.0))];
        assert!(ReferenceState::from_variables(v, &["angle".to_string()]).is_err());
    }

    #[test]
    fn test_validate_inputs() {
        let state = ReferenceState::from_variables(vars(), &["angle".to_string()]).unwrap();
        let inputs: ValueMap = [("angle", 0.5), ("m1", 10.0), ("m2", -3.5)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(state.validate_inputs(&inputs).unwrap(), vec!["m1"]);

        let strict_violation: ValueMap = [("m2".to_string(), 0.0)].into_iter().collect();
        assert!(matches!(
            state.validate_inputs(&strict_violation),
            Err(TwinError::Validation { .. })
        ));

        let unknown: ValueMap = [("m9".to_string(), 0.0)].into_iter().collect();
        assert!(state.validate_inputs(&unknown).is_err());
    }
}
