// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Unit Transform
// ─────────────────────────────────────────────────────────────────────
//! Bidirectional mapping between device (external) and simulation
//! (internal) units: `internal = external * factor`.

use std::collections::BTreeMap;

use snd_types::{Declarations, TwinError, TwinResult, ValueMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitMap {
    factors: BTreeMap<String, f64>,
}

impl UnitMap {
    pub fn new(factors: BTreeMap<String, f64>) -> TwinResult<Self> {
        for (name, factor) in &factors {
            if !factor.is_finite() || *factor == 0.0 {
                return Err(TwinError::Configuration(format!(
                    "unit factor for '{name}' must be finite and non-zero, got {factor}"
                )));
            }
        }
        Ok(Self { factors })
    }

    /// Identity factors for the given names.
    pub fn identity<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            factors: names.into_iter().map(|n| (n.to_string(), 1.0)).collect(),
        }
    }

    pub fn from_declarations(declarations: &Declarations) -> TwinResult<Self> {
        Self::new(declarations.factors())
    }

    fn factor(&self, name: &str) -> TwinResult<f64> {
        self.factors.get(name).copied().ok_or_else(|| {
            TwinError::Configuration(format!("no unit conversion declared for '{name}'"))
        })
    }

    pub fn to_internal(&self, values: &ValueMap) -> TwinResult<ValueMap> {
        values
            .iter()
            .map(|(name, v)| Ok((name.clone(), v * self.factor(name)?)))
            .collect()
    }

    pub fn to_external(&self, values: &ValueMap) -> TwinResult<ValueMap> {
        values
            .iter()
            .map(|(name, v)| Ok((name.clone(), v / self.factor(name)?)))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factors.contains_key(name)
    }
}
