// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Model Variables
// ─────────────────────────────────────────────────────────────────────
//! Scalar model channels with their validated envelope.

use serde::{Deserialize, Serialize};

use crate::error::{TwinError, TwinResult};

/// How strictly a variable's range is enforced on evaluation inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Out-of-range values are rejected.
    Strict,
    /// Out-of-range values are logged and accepted.
    #[default]
    Warn,
    /// No range check.
    None,
}

/// Closed interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: f64,
    pub high: f64,
}

impl ValueRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// `[center - half_width, center + half_width]`.
    pub fn around(center: f64, half_width: f64) -> Self {
        Self::new(center - half_width, center + half_width)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.low..=self.high).contains(&value)
    }

    /// Smallest range covering both `self` and `value`.
    pub fn hull(&self, value: f64) -> Self {
        Self::new(self.low.min(value), self.high.max(value))
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// One scalar channel of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub default_value: f64,
    pub value_range: ValueRange,
    #[serde(default)]
    pub validation_mode: ValidationMode,
}

impl Variable {
    pub fn new(name: impl Into<String>, default_value: f64, value_range: ValueRange) -> Self {
        Self {
            name: name.into(),
            default_value,
            value_range,
            validation_mode: ValidationMode::Warn,
        }
    }

    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    /// Check the `low <= default <= high` invariant (skipped for `None`).
    pub fn check_invariant(&self) -> TwinResult<()> {
        if self.validation_mode == ValidationMode::None {
            return Ok(());
        }
        let ValueRange { low, high } = self.value_range;
        if !(low.is_finite() && high.is_finite() && self.default_value.is_finite()) {
            return Err(TwinError::Configuration(format!(
                "variable '{}' has a non-finite default or range",
                self.name
            )));
        }
        if low > high || !self.value_range.contains(self.default_value) {
            return Err(TwinError::Configuration(format!(
                "variable '{}': default {} not within [{low}, {high}]",
                self.name, self.default_value
            )));
        }
        Ok(())
    }

    /// Validate an input value against the envelope according to the mode.
    ///
    /// Returns `Ok(false)` when the value is outside the range but the mode
    /// only warns, `Ok(true)` when it is inside (or unchecked).
    pub fn validate(&self, value: f64) -> TwinResult<bool> {
        match self.validation_mode {
            ValidationMode::None => Ok(true),
            _ if self.value_range.contains(value) => Ok(true),
            ValidationMode::Warn => {
                log::warn!(
                    "{} = {value} outside envelope [{}, {}]",
                    self.name,
                    self.value_range.low,
                    self.value_range.high
                );
                Ok(false)
            }
            ValidationMode::Strict => Err(TwinError::Validation {
                name: self.name.clone(),
                value,
                low: self.value_range.low,
                high: self.value_range.high,
            }),
        }
    }
}
