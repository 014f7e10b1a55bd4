// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Drift Detector
// ─────────────────────────────────────────────────────────────────────
//! Decides whether sampled pivot values have moved far enough from the
//! committed anchor to invalidate the model's reference state.
//!
//! Thresholds are per pivot and expressed in internal units: an angular
//! pivot needs a radian-scale threshold, a delay pivot a much coarser one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use snd_types::{TwinError, TwinResult, ValueMap};

use crate::reference::ReferenceState;

/// Drift of a single pivot relative to the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotDrift {
    pub name: String,
    pub reference: f64,
    pub sampled: f64,
    pub delta: f64,
    pub threshold: f64,
    pub exceeded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub pivots: Vec<PivotDrift>,
}

impl DriftReport {
    pub fn is_stale(&self) -> bool {
        self.pivots.iter().any(|p| p.exceeded)
    }

    /// Sampled pivot values, the candidate new anchor.
    pub fn sampled(&self) -> ValueMap {
        self.pivots
            .iter()
            .map(|p| (p.name.clone(), p.sampled))
            .collect()
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .pivots
            .iter()
            .map(|p| {
                format!(
                    "{}: {} -> {} (|Δ|={:.6}{}{})",
                    p.name,
                    p.reference,
                    p.sampled,
                    p.delta,
                    if p.exceeded { " > " } else { " <= " },
                    p.threshold
                )
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriftDetector {
    thresholds: BTreeMap<String, f64>,
}

impl DriftDetector {
    /// Build a detector; every pivot of `reference` must have a positive
    /// threshold.
    pub fn new(thresholds: BTreeMap<String, f64>, reference: &ReferenceState) -> TwinResult<Self> {
        for pivot in reference.pivot_names() {
            match thresholds.get(pivot) {
                Some(t) if t.is_finite() && *t > 0.0 => {}
                Some(t) => {
                    return Err(TwinError::Configuration(format!(
                        "drift threshold for '{pivot}' must be > 0, got {t}"
                    )))
                }
                None => {
                    return Err(TwinError::Configuration(format!(
                        "pivot '{pivot}' has no drift threshold"
                    )))
                }
            }
        }
        for name in thresholds.keys() {
            if !reference.is_pivot(name) {
                log::warn!("drift threshold for '{name}' ignored: not a pivot variable");
            }
        }
        Ok(Self { thresholds })
    }

    pub fn threshold(&self, name: &str) -> Option<f64> {
        self.thresholds.get(name).copied()
    }

    /// Compare the sampled pivots (internal units) against the reference.
    pub fn check(&self, reference: &ReferenceState, sample: &ValueMap) -> TwinResult<DriftReport> {
        let mut pivots = Vec::new();
        for (name, &anchor) in reference.pivot_values() {
            let sampled = *sample.get(name).ok_or_else(|| {
                TwinError::Configuration(format!("pivot '{name}' missing from sample"))
            })?;
            let threshold = self.threshold(name).ok_or_else(|| {
                TwinError::Configuration(format!("pivot '{name}' has no drift threshold"))
            })?;
            let delta = (sampled - anchor).abs();
            pivots.push(PivotDrift {
                name: name.clone(),
                reference: anchor,
                sampled,
                delta,
                threshold,
                exceeded: delta > threshold,
            });
        }
        Ok(DriftReport { pivots })
    }

    pub fn is_stale(&self, reference: &ReferenceState, sample: &ValueMap) -> TwinResult<bool> {
        Ok(self.check(reference, sample)?.is_stale())
    }
}
