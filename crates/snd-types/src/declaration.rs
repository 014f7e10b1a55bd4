// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Variable Declaration File
// ─────────────────────────────────────────────────────────────────────
//! Load-once mapping from model variable name to control-system
//! channel and unit-conversion factor.
//!
//! ```json
//! {
//!   "energy": { "channel": "SND:DIA:ENERGY", "factor": 1000.0 },
//!   "t1_th1": { "channel": "SND:T1:TH1:RBV", "factor": 1.0 }
//! }
//! ```
//!
//! `factor` converts external to internal units: `internal = external * factor`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TwinError, TwinResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDeclaration {
    pub channel: String,
    #[serde(default = "unit_factor")]
    pub factor: f64,
}

fn unit_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Declarations {
    entries: BTreeMap<String, ChannelDeclaration>,
}

impl Declarations {
    pub fn new(entries: BTreeMap<String, ChannelDeclaration>) -> TwinResult<Self> {
        let declarations = Self { entries };
        declarations.validate()?;
        Ok(declarations)
    }

    pub fn validate(&self) -> TwinResult<()> {
        let mut seen = HashSet::new();
        for (name, decl) in &self.entries {
            if decl.channel.trim().is_empty() {
                return Err(TwinError::Configuration(format!(
                    "variable '{name}' has an empty channel name"
                )));
            }
            if !decl.factor.is_finite() || decl.factor == 0.0 {
                return Err(TwinError::Configuration(format!(
                    "variable '{name}' has invalid unit factor {}",
                    decl.factor
                )));
            }
            if !seen.insert(decl.channel.as_str()) {
                return Err(TwinError::Configuration(format!(
                    "channel '{}' is declared more than once",
                    decl.channel
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> TwinResult<Self> {
        let declarations: Self = serde_json::from_str(json)
            .map_err(|e| TwinError::Configuration(format!("declaration parse error: {e}")))?;
        declarations.validate()?;
        Ok(declarations)
    }

    pub fn from_file(path: impl AsRef<Path>) -> TwinResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TwinError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Every name in `names` must be declared.
    pub fn ensure_covers<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> TwinResult<()> {
        let missing: Vec<&str> = names
            .into_iter()
            .filter(|n| !self.entries.contains_key(*n))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TwinError::Configuration(format!(
                "undeclared variables: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn get(&self, name: &str) -> TwinResult<&ChannelDeclaration> {
        self.entries
            .get(name)
            .ok_or_else(|| TwinError::Configuration(format!("variable '{name}' is not declared")))
    }

    pub fn channel(&self, name: &str) -> TwinResult<&str> {
        self.get(name).map(|d| d.channel.as_str())
    }

    pub fn factors(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|(name, decl)| (name.clone(), decl.factor))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
