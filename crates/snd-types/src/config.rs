// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Loop Configuration
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TwinError, TwinResult};

/// Which value source backs the loop. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic samples drawn from the current envelope, internal units.
    #[default]
    Test,
    /// Control-system channels through the gateway, external units.
    Live,
}

impl SourceKind {
    /// Whether readings arrive in device units and need transforming.
    pub fn is_external(self) -> bool {
        matches!(self, Self::Live)
    }
}

/// Whether non-pivot variables are re-read after a re-anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplePolicy {
    /// Resample for the test source, keep readings for the live source.
    #[default]
    FollowSource,
    Always,
    Never,
}

impl ResamplePolicy {
    pub fn resamples(self, source: SourceKind) -> bool {
        match self {
            Self::FollowSource => source == SourceKind::Test,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Metrics sink settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// MLflow tracking server.
    pub tracking_uri: String,
    pub experiment_name: String,
    /// Run names are `"<run_prefix><n>"`.
    pub run_prefix: String,
    /// CSV output used by the `csv` sink.
    pub csv_path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            tracking_uri: "https://ard-mlflow.slac.stanford.edu".to_string(),
            experiment_name: "snd-online-model".to_string(),
            run_prefix: "SND Online Model Run".to_string(),
            csv_path: "metrics.csv".to_string(),
        }
    }
}

/// Runtime configuration for the online model loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    /// Sleep between successful cycles, seconds.
    /// Default: 5.0.
    pub interval_s: f64,

    /// Sleep after a failed cycle, seconds.
    /// Default: 5.0.
    pub backoff_s: f64,

    /// Per-channel read timeout, seconds.
    /// Default: 5.0.
    pub read_timeout_s: f64,

    /// Half-width of the envelope placed around each resting position
    /// after a re-anchor, internal units.
    /// Default: 1e-4.
    pub reanchor_tolerance: f64,

    /// Drift threshold per pivot variable, internal units.
    /// Default: energy 100 eV, delay 0.1 ps.
    pub drift_thresholds: BTreeMap<String, f64>,

    pub resample_policy: ResamplePolicy,

    pub source: SourceKind,

    /// Seed for the test source; `None` seeds from entropy.
    pub seed: Option<u64>,

    /// Stop after this many ticks; `None` runs until interrupted.
    pub max_ticks: Option<u64>,

    pub metrics: MetricsConfig,
}

impl Default for TwinConfig {
    fn default() -> Self {
        let mut drift_thresholds = BTreeMap::new();
        drift_thresholds.insert("energy".to_string(), 100.0);
        drift_thresholds.insert("delay".to_string(), 0.1);
        Self {
            interval_s: 5.0,
            backoff_s: 5.0,
            read_timeout_s: 5.0,
            reanchor_tolerance: 1e-4,
            drift_thresholds,
            resample_policy: ResamplePolicy::FollowSource,
            source: SourceKind::Test,
            seed: None,
            max_ticks: None,
            metrics: MetricsConfig::default(),
        }
    }
}

impl TwinConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> TwinResult<()> {
        for (name, value) in [
            ("interval_s", self.interval_s),
            ("backoff_s", self.backoff_s),
            ("read_timeout_s", self.read_timeout_s),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(TwinError::Configuration(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(TwinError::Configuration(format!(
                    "{name} is too large to be a duration, got {value}"
                )));
            }
        }
        if self.read_timeout_s == 0.0 {
            return Err(TwinError::Configuration(
                "read_timeout_s must be > 0".to_string(),
            ));
        }
        if !(self.reanchor_tolerance.is_finite() && self.reanchor_tolerance > 0.0) {
            return Err(TwinError::Configuration(format!(
                "reanchor_tolerance must be > 0, got {}",
                self.reanchor_tolerance
            )));
        }
        if self.drift_thresholds.is_empty() {
            return Err(TwinError::Configuration(
                "at least one drift threshold is required".to_string(),
            ));
        }
        for (name, threshold) in &self.drift_thresholds {
            if !(threshold.is_finite() && *threshold > 0.0) {
                return Err(TwinError::Configuration(format!(
                    "drift threshold for '{name}' must be > 0, got {threshold}"
                )));
            }
        }
        if self.max_ticks == Some(0) {
            return Err(TwinError::Configuration(
                "max_ticks must be >= 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        seconds(self.interval_s)
    }

    pub fn backoff(&self) -> Duration {
        seconds(self.backoff_s)
    }

    pub fn read_timeout(&self) -> Duration {
        seconds(self.read_timeout_s)
    }

    /// Load from JSON string and validate.
    pub fn from_json(json: &str) -> TwinResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TwinError::Configuration(format!("JSON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> TwinResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TwinError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }
}

/// Saturating conversion; `validate()` rejects the values that saturate.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}
