// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for every failure the evaluation loop can surface.
///
/// Lower components never retry or swallow these; the loop driver is the
/// only place that turns them into a logged, backed-off outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TwinError {
    /// Declared variable/channel/unit tables are inconsistent, or a
    /// configuration document failed to load.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A channel failed to produce a usable value.
    #[error("source read error on '{channel}': {reason}")]
    SourceRead { channel: String, reason: String },

    /// The model reinitializer rejected the new pivot values.
    #[error("re-anchor error: {0}")]
    Reanchor(String),

    /// The model evaluator failed on the given input set.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// A strictly validated variable left its envelope.
    #[error("validation error: {name} = {value} outside [{low}, {high}]")]
    Validation {
        name: String,
        value: f64,
        low: f64,
        high: f64,
    },

    /// The metrics sink could not store a record.
    #[error("metrics error: {0}")]
    Metrics(String),
}

impl TwinError {
    pub fn source_read(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceRead {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Short category label used in loop logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::SourceRead { .. } => "source_read",
            Self::Reanchor(_) => "reanchor",
            Self::Evaluation(_) => "evaluation",
            Self::Validation { .. } => "validation",
            Self::Metrics(_) => "metrics",
        }
    }
}

pub type TwinResult<T> = Result<T, TwinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_read_message() {
        let err = TwinError::source_read("SND:T1:TH1", "timeout after 5s");
        assert_eq!(
            err.to_string(),
            "source read error on 'SND:T1:TH1': timeout after 5s"
        );
        assert_eq!(err.category(), "source_read");
    }

    #[test]
    fn test_validation_message() {
        let err = TwinError::Validation {
            name: "t1_th1".into(),
            value: 2.0,
            low: 0.0,
            high: 1.0,
        };
        assert!(err.to_string().contains("t1_th1 = 2 outside [0, 1]"));
    }
}
