// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Samples and Evaluation Records
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name-keyed scalar values. Ordered so logs and metrics are stable.
pub type ValueMap = BTreeMap<String, f64>;

/// One reading from the value source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    pub value: f64,
    /// Wall-clock seconds since the UNIX epoch.
    pub timestamp: f64,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: f64, timestamp: f64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
        }
    }
}

/// Per-channel outcome of a source read. A failed channel is reported
/// inline so the cycle can decide what to do with the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelReading {
    Value { value: f64, timestamp: f64 },
    Error { error: String },
}

impl ChannelReading {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// Latest timestamp in the batch; non-finite timestamps are ignored.
///
/// Returns `None` for an empty batch.
pub fn batch_timestamp(samples: &[Sample]) -> Option<f64> {
    samples
        .iter()
        .map(|s| s.timestamp)
        .filter(|t| t.is_finite())
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
}

/// Result of one successful evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Evaluated inputs, internal units.
    pub inputs: ValueMap,
    pub outputs: ValueMap,
    /// Batch timestamp, seconds since the UNIX epoch.
    pub timestamp: f64,
    /// Whether this cycle re-anchored the model.
    pub reanchored: bool,
}

impl EvaluationRecord {
    pub fn timestamp_ms(&self) -> i64 {
        (self.timestamp * 1000.0).round() as i64
    }

    /// Inputs and outputs flattened into one metric map.
    ///
    /// The cycle rejects outputs named like an input, so no key is lost.
    pub fn metrics(&self) -> ValueMap {
        let mut values = self.inputs.clone();
        values.extend(self.outputs.iter().map(|(k, v)| (k.clone(), *v)));
        values
    }
}

/// Counters accumulated by the loop driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub ticks: u64,
    pub successes: u64,
    pub failures: u64,
    pub reanchors: u64,
    pub last_error: Option<String>,
    pub stopped: bool,
}

impl LoopSummary {
    pub fn failure_rate(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.failures as f64 / self.ticks as f64
    }
}

/// Renders a value map one `name = value` per line, for debug logs.
pub struct MultiLine<'a>(pub &'a ValueMap);

impl fmt::Display for MultiLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.0 {
            write!(f, "\n{name} = {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_timestamp_latest_wins() {
        let batch = vec![
            Sample::new("a", 1.0, 10.0),
            Sample::new("b", 2.0, 12.0),
            Sample::new("c", 3.0, 9.0),
        ];
        assert_eq!(batch_timestamp(&batch), Some(12.0));
    }

    #[test]
    fn test_batch_timestamp_empty() {
        assert_eq!(batch_timestamp(&[]), None);
    }

    #[test]
    fn test_batch_timestamp_skips_nan() {
        let batch = vec![Sample::new("a", 1.0, f64::NAN), Sample::new("b", 1.0, 3.0)];
        assert_eq!(batch_timestamp(&batch), Some(3.0));
    }

    #[test]
    fn test_record_metrics_and_ms() {
        let record = EvaluationRecord {
            inputs: [("energy".to_string(), 9500.0)].into_iter().collect(),
            outputs: [("IP_sum".to_string(), 0.8)].into_iter().collect(),
            timestamp: 1_700_000_000.1234,
            reanchored: false,
        };
        let metrics = record.metrics();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["IP_sum"], 0.8);
        assert_eq!(record.timestamp_ms(), 1_700_000_000_123);
    }

    #[test]
    fn test_channel_reading_untagged() {
        let ok: ChannelReading =
            serde_json::from_str(r#"{"value": 1.5, "timestamp": 2.0}"#).unwrap();
        assert_eq!(
            ok,
            ChannelReading::Value {
                value: 1.5,
                timestamp: 2.0
            }
        );
        let err: ChannelReading = serde_json::from_str(r#"{"error": "disconnected"}"#).unwrap();
        assert_eq!(err, ChannelReading::error("disconnected"));
    }

    #[test]
    fn test_multiline_format() {
        let values: ValueMap = [("a".to_string(), 1.0), ("b".to_string(), 2.5)]
            .into_iter()
            .collect();
        assert_eq!(MultiLine(&values).to_string(), "\na = 1\nb = 2.5");
    }

    #[test]
    fn test_summary_failure_rate() {
        let summary = LoopSummary {
            ticks: 4,
            failures: 1,
            ..Default::default()
        };
        assert!((summary.failure_rate() - 0.25).abs() < 1e-12);
        assert_eq!(LoopSummary::default().failure_rate(), 0.0);
    }
}
