// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Metrics Sinks
// ─────────────────────────────────────────────────────────────────────
//! Destinations for evaluation records. The loop always supplies the
//! batch timestamp so recorded instants line up with the physical
//! sample; `None` means "use the current time".

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use snd_types::{MultiLine, TwinError, TwinResult, ValueMap};

use crate::source::unix_now;

pub trait MetricsSink: Send {
    fn record(&mut self, values: &ValueMap, timestamp_ms: Option<i64>) -> TwinResult<()>;

    /// Flush and release the sink. Called once when the loop stops.
    fn close(&mut self) -> TwinResult<()> {
        Ok(())
    }
}

pub(crate) fn resolve_timestamp_ms(timestamp_ms: Option<i64>) -> i64 {
    timestamp_ms.unwrap_or_else(|| (unix_now() * 1000.0).round() as i64)
}

/// One stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetrics {
    pub values: ValueMap,
    pub timestamp_ms: i64,
}

/// In-memory sink; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<RecordedMetrics>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RecordedMetrics> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl MetricsSink for MemorySink {
    fn record(&mut self, values: &ValueMap, timestamp_ms: Option<i64>) -> TwinResult<()> {
        self.records.lock().push(RecordedMetrics {
            values: values.clone(),
            timestamp_ms: resolve_timestamp_ms(timestamp_ms),
        });
        Ok(())
    }
}

/// Writes records through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn record(&mut self, values: &ValueMap, timestamp_ms: Option<i64>) -> TwinResult<()> {
        log::info!(
            "metrics @ {} ms:{}",
            resolve_timestamp_ms(timestamp_ms),
            MultiLine(values)
        );
        Ok(())
    }
}

/// Appends `timestamp,key,value` rows (timestamps in ms) to a CSV file.
pub struct CsvSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvSink {
    pub const HEADER: &'static str = "timestamp,key,value";

    /// Open `path` for appending, writing the header if the file is new.
    pub fn create(path: impl AsRef<Path>) -> TwinResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metrics_err =
            |e: std::io::Error| TwinError::Metrics(format!("{}: {e}", path.display()));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(metrics_err)?;
        let is_empty = file.metadata().map_err(metrics_err)?.len() == 0;
        let mut writer = BufWriter::new(file);
        if is_empty {
            writeln!(writer, "{}", Self::HEADER).map_err(metrics_err)?;
            writer.flush().map_err(metrics_err)?;
        }
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for CsvSink {
    fn record(&mut self, values: &ValueMap, timestamp_ms: Option<i64>) -> TwinResult<()> {
        let ts = resolve_timestamp_ms(timestamp_ms);
        let io = |e: std::io::Error| TwinError::Metrics(format!("{}: {e}", self.path.display()));
        for (key, value) in values {
            writeln!(self.writer, "{ts},{key},{value}").map_err(io)?;
        }
        self.writer.flush().map_err(io)
    }

    fn close(&mut self) -> TwinResult<()> {
        self.writer
            .flush()
            .map_err(|e| TwinError::Metrics(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> ValueMap {
        [("IP_sum".to_string(), 0.75), ("energy".to_string(), 9500.0)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_memory_sink_shared() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.record(&values(), Some(1234)).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].timestamp_ms, 1234);
        assert_eq!(sink.records()[0].values["IP_sum"], 0.75);
    }

    #[test]
    fn test_memory_sink_defaults_to_now() {
        let mut sink = MemorySink::new();
        let before = (unix_now() * 1000.0) as i64;
        sink.record(&values(), None).unwrap();
        assert!(sink.records()[0].timestamp_ms >= before);
    }

    #[test]
    fn test_csv_sink_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        {
            let mut sink = CsvSink::create(&path).unwrap();
            sink.record(&values(), Some(42)).unwrap();
            sink.close().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["timestamp,key,value", "42,IP_sum,0.75", "42,energy,9500"]);
    }

    #[test]
    fn test_csv_sink_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        CsvSink::create(&path).unwrap().record(&values(), Some(1)).unwrap();
        CsvSink::create(&path).unwrap().record(&values(), Some(2)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches(CsvSink::HEADER).count(), 1);
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_csv_sink_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("metrics.csv");
        assert!(matches!(CsvSink::create(path), Err(TwinError::Metrics(_))));
    }

    #[test]
    fn test_log_sink_accepts() {
        assert!(LogSink.record(&values(), None).is_ok());
    }
}
