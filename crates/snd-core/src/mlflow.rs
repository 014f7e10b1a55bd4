// ─────────────────────────────────────────────────────────────────────
// SND Online Model — MLflow Tracking Sink
// ─────────────────────────────────────────────────────────────────────
//! Metrics sink backed by the MLflow REST API.
//!
//! On start the sink resolves (or creates) the experiment, numbers the
//! new run after the highest existing run with the same prefix, and
//! opens it. Each record becomes one `log-batch` call; `close()` marks
//! the run finished.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use snd_types::{MetricsConfig, TwinError, TwinResult, ValueMap};

use crate::sink::{resolve_timestamp_ms, MetricsSink};
use crate::source::unix_now;

const RUN_NAME_TAG: &str = "mlflow.runName";

/// Next run name for `prefix` given the names of existing runs.
///
/// The number is appended directly to the prefix (`"Run7"`). Existing
/// names are matched with or without a separating space; runs whose
/// suffix after the prefix is not an integer are ignored.
pub fn next_run_name<'a>(prefix: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let last = existing
        .into_iter()
        .filter_map(|name| name.strip_prefix(prefix))
        .filter_map(|suffix| suffix.trim().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{}", last + 1)
}

#[derive(Deserialize)]
struct ExperimentReply {
    experiment: ExperimentInfo,
}

#[derive(Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Deserialize)]
struct CreateExperimentReply {
    experiment_id: String,
}

#[derive(Deserialize, Default)]
struct SearchRunsReply {
    #[serde(default)]
    runs: Vec<RunReply>,
}

#[derive(Deserialize)]
struct RunReply {
    info: RunInfo,
    #[serde(default)]
    data: RunData,
}

#[derive(Deserialize)]
struct RunInfo {
    run_id: String,
}

#[derive(Deserialize, Default)]
struct RunData {
    #[serde(default)]
    tags: Vec<RunTag>,
}

#[derive(Deserialize)]
struct RunTag {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct CreateRunReply {
    run: RunReply,
}

pub struct MlflowSink {
    api: String,
    agent: ureq::Agent,
    run_id: String,
    run_name: String,
    step: u64,
    closed: bool,
}

impl MlflowSink {
    /// Resolve the experiment and open a freshly numbered run.
    pub fn start(config: &MetricsConfig, timeout: Duration) -> TwinResult<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        let api = format!(
            "{}/api/2.0/mlflow",
            config.tracking_uri.trim_end_matches('/')
        );

        let experiment_id = Self::experiment_id(&agent, &api, &config.experiment_name)?;
        let search: SearchRunsReply = post(
            &agent,
            &format!("{api}/runs/search"),
            &json!({ "experiment_ids": [experiment_id], "max_results": 1000 }),
        )?;
        let run_name = next_run_name(
            &config.run_prefix,
            search.runs.iter().flat_map(|r| {
                r.data
                    .tags
                    .iter()
                    .filter(|t| t.key == RUN_NAME_TAG)
                    .map(|t| t.value.as_str())
            }),
        );

        let created: CreateRunReply = post(
            &agent,
            &format!("{api}/runs/create"),
            &json!({
                "experiment_id": experiment_id,
                "run_name": run_name,
                "start_time": now_ms(),
                "tags": [{ "key": RUN_NAME_TAG, "value": run_name }],
            }),
        )?;
        log::info!("started MLflow run: {run_name}");
        Ok(Self {
            api,
            agent,
            run_id: created.run.info.run_id,
            run_name,
            step: 0,
            closed: false,
        })
    }

    fn experiment_id(agent: &ureq::Agent, api: &str, name: &str) -> TwinResult<String> {
        log::debug!("setting up MLflow experiment '{name}'");
        match agent
            .get(&format!("{api}/experiments/get-by-name"))
            .query("experiment_name", name)
            .call()
        {
            Ok(response) => {
                let reply: ExperimentReply = parse(response)?;
                Ok(reply.experiment.experiment_id)
            }
            Err(ureq::Error::Status(404, _)) => {
                let reply: CreateExperimentReply = post(
                    agent,
                    &format!("{api}/experiments/create"),
                    &json!({ "name": name }),
                )?;
                log::info!("created MLflow experiment '{name}'");
                Ok(reply.experiment_id)
            }
            Err(e) => Err(TwinError::Metrics(format!("MLflow experiment lookup: {e}"))),
        }
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }
}

impl MetricsSink for MlflowSink {
    fn record(&mut self, values: &ValueMap, timestamp_ms: Option<i64>) -> TwinResult<()> {
        let ts = resolve_timestamp_ms(timestamp_ms);
        let metrics: Vec<Value> = values
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(key, value)| json!({ "key": key, "value": value, "timestamp": ts, "step": self.step }))
            .collect();
        let _: Value = post(
            &self.agent,
            &format!("{}/runs/log-batch", self.api),
            &json!({ "run_id": self.run_id, "metrics": metrics }),
        )?;
        self.step += 1;
        Ok(())
    }

    fn close(&mut self) -> TwinResult<()> {
        if self.closed {
            return Ok(());
        }
        let _: Value = post(
            &self.agent,
            &format!("{}/runs/update", self.api),
            &json!({ "run_id": self.run_id, "status": "FINISHED", "end_time": now_ms() }),
        )?;
        self.closed = true;
        log::info!("finished MLflow run: {}", self.run_name);
        Ok(())
    }
}

fn now_ms() -> i64 {
    (unix_now() * 1000.0).round() as i64
}

fn post<T: for<'de> Deserialize<'de>>(agent: &ureq::Agent, url: &str, body: &Value) -> TwinResult<T> {
    let response = agent
        .post(url)
        .set("Content-Type", "application/json")
        .send_string(&body.to_string())
        .map_err(|e| TwinError::Metrics(format!("POST {url}: {e}")))?;
    parse(response)
}

fn parse<T: for<'de> Deserialize<'de>>(response: ureq::Response) -> TwinResult<T> {
    let text = response
        .into_string()
        .map_err(|e| TwinError::Metrics(format!("unreadable MLflow response: {e}")))?;
    let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
    serde_json::from_str(text)
        .map_err(|e| TwinError::Metrics(format!("malformed MLflow response: {e}")))
}
