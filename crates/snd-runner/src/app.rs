// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Runner Wiring
// ─────────────────────────────────────────────────────────────────────
//! Command-line surface and startup wiring for `snd-twin`.
//!
//! Everything that can fail at startup (configuration, declaration file,
//! gateway address, metrics backend) fails here, before the first tick.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use snd_core::{
    CsvSink, EvaluationCycle, GatewayClient, LiveSource, LogSink, LoopDriver, MetricsSink,
    MlflowSink, ModelBackend, TestSource, UnitMap, ValueSource,
};
use snd_physics::SplitDelayModel;
use snd_types::{Declarations, SourceKind, TwinConfig, TwinResult};

/// Value source selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Interface {
    /// Uniform samples within the current envelope.
    Test,
    /// Control-system channels through the gateway at `SND_GATEWAY_URL`.
    Live,
}

impl From<Interface> for SourceKind {
    fn from(interface: Interface) -> Self {
        match interface {
            Interface::Test => SourceKind::Test,
            Interface::Live => SourceKind::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MetricsBackend {
    /// Log every record at info level.
    #[default]
    Log,
    /// Append `timestamp,key,value` rows to a CSV file.
    Csv,
    /// Log to an MLflow tracking server.
    Mlflow,
}

/// Run the split-and-delay online model.
#[derive(Debug, Parser)]
#[command(name = "snd-twin", version, about = "SND online model evaluation loop", long_about = None)]
pub struct Cli {
    /// Value source; overrides `source` from the config file.
    #[arg(long, short = 'i', value_enum)]
    pub interface: Option<Interface>,

    /// JSON loop configuration. Defaults apply when omitted.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON variable declarations (model variable -> channel, factor).
    #[arg(long, value_name = "FILE", default_value = "config/declarations.json")]
    pub declarations: PathBuf,

    #[arg(long, value_enum, default_value_t = MetricsBackend::Log)]
    pub metrics: MetricsBackend,

    /// CSV output path; overrides `metrics.csv_path`.
    #[arg(long, value_name = "FILE")]
    pub metrics_csv: Option<PathBuf>,

    /// Stop after this many ticks.
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Seed for the test source.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}

/// Merge the config file with command-line overrides.
pub fn load_config(cli: &Cli) -> TwinResult<TwinConfig> {
    let mut config = match &cli.config {
        Some(path) => TwinConfig::from_file(path)?,
        None => TwinConfig::default(),
    };
    if let Some(interface) = cli.interface {
        config.source = interface.into();
    }
    if let Some(path) = &cli.metrics_csv {
        config.metrics.csv_path = path.display().to_string();
    }
    if cli.max_ticks.is_some() {
        config.max_ticks = cli.max_ticks;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.validate()?;
    Ok(config)
}

fn build_source(
    cli: &Cli,
    config: &TwinConfig,
    model: &dyn ModelBackend,
) -> TwinResult<(Box<dyn ValueSource>, UnitMap)> {
    let names: Vec<String> = model.variables().into_iter().map(|v| v.name).collect();
    match config.source {
        SourceKind::Test => {
            let source: Box<dyn ValueSource> = Box::new(TestSource::new(config.seed));
            Ok((source, UnitMap::identity(names.iter().map(String::as_str))))
        }
        SourceKind::Live => {
            let declarations = Declarations::from_file(&cli.declarations)?;
            let units = UnitMap::from_declarations(&declarations)?;
            let client = GatewayClient::from_env(config.read_timeout())?;
            let source: Box<dyn ValueSource> =
                Box::new(LiveSource::connect(&names, &declarations, Box::new(client))?);
            Ok((source, units))
        }
    }
}

fn build_sink(cli: &Cli, config: &TwinConfig) -> TwinResult<Box<dyn MetricsSink>> {
    let sink: Box<dyn MetricsSink> = match cli.metrics {
        MetricsBackend::Log => Box::new(LogSink),
        MetricsBackend::Csv => {
            log::info!("writing metrics to {}", config.metrics.csv_path);
            Box::new(CsvSink::create(&config.metrics.csv_path)?)
        }
        MetricsBackend::Mlflow => Box::new(MlflowSink::start(&config.metrics, config.read_timeout())?),
    };
    Ok(sink)
}

/// Build the loop driver. Any error here is a startup failure.
pub fn build_driver(cli: &Cli) -> TwinResult<LoopDriver> {
    let config = load_config(cli)?;
    let model = SplitDelayModel::new()?;
    let (source, units) = build_source(cli, &config, &model)?;
    let sink = build_sink(cli, &config)?;
    let cycle = EvaluationCycle::new(Box::new(model), source, units, &config)?;
    Ok(LoopDriver::new(cycle, sink, &config))
}
