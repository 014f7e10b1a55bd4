// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Evaluation Loop Core
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Adaptive re-anchoring evaluation loop for the split-and-delay
//! online model.
//!
//! Each cycle reads the live (or synthetic) operating point, decides
//! whether the pivot variables drifted past their thresholds, rebuilds
//! the model's reference state around the new operating point if they
//! did, and evaluates the model on the validated input set.
//!
//! # Invariants
//!
//! 1. **Atomic commit**: the reference state is replaced wholesale and
//!    only after a fully successful cycle. A failed cycle leaves it
//!    bit-for-bit unchanged.
//!
//! 2. **Internal units for drift**: pivot samples from an external-unit
//!    source are converted before they are compared with the anchor.
//!
//! 3. **Tight envelopes after re-anchor**: every dependent variable sits
//!    in `[resting - ε, resting + ε]` in `warn` mode.
//!
//! 4. **Failures never end the loop**: only the stop flag (or an
//!    explicit tick bound) does.

pub mod cycle;
pub mod drift;
pub mod driver;
pub mod mlflow;
pub mod model;
pub mod reanchor;
pub mod reference;
pub mod sink;
pub mod source;
pub mod units;

pub use cycle::EvaluationCycle;
pub use drift::{DriftDetector, DriftReport, PivotDrift};
pub use driver::{DriverState, LoopDriver, Sleeper, ThreadSleeper};
pub use mlflow::{next_run_name, MlflowSink};
pub use model::{ExternalModel, ModelBackend};
pub use reanchor::reanchor;
pub use reference::ReferenceState;
pub use sink::{CsvSink, LogSink, MemorySink, MetricsSink, RecordedMetrics};
pub use source::{
    unix_now, ChannelClient, ExternalClient, GatewayClient, LiveSource, TestSource, ValueSource,
    GATEWAY_URL_ENV,
};
pub use units::UnitMap;
