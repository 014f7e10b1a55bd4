// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Twin Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy for the
//! split-and-delay online model loop.

pub mod config;
pub mod declaration;
pub mod error;
pub mod record;
pub mod variable;

pub use config::{MetricsConfig, ResamplePolicy, SourceKind, TwinConfig};
pub use declaration::{ChannelDeclaration, Declarations};
pub use error::{TwinError, TwinResult};
pub use record::{
    batch_timestamp, ChannelReading, EvaluationRecord, LoopSummary, MultiLine, Sample, ValueMap,
};
pub use variable::{ValidationMode, ValueRange, Variable};
