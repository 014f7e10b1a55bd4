// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Split-and-Delay Physics
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Reference split-and-delay model: Si(220) Bragg optics, delay-line
//! geometry, and branch/IP diagnostics behind the `ModelBackend` trait.

pub mod optics;
pub mod params;
pub mod snd;

pub use optics::{bragg_angle, darwin_width, delay_travel};
pub use params::{motor_names, OUTPUT_NAMES, PIVOTS};
pub use snd::{resting_positions, SplitDelayModel};
