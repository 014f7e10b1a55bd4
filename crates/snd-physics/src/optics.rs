// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Crystal Optics
// ─────────────────────────────────────────────────────────────────────
//! Closed-form optics used by the reference model.
//!
//!   λ = hc / E,  sin θ_B = λ / 2d
//!   w(θ) = K / sin 2θ                      (Darwin width)
//!   ΔL = 2 l (1 − cos 2θ) = c Δt           (delay-line geometry)
//!
//! Acceptances are Gaussian in the error with the given FWHM.

use std::f64::consts::LN_2;

use snd_types::{TwinError, TwinResult};

use crate::params::{C_MM_PER_PS, DARWIN_K_RAD, HC_EV_A, SI_220_D_SPACING_A};

/// Si(220) Bragg angle (rad) for `energy_ev`.
pub fn bragg_angle(energy_ev: f64) -> TwinResult<f64> {
    if !(energy_ev.is_finite() && energy_ev > 0.0) {
        return Err(TwinError::Evaluation(format!(
            "photon energy must be positive, got {energy_ev} eV"
        )));
    }
    let sin_theta = HC_EV_A / energy_ev / (2.0 * SI_220_D_SPACING_A);
    if sin_theta >= 1.0 {
        return Err(TwinError::Evaluation(format!(
            "{energy_ev} eV is below the Si(220) Bragg cutoff"
        )));
    }
    Ok(sin_theta.asin())
}

pub fn darwin_width(theta: f64) -> f64 {
    DARWIN_K_RAD / (2.0 * theta).sin()
}

/// Gaussian acceptance `exp(-4 ln2 (error/fwhm)²)`, 1 at zero error.
pub fn acceptance(error: f64, fwhm: f64) -> f64 {
    (-4.0 * LN_2 * (error / fwhm).powi(2)).exp()
}

/// Travel of each delay stage (mm) producing `delay_ps` at Bragg angle `theta`.
pub fn delay_travel(theta: f64, delay_ps: f64) -> f64 {
    C_MM_PER_PS * delay_ps / (2.0 * (1.0 - (2.0 * theta).cos()))
}

/// Fraction of a beam centred at `(cx, cy)` passing a round aperture.
pub fn aperture(cx: f64, cy: f64, half_width: f64) -> f64 {
    acceptance(cx.hypot(cy), 2.0 * half_width)
}

/// Intensity-weighted centroid of `(weight, position)` pairs.
///
/// Falls back to the plain mean when every weight vanished.
pub fn weighted_centroid(pairs: &[(f64, f64)]) -> f64 {
    let total: f64 = pairs.iter().map(|(w, _)| w).sum();
    if total > 0.0 {
        pairs.iter().map(|(w, x)| w * x).sum::<f64>() / total
    } else if pairs.is_empty() {
        0.0
    } else {
        pairs.iter().map(|(_, x)| x).sum::<f64>() / pairs.len() as f64
    }
}
