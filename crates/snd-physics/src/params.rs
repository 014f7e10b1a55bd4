// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Beamline Parameters
// ─────────────────────────────────────────────────────────────────────
//! Physical constants and geometry of the split-and-delay line.
//!
//! Internal units: energy in eV, delay in ps, angles in rad, lengths
//! and translations in mm.

/// Planck constant × speed of light (eV·Å).
pub const HC_EV_A: f64 = 12_398.419_843;

/// Si(220) lattice spacing (Å).
pub const SI_220_D_SPACING_A: f64 = 1.920_155_8;

/// Speed of light (mm/ps).
pub const C_MM_PER_PS: f64 = 0.299_792_458;

/// Darwin width scale: `w(θ) = DARWIN_K_RAD / sin 2θ`.
/// Gives ≈15 µrad for Si(220) at 9.5 keV.
pub const DARWIN_K_RAD: f64 = 9.6e-6;

/// Mechanical energy window of the towers (eV).
pub const ENERGY_MIN_EV: f64 = 5_000.0;
pub const ENERGY_MAX_EV: f64 = 15_000.0;

/// Delay window of the delay branch (ps).
pub const DELAY_MIN_PS: f64 = -50.0;
pub const DELAY_MAX_PS: f64 = 50.0;

pub const DEFAULT_ENERGY_EV: f64 = 9_500.0;
pub const DEFAULT_DELAY_PS: f64 = 0.0;

/// Fraction of the incident beam sent into the delay branch.
pub const SPLIT_RATIO: f64 = 0.5;

/// Acceptance FWHM of the chi (roll) axes (rad).
pub const CHI_ACCEPTANCE_RAD: f64 = 1.0e-3;

/// Acceptance FWHM of the crystal translations (mm).
pub const X_ACCEPTANCE_MM: f64 = 4.0;

/// Acceptance FWHM of a path-length mismatch between t1 and t4 (mm).
pub const TRAVEL_ACCEPTANCE_MM: f64 = 2.0;

/// Half-aperture of the dd/do diagnostics (mm).
pub const DIAGNOSTIC_APERTURE_MM: f64 = 1.5;

/// Distances from the last optic to each observation plane (mm).
pub const LEVER_DD_MM: f64 = 1_200.0;
pub const LEVER_DO_MM: f64 = 800.0;
pub const LEVER_IP_MM: f64 = 4_500.0;

/// Pivot variables of the model.
pub const PIVOTS: [&str; 2] = ["energy", "delay"];

/// Crystal angle motors (rad), resting at the Bragg angle.
pub const THETA_MOTORS: [&str; 6] = ["t1_th1", "t1_th2", "t4_th1", "t4_th2", "t2_th", "t3_th"];

/// Roll motors (rad), resting at zero.
pub const CHI_MOTORS: [&str; 4] = ["t1_chi1", "t1_chi2", "t4_chi1", "t4_chi2"];

/// Crystal translations and diagnostic stages (mm), resting at zero.
pub const TRANSLATION_MOTORS: [&str; 8] =
    ["t1_x", "t4_x", "t2_x", "t3_x", "dd_x", "dd_y", "do_x", "do_y"];

/// Delay-line travel stages (mm), resting at the travel for the delay.
pub const TRAVEL_MOTORS: [&str; 2] = ["t1_l", "t4_l"];

/// Model outputs in the order they are reported.
pub const OUTPUT_NAMES: [&str; 11] = [
    "t1_dh_sum",
    "dd_sum",
    "t4_dh_sum",
    "do_sum",
    "dd_cx",
    "dd_cy",
    "do_cx",
    "do_cy",
    "IP_sum",
    "IP_cx",
    "IP_cy",
];

/// Every motor name, in declaration order.
pub fn motor_names() -> Vec<&'static str> {
    THETA_MOTORS
        .iter()
        .chain(CHI_MOTORS.iter())
        .chain(TRANSLATION_MOTORS.iter())
        .chain(TRAVEL_MOTORS.iter())
        .copied()
        .collect()
}
