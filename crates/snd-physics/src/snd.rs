// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Split-and-Delay Reference Model
// ─────────────────────────────────────────────────────────────────────
//! Reference model of the split-and-delay line.
//!
//! The incident beam is split between a delay branch (towers t1 and t4,
//! each a pair of Si(220) crystals, plus the delay-line travel stages)
//! and a channel-cut branch (t2, t3). Diagnostics `dd` and `do` watch
//! each branch; both recombine at the interaction point (IP).
//!
//! Motors are absolute positions. `initialize()` places every motor at
//! its ideal position for an (energy, delay) operating point;
//! `evaluate()` scores an arbitrary motor configuration by how far each
//! axis sits from that ideal.

use snd_core::ModelBackend;
use snd_types::{TwinError, TwinResult, ValueMap, ValueRange, Variable};

use crate::optics::{
    acceptance, aperture, bragg_angle, darwin_width, delay_travel, weighted_centroid,
};
use crate::params::{
    motor_names, CHI_ACCEPTANCE_RAD, CHI_MOTORS, DEFAULT_DELAY_PS, DEFAULT_ENERGY_EV,
    DELAY_MAX_PS, DELAY_MIN_PS, DIAGNOSTIC_APERTURE_MM, ENERGY_MAX_EV, ENERGY_MIN_EV,
    LEVER_DD_MM, LEVER_DO_MM, LEVER_IP_MM, PIVOTS, SPLIT_RATIO, THETA_MOTORS, TRANSLATION_MOTORS,
    TRAVEL_ACCEPTANCE_MM, TRAVEL_MOTORS, X_ACCEPTANCE_MM,
};

/// Half-widths of the built-in motor envelopes around the default
/// operating point.
const THETA_SPAN_RAD: f64 = 0.01;
const CHI_SPAN_RAD: f64 = 0.01;
const TRANSLATION_SPAN_MM: f64 = 5.0;
const TRAVEL_SPAN_MM: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct SplitDelayModel {
    incident_intensity: f64,
    variables: Vec<Variable>,
}

impl SplitDelayModel {
    /// Model anchored at 9.5 keV and zero delay.
    pub fn new() -> TwinResult<Self> {
        Self::with_operating_point(DEFAULT_ENERGY_EV, DEFAULT_DELAY_PS)
    }

    /// Model whose built-in variables default to the given operating point.
    pub fn with_operating_point(energy_ev: f64, delay_ps: f64) -> TwinResult<Self> {
        let resting = resting_positions(energy_ev, delay_ps)?;
        let mut variables = vec![
            Variable::new("energy", energy_ev, ValueRange::new(ENERGY_MIN_EV, ENERGY_MAX_EV)),
            Variable::new("delay", delay_ps, ValueRange::new(DELAY_MIN_PS, DELAY_MAX_PS)),
        ];
        for (name, position) in &resting {
            let span = envelope_span(name);
            variables.push(Variable::new(
                name.as_str(),
                *position,
                ValueRange::around(*position, span),
            ));
        }
        Ok(Self {
            incident_intensity: 1.0,
            variables,
        })
    }

    pub fn with_incident_intensity(mut self, intensity: f64) -> Self {
        self.incident_intensity = intensity;
        self
    }
}

fn envelope_span(name: &str) -> f64 {
    if THETA_MOTORS.contains(&name) {
        THETA_SPAN_RAD
    } else if CHI_MOTORS.contains(&name) {
        CHI_SPAN_RAD
    } else if TRAVEL_MOTORS.contains(&name) {
        TRAVEL_SPAN_MM
    } else {
        TRANSLATION_SPAN_MM
    }
}

fn check_operating_point(energy_ev: f64, delay_ps: f64) -> TwinResult<()> {
    if !(ENERGY_MIN_EV..=ENERGY_MAX_EV).contains(&energy_ev) {
        return Err(TwinError::Evaluation(format!(
            "energy {energy_ev} eV outside [{ENERGY_MIN_EV}, {ENERGY_MAX_EV}]"
        )));
    }
    if !(DELAY_MIN_PS..=DELAY_MAX_PS).contains(&delay_ps) {
        return Err(TwinError::Evaluation(format!(
            "delay {delay_ps} ps outside [{DELAY_MIN_PS}, {DELAY_MAX_PS}]"
        )));
    }
    Ok(())
}

/// Ideal position of every motor for an operating point.
pub fn resting_positions(energy_ev: f64, delay_ps: f64) -> TwinResult<ValueMap> {
    check_operating_point(energy_ev, delay_ps)?;
    let theta = bragg_angle(energy_ev)?;
    let travel = delay_travel(theta, delay_ps);

    let mut resting = ValueMap::new();
    for name in THETA_MOTORS {
        resting.insert(name.to_string(), theta);
    }
    for name in CHI_MOTORS.iter().chain(TRANSLATION_MOTORS.iter()) {
        resting.insert(name.to_string(), 0.0);
    }
    for name in TRAVEL_MOTORS {
        resting.insert(name.to_string(), travel);
    }
    Ok(resting)
}

fn require(values: &ValueMap, names: &[&str]) -> TwinResult<()> {
    match names.iter().find(|n| !values.contains_key(**n)) {
        Some(missing) => Err(TwinError::Evaluation(format!("missing input '{missing}'"))),
        None => Ok(()),
    }
}

impl ModelBackend for SplitDelayModel {
    fn variables(&self) -> Vec<Variable> {
        self.variables.clone()
    }

    fn pivots(&self) -> Vec<String> {
        PIVOTS.iter().map(|p| p.to_string()).collect()
    }

    fn initialize(&self, pivots: &ValueMap) -> TwinResult<ValueMap> {
        require(pivots, &PIVOTS)?;
        let resting = resting_positions(pivots["energy"], pivots["delay"])?;
        log::debug!(
            "SND initialized at {} eV, {} ps (θ_B = {:.6} rad)",
            pivots["energy"],
            pivots["delay"],
            resting["t1_th1"]
        );
        Ok(resting)
    }

    fn evaluate(&self, inputs: &ValueMap) -> TwinResult<ValueMap> {
        require(inputs, &PIVOTS)?;
        require(inputs, &motor_names())?;
        let at = |name: &str| inputs.get(name).copied().unwrap_or(f64::NAN);

        let energy = at("energy");
        check_operating_point(energy, at("delay"))?;
        let theta = bragg_angle(energy)?;
        let width = darwin_width(theta);
        let rock = |name: &str, incoming: f64| acceptance(at(name) - theta + incoming, width);
        let roll = |name: &str| acceptance(at(name), CHI_ACCEPTANCE_RAD);
        let shift = |name: &str| acceptance(at(name), X_ACCEPTANCE_MM);

        // Delay branch: t1 -> dd -> t4.
        let t1_dev_x = 2.0 * (at("t1_th2") - at("t1_th1"));
        let t1_dev_y = 2.0 * (at("t1_chi2") - at("t1_chi1")) * theta.sin();
        let t1_dh_sum = self.incident_intensity
            * SPLIT_RATIO
            * rock("t1_th1", 0.0)
            * rock("t1_th2", 0.0)
            * roll("t1_chi1")
            * roll("t1_chi2")
            * shift("t1_x");

        let dd_cx = t1_dev_x * LEVER_DD_MM - at("dd_x");
        let dd_cy = t1_dev_y * LEVER_DD_MM - at("dd_y");
        let dd_sum = t1_dh_sum * aperture(dd_cx, dd_cy, DIAGNOSTIC_APERTURE_MM);

        let mismatch = at("t1_l") - at("t4_l");
        let t4_dh_sum = t1_dh_sum
            * rock("t4_th1", t1_dev_x)
            * rock("t4_th2", t1_dev_x)
            * roll("t4_chi1")
            * roll("t4_chi2")
            * shift("t4_x")
            * acceptance(mismatch, TRAVEL_ACCEPTANCE_MM);
        let delay_dev_x = t1_dev_x + 2.0 * (at("t4_th2") - at("t4_th1"));
        let delay_dev_y = t1_dev_y + 2.0 * (at("t4_chi2") - at("t4_chi1")) * theta.sin();
        let delay_walk = mismatch * (2.0 * theta).sin();

        // Channel-cut branch: t2 -> t3 -> do.
        let cc_sum = self.incident_intensity
            * (1.0 - SPLIT_RATIO)
            * rock("t2_th", 0.0)
            * rock("t3_th", 0.0)
            * shift("t2_x")
            * shift("t3_x");
        let cc_dev_x = 2.0 * (at("t3_th") - at("t2_th"));
        let do_cx = cc_dev_x * LEVER_DO_MM - at("do_x");
        let do_cy = -at("do_y");
        let do_sum = cc_sum * aperture(do_cx, do_cy, DIAGNOSTIC_APERTURE_MM);

        let ip_sum = t4_dh_sum + cc_sum;
        let ip_cx = weighted_centroid(&[
            (t4_dh_sum, delay_dev_x * LEVER_IP_MM + delay_walk),
            (cc_sum, cc_dev_x * LEVER_IP_MM),
        ]);
        let ip_cy = weighted_centroid(&[(t4_dh_sum, delay_dev_y * LEVER_IP_MM), (cc_sum, 0.0)]);

        Ok([
            ("t1_dh_sum", t1_dh_sum),
            ("dd_sum", dd_sum),
            ("t4_dh_sum", t4_dh_sum),
            ("do_sum", do_sum),
            ("dd_cx", dd_cx),
            ("dd_cy", dd_cy),
            ("do_cx", do_cx),
            ("do_cy", do_cy),
            ("IP_sum", ip_sum),
            ("IP_cx", ip_cx),
            ("IP_cy", ip_cy),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect())
    }
}
