// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Evaluation Cycle
// ─────────────────────────────────────────────────────────────────────
//! One pass of the online model: read, check drift, re-anchor if
//! needed, validate, evaluate.
//!
//! # Atomicity
//!
//! The cycle owns the committed `ReferenceState`. A re-anchor produces a
//! candidate state that is only swapped in once evaluation succeeded, so
//! a failing cycle (bad reading, failed reinitialization, rejected input,
//! failed evaluation) leaves the reference exactly as it was.

use std::collections::BTreeMap;

use snd_types::{
    batch_timestamp, ChannelReading, EvaluationRecord, MultiLine, Sample, SourceKind, TwinConfig,
    TwinError, TwinResult, ValueMap,
};

use crate::drift::DriftDetector;
use crate::model::ModelBackend;
use crate::reanchor::reanchor;
use crate::reference::ReferenceState;
use crate::source::{unix_now, ValueSource};
use crate::units::UnitMap;

pub struct EvaluationCycle {
    reference: ReferenceState,
    detector: DriftDetector,
    units: UnitMap,
    source: Box<dyn ValueSource>,
    model: Box<dyn ModelBackend>,
    tolerance: f64,
    resample: bool,
}

impl EvaluationCycle {
    /// Build the cycle around the model's built-in variables.
    ///
    /// `units` must cover every model variable when the source delivers
    /// external units; for an internal-unit source it is unused.
    pub fn new(
        model: Box<dyn ModelBackend>,
        source: Box<dyn ValueSource>,
        units: UnitMap,
        config: &TwinConfig,
    ) -> TwinResult<Self> {
        config.validate()?;
        let reference = ReferenceState::from_variables(model.variables(), &model.pivots())?;
        let detector = DriftDetector::new(config.drift_thresholds.clone(), &reference)?;

        let kind = source.kind();
        if kind.is_external() {
            if let Some(name) = reference
                .input_names()
                .into_iter()
                .find(|n| !units.contains(n))
            {
                return Err(TwinError::Configuration(format!(
                    "no unit conversion declared for '{name}'"
                )));
            }
        }
        let resample = config.resample_policy.resamples(kind);
        log::info!(
            "evaluation cycle ready: {} variables, pivots [{}], {kind:?} source, resample={resample}",
            reference.input_names().len(),
            reference.pivot_names().collect::<Vec<_>>().join(", "),
        );

        Ok(Self {
            reference,
            detector,
            units,
            source,
            model,
            tolerance: config.reanchor_tolerance,
            resample,
        })
    }

    pub fn reference(&self) -> &ReferenceState {
        &self.reference
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub fn resamples(&self) -> bool {
        self.resample
    }

    /// Run one cycle and commit the resulting reference on success.
    pub fn run_once(&mut self) -> TwinResult<EvaluationRecord> {
        let external = self.source.kind().is_external();
        let names = self.reference.input_names();
        let mut samples = collect_samples(&names, self.source.read(&names, &self.reference))?;

        let pivots: ValueMap = self
            .reference
            .pivot_names()
            .filter_map(|p| samples.get(p).map(|s| (p.to_string(), s.value)))
            .collect();
        let pivots = self.internal(pivots, external)?;
        let report = self.detector.check(&self.reference, &pivots)?;
        log::debug!("drift: {report}");

        let candidate = if report.is_stale() {
            let next = reanchor(&self.reference, &*self.model, &report.sampled(), self.tolerance)?;
            log::info!(
                "re-anchored model ({report})\nold pivots:{}\nnew pivots:{}",
                MultiLine(self.reference.pivot_values()),
                MultiLine(next.pivot_values())
            );
            if self.resample {
                let dependents = next.dependent_names();
                let fresh = collect_samples(&dependents, self.source.read(&dependents, &next))?;
                samples.extend(fresh);
            }
            Some(next)
        } else {
            None
        };
        let active = candidate.as_ref().unwrap_or(&self.reference);

        let raw: ValueMap = samples.iter().map(|(n, s)| (n.clone(), s.value)).collect();
        let inputs = self.internal(raw, external)?;
        let outside = active.validate_inputs(&inputs)?;
        if !outside.is_empty() {
            log::debug!("{} inputs outside their envelope", outside.len());
        }
        log::debug!("inputs:{}", MultiLine(&inputs));

        let outputs = self.model.evaluate(&inputs).map_err(|e| match e {
            TwinError::Evaluation(_) => e,
            other => TwinError::Evaluation(other.to_string()),
        })?;
        if let Some((name, value)) = outputs.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TwinError::Evaluation(format!(
                "output '{name}' is not finite: {value}"
            )));
        }
        if let Some(name) = outputs.keys().find(|k| inputs.contains_key(*k)) {
            return Err(TwinError::Evaluation(format!(
                "output '{name}' has the same name as an input"
            )));
        }
        log::debug!("outputs:{}", MultiLine(&outputs));

        let contributing: Vec<Sample> = samples.into_values().collect();
        let timestamp = batch_timestamp(&contributing).unwrap_or_else(unix_now);

        let reanchored = candidate.is_some();
        if let Some(next) = candidate {
            self.reference = next;
        }
        Ok(EvaluationRecord {
            inputs,
            outputs,
            timestamp,
            reanchored,
        })
    }

    fn internal(&self, values: ValueMap, external: bool) -> TwinResult<ValueMap> {
        if external {
            self.units.to_internal(&values)
        } else {
            Ok(values)
        }
    }
}

/// Turn a source batch into samples, failing on the first bad channel.
fn collect_samples(
    names: &[String],
    mut batch: BTreeMap<String, ChannelReading>,
) -> TwinResult<BTreeMap<String, Sample>> {
    let mut samples = BTreeMap::new();
    for name in names {
        match batch.remove(name) {
            Some(ChannelReading::Value { value, timestamp }) if value.is_finite() => {
                samples.insert(name.clone(), Sample::new(name.clone(), value, timestamp));
            }
            Some(ChannelReading::Value { value, .. }) => {
                return Err(TwinError::source_read(name, format!("non-finite value {value}")))
            }
            Some(ChannelReading::Error { error }) => return Err(TwinError::source_read(name, error)),
            None => return Err(TwinError::source_read(name, "no reading returned")),
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use snd_types::{ResamplePolicy, ValidationMode, ValueRange, Variable};

    use crate::model::ExternalModel;

    use super::*;

    /// Replays scripted batches; each read pops one and keeps the
    /// requested names.
    struct ScriptedSource {
        kind: SourceKind,
        batches: Arc<Mutex<VecDeque<BTreeMap<String, ChannelReading>>>>,
    }

    impl ScriptedSource {
        fn new(kind: SourceKind, batches: Vec<Vec<(&str, f64, f64)>>) -> Self {
            let batches = batches
                .into_iter()
                .map(|b| {
                    b.into_iter()
                        .map(|(n, value, timestamp)| {
                            (n.to_string(), ChannelReading::Value { value, timestamp })
                        })
                        .collect()
                })
                .collect();
            Self {
                kind,
                batches: Arc::new(Mutex::new(batches)),
            }
        }
    }

    impl ValueSource for ScriptedSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn read(
            &mut self,
            names: &[String],
            _reference: &ReferenceState,
        ) -> BTreeMap<String, ChannelReading> {
            let mut batch = self.batches.lock().pop_front().unwrap_or_default();
            batch.retain(|k, _| names.contains(k));
            batch
        }
    }

    fn variables() -> Vec<Variable> {
        vec![
            Variable::new("angle", 0.0, ValueRange::new(-0.05, 0.05)),
            Variable::new("m1", 0.0, ValueRange::new(-1.0, 1.0)),
            Variable::new("m2", 0.0, ValueRange::new(-1.0, 1.0)).with_mode(ValidationMode::Strict),
        ]
    }

    fn resting() -> ValueMap {
        [("m1".to_string(), 5.0), ("m2".to_string(), -3.2)]
            .into_iter()
            .collect()
    }

    fn model(evaluations: Arc<AtomicUsize>) -> ExternalModel {
        ExternalModel::new(
            variables(),
            vec!["angle".to_string()],
            |_| Ok(resting()),
            move |inputs| {
                evaluations.fetch_add(1, Ordering::SeqCst);
                Ok([("spot".to_string(), inputs["m1"] + inputs["m2"])]
                    .into_iter()
                    .collect())
            },
        )
    }

    fn config() -> TwinConfig {
        TwinConfig {
            drift_thresholds: [("angle".to_string(), 0.001)].into_iter().collect(),
            ..TwinConfig::default()
        }
    }

    fn cycle(source: ScriptedSource, m: ExternalModel, units: UnitMap) -> EvaluationCycle {
        EvaluationCycle::new(Box::new(m), Box::new(source), units, &config()).unwrap()
    }

    #[test]
    fn test_end_to_end_reanchor() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![
                vec![("angle", 0.1, 10.0), ("m1", 0.2, 10.0), ("m2", 0.3, 10.0)],
                vec![("m1", 5.00005, 11.0), ("m2", -3.2, 11.0)],
            ],
        );
        let mut c = cycle(source, model(Arc::default()), UnitMap::default());
        let record = c.run_once().unwrap();
        assert!(record.reanchored);
        assert_eq!(record.inputs["m1"], 5.00005);
        assert_eq!(record.timestamp, 11.0);

        let r = c.reference();
        assert_eq!(r.pivot_value("angle"), Some(0.1));
        let m1 = r.variable("m1").unwrap().value_range;
        let m2 = r.variable("m2").unwrap().value_range;
        assert!((m1.low - 4.9999).abs() < 1e-12 && (m1.high - 5.0001).abs() < 1e-12);
        assert!((m2.low + 3.2001).abs() < 1e-12 && (m2.high + 3.1999).abs() < 1e-12);
    }

    #[test]
    fn test_no_drift_keeps_reference() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![vec![("angle", 0.0005, 1.0), ("m1", 0.1, 3.0), ("m2", 0.2, 2.0)]],
        );
        let mut c = cycle(source, model(Arc::default()), UnitMap::default());
        let before = c.reference().clone();
        let record = c.run_once().unwrap();
        assert!(!record.reanchored);
        assert_eq!(record.timestamp, 3.0);
        assert!((record.outputs["spot"] - 0.3).abs() < 1e-12);
        assert_eq!(c.reference(), &before);
    }

    #[test]
    fn test_batch_timestamp_is_latest() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![vec![("angle", 0.0, 10.0), ("m1", 0.0, 12.0), ("m2", 0.0, 9.0)]],
        );
        let mut c = cycle(source, model(Arc::default()), UnitMap::default());
        assert_eq!(c.run_once().unwrap().timestamp, 12.0);
    }

    #[test]
    fn test_source_error_aborts_cycle() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![vec![("angle", 0.1, 1.0), ("m1", f64::NAN, 1.0), ("m2", 0.0, 1.0)]],
        );
        let evaluations = Arc::new(AtomicUsize::new(0));
        let mut c = cycle(source, model(evaluations.clone()), UnitMap::default());
        let before = c.reference().clone();
        let err = c.run_once().unwrap_err();
        assert!(matches!(err, TwinError::SourceRead { ref channel, .. } if channel == "m1"));
        assert_eq!(c.reference(), &before);
        assert_eq!(evaluations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_channel_is_source_error() {
        let source = ScriptedSource::new(SourceKind::Test, vec![vec![("angle", 0.0, 1.0)]]);
        let mut c = cycle(source, model(Arc::default()), UnitMap::default());
        assert!(matches!(c.run_once(), Err(TwinError::SourceRead { .. })));
    }

    #[test]
    fn test_failed_evaluation_keeps_old_reference() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![
                vec![("angle", 0.1, 1.0), ("m1", 0.0, 1.0), ("m2", 0.0, 1.0)],
                vec![("m1", 5.0, 1.0), ("m2", -3.2, 1.0)],
            ],
        );
        let failing = ExternalModel::new(
            variables(),
            vec!["angle".to_string()],
            |_| Ok(resting()),
            |_| Err(TwinError::Evaluation("tracking lost".into())),
        );
        let mut c = cycle(source, failing, UnitMap::default());
        let before = c.reference().clone();
        let err = c.run_once().unwrap_err();
        assert!(matches!(err, TwinError::Evaluation(_)));
        assert_eq!(c.reference(), &before);
        assert_eq!(c.reference().pivot_value("angle"), Some(0.0));
    }

    #[test]
    fn test_non_finite_output_is_evaluation_error() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![vec![("angle", 0.0, 1.0), ("m1", 0.0, 1.0), ("m2", 0.0, 1.0)]],
        );
        let m = ExternalModel::new(
            variables(),
            vec!["angle".to_string()],
            |_| Ok(resting()),
            |_| Ok([("spot".to_string(), f64::INFINITY)].into_iter().collect()),
        );
        let mut c = cycle(source, m, UnitMap::default());
        assert!(matches!(c.run_once(), Err(TwinError::Evaluation(_))));
    }

    #[test]
    fn test_output_shadowing_input_rejected() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![vec![("angle", 0.0, 1.0), ("m1", 0.0, 1.0), ("m2", 0.0, 1.0)]],
        );
        let m = ExternalModel::new(
            variables(),
            vec!["angle".to_string()],
            |_| Ok(resting()),
            |_| Ok([("m1".to_string(), 42.0)].into_iter().collect()),
        );
        let mut c = cycle(source, m, UnitMap::default());
        match c.run_once() {
            Err(TwinError::Evaluation(msg)) => assert!(msg.contains("'m1'"), "{msg}"),
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_violation_rejected() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![vec![("angle", 0.0, 1.0), ("m1", 0.0, 1.0), ("m2", 7.0, 1.0)]],
        );
        let mut c = cycle(source, model(Arc::default()), UnitMap::default());
        assert!(matches!(c.run_once(), Err(TwinError::Validation { .. })));
    }

    #[test]
    fn test_live_source_converts_units() {
        // Device reports the angle in mrad; the model works in rad.
        let source = ScriptedSource::new(
            SourceKind::Live,
            vec![vec![("angle", 100.0, 1.0), ("m1", 5.0, 1.0), ("m2", -3.2, 1.0)]],
        );
        let units = UnitMap::new(
            [("angle", 1e-3), ("m1", 1.0), ("m2", 1.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
        .unwrap();
        let mut c = cycle(source, model(Arc::default()), units);
        assert!(!c.resamples());
        let record = c.run_once().unwrap();
        assert!(record.reanchored);
        assert!((record.inputs["angle"] - 0.1).abs() < 1e-12);
        assert!((c.reference().pivot_value("angle").unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_live_source_requires_units() {
        let source = ScriptedSource::new(SourceKind::Live, Vec::new());
        let result = EvaluationCycle::new(
            Box::new(model(Arc::default())),
            Box::new(source),
            UnitMap::identity(["angle", "m1"]),
            &config(),
        );
        assert!(matches!(result, Err(TwinError::Configuration(_))));
    }

    #[test]
    fn test_resample_policy_override() {
        let source = ScriptedSource::new(
            SourceKind::Test,
            vec![vec![("angle", 0.1, 1.0), ("m1", 0.0, 2.0), ("m2", 0.0, 2.0)]],
        );
        let cfg = TwinConfig {
            resample_policy: ResamplePolicy::Never,
            ..config()
        };
        let mut c =
            EvaluationCycle::new(Box::new(model(Arc::default())), Box::new(source), UnitMap::default(), &cfg)
                .unwrap();
        let record = c.run_once().unwrap();
        // Stale readings are kept and only warned about.
        assert_eq!(record.inputs["m1"], 0.0);
        assert!(record.reanchored);
        assert_eq!(record.timestamp, 2.0);
    }
}
