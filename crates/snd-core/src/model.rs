// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Model Backend Interface
// ─────────────────────────────────────────────────────────────────────
//! The physics model is a black box behind this trait: it exposes its
//! variables, reinitializes around pivot values, and evaluates an input
//! set. Both calls are synchronous and side-effect free from the loop's
//! point of view.

use snd_types::{TwinResult, ValueMap, Variable};

pub trait ModelBackend: Send {
    /// Built-in input variables with their default envelopes.
    fn variables(&self) -> Vec<Variable>;

    /// Names of the pivot variables (subset of `variables`).
    fn pivots(&self) -> Vec<String>;

    /// Reinitialize around `pivots` and return the resting position of
    /// every dependent variable.
    fn initialize(&self, pivots: &ValueMap) -> TwinResult<ValueMap>;

    /// Evaluate the model on a full input set in internal units.
    fn evaluate(&self, inputs: &ValueMap) -> TwinResult<ValueMap>;
}

type InitializeFn = Box<dyn Fn(&ValueMap) -> TwinResult<ValueMap> + Send>;
type EvaluateFn = Box<dyn Fn(&ValueMap) -> TwinResult<ValueMap> + Send>;

/// Model backend that delegates to closures.
///
/// Used to plug in an out-of-process model or a scripted test double.
pub struct ExternalModel {
    variables: Vec<Variable>,
    pivots: Vec<String>,
    initialize_fn: InitializeFn,
    evaluate_fn: EvaluateFn,
}

impl ExternalModel {
    pub fn new(
        variables: Vec<Variable>,
        pivots: Vec<String>,
        initialize_fn: impl Fn(&ValueMap) -> TwinResult<ValueMap> + Send + 'static,
        evaluate_fn: impl Fn(&ValueMap) -> TwinResult<ValueMap> + Send + 'static,
    ) -> Self {
        Self {
            variables,
            pivots,
            initialize_fn: Box::new(initialize_fn),
            evaluate_fn: Box::new(evaluate_fn),
        }
    }
}

impl ModelBackend for ExternalModel {
    fn variables(&self) -> Vec<Variable> {
        self.variables.clone()
    }

    fn pivots(&self) -> Vec<String> {
        self.pivots.clone()
    }

    fn initialize(&self, pivots: &ValueMap) -> TwinResult<ValueMap> {
        (self.initialize_fn)(pivots)
    }

    fn evaluate(&self, inputs: &ValueMap) -> TwinResult<ValueMap> {
        (self.evaluate_fn)(inputs)
    }
}

impl<M: ModelBackend + ?Sized> ModelBackend for Box<M> {
    fn variables(&self) -> Vec<Variable> {
        (**self).variables()
    }

    fn pivots(&self) -> Vec<String> {
        (**self).pivots()
    }

    fn initialize(&self, pivots: &ValueMap) -> TwinResult<ValueMap> {
        (**self).initialize(pivots)
    }

    fn evaluate(&self, inputs: &ValueMap) -> TwinResult<ValueMap> {
        (**self).evaluate(inputs)
    }
}

#[cfg(test)]
mod tests {
    use snd_types::{TwinError, ValueRange};

    use super::*;

    #[test]
    fn test_external_model_delegates() {
        let model = ExternalModel::new(
            vec![Variable::new("angle", 0.0, ValueRange::new(-1.0, 1.0))],
            vec!["angle".to_string()],
            |p| Ok([("m1".to_string(), p["angle"] * 2.0)].into_iter().collect()),
            |_| Err(TwinError::Evaluation("diverged".into())),
        );
        let pivots: ValueMap = [("angle".to_string(), 0.5)].into_iter().collect();
        assert_eq!(model.initialize(&pivots).unwrap()["m1"], 1.0);
        assert!(model.evaluate(&pivots).is_err());
        assert_eq!(model.pivots(), vec!["angle"]);
        let boxed: Box<dyn ModelBackend> = Box::new(model);
        assert_eq!(boxed.variables().len(), 1);
    }
}
