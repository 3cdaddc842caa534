//! Top-level construction of a Bayesian optimization run.
//!
//! [`BayesianOptimizationBuilder::build`] resolves the configuration, then
//! creates the design space, objective evaluator and cost model. The
//! surrogate model and acquisition are built next, and the initial dataset
//! last. Every check that can fail without calling the objective runs before
//! the bootstrap, so a bad configuration never costs an evaluation. Construction either returns
//! a complete [`BayesianOptimization`] or an error; nothing is left half
//! built.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use ow_types::{
    config_error, matrix_from_rows, BatchMethod, BoConfig, BoResult, Constraint, CostSource,
    DesignSpace, ObservedDataset, OptionBag, VariableSpec, KNOWN_OPTIONS,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::acquisition::{
    build_acquisition, AcquisitionFunction, AcquisitionOptimizer, AcquisitionParams,
};
use crate::backend::Backend;
use crate::bootstrap::{bootstrap, BootstrapOutcome, InitialData};
use crate::cost::{bind_cost_model, CostFunction, SharedCost};
use crate::model::{build_model, ModelParams, SharedModel};
use crate::objective::{Objective, ObjectiveEvaluator};

/// Identity of one constructed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl RunInfo {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}

/// Collects the inputs of a run. Values set on the builder take precedence
/// over the same keys in the option bag.
pub struct BayesianOptimizationBuilder {
    objective: Arc<dyn Objective>,
    backend: Arc<dyn Backend>,
    options: OptionBag,
    domain: Option<Vec<VariableSpec>>,
    bounds: Option<Vec<(f64, f64)>>,
    constraints: Vec<Constraint>,
    initial: InitialData,
    cost_function: Option<Arc<dyn CostFunction>>,
}

impl BayesianOptimizationBuilder {
    pub fn new(objective: Arc<dyn Objective>, backend: Arc<dyn Backend>) -> Self {
        Self {
            objective,
            backend,
            options: OptionBag::new(),
            domain: None,
            bounds: None,
            constraints: Vec::new(),
            initial: InitialData::none(),
            cost_function: None,
        }
    }

    pub fn options(mut self, options: OptionBag) -> Self {
        self.options = options;
        self
    }

    pub fn domain(mut self, domain: Vec<VariableSpec>) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Pre-supplied points, with or without their observations.
    pub fn initial_data(mut self, x: Array2<f64>, y: Option<Array2<f64>>) -> Self {
        self.initial = InitialData { x: Some(x), y };
        self
    }

    pub fn cost_function(mut self, cost: Arc<dyn CostFunction>) -> Self {
        self.cost_function = Some(cost);
        self
    }

    pub fn build(self) -> BoResult<BayesianOptimization> {
        let Self {
            objective,
            backend,
            options,
            domain,
            bounds,
            constraints,
            initial,
            cost_function,
        } = self;

        // Configuration, including the model/acquisition pairing rule.
        let mut config = BoConfig::from_options(&options)?;
        if cost_function.is_some() {
            if config.cost != CostSource::Constant {
                return Err(config_error!(
                    "cost_withGradients is set in the options and a cost function was supplied"
                ));
            }
            config.cost = CostSource::User;
        }
        if options.contains("constraints") {
            return Err(config_error!(
                "constraints must be supplied as predicates, not through the option bag"
            ));
        }

        let domain = match domain {
            Some(d) => Some(d),
            None => options.resolve_optional::<Vec<VariableSpec>>("domain")?,
        };
        let bounds = match bounds {
            Some(b) => Some(b),
            None => options.resolve_optional::<Vec<(f64, f64)>>("bounds")?,
        };
        let space = Arc::new(DesignSpace::resolve(
            domain.as_deref(),
            bounds.as_deref(),
            constraints,
        )?);

        let initial = merge_initial_data(initial, &options)?;
        initial.check(&space)?;

        let evaluator = ObjectiveEvaluator::new(
            objective,
            config.batch_size,
            config.num_cores,
            options.without(KNOWN_OPTIONS),
        )?;
        if !evaluator.options().is_empty() {
            debug!(
                "Passing {} unrecognized options through to the objective",
                evaluator.options().len()
            );
        }

        let model_params = ModelParams::from_config(&config);
        let acquisition_params = AcquisitionParams::from_config(&config);
        let cost = bind_cost_model(config.cost, cost_function, backend.as_ref())?;

        // The unfitted model does not depend on data, so a backend that
        // rejects the request fails before any evaluation.
        let model = build_model(backend.as_ref(), &model_params)?;
        let optimizer: Arc<dyn AcquisitionOptimizer> = Arc::from(
            backend.build_acquisition_optimizer(
                Arc::clone(&space),
                config.acquisition_optimizer_type,
            )?,
        );
        let acquisition = build_acquisition(
            acquisition_params,
            &model,
            &space,
            optimizer,
            &cost,
            config.acquisition_optimizer_type,
        )?;

        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let boot = bootstrap(
            &space,
            config.initial_design_type,
            config.initial_design_numdata,
            &evaluator,
            initial,
            &mut rng,
        )?;
        if let Some(costs) = boot.dataset.costs() {
            cost.write().update(boot.dataset.x(), costs)?;
        }

        let run = RunInfo::new();
        info!(
            "Run {} ready: {} model, {} acquisition, {} observations, batch size {} ({})",
            run.id,
            config.model_type,
            config.acquisition_type,
            boot.dataset.len(),
            config.batch_size,
            config.effective_batch_method()
        );

        Ok(BayesianOptimization {
            run,
            config,
            space,
            evaluator,
            cost,
            dataset: boot.dataset,
            bootstrap: boot.outcome,
            model,
            acquisition,
        })
    }
}

/// `X`/`Y` from the builder win; otherwise nested arrays in the bag are used.
fn merge_initial_data(initial: InitialData, options: &OptionBag) -> BoResult<InitialData> {
    let x = match initial.x {
        Some(x) => Some(x),
        None => options
            .resolve_optional::<Vec<Vec<f64>>>("X")?
            .map(|rows| matrix_from_rows(&rows))
            .transpose()?,
    };
    let y = match initial.y {
        Some(y) => Some(y),
        None => options
            .resolve_optional::<Vec<Vec<f64>>>("Y")?
            .map(|rows| matrix_from_rows(&rows))
            .transpose()?,
    };
    Ok(InitialData { x, y })
}

/// The wired object graph handed to the optimization loop.
pub struct BayesianOptimization {
    run: RunInfo,
    config: BoConfig,
    space: Arc<DesignSpace>,
    evaluator: ObjectiveEvaluator,
    cost: SharedCost,
    dataset: ObservedDataset,
    bootstrap: BootstrapOutcome,
    model: SharedModel,
    acquisition: AcquisitionFunction,
}

impl BayesianOptimization {
    pub fn builder(
        objective: Arc<dyn Objective>,
        backend: Arc<dyn Backend>,
    ) -> BayesianOptimizationBuilder {
        BayesianOptimizationBuilder::new(objective, backend)
    }

    pub fn run_info(&self) -> &RunInfo {
        &self.run
    }

    /// Every tunable as resolved at construction.
    pub fn resolved_config(&self) -> &BoConfig {
        &self.config
    }

    pub fn space(&self) -> &Arc<DesignSpace> {
        &self.space
    }

    pub fn evaluator(&self) -> &ObjectiveEvaluator {
        &self.evaluator
    }

    pub fn cost(&self) -> &SharedCost {
        &self.cost
    }

    pub fn dataset(&self) -> &ObservedDataset {
        &self.dataset
    }

    /// The loop appends observations here between model refits.
    pub fn dataset_mut(&mut self) -> &mut ObservedDataset {
        &mut self.dataset
    }

    pub fn bootstrap_outcome(&self) -> BootstrapOutcome {
        self.bootstrap
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn acquisition(&self) -> &AcquisitionFunction {
        &self.acquisition
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn num_cores(&self) -> usize {
        self.config.num_cores
    }

    pub fn batch_method(&self) -> BatchMethod {
        self.config.effective_batch_method()
    }

    pub fn model_update_interval(&self) -> usize {
        self.config.model_update_interval
    }
}

impl fmt::Debug for BayesianOptimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BayesianOptimization")
            .field("run", &self.run)
            .field("config", &self.config)
            .field("observations", &self.dataset.len())
            .field("bootstrap", &self.bootstrap)
            .field("acquisition", &self.acquisition)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::from_fn;
    use crate::testing::StubBackend;
    use ndarray::{array, Array1};
    use ow_types::{AcquisitionType, BoError, ModelFamily};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn objective() -> Arc<dyn Objective> {
        from_fn(|x| Ok(x.rows().into_iter().map(|r| r.dot(&r)).collect::<Array1<f64>>()))
    }

    fn builder(options: serde_json::Value) -> BayesianOptimizationBuilder {
        BayesianOptimization::builder(objective(), Arc::new(StubBackend::default()))
            .options(OptionBag::from_value(options).unwrap())
    }

    #[test]
    fn defaults_produce_a_complete_graph() {
        let bo = builder(json!({ "bounds": [[-1.0, 1.0], [-1.0, 1.0]], "seed": 5 }))
            .build()
            .unwrap();
        assert_eq!(bo.dataset().len(), 5);
        assert_eq!(bo.model().read().family(), ModelFamily::PointEstimate);
        assert_eq!(bo.acquisition().acquisition_type(), AcquisitionType::Ei);
        assert_eq!(bo.batch_size(), 1);
        assert_eq!(bo.num_cores(), 1);
        assert_eq!(bo.batch_method(), BatchMethod::Sequential);
        assert_eq!(bo.model_update_interval(), 1);
        assert_eq!(bo.cost().read().source(), CostSource::Constant);
        assert!(Arc::ptr_eq(bo.acquisition().model(), bo.model()));
        assert!(Arc::ptr_eq(bo.acquisition().space(), bo.space()));
    }

    #[test]
    fn builder_bounds_win_over_bag_bounds() {
        let bo = builder(json!({ "bounds": [[-1.0, 1.0]] }))
            .bounds(vec![(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)])
            .build()
            .unwrap();
        assert_eq!(bo.space().dimensionality(), 3);
    }

    #[test]
    fn initial_data_from_the_bag() {
        let bo = builder(json!({
            "bounds": [[0.0, 2.0]],
            "X": [[1.0], [2.0]],
            "Y": [[7.0], [8.0]],
        }))
        .build()
        .unwrap();
        assert_eq!(bo.dataset().y(), array![[7.0], [8.0]]);
        assert_eq!(bo.bootstrap_outcome(), BootstrapOutcome::Supplied { points: 2 });
    }

    #[test]
    fn constraints_in_the_bag_are_rejected() {
        let result =
            builder(json!({ "bounds": [[0.0, 1.0]], "constraints": ["x[0] - 0.5"] })).build();
        assert!(matches!(result, Err(BoError::Configuration(_))));
    }

    #[test]
    fn evaluation_time_cost_is_seeded_by_the_bootstrap() {
        let backend = Arc::new(StubBackend::default());
        let bo = BayesianOptimization::builder(objective(), backend.clone())
            .options(
                OptionBag::from_value(json!({
                    "bounds": [[0.0, 1.0]],
                    "cost_withGradients": "evaluation_time",
                    "initial_design_numdata": 3,
                }))
                .unwrap(),
            )
            .build()
            .unwrap();
        match &*bo.cost().read() {
            crate::cost::CostModel::EvaluationTime(m) => assert_eq!(m.observations(), 3),
            other => panic!("expected evaluation-time cost, got {other:?}"),
        }
        // One model for the cost, one surrogate.
        assert_eq!(backend.built_models().len(), 2);
    }

    #[test]
    fn rejected_model_family_costs_no_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let objective = from_fn(move |x| {
            counted.fetch_add(x.nrows(), Ordering::SeqCst);
            Ok(Array1::zeros(x.nrows()))
        });
        let result = BayesianOptimization::builder(
            objective,
            Arc::new(StubBackend::default().lying_about_family()),
        )
        .bounds(vec![(0.0, 1.0)])
        .build();
        assert!(matches!(result, Err(BoError::Configuration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cost_function_and_cost_option_conflict() {
        let f = crate::cost::cost_fn(|x| {
            Ok(crate::cost::CostEstimate {
                cost: Array1::ones(x.nrows()),
                gradient: Array2::zeros(x.raw_dim()),
            })
        });
        let result = builder(json!({
            "bounds": [[0.0, 1.0]],
            "cost_withGradients": "evaluation_time",
        }))
        .cost_function(f)
        .build();
        assert!(matches!(result, Err(BoError::Configuration(_))));
    }

    #[test]
    fn unrecognized_options_reach_the_evaluator() {
        let bo = builder(json!({ "bounds": [[0.0, 1.0]], "simulator": "fast" }))
            .build()
            .unwrap();
        assert_eq!(
            bo.evaluator().options().keys().collect::<Vec<_>>(),
            vec!["simulator"]
        );
    }
}
