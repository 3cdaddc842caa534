//! # ow-orchestrator
//!
//! Component wiring for OptiWire Bayesian optimization runs.
//!
//! Turns a declarative configuration into a consistent set of collaborating
//! objects: design space, objective evaluator, cost model, surrogate model and
//! acquisition, and bootstraps the initial dataset so an external loop can
//! start iterating. The regression and acquisition math is supplied by a
//! [`Backend`].

mod acquisition;
mod backend;
mod bootstrap;
mod cost;
mod design;
mod model;
mod objective;
mod orchestrator;

#[cfg(test)]
mod testing;

pub use acquisition::{
    build_acquisition, AcquisitionFunction, AcquisitionOptimizer, AcquisitionParameter,
    AcquisitionParams,
};
pub use backend::Backend;
pub use bootstrap::{bootstrap, Bootstrap, BootstrapOutcome, InitialData};
pub use cost::{
    bind_cost_model, cost_fn, CostEstimate, CostFunction, CostModel, EvaluationTimeCost,
    SharedCost,
};
pub use design::sample_design;
pub use model::{
    build_model, GpSettings, McmcParams, ModelParams, PointEstimateParams, Prediction,
    SharedModel, SurrogateModel,
};
pub use objective::{from_fn, pointwise, Evaluation, Objective, ObjectiveEvaluator, Pointwise};
pub use orchestrator::{BayesianOptimization, BayesianOptimizationBuilder, RunInfo};
