//! Surrogate model capability and the factory that configures it.

use ndarray::{Array1, Array2, ArrayView2};
use ow_types::{
    config_error, BoConfig, BoError, BoResult, KernelKind, ModelFamily, ModelOptimizer,
    ModelSettings, ObservedDataset,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::backend::Backend;

/// Posterior mean and variance at a set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub mean: Array1<f64>,
    pub variance: Array1<f64>,
}

/// Probabilistic surrogate of the objective, supplied by a [`Backend`].
///
/// The orchestrator builds it unfitted; the optimization loop refits it in
/// place as observations arrive.
pub trait SurrogateModel: Send + Sync {
    fn family(&self) -> ModelFamily;

    fn fit(&mut self, data: &ObservedDataset) -> BoResult<()>;

    fn predict(&self, x: ArrayView2<'_, f64>) -> BoResult<Prediction>;

    /// Gradient of the posterior mean, one row per point.
    fn predict_gradients(&self, _x: ArrayView2<'_, f64>) -> BoResult<Array2<f64>> {
        Err(BoError::Model(format!(
            "{} model does not provide mean gradients",
            self.family()
        )))
    }
}

/// Model handle shared by the orchestrator, the acquisition and the loop.
pub type SharedModel = Arc<RwLock<Box<dyn SurrogateModel>>>;

/// Settings common to both families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpSettings {
    pub kernel: KernelKind,
    pub noise_var: Option<f64>,
    pub exact_feval: bool,
    pub normalize_y: bool,
}

/// Hyperparameter fitting by likelihood maximization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointEstimateParams {
    pub optimizer: ModelOptimizer,
    pub max_iters: usize,
    pub optimize_restarts: usize,
}

/// Hybrid Monte Carlo sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McmcParams {
    pub n_samples: usize,
    pub n_burnin: usize,
    pub subsample_interval: usize,
    pub step_size: f64,
    pub leapfrog_steps: usize,
}

/// Validated construction parameters for one surrogate family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelParams {
    PointEstimate {
        gp: GpSettings,
        fitting: PointEstimateParams,
    },
    McmcEnsemble {
        gp: GpSettings,
        sampler: McmcParams,
    },
}

impl ModelParams {
    /// Keep the tunables of the configured family.
    pub fn from_config(config: &BoConfig) -> Self {
        Self::for_family(config.model_type, &config.model)
    }

    pub fn for_family(family: ModelFamily, settings: &ModelSettings) -> Self {
        let gp = GpSettings {
            kernel: settings.kernel,
            noise_var: settings.noise_var,
            exact_feval: settings.exact_feval,
            normalize_y: settings.normalize_y,
        };
        match family {
            ModelFamily::PointEstimate => Self::PointEstimate {
                gp,
                fitting: PointEstimateParams {
                    optimizer: settings.optimizer,
                    max_iters: settings.max_iters,
                    optimize_restarts: settings.optimize_restarts,
                },
            },
            ModelFamily::McmcEnsemble => Self::McmcEnsemble {
                gp,
                sampler: McmcParams {
                    n_samples: settings.n_samples,
                    n_burnin: settings.n_burnin,
                    subsample_interval: settings.subsample_interval,
                    step_size: settings.step_size,
                    leapfrog_steps: settings.leapfrog_steps,
                },
            },
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Self::PointEstimate { .. } => ModelFamily::PointEstimate,
            Self::McmcEnsemble { .. } => ModelFamily::McmcEnsemble,
        }
    }

    pub fn gp(&self) -> &GpSettings {
        match self {
            Self::PointEstimate { gp, .. } | Self::McmcEnsemble { gp, .. } => gp,
        }
    }
}

/// Build an unfitted model through `backend` and check it belongs to the
/// requested family.
pub fn build_model(backend: &dyn Backend, params: &ModelParams) -> BoResult<SharedModel> {
    let model = backend.build_model(params)?;
    if model.family() != params.family() {
        return Err(config_error!(
            "backend built a `{}` model when `{}` was requested",
            model.family(),
            params.family()
        ));
    }
    info!(
        "Built {} surrogate model (kernel {})",
        params.family(),
        params.gp().kernel
    );
    Ok(Arc::new(RwLock::new(model)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubBackend;
    use ow_types::OptionBag;
    use serde_json::json;

    #[test]
    fn point_estimate_keeps_fitting_settings() {
        let params = ModelParams::from_config(&BoConfig::default());
        match &params {
            ModelParams::PointEstimate { gp, fitting } => {
                assert_eq!(fitting.optimize_restarts, 5);
                assert_eq!(fitting.max_iters, 1000);
                assert_eq!(fitting.optimizer, ModelOptimizer::Lbfgs);
                assert!(gp.normalize_y);
                assert!(!gp.exact_feval);
            }
            other => panic!("expected point-estimate params, got {other:?}"),
        }
    }

    #[test]
    fn mcmc_tunables_are_applied() {
        let options = OptionBag::from_value(json!({
            "model_type": "GP_MCMC",
            "acquisition_type": "EI_MCMC",
            "n_samples": 25,
            "n_burnin": 0,
            "subsample_interval": 3,
            "step_size": 0.05,
            "leapfrog_steps": 7,
        }))
        .unwrap();
        let config = BoConfig::from_options(&options).unwrap();
        let params = ModelParams::from_config(&config);
        assert_eq!(
            params,
            ModelParams::McmcEnsemble {
                gp: GpSettings {
                    kernel: KernelKind::Rbf,
                    noise_var: None,
                    exact_feval: false,
                    normalize_y: true,
                },
                sampler: McmcParams {
                    n_samples: 25,
                    n_burnin: 0,
                    subsample_interval: 3,
                    step_size: 0.05,
                    leapfrog_steps: 7,
                },
            }
        );
    }

    #[test]
    fn factory_returns_requested_family() {
        let backend = StubBackend::default();
        for family in ModelFamily::ALL {
            let params = ModelParams::for_family(*family, &ModelSettings::default());
            let model = build_model(&backend, &params).unwrap();
            assert_eq!(model.read().family(), *family);
        }
        assert_eq!(backend.built_models().len(), 2);
    }

    #[test]
    fn mismatched_backend_family_is_rejected() {
        let backend = StubBackend::default().lying_about_family();
        let params = ModelParams::for_family(ModelFamily::McmcEnsemble, &ModelSettings::default());
        assert!(matches!(
            build_model(&backend, &params),
            Err(BoError::Configuration(_))
        ));
    }
}
