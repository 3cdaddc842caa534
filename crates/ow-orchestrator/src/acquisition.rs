//! Acquisition selection and binding.
//!
//! The scoring math lives in the backend's [`AcquisitionOptimizer`]; this
//! module decides which of the six variants a run uses, checks it against the
//! model family actually built, and binds it to the model, space, optimizer
//! and cost handles.

use ndarray::{Array2, Axis};
use ow_types::{
    config_error, AcquisitionKind, AcquisitionOptimizerKind, AcquisitionType, BoConfig, BoError,
    BoResult, DesignSpace,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cost::SharedCost;
use crate::model::SharedModel;

/// Maximizes a bound acquisition over its design space.
pub trait AcquisitionOptimizer: Send + Sync {
    fn kind(&self) -> AcquisitionOptimizerKind;

    /// Proposed points, one per row, in the encoded space.
    fn optimize(&self, acquisition: &AcquisitionFunction) -> BoResult<Array2<f64>>;
}

/// The scalar knob of an acquisition: jitter for improvement-based criteria,
/// exploration weight for the confidence bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionParameter {
    Jitter(f64),
    Weight(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParams {
    pub acquisition_type: AcquisitionType,
    pub parameter: AcquisitionParameter,
}

impl AcquisitionParams {
    pub fn from_config(config: &BoConfig) -> Self {
        let parameter = if config.acquisition_type.kind().is_improvement_based() {
            AcquisitionParameter::Jitter(config.acquisition_jitter)
        } else {
            AcquisitionParameter::Weight(config.acquisition_weight)
        };
        Self {
            acquisition_type: config.acquisition_type,
            parameter,
        }
    }
}

/// A fully bound acquisition. Holds shared handles only; the orchestrator
/// owns the components.
#[derive(Clone)]
pub struct AcquisitionFunction {
    params: AcquisitionParams,
    model: SharedModel,
    space: Arc<DesignSpace>,
    optimizer: Arc<dyn AcquisitionOptimizer>,
    cost: SharedCost,
}

impl AcquisitionFunction {
    pub fn acquisition_type(&self) -> AcquisitionType {
        self.params.acquisition_type
    }

    pub fn kind(&self) -> AcquisitionKind {
        self.params.acquisition_type.kind()
    }

    /// True when the criterion is averaged over MCMC samples.
    pub fn is_mcmc(&self) -> bool {
        self.params.acquisition_type.is_mcmc()
    }

    pub fn parameter(&self) -> AcquisitionParameter {
        self.params.parameter
    }

    pub fn jitter(&self) -> Option<f64> {
        match self.params.parameter {
            AcquisitionParameter::Jitter(j) => Some(j),
            AcquisitionParameter::Weight(_) => None,
        }
    }

    pub fn exploration_weight(&self) -> Option<f64> {
        match self.params.parameter {
            AcquisitionParameter::Weight(w) => Some(w),
            AcquisitionParameter::Jitter(_) => None,
        }
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn space(&self) -> &Arc<DesignSpace> {
        &self.space
    }

    pub fn optimizer(&self) -> &Arc<dyn AcquisitionOptimizer> {
        &self.optimizer
    }

    pub fn cost(&self) -> &SharedCost {
        &self.cost
    }

    /// Ask the bound optimizer for the next points and snap them onto the
    /// design space.
    pub fn suggest(&self) -> BoResult<Array2<f64>> {
        let mut proposals = self.optimizer.optimize(self)?;
        let dim = self.space.dimensionality();
        if proposals.ncols() != dim {
            return Err(BoError::Optimizer(format!(
                "optimizer proposed points with {} columns in a {dim}-dimensional space",
                proposals.ncols()
            )));
        }
        for mut row in proposals.axis_iter_mut(Axis(0)) {
            let rounded = self.space.round_point(row.view());
            row.assign(&rounded);
        }
        Ok(proposals)
    }
}

impl fmt::Debug for AcquisitionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionFunction")
            .field("acquisition_type", &self.params.acquisition_type)
            .field("parameter", &self.params.parameter)
            .field("optimizer", &self.optimizer.kind())
            .finish_non_exhaustive()
    }
}

/// Bind the configured acquisition to already built components, enforcing
/// the pairing rule against the model that was actually built.
pub fn build_acquisition(
    params: AcquisitionParams,
    model: &SharedModel,
    space: &Arc<DesignSpace>,
    optimizer: Arc<dyn AcquisitionOptimizer>,
    cost: &SharedCost,
    requested_optimizer: AcquisitionOptimizerKind,
) -> BoResult<AcquisitionFunction> {
    let family = model.read().family();
    if !params.acquisition_type.is_compatible_with(family) {
        return Err(config_error!(
            "acquisition `{}` cannot be paired with a `{family}` model",
            params.acquisition_type
        ));
    }
    if optimizer.kind() != requested_optimizer {
        warn!(
            "Requested {} acquisition optimizer, backend supplied {}",
            requested_optimizer,
            optimizer.kind()
        );
    }

    info!(
        "Bound {} acquisition ({:?}) to {family} model with {} optimizer",
        params.acquisition_type,
        params.parameter,
        optimizer.kind()
    );
    Ok(AcquisitionFunction {
        params,
        model: Arc::clone(model),
        space: Arc::clone(space),
        optimizer,
        cost: Arc::clone(cost),
    })
}
