//! Seam to the numerical backend that owns the regression and acquisition
//! maximization math.

use ow_types::{AcquisitionOptimizerKind, BoResult, DesignSpace};
use std::sync::Arc;

use crate::acquisition::AcquisitionOptimizer;
use crate::model::{ModelParams, SurrogateModel};

/// Builds the external collaborators the orchestrator wires together.
pub trait Backend: Send + Sync {
    /// A configured, unfitted surrogate for `params.family()`.
    fn build_model(&self, params: &ModelParams) -> BoResult<Box<dyn SurrogateModel>>;

    /// An optimizer maximizing acquisitions over `space`.
    fn build_acquisition_optimizer(
        &self,
        space: Arc<DesignSpace>,
        kind: AcquisitionOptimizerKind,
    ) -> BoResult<Box<dyn AcquisitionOptimizer>>;
}
