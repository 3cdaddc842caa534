//! In-memory backend used by the unit tests.

use ndarray::{Array1, Array2, ArrayView2};
use ow_types::{
    AcquisitionOptimizerKind, BoError, BoResult, DesignSpace, ModelFamily, ObservedDataset,
};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::acquisition::{AcquisitionFunction, AcquisitionOptimizer};
use crate::backend::Backend;
use crate::model::{ModelParams, Prediction, SurrogateModel};

/// Predicts the row sum as mean with unit variance and unit gradients.
pub struct StubModel {
    family: ModelFamily,
    pub fitted_on: Option<usize>,
    failing: bool,
}

impl SurrogateModel for StubModel {
    fn family(&self) -> ModelFamily {
        self.family
    }

    fn fit(&mut self, data: &ObservedDataset) -> BoResult<()> {
        if self.failing {
            return Err(BoError::Model("singular kernel matrix".into()));
        }
        self.fitted_on = Some(data.len());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> BoResult<Prediction> {
        if self.failing && self.fitted_on.is_none() {
            return Err(BoError::Model("not fitted".into()));
        }
        Ok(Prediction {
            mean: x.rows().into_iter().map(|r| r.sum()).collect(),
            variance: Array1::ones(x.nrows()),
        })
    }

    fn predict_gradients(&self, x: ArrayView2<'_, f64>) -> BoResult<Array2<f64>> {
        Ok(Array2::ones(x.raw_dim()))
    }
}

/// Proposes the centre of the space's bounding box.
pub struct StubOptimizer {
    space: Arc<DesignSpace>,
    kind: AcquisitionOptimizerKind,
}

impl StubOptimizer {
    pub fn new(space: Arc<DesignSpace>, kind: AcquisitionOptimizerKind) -> Self {
        Self { space, kind }
    }
}

impl AcquisitionOptimizer for StubOptimizer {
    fn kind(&self) -> AcquisitionOptimizerKind {
        self.kind
    }

    fn optimize(&self, _acquisition: &AcquisitionFunction) -> BoResult<Array2<f64>> {
        let centre: Vec<f64> = self
            .space
            .bounds()
            .iter()
            .map(|(low, high)| (low + high) / 2.0)
            .collect();
        let dim = centre.len();
        Ok(Array2::from_shape_vec((1, dim), centre).unwrap_or_else(|_| Array2::zeros((1, dim))))
    }
}

#[derive(Default)]
pub struct StubBackend {
    built: Mutex<Vec<ModelParams>>,
    lie_about_family: bool,
    failing_fits: bool,
}

impl StubBackend {
    /// Build the opposite family to the one requested.
    pub fn lying_about_family(mut self) -> Self {
        self.lie_about_family = true;
        self
    }

    /// Every model it builds fails to fit.
    pub fn failing_fits(mut self) -> Self {
        self.failing_fits = true;
        self
    }

    pub fn built_models(&self) -> Vec<ModelParams> {
        self.built.lock().clone()
    }
}

impl Backend for StubBackend {
    fn build_model(&self, params: &ModelParams) -> BoResult<Box<dyn SurrogateModel>> {
        self.built.lock().push(params.clone());
        let family = match (params.family(), self.lie_about_family) {
            (family, false) => family,
            (ModelFamily::PointEstimate, true) => ModelFamily::McmcEnsemble,
            (ModelFamily::McmcEnsemble, true) => ModelFamily::PointEstimate,
        };
        Ok(Box::new(StubModel {
            family,
            fitted_on: None,
            failing: self.failing_fits,
        }))
    }

    fn build_acquisition_optimizer(
        &self,
        space: Arc<DesignSpace>,
        kind: AcquisitionOptimizerKind,
    ) -> BoResult<Box<dyn AcquisitionOptimizer>> {
        Ok(Box::new(StubOptimizer::new(space, kind)))
    }
}
