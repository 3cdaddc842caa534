//! Backend and objectives shared by the integration tests.

#![allow(dead_code)]

use ndarray::{Array1, Array2, ArrayView2};
use ow_orchestrator::{
    from_fn, AcquisitionFunction, AcquisitionOptimizer, Backend, ModelParams, Objective,
    Prediction, SurrogateModel,
};
use ow_types::{AcquisitionOptimizerKind, BoResult, DesignSpace, ModelFamily, ObservedDataset};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct ConstantModel {
    family: ModelFamily,
    params: ModelParams,
}

impl ConstantModel {
    pub fn params(&self) -> &ModelParams {
        &self.params
    }
}

impl SurrogateModel for ConstantModel {
    fn family(&self) -> ModelFamily {
        self.family
    }

    fn fit(&mut self, _data: &ObservedDataset) -> BoResult<()> {
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> BoResult<Prediction> {
        Ok(Prediction {
            mean: Array1::zeros(x.nrows()),
            variance: Array1::ones(x.nrows()),
        })
    }
}

pub struct LowerCornerOptimizer {
    space: Arc<DesignSpace>,
    kind: AcquisitionOptimizerKind,
}

impl AcquisitionOptimizer for LowerCornerOptimizer {
    fn kind(&self) -> AcquisitionOptimizerKind {
        self.kind
    }

    fn optimize(&self, _acquisition: &AcquisitionFunction) -> BoResult<Array2<f64>> {
        let corner: Array1<f64> = self.space.bounds().iter().map(|(low, _)| *low).collect();
        Ok(corner.insert_axis(ndarray::Axis(0)))
    }
}

/// Records every model request so tests can inspect the applied tunables.
#[derive(Default)]
pub struct RecordingBackend {
    requests: Mutex<Vec<ModelParams>>,
}

impl RecordingBackend {
    pub fn requests(&self) -> Vec<ModelParams> {
        self.requests.lock().clone()
    }
}

impl Backend for RecordingBackend {
    fn build_model(&self, params: &ModelParams) -> BoResult<Box<dyn SurrogateModel>> {
        self.requests.lock().push(params.clone());
        Ok(Box::new(ConstantModel {
            family: params.family(),
            params: params.clone(),
        }))
    }

    fn build_acquisition_optimizer(
        &self,
        space: Arc<DesignSpace>,
        kind: AcquisitionOptimizerKind,
    ) -> BoResult<Box<dyn AcquisitionOptimizer>> {
        Ok(Box::new(LowerCornerOptimizer { space, kind }))
    }
}

/// Sphere objective that counts the points it has seen.
pub fn counting_sphere(calls: Arc<AtomicUsize>) -> Arc<dyn Objective> {
    from_fn(move |x| {
        calls.fetch_add(x.nrows(), Ordering::SeqCst);
        Ok(x.rows().into_iter().map(|r| r.dot(&r)).collect())
    })
}
