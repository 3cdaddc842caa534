//! Builds a run on the Branin function with a toy backend and prints the
//! wired graph. Set `RUST_LOG=debug` for construction details.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use ow_orchestrator::{
    pointwise, AcquisitionFunction, AcquisitionOptimizer, Backend, BayesianOptimization,
    ModelParams, Prediction, SurrogateModel,
};
use ow_types::{
    AcquisitionOptimizerKind, BoError, BoResult, DesignSpace, ModelFamily, ObservedDataset,
    OptionBag,
};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Nearest-neighbour "surrogate": predicts the closest observed value.
struct NearestNeighbour {
    family: ModelFamily,
    data: Option<ObservedDataset>,
}

impl SurrogateModel for NearestNeighbour {
    fn family(&self) -> ModelFamily {
        self.family
    }

    fn fit(&mut self, data: &ObservedDataset) -> BoResult<()> {
        self.data = Some(data.clone());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> BoResult<Prediction> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| BoError::Model("model has not been fitted".into()))?;
        let mut mean = Array1::zeros(x.nrows());
        let mut variance = Array1::zeros(x.nrows());
        for (i, point) in x.rows().into_iter().enumerate() {
            let (distance, value) = data
                .x()
                .rows()
                .into_iter()
                .zip(data.y().column(0))
                .map(|(row, y)| ((&row - &point).mapv(|d| d * d).sum(), *y))
                .fold((f64::INFINITY, 0.0), |best, cand| {
                    if cand.0 < best.0 {
                        cand
                    } else {
                        best
                    }
                });
            mean[i] = value;
            variance[i] = distance;
        }
        Ok(Prediction { mean, variance })
    }
}

/// Scores a fixed random sample of candidates and keeps the best.
struct CandidateScan {
    space: Arc<DesignSpace>,
    kind: AcquisitionOptimizerKind,
}

impl AcquisitionOptimizer for CandidateScan {
    fn kind(&self) -> AcquisitionOptimizerKind {
        self.kind
    }

    fn optimize(&self, acquisition: &AcquisitionFunction) -> BoResult<Array2<f64>> {
        let bounds = self.space.bounds();
        let steps = 25;
        let candidates = Array2::from_shape_fn((steps * steps, bounds.len()), |(i, j)| {
            let k = if j == 0 { i / steps } else { i % steps };
            let (low, high) = bounds[j];
            low + (high - low) * k as f64 / (steps - 1) as f64
        });
        let prediction = acquisition.model().read().predict(candidates.view())?;
        let weight = acquisition.exploration_weight().unwrap_or(2.0);
        let best = prediction
            .mean
            .iter()
            .zip(prediction.variance.iter())
            .map(|(m, v)| m - weight * v.sqrt())
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, score)| {
                if score < best.1 {
                    (i, score)
                } else {
                    best
                }
            })
            .0;
        Ok(candidates.row(best).to_owned().insert_axis(Axis(0)))
    }
}

struct ToyBackend;

impl Backend for ToyBackend {
    fn build_model(&self, params: &ModelParams) -> BoResult<Box<dyn SurrogateModel>> {
        Ok(Box::new(NearestNeighbour {
            family: params.family(),
            data: None,
        }))
    }

    fn build_acquisition_optimizer(
        &self,
        space: Arc<DesignSpace>,
        kind: AcquisitionOptimizerKind,
    ) -> BoResult<Box<dyn AcquisitionOptimizer>> {
        Ok(Box::new(CandidateScan { space, kind }))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let branin = pointwise(|p| {
        let (x, y) = (p[0], p[1]);
        let b = 5.1 / (4.0 * PI * PI);
        let c = 5.0 / PI;
        let t = 1.0 / (8.0 * PI);
        Ok((y - b * x * x + c * x - 6.0).powi(2) + 10.0 * (1.0 - t) * x.cos() + 10.0)
    });

    let options = OptionBag::from_json(
        r#"{
            "bounds": [[-5.0, 10.0], [0.0, 15.0]],
            "acquisition_type": "LCB",
            "initial_design_type": "latin",
            "initial_design_numdata": 8,
            "num_cores": 2,
            "seed": 2024
        }"#,
    )?;

    let mut bo = BayesianOptimization::builder(branin, Arc::new(ToyBackend))
        .options(options)
        .build()?;

    println!("run {} created at {}", bo.run_info().id, bo.run_info().created_at);
    println!("{}", serde_json::to_string_pretty(bo.resolved_config())?);

    // One hand-driven iteration of the loop the graph is built for.
    bo.model().write().fit(bo.dataset())?;
    let next = bo.acquisition().suggest()?;
    let evaluation = bo.evaluator().evaluate(next.view())?;
    bo.dataset_mut()
        .append(next.view(), evaluation.values_column().view(), Some(evaluation.costs.view()))?;

    let (index, value) = bo.dataset().best();
    println!(
        "best after {} evaluations: {value:.4} at {}",
        bo.dataset().len(),
        bo.dataset().x().row(index)
    );
    Ok(())
}
