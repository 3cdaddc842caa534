//! Evaluation-cost capability used to penalize expensive regions.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ow_types::{
    config_error, BoError, BoResult, CostSource, KernelKind, ModelFamily, ModelSettings,
    ObservedDataset,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::model::{build_model, ModelParams, SharedModel};

/// Smallest cost fed to the log transform.
const MIN_COST: f64 = 1e-9;

/// Cost and cost gradient at a batch of points.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    /// One cost per row.
    pub cost: Array1<f64>,
    /// `n × d` gradient of the cost.
    pub gradient: Array2<f64>,
}

impl CostEstimate {
    fn unit(x: ArrayView2<'_, f64>) -> Self {
        Self {
            cost: Array1::ones(x.nrows()),
            gradient: Array2::zeros(x.raw_dim()),
        }
    }
}

/// User-supplied cost with gradient.
pub trait CostFunction: Send + Sync {
    fn cost_with_gradient(&self, x: ArrayView2<'_, f64>) -> anyhow::Result<CostEstimate>;
}

impl<F> CostFunction for F
where
    F: Fn(ArrayView2<'_, f64>) -> anyhow::Result<CostEstimate> + Send + Sync,
{
    fn cost_with_gradient(&self, x: ArrayView2<'_, f64>) -> anyhow::Result<CostEstimate> {
        self(x)
    }
}

/// Wrap a closure as a shared cost function.
pub fn cost_fn<F>(f: F) -> Arc<dyn CostFunction>
where
    F: Fn(ArrayView2<'_, f64>) -> anyhow::Result<CostEstimate> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Cost learned from past evaluation times. A point-estimate surrogate is
/// fitted on `log(cost)`; until the first update every point costs 1.
pub struct EvaluationTimeCost {
    model: SharedModel,
    observed: Option<ObservedDataset>,
}

impl EvaluationTimeCost {
    pub fn new(backend: &dyn Backend) -> BoResult<Self> {
        let settings = ModelSettings {
            kernel: KernelKind::Rbf,
            exact_feval: false,
            normalize_y: false,
            ..ModelSettings::default()
        };
        let params = ModelParams::for_family(ModelFamily::PointEstimate, &settings);
        Ok(Self {
            model: build_model(backend, &params)?,
            observed: None,
        })
    }

    pub fn is_fitted(&self) -> bool {
        self.observed.is_some()
    }

    pub fn observations(&self) -> usize {
        self.observed.as_ref().map_or(0, ObservedDataset::len)
    }

    fn update(&mut self, x: ArrayView2<'_, f64>, costs: ArrayView1<'_, f64>) -> BoResult<()> {
        let log_costs = costs
            .mapv(|c| c.max(MIN_COST).ln())
            .insert_axis(Axis(1));
        // Observations are only committed once the model accepts them.
        let candidate = match &self.observed {
            Some(data) => {
                let mut data = data.clone();
                data.append(x, log_costs.view(), None)?;
                data
            }
            None => ObservedDataset::new(x.to_owned(), log_costs)?,
        };
        self.model.write().fit(&candidate)?;
        debug!("Refitted evaluation-time cost model on {} points", candidate.len());
        self.observed = Some(candidate);
        Ok(())
    }

    fn estimate(&self, x: ArrayView2<'_, f64>) -> BoResult<CostEstimate> {
        if !self.is_fitted() {
            return Ok(CostEstimate::unit(x));
        }
        let model = self.model.read();
        let prediction = model.predict(x)?;
        let mean_gradient = model.predict_gradients(x)?;
        if mean_gradient.dim() != x.dim() {
            return Err(BoError::Model(format!(
                "cost model returned {:?} gradients for {:?} points",
                mean_gradient.dim(),
                x.dim()
            )));
        }
        let cost = prediction.mean.mapv(f64::exp);
        let gradient = &mean_gradient * &cost.view().insert_axis(Axis(1));
        Ok(CostEstimate { cost, gradient })
    }
}

/// Uniform cost capability. Never absent: an unconfigured run gets
/// [`CostModel::Constant`].
pub enum CostModel {
    /// `cost ≡ 1`, `gradient ≡ 0`.
    Constant,
    User(Arc<dyn CostFunction>),
    EvaluationTime(EvaluationTimeCost),
}

/// Cost handle shared by the acquisition and the loop.
pub type SharedCost = Arc<RwLock<CostModel>>;

impl CostModel {
    pub fn source(&self) -> CostSource {
        match self {
            Self::Constant => CostSource::Constant,
            Self::User(_) => CostSource::User,
            Self::EvaluationTime(_) => CostSource::EvaluationTime,
        }
    }

    pub fn evaluate(&self, x: ArrayView2<'_, f64>) -> BoResult<CostEstimate> {
        match self {
            Self::Constant => Ok(CostEstimate::unit(x)),
            Self::User(f) => {
                let estimate = f.cost_with_gradient(x).map_err(BoError::Evaluation)?;
                if estimate.cost.len() != x.nrows() || estimate.gradient.dim() != x.dim() {
                    return Err(BoError::Evaluation(anyhow::anyhow!(
                        "cost function returned {} costs and {:?} gradients for {:?} points",
                        estimate.cost.len(),
                        estimate.gradient.dim(),
                        x.dim()
                    )));
                }
                Ok(estimate)
            }
            Self::EvaluationTime(model) => model.estimate(x),
        }
    }

    /// Feed observed evaluation costs. Only the evaluation-time model learns;
    /// the other sources ignore the data.
    pub fn update(&mut self, x: ArrayView2<'_, f64>, costs: ArrayView1<'_, f64>) -> BoResult<()> {
        if costs.len() != x.nrows() {
            return Err(config_error!(
                "got {} costs for {} points",
                costs.len(),
                x.nrows()
            ));
        }
        match self {
            Self::EvaluationTime(model) => model.update(x, costs),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for CostModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant => f.write_str("CostModel::Constant"),
            Self::User(_) => f.write_str("CostModel::User"),
            Self::EvaluationTime(m) => f
                .debug_struct("CostModel::EvaluationTime")
                .field("observations", &m.observations())
                .finish(),
        }
    }
}

/// Bind the configured cost source. A user function takes `CostSource::User`;
/// asking for it without supplying one is a configuration error.
pub fn bind_cost_model(
    source: CostSource,
    user: Option<Arc<dyn CostFunction>>,
    backend: &dyn Backend,
) -> BoResult<SharedCost> {
    let model = match (source, user) {
        (CostSource::Constant, None) => CostModel::Constant,
        (CostSource::User, Some(f)) => CostModel::User(f),
        (CostSource::EvaluationTime, None) => {
            CostModel::EvaluationTime(EvaluationTimeCost::new(backend)?)
        }
        (CostSource::User, None) => {
            return Err(config_error!("user cost selected but no cost function supplied"))
        }
        (other, Some(_)) => {
            return Err(config_error!(
                "cost function supplied but cost source is `{other:?}`"
            ))
        }
    };
    info!("Bound {:?} cost model", model.source());
    Ok(Arc::new(RwLock::new(model)))
}
