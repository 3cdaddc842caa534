//! Initial dataset bootstrap.
//!
//! Three entry conditions:
//! - no `X`: sample `n` points from the space, then evaluate them;
//! - `X` without `Y`: evaluate the supplied points;
//! - `X` and `Y`: pass through untouched.
//!
//! On success the dataset is non-empty and fully paired. An evaluation
//! failure aborts the bootstrap; no retry happens here.

use ndarray::Array2;
use ow_types::{config_error, BoResult, DesignSpace, InitialDesign, ObservedDataset};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::design::sample_design;
use crate::objective::ObjectiveEvaluator;

/// How the initial dataset came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// Points were sampled from the space and evaluated.
    Sampled { design: InitialDesign, points: usize },
    /// Supplied `X` was evaluated to obtain `Y`.
    Completed { points: usize },
    /// Supplied `X` and `Y` were used as is.
    Supplied { points: usize },
}

impl BootstrapOutcome {
    /// True when the objective was called during the bootstrap.
    pub fn evaluated(&self) -> bool {
        !matches!(self, Self::Supplied { .. })
    }
}

/// Pre-supplied observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialData {
    pub x: Option<Array2<f64>>,
    pub y: Option<Array2<f64>>,
}

impl InitialData {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn points(x: Array2<f64>) -> Self {
        Self {
            x: Some(x),
            y: None,
        }
    }

    pub fn observations(x: Array2<f64>, y: Array2<f64>) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }

    /// Shape checks that need no evaluation. Run before anything expensive.
    pub fn check(&self, space: &DesignSpace) -> BoResult<()> {
        let x = match (&self.x, &self.y) {
            (None, None) => return Ok(()),
            (None, Some(_)) => return Err(config_error!("Y was supplied without X")),
            (Some(x), _) => x,
        };
        if x.nrows() == 0 {
            return Err(config_error!("supplied X has no rows"));
        }
        if x.ncols() != space.dimensionality() {
            return Err(config_error!(
                "supplied X has {} columns, the design space has {}",
                x.ncols(),
                space.dimensionality()
            ));
        }
        if let Some(y) = &self.y {
            if y.ncols() != 1 || y.nrows() != x.nrows() {
                return Err(config_error!(
                    "supplied Y has shape {:?}, expected ({}, 1)",
                    y.dim(),
                    x.nrows()
                ));
            }
        }
        let outside = x.rows().into_iter().filter(|r| !space.contains(*r)).count();
        if outside > 0 {
            warn!("{outside} supplied points lie outside the design space");
        }
        Ok(())
    }
}

/// Result of the bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub struct Bootstrap {
    pub dataset: ObservedDataset,
    pub outcome: BootstrapOutcome,
}

/// Produce or complete the initial dataset.
pub fn bootstrap<R: Rng>(
    space: &DesignSpace,
    design: InitialDesign,
    numdata: usize,
    evaluator: &ObjectiveEvaluator,
    initial: InitialData,
    rng: &mut R,
) -> BoResult<Bootstrap> {
    initial.check(space)?;

    let (dataset, outcome) = match (initial.x, initial.y) {
        (Some(x), Some(y)) => {
            let points = x.nrows();
            (
                ObservedDataset::new(x, y)?,
                BootstrapOutcome::Supplied { points },
            )
        }
        (Some(x), None) => {
            let evaluation = evaluator.evaluate(x.view())?;
            let points = x.nrows();
            let dataset =
                ObservedDataset::new(x, evaluation.values_column())?.with_costs(evaluation.costs)?;
            (dataset, BootstrapOutcome::Completed { points })
        }
        (None, None) => {
            let x = sample_design(space, design, numdata, rng)?;
            let evaluation = evaluator.evaluate(x.view())?;
            let dataset =
                ObservedDataset::new(x, evaluation.values_column())?.with_costs(evaluation.costs)?;
            (
                dataset,
                BootstrapOutcome::Sampled {
                    design,
                    points: numdata,
                },
            )
        }
        (None, Some(_)) => return Err(config_error!("Y was supplied without X")),
    };

    let (best_index, best_value) = dataset.best();
    info!(
        "Bootstrapped {} observations ({:?}); best value {best_value} at row {best_index}",
        dataset.len(),
        outcome
    );
    Ok(Bootstrap { dataset, outcome })
}
