//! Objective binding: wraps the user's black-box function with batching and
//! parallelism settings.

use anyhow::anyhow;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ow_types::{config_error, BoError, BoResult, OptionBag};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A black-box objective evaluated on a batch of encoded points (one row per
/// point). Must return one value per row, in row order.
pub trait Objective: Send + Sync {
    fn evaluate_batch(&self, x: ArrayView2<'_, f64>) -> anyhow::Result<Array1<f64>>;
}

impl<F> Objective for F
where
    F: Fn(ArrayView2<'_, f64>) -> anyhow::Result<Array1<f64>> + Send + Sync,
{
    fn evaluate_batch(&self, x: ArrayView2<'_, f64>) -> anyhow::Result<Array1<f64>> {
        self(x)
    }
}

/// Adapts a single-point function into an [`Objective`].
pub struct Pointwise<F>(pub F);

/// Wrap a batch closure as a shared objective.
pub fn from_fn<F>(f: F) -> Arc<dyn Objective>
where
    F: Fn(ArrayView2<'_, f64>) -> anyhow::Result<Array1<f64>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a single-point closure as a shared objective.
pub fn pointwise<F>(f: F) -> Arc<dyn Objective>
where
    F: Fn(ArrayView1<'_, f64>) -> anyhow::Result<f64> + Send + Sync + 'static,
{
    Arc::new(Pointwise(f))
}

impl<F> Objective for Pointwise<F>
where
    F: Fn(ArrayView1<'_, f64>) -> anyhow::Result<f64> + Send + Sync,
{
    fn evaluate_batch(&self, x: ArrayView2<'_, f64>) -> anyhow::Result<Array1<f64>> {
        x.rows().into_iter().map(|row| (self.0)(row)).collect()
    }
}

/// Objective values plus the wall-clock cost of producing each one.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub values: Array1<f64>,
    /// Seconds per point; a batched call splits its time evenly.
    pub costs: Array1<f64>,
}

impl Evaluation {
    /// Values as an `n × 1` observation matrix.
    pub fn values_column(&self) -> Array2<f64> {
        self.values.clone().insert_axis(Axis(1))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Uniform evaluation capability over a user objective.
///
/// Points are split into chunks of `batch_size` rows and each chunk is one
/// objective call. With `num_cores > 1` chunks run on a dedicated rayon pool;
/// results are always reassembled in input order.
pub struct ObjectiveEvaluator {
    objective: Arc<dyn Objective>,
    batch_size: usize,
    num_cores: usize,
    pool: Option<rayon::ThreadPool>,
    options: OptionBag,
}

impl ObjectiveEvaluator {
    pub fn new(
        objective: Arc<dyn Objective>,
        batch_size: usize,
        num_cores: usize,
        options: OptionBag,
    ) -> BoResult<Self> {
        if batch_size == 0 {
            return Err(config_error!("`batch_size` must be at least 1"));
        }
        if num_cores == 0 {
            return Err(config_error!("`num_cores` must be at least 1"));
        }

        let pool = if num_cores > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(num_cores)
                .thread_name(|i| format!("ow-objective-{i}"))
                .build()
                .map_err(|e| config_error!("cannot start {num_cores} evaluation threads: {e}"))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            objective,
            batch_size,
            num_cores,
            pool,
            options,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    /// Options not consumed by the orchestrator, kept for the objective's owner.
    pub fn options(&self) -> &OptionBag {
        &self.options
    }

    /// Evaluate every row of `points`. Blocks until all rows are resolved;
    /// the first failing chunk aborts the call.
    pub fn evaluate(&self, points: ArrayView2<'_, f64>) -> BoResult<Evaluation> {
        if points.nrows() == 0 {
            return Ok(Evaluation {
                values: Array1::zeros(0),
                costs: Array1::zeros(0),
            });
        }

        let chunks: Vec<ArrayView2<'_, f64>> =
            points.axis_chunks_iter(Axis(0), self.batch_size).collect();
        debug!(
            "Evaluating {} points in {} chunks on {} cores",
            points.nrows(),
            chunks.len(),
            self.num_cores
        );

        let results: Vec<(Vec<f64>, Vec<f64>)> = match &self.pool {
            Some(pool) => pool.install(|| {
                chunks
                    .par_iter()
                    .map(|chunk| self.evaluate_chunk(*chunk))
                    .collect::<BoResult<Vec<_>>>()
            })?,
            None => chunks
                .iter()
                .map(|chunk| self.evaluate_chunk(*chunk))
                .collect::<BoResult<Vec<_>>>()?,
        };

        let mut values = Vec::with_capacity(points.nrows());
        let mut costs = Vec::with_capacity(points.nrows());
        for (v, c) in results {
            values.extend(v);
            costs.extend(c);
        }
        Ok(Evaluation {
            values: Array1::from(values),
            costs: Array1::from(costs),
        })
    }

    fn evaluate_chunk(&self, chunk: ArrayView2<'_, f64>) -> BoResult<(Vec<f64>, Vec<f64>)> {
        let started = Instant::now();
        let values = self
            .objective
            .evaluate_batch(chunk)
            .map_err(BoError::Evaluation)?;
        let elapsed = started.elapsed().as_secs_f64();

        if values.len() != chunk.nrows() {
            return Err(BoError::Evaluation(anyhow!(
                "objective returned {} values for {} points",
                values.len(),
                chunk.nrows()
            )));
        }
        let per_point = elapsed / chunk.nrows() as f64;
        Ok((values.to_vec(), vec![per_point; chunk.nrows()]))
    }
}

impl fmt::Debug for ObjectiveEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectiveEvaluator")
            .field("batch_size", &self.batch_size)
            .field("num_cores", &self.num_cores)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
