//! Initial design sampling: random, Latin hypercube and grid.

use egobox_doe::{FullFactorial, Lhs, LhsKind, SamplingMethod};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ow_types::{config_error, sampling_error, BoResult, DesignSpace, InitialDesign, VariableKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Rejection-sampling attempts allowed per requested point.
const MAX_ATTEMPTS_PER_POINT: usize = 1000;

/// Largest continuous grid materialized before filtering.
const MAX_GRID_POINTS: usize = 1 << 16;

/// Draw exactly `n` points (rows) from `space` with the given policy.
pub fn sample_design<R: Rng>(
    space: &DesignSpace,
    design: InitialDesign,
    n: usize,
    rng: &mut R,
) -> BoResult<Array2<f64>> {
    if n == 0 {
        return Err(config_error!("initial design needs at least one point"));
    }
    let points = match design {
        InitialDesign::Random => random_design(space, n, rng)?,
        InitialDesign::Latin => latin_design(space, n, rng)?,
        InitialDesign::Grid => grid_design(space, n, rng)?,
    };
    debug!(
        "Sampled {} {} design points in {} columns",
        points.nrows(),
        design,
        points.ncols()
    );
    Ok(points)
}

/// Uniform samples, rejecting points that violate a constraint.
fn random_design<R: Rng>(space: &DesignSpace, n: usize, rng: &mut R) -> BoResult<Array2<f64>> {
    let mut rows = Vec::with_capacity(n);
    let budget = n.saturating_mul(MAX_ATTEMPTS_PER_POINT);
    let mut attempts = 0;

    while rows.len() < n {
        if attempts == budget {
            return Err(sampling_error!(
                "found only {} feasible points out of {n} after {attempts} draws",
                rows.len()
            ));
        }
        attempts += 1;
        let point = uniform_point(space, rng);
        if space.is_feasible(point.view()) {
            rows.push(point);
        }
    }
    stack(space, rows)
}

/// Latin hypercube over the continuous variables; other variables are drawn
/// uniformly.
fn latin_design<R: Rng>(space: &DesignSpace, n: usize, rng: &mut R) -> BoResult<Array2<f64>> {
    if space.has_constraints() {
        return Err(config_error!(
            "latin initial design does not support constrained spaces"
        ));
    }

    let mut points = Array2::zeros((n, space.dimensionality()));
    for mut row in points.rows_mut() {
        row.assign(&uniform_point(space, rng));
    }

    let (columns, limits) = continuous_limits(space);
    if !columns.is_empty() {
        let lhs = Lhs::new(&limits)
            .kind(LhsKind::Classic)
            .with_rng(ChaCha8Rng::seed_from_u64(rng.gen()));
        let block = lhs.sample(n);
        for (k, col) in columns.iter().enumerate() {
            points.column_mut(*col).assign(&block.column(k));
        }
    }
    Ok(points)
}

/// Full-factorial grid over continuous variables crossed with every discrete
/// value and category. Infeasible grid points are dropped; the grid is
/// truncated to `n` or topped up with random feasible points.
fn grid_design<R: Rng>(space: &DesignSpace, n: usize, rng: &mut R) -> BoResult<Array2<f64>> {
    let (columns, limits) = continuous_limits(space);
    let continuous = continuous_grid(&limits, n)?;
    debug_assert_eq!(continuous.ncols(), columns.len());

    let others: Vec<Vec<Vec<f64>>> = space
        .variables()
        .iter()
        .filter_map(|variable| match &variable.kind {
            VariableKind::Continuous { .. } => None,
            VariableKind::Discrete { values } => Some(values.iter().map(|v| vec![*v]).collect()),
            VariableKind::Categorical { labels } => Some(
                (0..labels.len())
                    .map(|k| {
                        let mut one_hot = vec![0.0; labels.len()];
                        one_hot[k] = 1.0;
                        one_hot
                    })
                    .collect(),
            ),
        })
        .collect();
    let combinations = others
        .iter()
        .try_fold(1usize, |acc, axis: &Vec<Vec<f64>>| acc.checked_mul(axis.len()))
        .unwrap_or(usize::MAX);
    let total = continuous.nrows().saturating_mul(combinations);

    let mut rows = Vec::with_capacity(n);
    let mut index = 0;
    while rows.len() < n && index < total {
        let choices = decode(&others, index % combinations);
        let point = grid_point(space, continuous.row(index / combinations), &choices);
        if space.is_feasible(point.view()) {
            rows.push(point);
        }
        index += 1;
    }

    if rows.len() < n {
        debug!(
            "Grid produced {} of {n} points; filling the rest randomly",
            rows.len()
        );
        let fill = random_design(space, n - rows.len(), rng)?;
        rows.extend(fill.rows().into_iter().map(|r| r.to_owned()));
    }
    stack(space, rows)
}

/// Continuous column indices and their `[low, high]` rows.
fn continuous_limits(space: &DesignSpace) -> (Vec<usize>, Array2<f64>) {
    let mut columns = Vec::new();
    let mut limits = Vec::new();
    let mut col = 0;
    for variable in space.variables() {
        if let VariableKind::Continuous { low, high } = variable.kind {
            columns.push(col);
            limits.extend([low, high]);
        }
        col += variable.width();
    }
    let limits = Array2::from_shape_vec((columns.len(), 2), limits)
        .unwrap_or_else(|_| Array2::zeros((0, 2)));
    (columns, limits)
}

/// `ceil(n^(1/k))` levels per continuous variable; a single level sits at the
/// midpoint.
fn continuous_grid(limits: &Array2<f64>, n: usize) -> BoResult<Array2<f64>> {
    let k = limits.nrows();
    if k == 0 {
        return Ok(Array2::zeros((1, 0)));
    }
    // Trim float noise so perfect powers are not rounded up.
    let steps = (((n as f64).powf(1.0 / k as f64) - 1e-9).ceil() as usize).max(1);
    if steps == 1 {
        let centre = (&limits.column(0) + &limits.column(1)) / 2.0;
        return Ok(centre.insert_axis(Axis(0)));
    }
    let size = u32::try_from(k)
        .ok()
        .and_then(|k| steps.checked_pow(k))
        .filter(|size| *size <= MAX_GRID_POINTS)
        .ok_or_else(|| {
            sampling_error!("a {steps}-level grid over {k} continuous variables is too large")
        })?;
    Ok(FullFactorial::new(limits).sample(size))
}

/// Mixed-radix decode of `index` into one choice per axis.
fn decode(axes: &[Vec<Vec<f64>>], mut index: usize) -> Vec<&[f64]> {
    let mut choices = Vec::with_capacity(axes.len());
    for axis in axes.iter().rev() {
        choices.push(axis[index % axis.len()].as_slice());
        index /= axis.len();
    }
    choices.reverse();
    choices
}

/// Interleave continuous grid values with the other variables' choices in
/// variable order.
fn grid_point(
    space: &DesignSpace,
    continuous: ArrayView1<'_, f64>,
    choices: &[&[f64]],
) -> Array1<f64> {
    let mut point = Vec::with_capacity(space.dimensionality());
    let mut continuous = continuous.iter();
    let mut choices = choices.iter();
    for variable in space.variables() {
        if variable.is_continuous() {
            point.extend(continuous.next().copied());
        } else if let Some(choice) = choices.next() {
            point.extend_from_slice(choice);
        }
    }
    Array1::from(point)
}

fn uniform_point<R: Rng>(space: &DesignSpace, rng: &mut R) -> Array1<f64> {
    let mut point = Vec::with_capacity(space.dimensionality());
    for variable in space.variables() {
        match &variable.kind {
            VariableKind::Continuous { low, high } => {
                point.push(if low < high { rng.gen_range(*low..=*high) } else { *low });
            }
            VariableKind::Discrete { values } => {
                point.push(values[rng.gen_range(0..values.len())]);
            }
            VariableKind::Categorical { labels } => {
                let chosen = rng.gen_range(0..labels.len());
                point.extend((0..labels.len()).map(|k| if k == chosen { 1.0 } else { 0.0 }));
            }
        }
    }
    Array1::from(point)
}

fn stack(space: &DesignSpace, rows: Vec<Array1<f64>>) -> BoResult<Array2<f64>> {
    let dim = space.dimensionality();
    let n = rows.len();
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((n, dim), flat)
        .map_err(|e| sampling_error!("cannot assemble design matrix: {e}"))
}
