//! Observed `(X, Y)` data shared between the bootstrap and the run loop.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::config_error;
use crate::errors::BoResult;

/// Paired observations. `x` is `n × d`, `y` is `n × 1`; optional `costs`
/// hold one evaluation cost per row.
///
/// Construction and [`append`](ObservedDataset::append) both refuse to break
/// the row pairing, so a model never sees a partially populated dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedDataset {
    x: Array2<f64>,
    y: Array2<f64>,
    costs: Option<Array1<f64>>,
}

impl ObservedDataset {
    pub fn new(x: Array2<f64>, y: Array2<f64>) -> BoResult<Self> {
        check_pairing(x.view(), y.view())?;
        if x.nrows() == 0 {
            return Err(config_error!("observed dataset must not be empty"));
        }
        Ok(Self { x, y, costs: None })
    }

    /// Attach per-row evaluation costs.
    pub fn with_costs(mut self, costs: Array1<f64>) -> BoResult<Self> {
        if costs.len() != self.x.nrows() {
            return Err(config_error!(
                "got {} costs for {} observations",
                costs.len(),
                self.x.nrows()
            ));
        }
        self.costs = Some(costs);
        Ok(self)
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f64> {
        self.y.view()
    }

    pub fn costs(&self) -> Option<ArrayView1<'_, f64>> {
        self.costs.as_ref().map(|c| c.view())
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    /// Number of encoded input columns.
    pub fn dim(&self) -> usize {
        self.x.ncols()
    }

    /// Append new observations. Costs are kept only while every batch
    /// supplies them.
    pub fn append(
        &mut self,
        x_new: ArrayView2<'_, f64>,
        y_new: ArrayView2<'_, f64>,
        costs_new: Option<ArrayView1<'_, f64>>,
    ) -> BoResult<()> {
        check_pairing(x_new, y_new)?;
        if x_new.ncols() != self.x.ncols() {
            return Err(config_error!(
                "new points have {} columns, dataset has {}",
                x_new.ncols(),
                self.x.ncols()
            ));
        }
        if let Some(c) = costs_new {
            if c.len() != x_new.nrows() {
                return Err(config_error!(
                    "got {} costs for {} new observations",
                    c.len(),
                    x_new.nrows()
                ));
            }
        }

        self.x = ndarray::concatenate(Axis(0), &[self.x.view(), x_new.view()])
            .map_err(|e| config_error!("cannot append points: {e}"))?;
        self.y = ndarray::concatenate(Axis(0), &[self.y.view(), y_new.view()])
            .map_err(|e| config_error!("cannot append values: {e}"))?;
        self.costs = match (self.costs.take(), costs_new) {
            (Some(old), Some(new)) => Some(
                ndarray::concatenate(Axis(0), &[old.view(), new.view()])
                    .map_err(|e| config_error!("cannot append costs: {e}"))?,
            ),
            _ => None,
        };
        Ok(())
    }

    /// Index and value of the smallest observation.
    pub fn best(&self) -> (usize, f64) {
        self.y
            .column(0)
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, v)| {
                if v < best.1 {
                    (i, v)
                } else {
                    best
                }
            })
    }

    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>, Option<Array1<f64>>) {
        (self.x, self.y, self.costs)
    }
}

fn check_pairing(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> BoResult<()> {
    if y.ncols() != 1 {
        return Err(config_error!(
            "observations must have exactly one column, got {}",
            y.ncols()
        ));
    }
    if x.nrows() != y.nrows() {
        return Err(config_error!(
            "X has {} rows but Y has {}",
            x.nrows(),
            y.nrows()
        ));
    }
    Ok(())
}

/// Build a matrix from row vectors, rejecting ragged input.
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> BoResult<Array2<f64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().position(|r| r.len() != ncols) {
        return Err(config_error!(
            "row {bad} has {} entries, expected {ncols}",
            rows[bad].len()
        ));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), ncols), flat)
        .map_err(|e| config_error!("cannot build matrix: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BoError;
    use ndarray::array;

    #[test]
    fn pairing_is_enforced() {
        assert!(ObservedDataset::new(array![[0.0], [1.0]], array![[1.0], [2.0]]).is_ok());
        assert!(matches!(
            ObservedDataset::new(array![[0.0], [1.0]], array![[1.0]]),
            Err(BoError::Configuration(_))
        ));
        assert!(ObservedDataset::new(array![[0.0]], array![[1.0, 2.0]]).is_err());
        assert!(ObservedDataset::new(Array2::zeros((0, 2)), Array2::zeros((0, 1))).is_err());
    }

    #[test]
    fn append_keeps_rows_paired() {
        let mut data = ObservedDataset::new(array![[0.0, 0.0]], array![[3.0]])
            .unwrap()
            .with_costs(array![0.5])
            .unwrap();
        data.append(
            array![[1.0, 1.0], [2.0, 2.0]].view(),
            array![[1.0], [2.0]].view(),
            Some(array![0.1, 0.2].view()),
        )
        .unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data.costs().unwrap(), array![0.5, 0.1, 0.2]);
        assert_eq!(data.best(), (1, 1.0));

        assert!(data
            .append(array![[1.0, 1.0]].view(), array![[1.0], [2.0]].view(), None)
            .is_err());
        assert!(data
            .append(array![[1.0]].view(), array![[1.0]].view(), None)
            .is_err());
        assert_eq!(data.len(), 3);

        data.append(array![[4.0, 4.0]].view(), array![[9.0]].view(), None)
            .unwrap();
        assert!(data.costs().is_none());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let m = matrix_from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m, array![[1.0, 2.0], [3.0, 4.0]]);
        assert!(matrix_from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }
}
