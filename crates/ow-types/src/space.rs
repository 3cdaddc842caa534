//! Search domain definitions.
//!
//! A [`DesignSpace`] is an ordered list of variables plus optional constraint
//! predicates. It can be described explicitly with [`VariableSpec`]s or from
//! plain box bounds; [`DesignSpace::resolve`] picks whichever is usable.
//!
//! Points live in the *encoded* space: continuous and discrete variables take
//! one column each, categorical variables take one column per category
//! (one-hot).

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config_error;
use crate::errors::BoResult;

/// Variable type tag used in domain descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Continuous,
    Discrete,
    Categorical,
}

/// One entry of a structured domain description, e.g.
/// `{"name": "x", "type": "continuous", "domain": [-1, 1], "dimensionality": 2}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableType,
    /// `[low, high]` for continuous, admissible values for discrete,
    /// category labels for categorical.
    pub domain: Vec<Value>,
    #[serde(default = "default_dimensionality")]
    pub dimensionality: usize,
}

fn default_dimensionality() -> usize {
    1
}

impl VariableSpec {
    pub fn continuous(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            kind: VariableType::Continuous,
            domain: vec![Value::from(low), Value::from(high)],
            dimensionality: 1,
        }
    }

    pub fn discrete(name: impl Into<String>, values: &[f64]) -> Self {
        Self {
            name: name.into(),
            kind: VariableType::Discrete,
            domain: values.iter().map(|v| Value::from(*v)).collect(),
            dimensionality: 1,
        }
    }

    pub fn categorical(name: impl Into<String>, labels: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: VariableType::Categorical,
            domain: labels.iter().map(|l| Value::from(*l)).collect(),
            dimensionality: 1,
        }
    }

    pub fn with_dimensionality(mut self, dimensionality: usize) -> Self {
        self.dimensionality = dimensionality;
        self
    }
}

/// Canonical, validated variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableKind {
    /// Continuous range `[low, high]`.
    Continuous { low: f64, high: f64 },
    /// Finite ordered value set (sorted, deduplicated).
    Discrete { values: Vec<f64> },
    /// Unordered labels, one-hot encoded.
    Categorical { labels: Vec<String> },
}

impl Variable {
    /// Number of encoded columns this variable occupies.
    pub fn width(&self) -> usize {
        match &self.kind {
            VariableKind::Categorical { labels } => labels.len(),
            _ => 1,
        }
    }

    /// Bounds of each encoded column.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        match &self.kind {
            VariableKind::Continuous { low, high } => vec![(*low, *high)],
            VariableKind::Discrete { values } => {
                vec![(values[0], values[values.len() - 1])]
            }
            VariableKind::Categorical { labels } => vec![(0.0, 1.0); labels.len()],
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self.kind, VariableKind::Continuous { .. })
    }

    fn from_spec(name: String, spec: &VariableSpec) -> BoResult<Self> {
        let kind = match spec.kind {
            VariableType::Continuous => {
                let numbers = numeric_domain(&spec.name, &spec.domain)?;
                if numbers.len() != 2 {
                    return Err(config_error!(
                        "continuous variable `{}` needs a [low, high] domain, got {} values",
                        spec.name,
                        numbers.len()
                    ));
                }
                VariableKind::Continuous {
                    low: numbers[0],
                    high: numbers[1],
                }
            }
            VariableType::Discrete => {
                let mut values = numeric_domain(&spec.name, &spec.domain)?;
                values.sort_by(|a, b| a.total_cmp(b));
                values.dedup();
                VariableKind::Discrete { values }
            }
            VariableType::Categorical => VariableKind::Categorical {
                labels: spec
                    .domain
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            },
        };
        let variable = Variable { name, kind };
        variable.validate()?;
        Ok(variable)
    }

    fn validate(&self) -> BoResult<()> {
        match &self.kind {
            VariableKind::Continuous { low, high } => {
                let finite = low.is_finite() && high.is_finite() && (high - low).is_finite();
                if !finite || low > high {
                    return Err(config_error!(
                        "variable `{}` has invalid bounds ({low}, {high})",
                        self.name
                    ));
                }
            }
            VariableKind::Discrete { values } => {
                if values.is_empty() {
                    return Err(config_error!("discrete variable `{}` has no values", self.name));
                }
            }
            VariableKind::Categorical { labels } => {
                if labels.is_empty() {
                    return Err(config_error!(
                        "categorical variable `{}` has no categories",
                        self.name
                    ));
                }
            }
        }
        Ok(())
    }
}

fn numeric_domain(name: &str, domain: &[Value]) -> BoResult<Vec<f64>> {
    domain
        .iter()
        .map(|v| {
            v.as_f64()
                .filter(|x| x.is_finite())
                .ok_or_else(|| {
                    config_error!("variable `{name}` has a non-numeric domain entry {v}")
                })
        })
        .collect()
}

/// Constraint predicate over encoded points. A point is feasible when the
/// predicate returns a value `<= 0`.
pub type ConstraintFn = dyn Fn(ArrayView1<'_, f64>) -> f64 + Send + Sync;

#[derive(Clone)]
pub struct Constraint {
    pub name: String,
    predicate: Arc<ConstraintFn>,
}

impl Constraint {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(ArrayView1<'_, f64>) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn evaluate(&self, x: ArrayView1<'_, f64>) -> f64 {
        (self.predicate)(x)
    }

    pub fn is_satisfied(&self, x: ArrayView1<'_, f64>) -> bool {
        self.evaluate(x) <= 0.0
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint").field("name", &self.name).finish()
    }
}

/// Canonical search domain.
#[derive(Debug, Clone)]
pub struct DesignSpace {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
}

impl DesignSpace {
    pub fn new(variables: Vec<Variable>, constraints: Vec<Constraint>) -> BoResult<Self> {
        if variables.is_empty() {
            return Err(config_error!("search domain has no variables"));
        }
        for variable in &variables {
            variable.validate()?;
        }
        Ok(Self {
            variables,
            constraints,
        })
    }

    /// Build from a structured description, expanding `dimensionality > 1`
    /// entries into `name_1`, `name_2`, ...
    pub fn from_specs(specs: &[VariableSpec], constraints: Vec<Constraint>) -> BoResult<Self> {
        let mut variables = Vec::new();
        for spec in specs {
            match spec.dimensionality {
                0 => {
                    return Err(config_error!(
                        "variable `{}` has dimensionality 0",
                        spec.name
                    ))
                }
                1 => variables.push(Variable::from_spec(spec.name.clone(), spec)?),
                n => {
                    for k in 1..=n {
                        variables.push(Variable::from_spec(format!("{}_{k}", spec.name), spec)?);
                    }
                }
            }
        }
        Self::new(variables, constraints)
    }

    /// Build from box bounds; variables are named `var_1`, `var_2`, ...
    pub fn from_bounds(bounds: &[(f64, f64)], constraints: Vec<Constraint>) -> BoResult<Self> {
        let variables = bounds
            .iter()
            .enumerate()
            .map(|(k, (low, high))| Variable {
                name: format!("var_{}", k + 1),
                kind: VariableKind::Continuous {
                    low: *low,
                    high: *high,
                },
            })
            .collect();
        Self::new(variables, constraints)
    }

    /// Pick the usable domain description: an explicit domain wins over
    /// bounds; neither is a configuration error.
    pub fn resolve(
        domain: Option<&[VariableSpec]>,
        bounds: Option<&[(f64, f64)]>,
        constraints: Vec<Constraint>,
    ) -> BoResult<Self> {
        let space = match (domain, bounds) {
            (Some(specs), other_bounds) => {
                if other_bounds.is_some() {
                    warn!("Both domain and bounds supplied; using domain");
                }
                Self::from_specs(specs, constraints)?
            }
            (None, Some(bounds)) => Self::from_bounds(bounds, constraints)?,
            (None, None) => return Err(config_error!("no search domain specified")),
        };
        debug!(
            "Resolved design space with {} variables ({} encoded columns, {} constraints)",
            space.variables.len(),
            space.dimensionality(),
            space.constraints.len()
        );
        Ok(space)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has_constraints(&self) -> bool {
        !self.constraints.is_empty()
    }

    /// Number of encoded columns.
    pub fn dimensionality(&self) -> usize {
        self.variables.iter().map(Variable::width).sum()
    }

    /// Bounds of every encoded column, in column order.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.variables.iter().flat_map(Variable::bounds).collect()
    }

    /// True when every variable admits a continuous value.
    pub fn is_continuous(&self) -> bool {
        self.variables.iter().all(Variable::is_continuous)
    }

    /// 1.0 for rows satisfying every constraint, 0.0 otherwise.
    pub fn indicator_constraints(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                if self.is_feasible(row) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    pub fn is_feasible(&self, x: ArrayView1<'_, f64>) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied(x))
    }

    /// True when `x` has the encoded width, lies within every column's
    /// bounds, uses admissible discrete values and a valid one-hot encoding.
    pub fn contains(&self, x: ArrayView1<'_, f64>) -> bool {
        if x.len() != self.dimensionality() {
            return false;
        }
        let mut col = 0;
        for variable in &self.variables {
            let ok = match &variable.kind {
                VariableKind::Continuous { low, high } => x[col] >= *low && x[col] <= *high,
                VariableKind::Discrete { values } => values.contains(&x[col]),
                VariableKind::Categorical { labels } => {
                    let block = x.slice(ndarray::s![col..col + labels.len()]);
                    block.iter().all(|v| *v == 0.0 || *v == 1.0) && block.sum() == 1.0
                }
            };
            if !ok {
                return false;
            }
            col += variable.width();
        }
        true
    }

    /// Snap an encoded point onto the space: continuous values are clipped,
    /// discrete values move to the nearest admissible value and categorical
    /// blocks become one-hot at their largest entry.
    pub fn round_point(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut rounded = x.to_owned();
        let mut col = 0;
        for variable in &self.variables {
            match &variable.kind {
                VariableKind::Continuous { low, high } => {
                    rounded[col] = rounded[col].clamp(*low, *high);
                }
                VariableKind::Discrete { values } => {
                    let v = rounded[col];
                    rounded[col] = values
                        .iter()
                        .copied()
                        .min_by(|a, b| (a - v).abs().total_cmp(&(b - v).abs()))
                        .unwrap_or(v);
                }
                VariableKind::Categorical { labels } => {
                    let width = labels.len();
                    // Ties go to the first category.
                    let mut winner = 0;
                    for k in 1..width {
                        if rounded[col + k] > rounded[col + winner] {
                            winner = k;
                        }
                    }
                    for k in 0..width {
                        rounded[col + k] = if k == winner { 1.0 } else { 0.0 };
                    }
                }
            }
            col += variable.width();
        }
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BoError;
    use ndarray::array;

    #[test]
    fn bounds_become_named_continuous_variables() {
        let space = DesignSpace::from_bounds(&[(-1.0, 1.0), (0.0, 5.0)], vec![]).unwrap();
        let names: Vec<_> = space.variables().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["var_1", "var_2"]);
        assert_eq!(space.bounds(), vec![(-1.0, 1.0), (0.0, 5.0)]);
        assert!(space.is_continuous());
    }

    #[test]
    fn missing_domain_is_a_configuration_error() {
        match DesignSpace::resolve(None, None, vec![]) {
            Err(BoError::Configuration(msg)) => assert_eq!(msg, "no search domain specified"),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn domain_takes_precedence_over_bounds() {
        let specs = vec![VariableSpec::continuous("x", 0.0, 2.0)];
        let space = DesignSpace::resolve(Some(&specs), Some(&[(-9.0, 9.0)]), vec![]).unwrap();
        assert_eq!(space.variables()[0].name, "x");
        assert_eq!(space.bounds(), vec![(0.0, 2.0)]);
    }

    #[test]
    fn structured_domain_from_json() {
        let specs: Vec<VariableSpec> = serde_json::from_str(
            r#"[
                {"name": "lr", "type": "continuous", "domain": [0.001, 0.1]},
                {"name": "layers", "type": "discrete", "domain": [4, 1, 2, 2]},
                {"name": "act", "type": "categorical", "domain": ["relu", "tanh", "gelu"]},
                {"name": "w", "type": "continuous", "domain": [-1, 1], "dimensionality": 2}
            ]"#,
        )
        .unwrap();
        let space = DesignSpace::from_specs(&specs, vec![]).unwrap();
        assert_eq!(space.variables().len(), 5);
        assert_eq!(space.dimensionality(), 1 + 1 + 3 + 2);
        assert_eq!(
            space.variables()[1].kind,
            VariableKind::Discrete {
                values: vec![1.0, 2.0, 4.0]
            }
        );
        assert_eq!(space.variables()[3].name, "w_1");
        assert_eq!(space.variables()[4].name, "w_2");
        assert!(!space.is_continuous());
    }

    #[test]
    fn invalid_variables_are_rejected() {
        assert!(DesignSpace::from_bounds(&[(1.0, 0.0)], vec![]).is_err());
        assert!(DesignSpace::from_bounds(&[], vec![]).is_err());
        assert!(DesignSpace::from_specs(&[VariableSpec::discrete("d", &[])], vec![]).is_err());
        let bad = VariableSpec {
            name: "x".into(),
            kind: VariableType::Continuous,
            domain: vec![Value::from("low"), Value::from(1.0)],
            dimensionality: 1,
        };
        assert!(DesignSpace::from_specs(&[bad], vec![]).is_err());
    }

    #[test]
    fn bounds_whose_width_overflows_are_rejected() {
        match DesignSpace::from_bounds(&[(-1e308, 1e308)], vec![]) {
            Err(BoError::Configuration(msg)) => assert!(msg.contains("invalid bounds"), "{msg}"),
            other => panic!("expected configuration error, got {other:?}"),
        }
        assert!(DesignSpace::from_bounds(&[(-1e307, 1e307)], vec![]).is_ok());
    }

    #[test]
    fn constraints_mark_infeasible_rows() {
        let space = DesignSpace::from_bounds(
            &[(-1.0, 1.0), (-1.0, 1.0)],
            vec![Constraint::new("disk", |x| x[0] * x[0] + x[1] * x[1] - 0.25)],
        )
        .unwrap();
        let points = array![[0.1, 0.1], [0.9, 0.9], [0.0, -0.5]];
        assert_eq!(space.indicator_constraints(points.view()), array![1.0, 0.0, 1.0]);
        assert!(space.has_constraints());
    }

    #[test]
    fn round_point_snaps_onto_the_space() {
        let space = DesignSpace::from_specs(
            &[
                VariableSpec::continuous("x", 0.0, 1.0),
                VariableSpec::discrete("n", &[1.0, 2.0, 4.0]),
                VariableSpec::categorical("c", &["a", "b", "c"]),
            ],
            vec![],
        )
        .unwrap();
        let rounded = space.round_point(array![1.7, 3.2, 0.2, 0.7, 0.1].view());
        assert_eq!(rounded, array![1.0, 4.0, 0.0, 1.0, 0.0]);
        assert!(space.contains(rounded.view()));
        assert!(!space.contains(array![0.5, 3.0, 0.0, 1.0, 0.0].view()));
        assert!(!space.contains(array![0.5, 2.0].view()));
    }
}
