//! Typed run configuration resolved once from an [`OptionBag`].

use serde::{Deserialize, Serialize};

use crate::config_error;
use crate::errors::{BoError, BoResult};
use crate::options::OptionBag;

/// Bootstrap sample count used when `initial_design_numdata` is unset or
/// not positive.
pub const DEFAULT_INITIAL_DESIGN_NUMDATA: usize = 5;
pub const DEFAULT_ACQUISITION_JITTER: f64 = 0.01;
pub const DEFAULT_ACQUISITION_WEIGHT: f64 = 2.0;

/// Option keys consumed by [`BoConfig::from_options`] or by the orchestrator.
/// Anything else in the bag is passed through to the objective.
pub const KNOWN_OPTIONS: &[&str] = &[
    "domain",
    "bounds",
    "constraints",
    "X",
    "Y",
    "model_type",
    "acquisition_type",
    "acquisition_optimizer_type",
    "evaluator_type",
    "initial_design_type",
    "initial_design_numdata",
    "normalize_Y",
    "exact_feval",
    "batch_size",
    "num_cores",
    "model_update_interval",
    "acquisition_jitter",
    "acquisition_weight",
    "cost_withGradients",
    "kernel",
    "noise_var",
    "model_optimizer_type",
    "max_iters",
    "optimize_restarts",
    "n_samples",
    "n_burnin",
    "subsample_interval",
    "step_size",
    "leapfrog_steps",
    "seed",
];

/// Declares a closed set of string selectors with parsing and display.
macro_rules! selector {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($other:ident => $err:expr) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = BoError;

            fn from_str(s: &str) -> BoResult<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    $other => Err($err),
                }
            }
        }
    };
}

selector! {
    /// Surrogate model family.
    pub enum ModelFamily (other => config_error!("unrecognized model_type `{other}`")) {
        /// Single set of hyperparameters fitted by likelihood maximization.
        PointEstimate => "GP",
        /// Hyperparameter samples drawn by hybrid Monte Carlo.
        McmcEnsemble => "GP_MCMC",
    }
}

selector! {
    /// Acquisition selector: criterion × (plain | MCMC-averaged).
    pub enum AcquisitionType (other => BoError::InvalidAcquisition(format!("`{other}`"))) {
        Ei => "EI",
        EiMcmc => "EI_MCMC",
        Mpi => "MPI",
        MpiMcmc => "MPI_MCMC",
        Lcb => "LCB",
        LcbMcmc => "LCB_MCMC",
    }
}

/// The scoring criterion behind an [`AcquisitionType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionKind {
    ExpectedImprovement,
    ProbabilityOfImprovement,
    LowerConfidenceBound,
}

impl AcquisitionKind {
    /// Improvement-based criteria take a jitter, LCB takes an exploration weight.
    pub fn is_improvement_based(self) -> bool {
        !matches!(self, Self::LowerConfidenceBound)
    }
}

impl AcquisitionType {
    pub fn kind(self) -> AcquisitionKind {
        match self {
            Self::Ei | Self::EiMcmc => AcquisitionKind::ExpectedImprovement,
            Self::Mpi | Self::MpiMcmc => AcquisitionKind::ProbabilityOfImprovement,
            Self::Lcb | Self::LcbMcmc => AcquisitionKind::LowerConfidenceBound,
        }
    }

    /// True for the variants averaging the criterion over MCMC samples.
    pub fn is_mcmc(self) -> bool {
        matches!(self, Self::EiMcmc | Self::MpiMcmc | Self::LcbMcmc)
    }

    /// The only model family this acquisition may be bound to.
    pub fn required_model(self) -> ModelFamily {
        if self.is_mcmc() {
            ModelFamily::McmcEnsemble
        } else {
            ModelFamily::PointEstimate
        }
    }

    pub fn is_compatible_with(self, model: ModelFamily) -> bool {
        self.required_model() == model
    }
}

selector! {
    /// Numerical optimizer used to maximize the acquisition.
    pub enum AcquisitionOptimizerKind (other => config_error!("unrecognized acquisition_optimizer_type `{other}`")) {
        Lbfgs => "lbfgs",
        Direct => "DIRECT",
        Cma => "CMA",
    }
}

selector! {
    /// How the external loop collects a batch of points.
    pub enum BatchMethod (other => config_error!("unrecognized evaluator_type `{other}`")) {
        Sequential => "sequential",
        Random => "random",
        LocalPenalization => "local_penalization",
    }
}

selector! {
    /// Sampling policy for the bootstrap design.
    pub enum InitialDesign (other => config_error!("unrecognized initial_design_type `{other}`")) {
        Random => "random",
        Latin => "latin",
        Grid => "grid",
    }
}

selector! {
    /// Covariance function of the surrogate.
    pub enum KernelKind (other => config_error!("unrecognized kernel `{other}`")) {
        Rbf => "rbf",
        Matern32 => "matern32",
        Matern52 => "matern52",
        Exponential => "exponential",
    }
}

selector! {
    /// Hyperparameter optimizer for point-estimate models.
    pub enum ModelOptimizer (other => config_error!("unrecognized model_optimizer_type `{other}`")) {
        Lbfgs => "lbfgs",
        Scg => "scg",
        Tnc => "tnc",
    }
}

/// Where evaluation costs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    /// Unit cost everywhere.
    Constant,
    /// Learned from the wall-clock time of past evaluations.
    EvaluationTime,
    /// A user function supplied in code.
    User,
}

/// Surrogate tunables. Point-estimate and MCMC fields are all resolved; the
/// model factory keeps only those of the selected family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub kernel: KernelKind,
    /// Observation noise variance; `None` lets the model learn it.
    pub noise_var: Option<f64>,
    pub exact_feval: bool,
    pub normalize_y: bool,

    pub optimizer: ModelOptimizer,
    pub max_iters: usize,
    pub optimize_restarts: usize,

    pub n_samples: usize,
    pub n_burnin: usize,
    pub subsample_interval: usize,
    pub step_size: f64,
    pub leapfrog_steps: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            kernel: KernelKind::Rbf,
            noise_var: None,
            exact_feval: false,
            normalize_y: true,
            optimizer: ModelOptimizer::Lbfgs,
            max_iters: 1000,
            optimize_restarts: 5,
            n_samples: 10,
            n_burnin: 100,
            subsample_interval: 10,
            step_size: 0.1,
            leapfrog_steps: 20,
        }
    }
}

/// Fully resolved configuration of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoConfig {
    pub model_type: ModelFamily,
    pub acquisition_type: AcquisitionType,
    pub acquisition_optimizer_type: AcquisitionOptimizerKind,
    pub evaluator_type: BatchMethod,
    pub initial_design_type: InitialDesign,
    pub initial_design_numdata: usize,
    pub batch_size: usize,
    pub num_cores: usize,
    pub model_update_interval: usize,
    pub acquisition_jitter: f64,
    pub acquisition_weight: f64,
    pub cost: CostSource,
    pub model: ModelSettings,
    /// Seed for the initial design; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for BoConfig {
    fn default() -> Self {
        Self {
            model_type: ModelFamily::PointEstimate,
            acquisition_type: AcquisitionType::Ei,
            acquisition_optimizer_type: AcquisitionOptimizerKind::Lbfgs,
            evaluator_type: BatchMethod::LocalPenalization,
            initial_design_type: InitialDesign::Random,
            initial_design_numdata: DEFAULT_INITIAL_DESIGN_NUMDATA,
            batch_size: 1,
            num_cores: 1,
            model_update_interval: 1,
            acquisition_jitter: DEFAULT_ACQUISITION_JITTER,
            acquisition_weight: DEFAULT_ACQUISITION_WEIGHT,
            cost: CostSource::Constant,
            model: ModelSettings::default(),
            seed: None,
        }
    }
}

impl BoConfig {
    /// Resolve every tunable from `options`, then validate the result.
    ///
    /// Selector strings are parsed here, so an unknown `acquisition_type`
    /// surfaces as [`BoError::InvalidAcquisition`] and an unknown
    /// `model_type` as [`BoError::Configuration`], both before any other
    /// component is built.
    pub fn from_options(options: &OptionBag) -> BoResult<Self> {
        let defaults = Self::default();
        let model_defaults = ModelSettings::default();

        let model = ModelSettings {
            kernel: selector(options, "kernel", model_defaults.kernel)?,
            noise_var: options.resolve_optional("noise_var")?,
            exact_feval: options.resolve("exact_feval", model_defaults.exact_feval)?,
            normalize_y: options.resolve("normalize_Y", model_defaults.normalize_y)?,
            optimizer: selector(options, "model_optimizer_type", model_defaults.optimizer)?,
            max_iters: positive(options, "max_iters", model_defaults.max_iters)?,
            optimize_restarts: positive(
                options,
                "optimize_restarts",
                model_defaults.optimize_restarts,
            )?,
            n_samples: positive(options, "n_samples", model_defaults.n_samples)?,
            n_burnin: non_negative(options, "n_burnin", model_defaults.n_burnin)?,
            subsample_interval: positive(
                options,
                "subsample_interval",
                model_defaults.subsample_interval,
            )?,
            step_size: options.resolve("step_size", model_defaults.step_size)?,
            leapfrog_steps: positive(options, "leapfrog_steps", model_defaults.leapfrog_steps)?,
        };

        let numdata: i64 = options.resolve(
            "initial_design_numdata",
            DEFAULT_INITIAL_DESIGN_NUMDATA as i64,
        )?;
        let initial_design_numdata = if numdata > 0 {
            numdata as usize
        } else {
            DEFAULT_INITIAL_DESIGN_NUMDATA
        };

        let cost = match options.resolve_optional::<String>("cost_withGradients")? {
            None => CostSource::Constant,
            Some(s) if s == "evaluation_time" => CostSource::EvaluationTime,
            Some(other) => {
                return Err(config_error!(
                    "cost_withGradients must be `evaluation_time` or a cost function, got `{other}`"
                ))
            }
        };

        let config = Self {
            model_type: selector(options, "model_type", defaults.model_type)?,
            acquisition_type: selector(options, "acquisition_type", defaults.acquisition_type)?,
            acquisition_optimizer_type: selector(
                options,
                "acquisition_optimizer_type",
                defaults.acquisition_optimizer_type,
            )?,
            evaluator_type: selector(options, "evaluator_type", defaults.evaluator_type)?,
            initial_design_type: selector(
                options,
                "initial_design_type",
                defaults.initial_design_type,
            )?,
            initial_design_numdata,
            batch_size: positive(options, "batch_size", defaults.batch_size)?,
            num_cores: positive(options, "num_cores", defaults.num_cores)?,
            model_update_interval: positive(
                options,
                "model_update_interval",
                defaults.model_update_interval,
            )?,
            acquisition_jitter: options.resolve("acquisition_jitter", defaults.acquisition_jitter)?,
            acquisition_weight: options.resolve("acquisition_weight", defaults.acquisition_weight)?,
            cost,
            model,
            seed: options.resolve_optional("seed")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the model/acquisition pairing rule.
    pub fn validate(&self) -> BoResult<()> {
        if !self.acquisition_type.is_compatible_with(self.model_type) {
            return Err(config_error!(
                "acquisition `{}` requires a `{}` model, but model_type is `{}`",
                self.acquisition_type,
                self.acquisition_type.required_model(),
                self.model_type
            ));
        }

        for (key, value) in [
            ("initial_design_numdata", self.initial_design_numdata),
            ("batch_size", self.batch_size),
            ("num_cores", self.num_cores),
            ("model_update_interval", self.model_update_interval),
            ("max_iters", self.model.max_iters),
            ("optimize_restarts", self.model.optimize_restarts),
            ("n_samples", self.model.n_samples),
            ("subsample_interval", self.model.subsample_interval),
            ("leapfrog_steps", self.model.leapfrog_steps),
        ] {
            if value == 0 {
                return Err(config_error!("`{key}` must be at least 1"));
            }
        }

        if !self.acquisition_jitter.is_finite() || self.acquisition_jitter < 0.0 {
            return Err(config_error!(
                "`acquisition_jitter` must be a finite non-negative number, got {}",
                self.acquisition_jitter
            ));
        }
        if !self.acquisition_weight.is_finite() || self.acquisition_weight < 0.0 {
            return Err(config_error!(
                "`acquisition_weight` must be a finite non-negative number, got {}",
                self.acquisition_weight
            ));
        }
        if !self.model.step_size.is_finite() || self.model.step_size <= 0.0 {
            return Err(config_error!(
                "`step_size` must be a finite positive number, got {}",
                self.model.step_size
            ));
        }
        if let Some(noise) = self.model.noise_var {
            if !noise.is_finite() || noise < 0.0 {
                return Err(config_error!(
                    "`noise_var` must be a finite non-negative number, got {noise}"
                ));
            }
        }
        Ok(())
    }

    /// Batch method the loop should actually use: a single-point batch is
    /// always sequential.
    pub fn effective_batch_method(&self) -> BatchMethod {
        if self.batch_size == 1 {
            BatchMethod::Sequential
        } else {
            self.evaluator_type
        }
    }

    pub fn with_model_type(mut self, model_type: ModelFamily) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn with_acquisition_type(mut self, acquisition_type: AcquisitionType) -> Self {
        self.acquisition_type = acquisition_type;
        self
    }

    pub fn with_initial_design(mut self, design: InitialDesign, numdata: usize) -> Self {
        self.initial_design_type = design;
        self.initial_design_numdata = numdata;
        self
    }

    pub fn with_batching(mut self, batch_size: usize, num_cores: usize) -> Self {
        self.batch_size = batch_size;
        self.num_cores = num_cores;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn selector<T>(options: &OptionBag, key: &str, default: T) -> BoResult<T>
where
    T: std::str::FromStr<Err = BoError>,
{
    match options.resolve_optional::<String>(key)? {
        Some(text) => text.parse(),
        None => Ok(default),
    }
}

fn positive(options: &OptionBag, key: &str, default: usize) -> BoResult<usize> {
    let value: i64 = options.resolve(key, default as i64)?;
    if value < 1 {
        return Err(config_error!("`{key}` must be a positive integer, got {value}"));
    }
    Ok(value as usize)
}

fn non_negative(options: &OptionBag, key: &str, default: usize) -> BoResult<usize> {
    let value: i64 = options.resolve(key, default as i64)?;
    if value < 0 {
        return Err(config_error!("`{key}` must be a non-negative integer, got {value}"));
    }
    Ok(value as usize)
}
