//! # ow-types
//!
//! Shared types for OptiWire: the error taxonomy, the option bag and the
//! typed run configuration resolved from it, the design space and the
//! observed dataset.

pub mod config;
pub mod dataset;
pub mod errors;
pub mod options;
pub mod space;

pub use config::*;
pub use dataset::*;
pub use errors::*;
pub use options::*;
pub use space::*;
