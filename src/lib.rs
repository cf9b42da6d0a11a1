#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classifier;
pub mod config;
pub mod error;
pub mod estimator;
pub mod evaluation;
pub mod hierarchy;
pub mod observability;
pub mod replay;
pub mod synthetic;

pub use classifier::HierarchicalClassifier;
pub use error::{HierarchyError, Result};
pub use estimator::{BaseEstimator, EstimatorError, NearestCentroid};
pub use hierarchy::{ClassHierarchy, Metafeatures, ROOT, StoppingCriteria};
