pub mod metrics;

pub use metrics::{
    HierarchicalMetrics, HierarchicalMetricsCalculator, accuracy, hierarchical_metrics,
};
