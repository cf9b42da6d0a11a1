//! 階層エンジン: グラフ構築 → メタ特徴量 → ノード局所学習 → 探索予測。

pub mod graph;
pub mod metafeatures;
pub mod params;
pub mod training;
pub mod traversal;

pub use graph::{ClassHierarchy, HierarchyGraph, HierarchyNode, LocalModel, ROOT, SkipReason};
pub use metafeatures::{Metafeatures, NodeRows, annotate};
pub use params::{
    Algorithm, HierarchicalParams, PredictionDepth, StoppingCriteria, StoppingPredicate,
    TrainingStrategy, ValidatedParams,
};
pub use training::{LocalTrainingSet, TrainingSummary, derive_training_set, train};
pub use traversal::{PathStep, decision_path, predict, predict_one};
