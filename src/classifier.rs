//! 階層分類器の公開インターフェース（`fit` / `predict`）。

use std::collections::BTreeSet;

use ndarray::{ArrayView1, ArrayView2};

use crate::config::HierarchyConfig;
use crate::error::{HierarchyError, Result};
use crate::estimator::BaseEstimator;
use crate::hierarchy::{
    self, ClassHierarchy, HierarchicalParams, HierarchyGraph, PathStep, StoppingCriteria,
    TrainingSummary, ValidatedParams,
};

/// `fit` ごとに丸ごと作り直される学習済み状態。
#[derive(Debug)]
struct FittedHierarchy {
    class_hierarchy: ClassHierarchy,
    graph: HierarchyGraph,
    classes: Vec<String>,
    params: ValidatedParams,
    summary: TrainingSummary,
}

/// Hierarchical Classifier
/// クラス階層の内部ノードごとに局所分類器を学習し、ROOT から木を辿って予測する。
#[derive(Debug)]
pub struct HierarchicalClassifier {
    base_estimator: Box<dyn BaseEstimator>,
    class_hierarchy: Option<ClassHierarchy>,
    params: HierarchicalParams,
    fitted: Option<FittedHierarchy>,
}

impl HierarchicalClassifier {
    /// 既定のパラメータ（lcpn / exclusive / mlnp）で作成する。
    #[must_use]
    pub fn new(base_estimator: impl BaseEstimator + 'static) -> Self {
        Self {
            base_estimator: Box::new(base_estimator),
            class_hierarchy: None,
            params: HierarchicalParams::default(),
            fitted: None,
        }
    }

    /// 設定から作成する。設定値の検証は `fit` 時に行う。
    #[must_use]
    pub fn from_config(base_estimator: impl BaseEstimator + 'static, config: &HierarchyConfig) -> Self {
        Self {
            base_estimator: Box::new(base_estimator),
            class_hierarchy: config.class_hierarchy.clone(),
            params: config.params(),
            fitted: None,
        }
    }

    #[must_use]
    pub fn with_class_hierarchy(mut self, class_hierarchy: ClassHierarchy) -> Self {
        self.class_hierarchy = Some(class_hierarchy);
        self
    }

    #[must_use]
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.params.algorithm = algorithm.into();
        self
    }

    #[must_use]
    pub fn with_training_strategy(mut self, training_strategy: impl Into<String>) -> Self {
        self.params.training_strategy = Some(training_strategy.into());
        self
    }

    #[must_use]
    pub fn with_prediction_depth(mut self, prediction_depth: impl Into<String>) -> Self {
        self.params.prediction_depth = prediction_depth.into();
        self
    }

    #[must_use]
    pub fn with_stopping_criteria(mut self, stopping_criteria: impl Into<StoppingCriteria>) -> Self {
        self.params.stopping_criteria = Some(stopping_criteria.into());
        self
    }

    #[must_use]
    pub fn params(&self) -> &HierarchicalParams {
        &self.params
    }

    /// 階層グラフを構築し、全内部ノードの局所分類器を学習する。
    ///
    /// 以前の学習結果は破棄され、失敗した場合は未学習状態になる。
    ///
    /// # Errors
    /// - パラメータの組み合わせが不正: [`HierarchyError::Configuration`]（データに触れる前）
    /// - 階層が木でない: [`HierarchyError::InconsistentHierarchy`]
    /// - `y` に階層の葉でないラベル: [`HierarchyError::UnknownClass`]
    /// - 形状不一致・空データ・局所学習の失敗
    pub fn fit<S: AsRef<str>>(&mut self, x: ArrayView2<'_, f64>, y: &[S]) -> Result<&mut Self> {
        self.fitted = None;
        let params = self.params.validate()?;

        if x.nrows() != y.len() {
            return Err(HierarchyError::ShapeMismatch(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if y.is_empty() {
            return Err(HierarchyError::EmptyTrainingSet);
        }

        let mut graph = match &self.class_hierarchy {
            Some(class_hierarchy) => HierarchyGraph::build(class_hierarchy)?,
            None => HierarchyGraph::flat(y)?,
        };
        graph.validate_targets(y)?;

        let rows = hierarchy::annotate(&mut graph, y)?;
        let summary = hierarchy::train(&mut graph, x, &rows, self.base_estimator.as_ref(), &params)?;

        let classes: Vec<String> = y
            .iter()
            .map(|label| label.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        tracing::info!(
            samples = y.len(),
            features = x.ncols(),
            classes = classes.len(),
            nodes = graph.node_count(),
            algorithm = params.algorithm.as_str(),
            prediction_depth = params.prediction_depth.as_str(),
            "hierarchical classifier fitted"
        );

        self.fitted = Some(FittedHierarchy {
            class_hierarchy: graph.to_class_hierarchy(),
            graph,
            classes,
            params,
            summary,
        });
        Ok(self)
    }

    fn fitted(&self) -> Result<&FittedHierarchy> {
        self.fitted.as_ref().ok_or(HierarchyError::NotFitted)
    }

    /// 各行のラベルを予測する。NMLNP では内部ノードのラベルも返り得る。
    ///
    /// # Errors
    /// 未学習なら [`HierarchyError::NotFitted`]、特徴次元が合わなければ局所学習器のエラー。
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<String>> {
        let fitted = self.fitted()?;
        let predictions = hierarchy::predict(&fitted.graph, x, &fitted.params)?;
        let internal = predictions
            .iter()
            .filter(|label| !fitted.graph.is_leaf_label(label))
            .count();
        tracing::debug!(
            rows = predictions.len(),
            internal_predictions = internal,
            "hierarchical prediction completed"
        );
        Ok(predictions)
    }

    /// 1行の探索経路（ROOT から予測ノードまで）。
    ///
    /// # Errors
    /// [`HierarchicalClassifier::predict`] と同じ。
    pub fn decision_path(&self, row: ArrayView1<'_, f64>) -> Result<Vec<PathStep>> {
        let fitted = self.fitted()?;
        hierarchy::decision_path(&fitted.graph, row, &fitted.params)
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// 正規化された階層マッピング（`ROOT` を含む）。
    ///
    /// # Errors
    /// 未学習なら [`HierarchyError::NotFitted`]。
    pub fn class_hierarchy_(&self) -> Result<&ClassHierarchy> {
        Ok(&self.fitted()?.class_hierarchy)
    }

    /// 学習済みモデルを載せた階層グラフ。
    ///
    /// # Errors
    /// 未学習なら [`HierarchyError::NotFitted`]。
    pub fn graph_(&self) -> Result<&HierarchyGraph> {
        Ok(&self.fitted()?.graph)
    }

    /// 学習データに現れたラベル（昇順・重複なし）。
    ///
    /// # Errors
    /// 未学習なら [`HierarchyError::NotFitted`]。
    pub fn classes_(&self) -> Result<&[String]> {
        Ok(&self.fitted()?.classes)
    }

    /// # Errors
    /// 未学習なら [`HierarchyError::NotFitted`]。
    pub fn n_classes_(&self) -> Result<usize> {
        Ok(self.fitted()?.classes.len())
    }

    /// # Errors
    /// 未学習なら [`HierarchyError::NotFitted`]。
    pub fn training_summary(&self) -> Result<TrainingSummary> {
        Ok(self.fitted()?.summary)
    }
}
