//! 階層分類エンジンのエラー型。

use thiserror::Error;

use crate::estimator::EstimatorError;

/// `fit` / `predict` が呼び出し元に返すエラー。
///
/// いずれも即座に伝播し、リトライや暗黙の補正は行わない。
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// パラメータの組み合わせが不正（データに触れる前に検出される）。
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// 階層マッピングが根付き木になっていない（多重親・循環）。
    #[error("inconsistent class hierarchy: {0}")]
    InconsistentHierarchy(String),
    /// 学習データのラベルが階層の葉に対応しない。
    #[error("unknown class label '{0}': not a leaf of the class hierarchy")]
    UnknownClass(String),
    /// `fit` 前に `predict` が呼ばれた。
    #[error("classifier is not fitted yet; call fit before predict")]
    NotFitted,
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("training set is empty")]
    EmptyTrainingSet,
    /// ノード局所の学習器が失敗した。
    #[error("local classifier at node '{node}' failed: {source}")]
    Estimator {
        node: String,
        #[source]
        source: EstimatorError,
    },
}

impl HierarchyError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn inconsistent(message: impl Into<String>) -> Self {
        Self::InconsistentHierarchy(message.into())
    }

    pub(crate) fn estimator(node: &str, source: EstimatorError) -> Self {
        Self::Estimator {
            node: node.to_string(),
            source,
        }
    }

    /// 設定起因のエラーかどうか（データ起因のエラーと区別する）。
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T, E = HierarchyError> = std::result::Result<T, E>;
