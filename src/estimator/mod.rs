//! ノード局所の学習器（ベース学習器）の契約。
//!
//! 階層エンジンは学習器を `fit` / `predict` / `predict_proba` と未学習クローンの
//! 生成だけで扱う。ラベルはノード局所のクラス番号（`usize`）。

pub mod centroid;

use std::fmt;

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

pub use centroid::{DistanceMetric, NearestCentroid};

/// ベース学習器のエラー。
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("estimator is not fitted")]
    NotFitted,
    #[error("training data is empty")]
    EmptyInput,
    #[error("at least two distinct classes are required to fit a discriminator")]
    SingleClass,
    #[error("row count mismatch: {rows} feature rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("{0}")]
    Other(String),
}

/// 階層の各ノードで学習されるベース学習器。
///
/// `clone_unfitted` はノードごと・`fit` ごとに呼ばれ、学習済み状態を共有しない
/// 新しいインスタンスを返す必要がある。
pub trait BaseEstimator: Send + Sync + fmt::Debug {
    /// `x` の各行に対応するクラス番号 `y` で学習する。
    ///
    /// # Errors
    /// 入力の形状が不正な場合や学習に失敗した場合。
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize]) -> Result<(), EstimatorError>;

    /// 各行のクラス番号を予測する。
    ///
    /// # Errors
    /// 未学習、または特徴次元が一致しない場合。
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>, EstimatorError>;

    /// 各行のクラス確率。列の並びは [`BaseEstimator::classes`] に対応する。
    ///
    /// 確率を出せない学習器向けに、既定では `predict` の結果を one-hot にする。
    ///
    /// # Errors
    /// `predict` と同じ。
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, EstimatorError> {
        let predicted = self.predict(x)?;
        let classes = self.classes();
        let mut proba = Array2::<f64>::zeros((predicted.len(), classes.len()));
        for (row, label) in predicted.iter().enumerate() {
            if let Some(col) = classes.iter().position(|c| c == label) {
                proba[[row, col]] = 1.0;
            }
        }
        Ok(proba)
    }

    /// 学習済みのクラス番号（`predict_proba` の列順）。未学習なら空。
    fn classes(&self) -> &[usize];

    /// 設定だけを引き継いだ未学習のコピー。
    fn clone_unfitted(&self) -> Box<dyn BaseEstimator>;

    fn name(&self) -> &str {
        "estimator"
    }
}
