//! 学習アルゴリズム・学習戦略・予測深さ・停止条件の組み合わせ検証。
//!
//! 設定は実行時に文字列で与えられるため、不正な組み合わせは型ではなく
//! [`HierarchicalParams::validate`] で弾く。検証はデータを一切参照しない。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{HierarchyError, Result};
use crate::hierarchy::metafeatures::Metafeatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// 内部ノードごとに子を選ぶ多クラス分類器（既定）。
    #[default]
    LocalClassifierPerParentNode,
    /// ノードごとの二値分類器（「このクラスまたはその子孫か」）。
    LocalClassifierPerNode,
}

impl Algorithm {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalClassifierPerParentNode => "lcpn",
            Self::LocalClassifierPerNode => "lcn",
        }
    }
}

impl FromStr for Algorithm {
    type Err = HierarchyError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "lcpn" | "local-classifier-per-parent-node" => Ok(Self::LocalClassifierPerParentNode),
            "lcn" | "local-classifier-per-node" => Ok(Self::LocalClassifierPerNode),
            _ => Err(HierarchyError::configuration(format!(
                "unknown algorithm '{raw}'; expected 'lcpn' or 'lcn'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainingStrategy {
    /// ノード配下の行のみ。
    #[default]
    Exclusive,
    /// 配下の行に加え、兄弟ノード配下の行を負例として使う。
    Siblings,
    /// 全行を使い、配下以外を負例とする。
    Inclusive,
}

impl TrainingStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Siblings => "siblings",
            Self::Inclusive => "inclusive",
        }
    }
}

impl FromStr for TrainingStrategy {
    type Err = HierarchyError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "exclusive" => Ok(Self::Exclusive),
            "siblings" => Ok(Self::Siblings),
            "inclusive" => Ok(Self::Inclusive),
            _ => Err(HierarchyError::configuration(format!(
                "unknown training strategy '{raw}'; expected 'exclusive', 'siblings' or 'inclusive'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionDepth {
    /// Mandatory leaf node prediction.
    #[default]
    Mlnp,
    /// Non-mandatory leaf node prediction.
    Nmlnp,
}

impl PredictionDepth {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mlnp => "mlnp",
            Self::Nmlnp => "nmlnp",
        }
    }
}

impl FromStr for PredictionDepth {
    type Err = HierarchyError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "mlnp" | "mandatory-leaf-node-prediction" => Ok(Self::Mlnp),
            "nmlnp" | "non-mandatory-leaf-node-prediction" => Ok(Self::Nmlnp),
            _ => Err(HierarchyError::configuration(format!(
                "unknown prediction depth '{raw}'; expected 'mlnp' or 'nmlnp'"
            ))),
        }
    }
}

/// 停止判定の述語。`(confidence, metafeatures)` で `true` なら停止する。
pub type StoppingPredicate = Arc<dyn Fn(f64, &Metafeatures) -> bool + Send + Sync>;

/// NMLNP の停止条件。
#[derive(Clone)]
pub enum StoppingCriteria {
    /// 最上位の子の確信度がこの値未満なら、現在の内部ノードで停止する。
    Threshold(f64),
    Predicate(StoppingPredicate),
    /// 設定ファイルや環境変数から来た、数値として解釈できなかった値。
    Unparsed(String),
}

impl StoppingCriteria {
    #[must_use]
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(f64, &Metafeatures) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// 設定値のテキストを解釈する。数値でなければ `Unparsed` として残し、
    /// 検証時にエラーにする。
    #[must_use]
    pub fn from_text(raw: &str) -> Self {
        raw.trim()
            .parse::<f64>()
            .map_or_else(|_| Self::Unparsed(raw.to_string()), Self::Threshold)
    }

    /// 停止すべきかを判定する。
    #[must_use]
    pub fn should_stop(&self, confidence: f64, metafeatures: &Metafeatures) -> bool {
        match self {
            Self::Threshold(threshold) => confidence < *threshold,
            Self::Predicate(predicate) => predicate(confidence, metafeatures),
            Self::Unparsed(_) => false,
        }
    }
}

impl fmt::Debug for StoppingCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threshold(value) => f.debug_tuple("Threshold").field(value).finish(),
            Self::Predicate(_) => f.write_str("Predicate(<fn>)"),
            Self::Unparsed(raw) => f.debug_tuple("Unparsed").field(raw).finish(),
        }
    }
}

impl From<f64> for StoppingCriteria {
    fn from(threshold: f64) -> Self {
        Self::Threshold(threshold)
    }
}

/// 未検証のパラメータ（コンストラクタ・環境変数・YAMLから来る生の値）。
#[derive(Debug, Clone)]
pub struct HierarchicalParams {
    pub algorithm: String,
    pub training_strategy: Option<String>,
    pub prediction_depth: String,
    pub stopping_criteria: Option<StoppingCriteria>,
}

impl Default for HierarchicalParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default().as_str().to_string(),
            training_strategy: None,
            prediction_depth: PredictionDepth::default().as_str().to_string(),
            stopping_criteria: None,
        }
    }
}

/// 検証済みのパラメータ。学習・予測エンジンはこれだけを受け取る。
#[derive(Debug, Clone)]
pub struct ValidatedParams {
    pub algorithm: Algorithm,
    /// `lcn` では常に `None`。
    pub training_strategy: Option<TrainingStrategy>,
    pub prediction_depth: PredictionDepth,
    /// `mlnp` では常に `None`。
    pub stopping_criteria: Option<StoppingCriteria>,
}

impl HierarchicalParams {
    /// パラメータの組み合わせを検証する。
    ///
    /// # Errors
    /// 値が不明、または組み合わせが矛盾する場合は
    /// [`HierarchyError::Configuration`] を返す。
    pub fn validate(&self) -> Result<ValidatedParams> {
        let prediction_depth = self.prediction_depth.parse::<PredictionDepth>()?;
        let stopping_criteria = match (prediction_depth, &self.stopping_criteria) {
            (PredictionDepth::Nmlnp, None) => {
                return Err(HierarchyError::configuration(
                    "stopping_criteria must be set when prediction_depth is 'nmlnp'",
                ));
            }
            (PredictionDepth::Nmlnp, Some(StoppingCriteria::Threshold(value)))
                if !value.is_finite() =>
            {
                return Err(HierarchyError::configuration(format!(
                    "stopping_criteria threshold must be a finite number, got {value}"
                )));
            }
            (PredictionDepth::Nmlnp, Some(StoppingCriteria::Unparsed(raw))) => {
                return Err(HierarchyError::configuration(format!(
                    "stopping_criteria must be a numeric threshold or a predicate, got '{raw}'"
                )));
            }
            (PredictionDepth::Nmlnp, Some(criteria)) => Some(criteria.clone()),
            (PredictionDepth::Mlnp, Some(_)) => {
                return Err(HierarchyError::configuration(
                    "stopping_criteria is only meaningful when prediction_depth is 'nmlnp'",
                ));
            }
            (PredictionDepth::Mlnp, None) => None,
        };

        let algorithm = self.algorithm.parse::<Algorithm>()?;
        let training_strategy = match (algorithm, self.training_strategy.as_deref()) {
            (Algorithm::LocalClassifierPerNode, Some(raw)) => {
                return Err(HierarchyError::configuration(format!(
                    "training_strategy '{raw}' is only supported with algorithm 'lcpn'"
                )));
            }
            (Algorithm::LocalClassifierPerNode, None) => None,
            (Algorithm::LocalClassifierPerParentNode, Some(raw)) => {
                Some(raw.parse::<TrainingStrategy>()?)
            }
            (Algorithm::LocalClassifierPerParentNode, None) => Some(TrainingStrategy::default()),
        };

        Ok(ValidatedParams {
            algorithm,
            training_strategy,
            prediction_depth,
            stopping_criteria,
        })
    }
}

impl ValidatedParams {
    #[must_use]
    pub fn strategy(&self) -> TrainingStrategy {
        self.training_strategy.unwrap_or_default()
    }
}
