//! ノード局所の学習セット構築と学習。
//!
//! 各ノードの学習は互いに独立なので `rayon` で並列に行う。ワーカーは自分の
//! ノードのモデルを返すだけで、グラフへの書き込みは全ワーカー完了後にまとめて行う。

use ndarray::{ArrayView2, Axis};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;

use crate::error::{HierarchyError, Result};
use crate::estimator::BaseEstimator;
use crate::hierarchy::graph::{HierarchyGraph, LocalModel, SkipReason};
use crate::hierarchy::metafeatures::NodeRows;
use crate::hierarchy::params::{Algorithm, TrainingStrategy, ValidatedParams};

/// 二値モデル（lcn）の正例ラベル。
pub const POSITIVE: usize = 1;
/// 二値モデル（lcn）の負例ラベル。
pub const NEGATIVE: usize = 0;

/// 1ノード分の学習セット。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrainingSet {
    /// 昇順の行番号。
    pub rows: Vec<usize>,
    /// `rows` と同じ並びのノード局所ラベル。
    pub labels: Vec<usize>,
}

impl LocalTrainingSet {
    fn from_pairs(mut pairs: Vec<(usize, usize)>) -> Self {
        pairs.sort_unstable();
        let (rows, labels) = pairs.into_iter().unzip();
        Self { rows, labels }
    }

    /// ラベルが1種類以下なら、その唯一のラベル（空なら `None`）を返す。
    fn degenerate(&self) -> Option<Option<usize>> {
        let first = self.labels.first().copied();
        if self.labels.iter().all(|label| Some(*label) == first) {
            Some(first)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    pub trained: usize,
    pub single_child: usize,
    pub degenerate: usize,
}

struct NodeJob {
    node: NodeIndex,
    label: String,
    set: LocalTrainingSet,
}

/// lcpn: 子の位置をラベルにし、戦略に応じて負例クラス `children.len()` を加える。
fn parent_node_set(
    graph: &HierarchyGraph,
    rows: &NodeRows,
    idx: NodeIndex,
    strategy: TrainingStrategy,
) -> LocalTrainingSet {
    let node = graph.node(idx);
    let negative = node.children.len();
    let mut pairs: Vec<(usize, usize)> = node
        .children
        .iter()
        .enumerate()
        .flat_map(|(position, child)| rows.rows(*child).iter().map(move |row| (*row, position)))
        .collect();

    match strategy {
        TrainingStrategy::Exclusive => {}
        TrainingStrategy::Siblings => {
            for sibling in graph.siblings(idx) {
                pairs.extend(rows.rows(sibling).iter().map(|row| (*row, negative)));
            }
        }
        TrainingStrategy::Inclusive => {
            let mut inside = vec![false; rows.total()];
            for row in rows.rows(idx) {
                inside[*row] = true;
            }
            pairs.extend(
                inside
                    .iter()
                    .enumerate()
                    .filter(|(_, inside)| !**inside)
                    .map(|(row, _)| (row, negative)),
            );
        }
    }

    LocalTrainingSet::from_pairs(pairs)
}

/// lcn: 配下の行を正例、それ以外の全行を負例にする。
fn node_set(rows: &NodeRows, idx: NodeIndex) -> LocalTrainingSet {
    let mut labels = vec![NEGATIVE; rows.total()];
    for row in rows.rows(idx) {
        labels[*row] = POSITIVE;
    }
    LocalTrainingSet {
        rows: (0..rows.total()).collect(),
        labels,
    }
}

/// アルゴリズムと戦略の組み合わせから、ノードの学習セットを選ぶ。
///
/// 学習しないノードは `Err(SkipReason)`。
///
/// # Errors
/// 学習対象外のノードでは理由を返す（エラーではなく素通しノード）。
pub fn derive_training_set(
    graph: &HierarchyGraph,
    rows: &NodeRows,
    idx: NodeIndex,
    params: &ValidatedParams,
) -> std::result::Result<LocalTrainingSet, SkipReason> {
    let set = match params.algorithm {
        Algorithm::LocalClassifierPerParentNode => {
            if graph.node(idx).children.len() < 2 {
                return Err(SkipReason::SingleChild);
            }
            parent_node_set(graph, rows, idx, params.strategy())
        }
        Algorithm::LocalClassifierPerNode => node_set(rows, idx),
    };
    match set.degenerate() {
        Some(sole) => Err(SkipReason::Degenerate { sole }),
        None => Ok(set),
    }
}

/// 学習が必要なノード（lcpn は内部ノード、lcn は ROOT 以外の全ノード）。
fn candidates(graph: &HierarchyGraph, algorithm: Algorithm) -> Vec<NodeIndex> {
    graph
        .top_down()
        .into_iter()
        .filter(|idx| match algorithm {
            Algorithm::LocalClassifierPerParentNode => !graph.node(*idx).is_leaf(),
            Algorithm::LocalClassifierPerNode => *idx != graph.root(),
        })
        .collect()
}

/// 全ノードの局所モデルを学習してグラフに載せる。
///
/// メタ特徴量の付与（[`crate::hierarchy::metafeatures::annotate`]）が完了している必要がある。
///
/// # Errors
/// 学習対象ノードでベース学習器が失敗した場合は [`HierarchyError::Estimator`]。
/// 一部のノードだけ学習済みのグラフは返さない。
pub fn train(
    graph: &mut HierarchyGraph,
    x: ArrayView2<'_, f64>,
    rows: &NodeRows,
    template: &dyn BaseEstimator,
    params: &ValidatedParams,
) -> Result<TrainingSummary> {
    let mut summary = TrainingSummary::default();
    let mut jobs = Vec::new();

    for idx in candidates(graph, params.algorithm) {
        match derive_training_set(graph, rows, idx, params) {
            Ok(set) => jobs.push(NodeJob {
                node: idx,
                label: graph.node(idx).label.clone(),
                set,
            }),
            Err(reason) => {
                match reason {
                    SkipReason::SingleChild => summary.single_child += 1,
                    SkipReason::Degenerate { .. } => summary.degenerate += 1,
                }
                tracing::debug!(
                    node = %graph.node(idx).label,
                    reason = ?reason,
                    "local classifier skipped"
                );
                graph.node_mut(idx).model = LocalModel::Skipped(reason);
            }
        }
    }

    let fitted = jobs
        .into_par_iter()
        .map(|job| {
            let mut model = template.clone_unfitted();
            let subset = x.select(Axis(0), &job.set.rows);
            model
                .fit(subset.view(), &job.set.labels)
                .map_err(|source| HierarchyError::estimator(&job.label, source))?;
            tracing::debug!(
                node = %job.label,
                rows = job.set.rows.len(),
                classes = model.classes().len(),
                estimator = model.name(),
                "local classifier fitted"
            );
            Ok((job.node, model))
        })
        .collect::<Result<Vec<_>>>()?;

    summary.trained = fitted.len();
    for (idx, model) in fitted {
        graph.node_mut(idx).model = LocalModel::Fitted(model);
    }

    tracing::info!(
        algorithm = params.algorithm.as_str(),
        strategy = params.training_strategy.map(TrainingStrategy::as_str),
        trained = summary.trained,
        single_child = summary.single_child,
        degenerate = summary.degenerate,
        "hierarchy training completed"
    );
    Ok(summary)
}
