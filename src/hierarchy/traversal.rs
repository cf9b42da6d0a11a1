//! ROOT から葉（または停止ノード）までの予測探索。
//!
//! 状態は「現在のノード」だけで、遷移は「子へ降りる」か「ここで停止する」の2つ。
//! 学習済みグラフは読み取り専用なので、行ごとの予測は並列に実行できる。

use ndarray::{ArrayView1, ArrayView2, Axis};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;

use crate::error::{HierarchyError, Result};
use crate::hierarchy::graph::{HierarchyGraph, LocalModel, SkipReason};
use crate::hierarchy::params::{Algorithm, PredictionDepth, ValidatedParams};
use crate::hierarchy::training::POSITIVE;

/// 1ノードでの判断。
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decision {
    /// モデルを参照せずに降りる（単一の子・学習しなかったノード）。
    PassThrough(NodeIndex),
    Scored {
        child: NodeIndex,
        confidence: f64,
    },
}

/// 探索の1ステップ（デバッグ・評価用）。
#[derive(Debug, Clone, PartialEq)]
pub struct PathStep {
    pub label: String,
    /// このノードで子を選んだときの確信度。素通しや終端では `None`。
    pub confidence: Option<f64>,
}

/// 最大スコアの位置。同点は先に宣言された方。
fn argmax_first(scores: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, score) in scores.iter().enumerate() {
        match best {
            Some(current) if *score <= scores[current] => {}
            _ => best = Some(idx),
        }
    }
    best
}

fn decide_parent_node(
    graph: &HierarchyGraph,
    idx: NodeIndex,
    row: ArrayView1<'_, f64>,
) -> Result<Decision> {
    let node = graph.node(idx);
    match &node.model {
        LocalModel::Fitted(model) => {
            let proba = model
                .predict_proba(row.insert_axis(Axis(0)))
                .map_err(|source| HierarchyError::estimator(&node.label, source))?;
            let classes = model.classes();
            // 負例クラスの列は子の選択には使わない
            let scores: Vec<f64> = (0..node.children.len())
                .map(|position| {
                    classes
                        .iter()
                        .position(|c| *c == position)
                        .map_or(0.0, |col| proba[[0, col]])
                })
                .collect();
            let best = argmax_first(&scores).ok_or(HierarchyError::NotFitted)?;
            Ok(Decision::Scored {
                child: node.children[best],
                confidence: scores[best],
            })
        }
        LocalModel::Skipped(SkipReason::Degenerate { sole }) => {
            let target = sole
                .and_then(|position| node.children.get(position))
                .unwrap_or(&node.children[0]);
            Ok(Decision::PassThrough(*target))
        }
        LocalModel::Skipped(SkipReason::SingleChild) => Ok(Decision::PassThrough(node.children[0])),
        LocalModel::Untrained => Err(HierarchyError::NotFitted),
    }
}

/// lcn: 子それぞれの二値モデルの正例確率。
fn child_score(graph: &HierarchyGraph, child: NodeIndex, row: ArrayView1<'_, f64>) -> Result<f64> {
    let node = graph.node(child);
    match &node.model {
        LocalModel::Fitted(model) => {
            let proba = model
                .predict_proba(row.insert_axis(Axis(0)))
                .map_err(|source| HierarchyError::estimator(&node.label, source))?;
            Ok(model
                .classes()
                .iter()
                .position(|c| *c == POSITIVE)
                .map_or(0.0, |col| proba[[0, col]]))
        }
        LocalModel::Skipped(SkipReason::Degenerate { sole }) => {
            Ok(if *sole == Some(POSITIVE) { 1.0 } else { 0.0 })
        }
        LocalModel::Skipped(SkipReason::SingleChild) | LocalModel::Untrained => {
            Err(HierarchyError::NotFitted)
        }
    }
}

fn decide_per_node(
    graph: &HierarchyGraph,
    idx: NodeIndex,
    row: ArrayView1<'_, f64>,
) -> Result<Decision> {
    let node = graph.node(idx);
    if node.children.len() == 1 {
        return Ok(Decision::PassThrough(node.children[0]));
    }
    let scores = node
        .children
        .iter()
        .map(|child| child_score(graph, *child, row))
        .collect::<Result<Vec<f64>>>()?;

    // 0.5 未満（どの子も受理しない）でも最大スコアの子へ降りる。止めるかは停止条件が決める
    let best = argmax_first(&scores).ok_or(HierarchyError::NotFitted)?;
    Ok(Decision::Scored {
        child: node.children[best],
        confidence: scores[best],
    })
}

/// 1行を ROOT から辿り、訪れたノードの列を返す。最後の要素が予測。
///
/// # Errors
/// 学習済みモデルのない内部ノードに到達した場合は [`HierarchyError::NotFitted`]、
/// ローカルモデルの予測が失敗した場合は [`HierarchyError::Estimator`]。
pub fn decision_path(
    graph: &HierarchyGraph,
    row: ArrayView1<'_, f64>,
    params: &ValidatedParams,
) -> Result<Vec<PathStep>> {
    let root = graph.root();
    let mut current = root;
    let mut path = Vec::new();

    loop {
        let node = graph.node(current);
        if node.is_leaf() {
            path.push(PathStep {
                label: node.label.clone(),
                confidence: None,
            });
            break;
        }

        let decision = if node.children.len() == 1 {
            Decision::PassThrough(node.children[0])
        } else {
            match params.algorithm {
                Algorithm::LocalClassifierPerParentNode => decide_parent_node(graph, current, row)?,
                Algorithm::LocalClassifierPerNode => decide_per_node(graph, current, row)?,
            }
        };

        match decision {
            Decision::PassThrough(next) => {
                path.push(PathStep {
                    label: node.label.clone(),
                    confidence: None,
                });
                current = next;
            }
            Decision::Scored { child, confidence } => {
                path.push(PathStep {
                    label: node.label.clone(),
                    confidence: Some(confidence),
                });
                // ROOT は予測クラスではないので停止しない
                if params.prediction_depth == PredictionDepth::Nmlnp && current != root {
                    let stop = params
                        .stopping_criteria
                        .as_ref()
                        .is_some_and(|criteria| criteria.should_stop(confidence, &node.metafeatures));
                    if stop {
                        break;
                    }
                }
                current = child;
            }
        }
    }

    Ok(path)
}

/// 1行の予測ラベル。
///
/// # Errors
/// [`decision_path`] と同じ。
pub fn predict_one(
    graph: &HierarchyGraph,
    row: ArrayView1<'_, f64>,
    params: &ValidatedParams,
) -> Result<String> {
    let path = decision_path(graph, row, params)?;
    path.into_iter()
        .last()
        .map(|step| step.label)
        .ok_or(HierarchyError::NotFitted)
}

/// 全行を並列に予測する。結果は入力の行順。
///
/// # Errors
/// いずれかの行で [`predict_one`] が失敗した場合。
pub fn predict(
    graph: &HierarchyGraph,
    x: ArrayView2<'_, f64>,
    params: &ValidatedParams,
) -> Result<Vec<String>> {
    (0..x.nrows())
        .into_par_iter()
        .map(|row| predict_one(graph, x.row(row), params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_declared_on_ties() {
        assert_eq!(argmax_first(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax_first(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax_first(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax_first(&[]), None);
    }

    #[test]
    fn argmax_skips_rejected_children() {
        let scores = [f64::NEG_INFINITY, 0.6, f64::NEG_INFINITY];
        assert_eq!(argmax_first(&scores), Some(1));
    }
}
