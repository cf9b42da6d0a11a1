//! ノードごとの学習データ統計（メタ特徴量）の付与。

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use serde::Serialize;

use crate::error::{HierarchyError, Result};
use crate::hierarchy::graph::HierarchyGraph;

/// ノードの統計量。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metafeatures {
    /// ノード配下の葉をラベルに持つ学習行の数。
    pub num_samples: usize,
    /// 配下に実際に現れた葉ラベルの種類数。
    pub num_targets: usize,
    /// `ROOT` からの深さ。
    pub depth: usize,
}

/// ノード配下の学習行（昇順の行番号）。
#[derive(Debug, Default)]
pub struct NodeRows {
    rows: HashMap<NodeIndex, Vec<usize>>,
    total: usize,
}

impl NodeRows {
    #[must_use]
    pub fn rows(&self, idx: NodeIndex) -> &[usize] {
        self.rows.get(&idx).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 学習セット全体の行数。
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }
}

/// 全ノードにメタ特徴量を書き込み、ノード配下の行集合を返す。
///
/// 学習セットの構築より前に一度だけ実行する。
///
/// # Errors
/// 葉に対応しないラベルがあれば [`HierarchyError::UnknownClass`]。
pub fn annotate<S: AsRef<str>>(graph: &mut HierarchyGraph, y: &[S]) -> Result<NodeRows> {
    let mut rows: HashMap<NodeIndex, Vec<usize>> = HashMap::new();
    for (row, label) in y.iter().enumerate() {
        let label = label.as_ref();
        let leaf = graph
            .index_of(label)
            .filter(|idx| graph.node(*idx).is_leaf())
            .ok_or_else(|| HierarchyError::UnknownClass(label.to_string()))?;
        rows.entry(leaf).or_default().push(row);
    }

    // 葉側から集約する
    let order = graph.top_down();
    let mut targets: HashMap<NodeIndex, usize> = HashMap::new();
    for idx in order.iter().rev().copied() {
        let node = graph.node(idx);
        if node.is_leaf() {
            let represented = usize::from(rows.get(&idx).is_some_and(|r| !r.is_empty()));
            targets.insert(idx, represented);
            continue;
        }
        let mut merged: Vec<usize> = node
            .children
            .iter()
            .flat_map(|child| rows.get(child).into_iter().flatten().copied())
            .collect();
        merged.sort_unstable();
        let num_targets = node
            .children
            .iter()
            .map(|child| targets.get(child).copied().unwrap_or(0))
            .sum();
        targets.insert(idx, num_targets);
        rows.insert(idx, merged);
    }

    for idx in order {
        let num_samples = rows.get(&idx).map_or(0, Vec::len);
        let num_targets = targets.get(&idx).copied().unwrap_or(0);
        let node = graph.node_mut(idx);
        node.metafeatures = Metafeatures {
            num_samples,
            num_targets,
            depth: node.depth,
        };
    }

    let root = graph.node(graph.root()).metafeatures;
    tracing::debug!(
        num_samples = root.num_samples,
        num_targets = root.num_targets,
        "metafeatures annotated"
    );

    Ok(NodeRows {
        rows,
        total: y.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::graph::{ClassHierarchy, ROOT};

    fn graph() -> HierarchyGraph {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.insert(ROOT.into(), vec!["A".into(), "B".into()]);
        hierarchy.insert("A".into(), vec!["1".into(), "7".into()]);
        hierarchy.insert("B".into(), vec!["3".into(), "8".into(), "9".into()]);
        HierarchyGraph::build(&hierarchy).expect("valid")
    }

    #[test]
    fn counts_rows_and_targets_per_node() {
        let mut graph = graph();
        let y = ["1", "3", "1", "8", "7", "3"];

        let rows = annotate(&mut graph, &y).expect("annotate");

        let root = graph.node(graph.root()).metafeatures;
        assert_eq!(root.num_samples, 6);
        assert_eq!(root.num_targets, 4);
        assert_eq!(root.depth, 0);

        let b = graph.index_of("B").expect("B");
        assert_eq!(graph.node(b).metafeatures.num_samples, 3);
        // 9 は学習データに現れない
        assert_eq!(graph.node(b).metafeatures.num_targets, 2);
        assert_eq!(rows.rows(b), &[1, 3, 5]);

        let nine = graph.index_of("9").expect("9");
        assert_eq!(graph.node(nine).metafeatures.num_samples, 0);
        assert!(rows.rows(nine).is_empty());
        assert_eq!(rows.total(), 6);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let mut graph = graph();
        assert!(matches!(
            annotate(&mut graph, &["1", "B"]),
            Err(HierarchyError::UnknownClass(label)) if label == "B"
        ));
    }
}
