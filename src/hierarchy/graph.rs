//! クラス階層グラフの構築と検証。
//! ユーザー指定の `親 → 子リスト` マッピングから、合成ノード `ROOT` を根とする
//! 有向木を組み立てる。ノードは `petgraph` のアリーナに置き、`NodeIndex` で参照する。

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};

use crate::error::{HierarchyError, Result};
use crate::estimator::BaseEstimator;
use crate::hierarchy::metafeatures::Metafeatures;

/// 全クラスの祖先となる合成ノードのラベル。予測対象のクラスではない。
pub const ROOT: &str = "<ROOT>";

/// 親ラベルから、宣言順の子ラベルへのマッピング。
pub type ClassHierarchy = BTreeMap<String, Vec<String>>;

/// 学習を行わなかった理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 子が1つしかない（予測時はその子へ素通し）。
    SingleChild,
    /// 戦略適用後のラベルが1種類しかない。`sole` はそのノード局所ラベル。
    Degenerate { sole: Option<usize> },
}

/// ノードに載る局所モデルのスロット。
#[derive(Debug, Default)]
pub enum LocalModel {
    #[default]
    Untrained,
    Fitted(Box<dyn BaseEstimator>),
    Skipped(SkipReason),
}

impl LocalModel {
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        matches!(self, Self::Fitted(_))
    }

    #[must_use]
    pub fn estimator(&self) -> Option<&dyn BaseEstimator> {
        match self {
            Self::Fitted(model) => Some(model.as_ref()),
            _ => None,
        }
    }
}

/// 役割（ROOT・内部ノード・葉）によらず同じ形をしたノード。
#[derive(Debug)]
pub struct HierarchyNode {
    pub label: String,
    pub parent: Option<NodeIndex>,
    /// 宣言順の子。
    pub children: Vec<NodeIndex>,
    pub depth: usize,
    pub metafeatures: Metafeatures,
    pub model: LocalModel,
}

impl HierarchyNode {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            parent: None,
            children: Vec::new(),
            depth: 0,
            metafeatures: Metafeatures::default(),
            model: LocalModel::Untrained,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// 検証済みの根付き木。
#[derive(Debug)]
pub struct HierarchyGraph {
    graph: DiGraph<HierarchyNode, ()>,
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl HierarchyGraph {
    /// マッピングからグラフを構築する。入力は変更しない。
    ///
    /// 親が宣言されていないノードは `ROOT` の子になる。
    ///
    /// # Errors
    /// 多重親・循環・`ROOT` を子に持つマッピングは
    /// [`HierarchyError::InconsistentHierarchy`] になる。
    pub fn build(hierarchy: &ClassHierarchy) -> Result<Self> {
        let mut graph = DiGraph::<HierarchyNode, ()>::new();
        let mut index = HashMap::new();
        let root = graph.add_node(HierarchyNode::new(ROOT));
        index.insert(ROOT.to_string(), root);

        // 出現順にノードを作り、親を1つに限定する
        let mut parent_of: HashMap<&str, &str> = HashMap::new();
        for (parent, children) in hierarchy {
            Self::ensure_node(&mut graph, &mut index, parent);
            for child in children {
                if child == ROOT {
                    return Err(HierarchyError::inconsistent(format!(
                        "'{ROOT}' cannot be the child of '{parent}'"
                    )));
                }
                if let Some(previous) = parent_of.insert(child.as_str(), parent.as_str()) {
                    return Err(HierarchyError::inconsistent(format!(
                        "node '{child}' has more than one parent ('{previous}' and '{parent}')"
                    )));
                }
                Self::ensure_node(&mut graph, &mut index, child);
            }
        }

        for (parent, children) in hierarchy {
            let parent_idx = index[parent.as_str()];
            for child in children {
                let child_idx = index[child.as_str()];
                graph.add_edge(parent_idx, child_idx, ());
                graph[parent_idx].children.push(child_idx);
                graph[child_idx].parent = Some(parent_idx);
            }
        }

        // 親のないノードを ROOT にぶら下げる
        let orphans: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|idx| *idx != root && graph[*idx].parent.is_none())
            .collect();
        for orphan in orphans {
            graph.add_edge(root, orphan, ());
            graph[root].children.push(orphan);
            graph[orphan].parent = Some(root);
        }

        if is_cyclic_directed(&graph) {
            return Err(HierarchyError::inconsistent(
                "class hierarchy contains a cycle",
            ));
        }

        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&graph, root);
        while let Some(idx) = dfs.next(&graph) {
            reachable.insert(idx);
        }
        if let Some(stray) = graph.node_indices().find(|idx| !reachable.contains(idx)) {
            return Err(HierarchyError::inconsistent(format!(
                "node '{}' is not reachable from '{ROOT}'",
                graph[stray].label
            )));
        }

        let mut built = Self { graph, index, root };
        built.assign_depths();

        tracing::info!(
            nodes = built.node_count(),
            edges = built.edge_count(),
            leaves = built.leaves().len(),
            "hierarchy graph built"
        );
        Ok(built)
    }

    /// 階層未指定時の1段階の階層（`ROOT` 直下に全ラベル）。
    ///
    /// # Errors
    /// ラベルに `ROOT` が含まれる場合。
    pub fn flat<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let distinct: BTreeSet<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.insert(ROOT.to_string(), distinct.into_iter().collect());
        Self::build(&hierarchy)
    }

    fn ensure_node(
        graph: &mut DiGraph<HierarchyNode, ()>,
        index: &mut HashMap<String, NodeIndex>,
        label: &str,
    ) -> NodeIndex {
        if let Some(idx) = index.get(label) {
            return *idx;
        }
        let idx = graph.add_node(HierarchyNode::new(label));
        index.insert(label.to_string(), idx);
        idx
    }

    fn assign_depths(&mut self) {
        for idx in self.top_down() {
            let depth = self.graph[idx]
                .parent
                .map_or(0, |parent| self.graph[parent].depth + 1);
            self.graph[idx].depth = depth;
        }
    }

    /// 学習ラベルがすべて葉に対応するか検証する。
    ///
    /// # Errors
    /// 階層にない、または内部ノードのラベルは [`HierarchyError::UnknownClass`]。
    pub fn validate_targets<S: AsRef<str>>(&self, labels: &[S]) -> Result<()> {
        let mut seen = HashSet::new();
        for label in labels {
            let label = label.as_ref();
            if !seen.insert(label) {
                continue;
            }
            match self.index.get(label) {
                Some(idx) if self.graph[*idx].is_leaf() => {}
                _ => return Err(HierarchyError::UnknownClass(label.to_string())),
            }
        }
        Ok(())
    }

    /// 正規化されたマッピング（`ROOT` を含む）に戻す。
    #[must_use]
    pub fn to_class_hierarchy(&self) -> ClassHierarchy {
        self.top_down()
            .into_iter()
            .filter(|idx| !self.graph[*idx].is_leaf())
            .map(|idx| {
                let node = &self.graph[idx];
                let children = node
                    .children
                    .iter()
                    .map(|child| self.graph[*child].label.clone())
                    .collect();
                (node.label.clone(), children)
            })
            .collect()
    }

    /// `ROOT` から幅優先、子は宣言順。
    #[must_use]
    pub fn top_down(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut queue = VecDeque::from([self.root]);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            queue.extend(self.graph[idx].children.iter().copied());
        }
        order
    }

    #[must_use]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    #[must_use]
    pub fn node(&self, idx: NodeIndex) -> &HierarchyNode {
        &self.graph[idx]
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> &mut HierarchyNode {
        &mut self.graph[idx]
    }

    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<NodeIndex> {
        self.index.get(label).copied()
    }

    #[must_use]
    pub fn node_by_label(&self, label: &str) -> Option<&HierarchyNode> {
        self.index_of(label).map(|idx| &self.graph[idx])
    }

    #[must_use]
    pub fn is_leaf_label(&self, label: &str) -> bool {
        self.node_by_label(label).is_some_and(HierarchyNode::is_leaf)
    }

    #[must_use]
    pub fn leaves(&self) -> Vec<NodeIndex> {
        self.top_down()
            .into_iter()
            .filter(|idx| self.graph[*idx].is_leaf())
            .collect()
    }

    /// 同じ親を持つ他のノード（宣言順）。
    #[must_use]
    pub fn siblings(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph[idx].parent.map_or_else(Vec::new, |parent| {
            self.graph[parent]
                .children
                .iter()
                .copied()
                .filter(|sibling| *sibling != idx)
                .collect()
        })
    }

    /// 自身を含む祖先のラベル（`ROOT` は除く、葉側から順に）。
    #[must_use]
    pub fn lineage(&self, label: &str) -> Option<Vec<&str>> {
        let mut current = self.index_of(label)?;
        let mut lineage = Vec::new();
        while current != self.root {
            lineage.push(self.graph[current].label.as_str());
            current = self.graph[current].parent?;
        }
        Some(lineage)
    }

    /// `(親, 子)` ラベルの辺集合。
    #[must_use]
    pub fn edges(&self) -> BTreeSet<(String, String)> {
        self.graph
            .edge_references()
            .map(|edge| {
                (
                    self.graph[edge.source()].label.clone(),
                    self.graph[edge.target()].label.clone(),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn labels(&self) -> BTreeSet<String> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].label.clone())
            .collect()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
