use std::collections::HashSet;

use crate::error::{HierarchyError, Result};
use crate::hierarchy::HierarchyGraph;

/// 階層分類メトリクス。
///
/// 階層版の precision / recall は、正解・予測のラベルをそれぞれ祖先で拡張した
/// 集合の重なりで計算する（`ROOT` は含めない）。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HierarchicalMetrics {
    pub accuracy: f64,
    pub h_precision: f64,
    pub h_recall: f64,
    pub h_fbeta: f64,
    /// 内部ノードで停止した予測の割合（NMLNP）。
    pub internal_rate: f64,
    pub samples: usize,
}

/// テストセットに対するメトリクス集計器。
#[derive(Debug)]
pub struct HierarchicalMetricsCalculator<'g> {
    graph: &'g HierarchyGraph,
    beta: f64,
    overlap: usize,
    predicted_size: usize,
    expected_size: usize,
    correct: usize,
    internal: usize,
    samples: usize,
}

impl<'g> HierarchicalMetricsCalculator<'g> {
    #[must_use]
    pub fn new(graph: &'g HierarchyGraph, beta: f64) -> Self {
        Self {
            graph,
            beta,
            overlap: 0,
            predicted_size: 0,
            expected_size: 0,
            correct: 0,
            internal: 0,
            samples: 0,
        }
    }

    fn augmented(&self, label: &str) -> Result<HashSet<&'g str>> {
        self.graph
            .lineage(label)
            .map(|lineage| lineage.into_iter().collect())
            .ok_or_else(|| HierarchyError::UnknownClass(label.to_string()))
    }

    /// 正解ラベルと予測ラベルを登録する。
    ///
    /// # Errors
    /// どちらかのラベルが階層にない場合は [`HierarchyError::UnknownClass`]。
    pub fn push(&mut self, expected: &str, predicted: &str) -> Result<()> {
        let expected_set = self.augmented(expected)?;
        let predicted_set = self.augmented(predicted)?;

        self.samples += 1;
        if expected == predicted {
            self.correct += 1;
        }
        if !self.graph.is_leaf_label(predicted) {
            self.internal += 1;
        }
        self.overlap += expected_set.intersection(&predicted_set).count();
        self.predicted_size += predicted_set.len();
        self.expected_size += expected_set.len();
        Ok(())
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finalize(&self) -> HierarchicalMetrics {
        if self.samples == 0 {
            return HierarchicalMetrics::default();
        }
        let ratio = |num: usize, den: usize| {
            if den == 0 { 0.0 } else { num as f64 / den as f64 }
        };
        let h_precision = ratio(self.overlap, self.predicted_size);
        let h_recall = ratio(self.overlap, self.expected_size);
        let beta_sq = self.beta * self.beta;
        let denominator = beta_sq * h_precision + h_recall;
        let h_fbeta = if denominator > 0.0 {
            (1.0 + beta_sq) * h_precision * h_recall / denominator
        } else {
            0.0
        };

        HierarchicalMetrics {
            accuracy: ratio(self.correct, self.samples),
            h_precision,
            h_recall,
            h_fbeta,
            internal_rate: ratio(self.internal, self.samples),
            samples: self.samples,
        }
    }
}

/// 正解と予測の組からメトリクスを一括計算する。
///
/// # Errors
/// 長さが異なる場合は [`HierarchyError::ShapeMismatch`]、階層にないラベルは
/// [`HierarchyError::UnknownClass`]。
pub fn hierarchical_metrics<E: AsRef<str>, P: AsRef<str>>(
    graph: &HierarchyGraph,
    expected: &[E],
    predicted: &[P],
    beta: f64,
) -> Result<HierarchicalMetrics> {
    if expected.len() != predicted.len() {
        return Err(HierarchyError::ShapeMismatch(format!(
            "{} expected labels but {} predictions",
            expected.len(),
            predicted.len()
        )));
    }
    let mut calculator = HierarchicalMetricsCalculator::new(graph, beta);
    for (e, p) in expected.iter().zip(predicted) {
        calculator.push(e.as_ref(), p.as_ref())?;
    }
    Ok(calculator.finalize())
}

/// 完全一致の正解率。
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accuracy<E: AsRef<str>, P: AsRef<str>>(expected: &[E], predicted: &[P]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let correct = expected
        .iter()
        .zip(predicted)
        .filter(|(e, p)| e.as_ref() == p.as_ref())
        .count();
    correct as f64 / expected.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{ClassHierarchy, ROOT};

    fn graph() -> HierarchyGraph {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.insert(ROOT.into(), vec!["A".into(), "B".into()]);
        hierarchy.insert("A".into(), vec!["1".into(), "7".into()]);
        hierarchy.insert("B".into(), vec!["3".into(), "8".into(), "9".into()]);
        HierarchyGraph::build(&hierarchy).expect("valid")
    }

    #[test]
    fn perfect_predictions_score_one() {
        let graph = graph();
        let metrics = hierarchical_metrics(&graph, &["1", "8"], &["1", "8"], 1.0).expect("metrics");

        assert!((metrics.accuracy - 1.0).abs() < 1e-12);
        assert!((metrics.h_precision - 1.0).abs() < 1e-12);
        assert!((metrics.h_recall - 1.0).abs() < 1e-12);
        assert!((metrics.h_fbeta - 1.0).abs() < 1e-12);
        assert_eq!(metrics.samples, 2);
    }

    #[test]
    fn sibling_mistake_keeps_partial_credit() {
        let graph = graph();
        // {3, B} vs {8, B}: overlap 1 of 2
        let metrics = hierarchical_metrics(&graph, &["3"], &["8"], 1.0).expect("metrics");

        assert!(metrics.accuracy.abs() < 1e-12);
        assert!((metrics.h_precision - 0.5).abs() < 1e-12);
        assert!((metrics.h_recall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn internal_prediction_is_precise_but_incomplete() {
        let graph = graph();
        // {B} vs {3, B}
        let metrics = hierarchical_metrics(&graph, &["3"], &["B"], 1.0).expect("metrics");

        assert!((metrics.h_precision - 1.0).abs() < 1e-12);
        assert!((metrics.h_recall - 0.5).abs() < 1e-12);
        assert!((metrics.h_fbeta - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.internal_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_labels_and_length_mismatch_fail() {
        let graph = graph();
        assert!(matches!(
            hierarchical_metrics(&graph, &["3"], &["42"], 1.0),
            Err(HierarchyError::UnknownClass(_))
        ));
        assert!(matches!(
            hierarchical_metrics(&graph, &["3", "1"], &["3"], 1.0),
            Err(HierarchyError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn flat_accuracy() {
        assert!((accuracy(&["a", "b", "c", "d"], &["a", "b", "x", "d"]) - 0.75).abs() < 1e-12);
        let empty: [&str; 0] = [];
        assert!(accuracy(&empty, &empty).abs() < 1e-12);
    }
}
