#![allow(dead_code)]

use ndarray::Array2;
use taxon_classifier::synthetic::make_blobs;
use taxon_classifier::{ClassHierarchy, ROOT};

/// `{ROOT: [A, B], A: [1, 7], B: [3, 8, 9]}`
pub fn digits_hierarchy() -> ClassHierarchy {
    let mut hierarchy = ClassHierarchy::new();
    hierarchy.insert(ROOT.into(), vec!["A".into(), "B".into()]);
    hierarchy.insert("A".into(), vec!["1".into(), "7".into()]);
    hierarchy.insert("B".into(), vec!["3".into(), "8".into(), "9".into()]);
    hierarchy
}

/// 葉ごとの中心。A の部分木は左、B の部分木は右に離れている。
pub fn digit_centers() -> Vec<(String, Vec<f64>)> {
    vec![
        ("1".into(), vec![0.0, 0.0]),
        ("7".into(), vec![0.0, 4.0]),
        ("3".into(), vec![20.0, 0.0]),
        ("8".into(), vec![20.0, 4.0]),
        ("9".into(), vec![24.0, 2.0]),
    ]
}

pub fn digits(per_class: usize, seed: u64) -> (Array2<f64>, Vec<String>) {
    make_blobs(&digit_centers(), per_class, 0.5, seed)
}

/// B の子 3 と 8 のちょうど中間付近の行。
pub fn straddling_b(rows: usize) -> Array2<f64> {
    let mut x = Array2::<f64>::zeros((rows, 2));
    for (idx, mut row) in x.outer_iter_mut().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let jitter = (idx as f64 - rows as f64 / 2.0) * 0.02;
        row[0] = 20.0 + jitter;
        row[1] = 2.0;
    }
    x
}
