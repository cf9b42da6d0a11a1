//! 計測・テスト用の合成データ。
use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::hierarchy::{ClassHierarchy, ROOT};

/// クラスごとの中心点の周りに一様ノイズで点を生成する。
///
/// # Arguments
/// * `centers` - `(ラベル, 中心座標)` の並び。全て同じ次元であること
/// * `per_class` - 1クラスあたりの行数
/// * `spread` - 各座標に加えるノイズの幅（`±spread`）
/// * `seed` - 乱数シード
///
/// 行はクラスを交互に並べるので、先頭の数行だけでも全クラスが現れる。
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn make_blobs(
    centers: &[(String, Vec<f64>)],
    per_class: usize,
    spread: f64,
    seed: u64,
) -> (Array2<f64>, Vec<String>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let dims = centers.first().map_or(0, |(_, center)| center.len());
    let rows = centers.len() * per_class;
    let mut x = Array2::<f64>::zeros((rows, dims));
    let mut y = Vec::with_capacity(rows);

    for sample in 0..per_class {
        for (class, (label, center)) in centers.iter().enumerate() {
            let row = sample * centers.len() + class;
            for (dim, value) in center.iter().enumerate().take(dims) {
                let noise = if spread > 0.0 {
                    rng.random_range(-spread..=spread)
                } else {
                    0.0
                };
                x[[row, dim]] = value + noise;
            }
            y.push(label.clone());
        }
    }

    (x, y)
}

/// `ROOT` の下に `branching` 個ずつ枝分かれする深さ `depth` の木と、
/// 葉ごとに離れた中心点を作る。
///
/// 葉の中心は葉の通し番号を2次元の格子に並べたもので、兄弟同士が近く、
/// 別の部分木とは離れる。
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn balanced_hierarchy(branching: usize, depth: usize) -> (ClassHierarchy, Vec<(String, Vec<f64>)>) {
    let mut hierarchy = ClassHierarchy::new();
    let mut frontier = vec![ROOT.to_string()];

    for _ in 0..depth {
        let mut next = Vec::with_capacity(frontier.len() * branching);
        for parent in &frontier {
            let prefix = if parent == ROOT { "n" } else { parent.as_str() };
            let children: Vec<String> = (0..branching)
                .map(|child| format!("{prefix}.{child}"))
                .collect();
            next.extend(children.iter().cloned());
            hierarchy.insert(parent.clone(), children);
        }
        frontier = next;
    }

    let width = branching.max(1);
    let centers = frontier
        .into_iter()
        .enumerate()
        .map(|(leaf, label)| {
            let column = (leaf % width) as f64;
            let row = (leaf / width) as f64;
            (label, vec![column * 10.0, row * 20.0])
        })
        .collect();

    (hierarchy, centers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blobs_are_interleaved_and_seeded() {
        let centers = vec![("a".to_string(), vec![0.0, 0.0]), ("b".to_string(), vec![10.0, 10.0])];
        let (x, y) = make_blobs(&centers, 3, 0.5, 7);
        let (x_again, _) = make_blobs(&centers, 3, 0.5, 7);

        assert_eq!(x.dim(), (6, 2));
        assert_eq!(y, vec!["a", "b", "a", "b", "a", "b"]);
        assert_eq!(x, x_again);
        assert!(x.row(1).iter().all(|v| (9.5..=10.5).contains(v)));
    }

    #[test]
    fn balanced_hierarchy_has_expected_leaves() {
        let (hierarchy, centers) = balanced_hierarchy(3, 2);

        assert_eq!(hierarchy[ROOT], vec!["n.0", "n.1", "n.2"]);
        assert_eq!(hierarchy["n.1"], vec!["n.1.0", "n.1.1", "n.1.2"]);
        assert_eq!(centers.len(), 9);
        assert_eq!(centers[4].0, "n.1.1");
    }
}
