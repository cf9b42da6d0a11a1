//! Centroid-based Classification (Rocchio) の実装。
//! クラスごとの重心ベクトルを計算し、重心との距離の softmax で確率を出す。

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::{BaseEstimator, EstimatorError};

/// 重心との近さの測り方。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// ユークリッド距離（スコアは `-distance`）。
    #[default]
    Euclidean,
    /// L2正規化した上でのコサイン類似度。
    Cosine,
}

/// Nearest Centroid Classifier
/// クラスごとに1つの重心を保持する。
#[derive(Debug, Clone)]
pub struct NearestCentroid {
    metric: DistanceMetric,
    /// softmax の温度。大きいほど確率がなだらかになる。
    temperature: f64,
    classes: Vec<usize>,
    /// `classes` と同じ並びの重心（行）。
    centroids: Option<Array2<f64>>,
}

impl Default for NearestCentroid {
    fn default() -> Self {
        Self::new(DistanceMetric::Euclidean, 1.0)
    }
}

impl NearestCentroid {
    #[must_use]
    pub fn new(metric: DistanceMetric, temperature: f64) -> Self {
        Self {
            metric,
            temperature,
            classes: Vec::new(),
            centroids: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// 重心を取得する（デバッグ用）。
    #[must_use]
    pub fn centroid(&self, class: usize) -> Option<ArrayView1<'_, f64>> {
        let row = self.classes.iter().position(|c| *c == class)?;
        self.centroids.as_ref().map(|c| c.row(row))
    }

    fn normalize(vector: ArrayView1<'_, f64>) -> Array1<f64> {
        let norm = vector.dot(&vector).sqrt();
        if norm > 0.0 {
            &vector / norm
        } else {
            vector.to_owned()
        }
    }

    /// 行と各重心のスコア（大きいほど近い）。
    fn scores(&self, centroids: &Array2<f64>, row: ArrayView1<'_, f64>) -> Vec<f64> {
        match self.metric {
            DistanceMetric::Euclidean => centroids
                .outer_iter()
                .map(|c| {
                    let diff = &row - &c;
                    -diff.dot(&diff).sqrt()
                })
                .collect(),
            DistanceMetric::Cosine => {
                let normalized = Self::normalize(row);
                centroids
                    .outer_iter()
                    .map(|c| normalized.dot(&Self::normalize(c)))
                    .collect()
            }
        }
    }

    fn softmax(&self, scores: &[f64]) -> Vec<f64> {
        let temperature = if self.temperature > 0.0 {
            self.temperature
        } else {
            1.0
        };
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores
            .iter()
            .map(|s| ((s - max) / temperature).exp())
            .collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }

    fn fitted(&self, x: ArrayView2<'_, f64>) -> Result<&Array2<f64>, EstimatorError> {
        let centroids = self.centroids.as_ref().ok_or(EstimatorError::NotFitted)?;
        if x.ncols() != centroids.ncols() {
            return Err(EstimatorError::DimensionMismatch {
                expected: centroids.ncols(),
                got: x.ncols(),
            });
        }
        Ok(centroids)
    }
}

impl BaseEstimator for NearestCentroid {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize]) -> Result<(), EstimatorError> {
        if x.nrows() == 0 {
            return Err(EstimatorError::EmptyInput);
        }
        if x.nrows() != y.len() {
            return Err(EstimatorError::LengthMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }

        // クラスごとに行をグループ化
        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (row, label) in y.iter().enumerate() {
            grouped.entry(*label).or_default().push(row);
        }
        if grouped.len() < 2 {
            return Err(EstimatorError::SingleClass);
        }

        let mut centroids = Array2::<f64>::zeros((grouped.len(), x.ncols()));
        for (mut target, rows) in centroids.outer_iter_mut().zip(grouped.values()) {
            let subset = x.select(Axis(0), rows);
            if let Some(mean) = subset.mean_axis(Axis(0)) {
                target.assign(&mean);
            }
        }

        self.classes = grouped.into_keys().collect();
        self.centroids = Some(centroids);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>, EstimatorError> {
        let centroids = self.fitted(x)?;
        Ok(x.outer_iter()
            .map(|row| {
                let scores = self.scores(centroids, row);
                let mut best = 0;
                for (idx, score) in scores.iter().enumerate() {
                    if *score > scores[best] {
                        best = idx;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, EstimatorError> {
        let centroids = self.fitted(x)?;
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (mut out, row) in proba.outer_iter_mut().zip(x.outer_iter()) {
            let probabilities = self.softmax(&self.scores(centroids, row));
            out.assign(&Array1::from_vec(probabilities));
        }
        Ok(proba)
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn clone_unfitted(&self) -> Box<dyn BaseEstimator> {
        Box::new(Self::new(self.metric, self.temperature))
    }

    fn name(&self) -> &str {
        "nearest_centroid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_clusters() -> (Array2<f64>, Vec<usize>) {
        let x = array![[0.0, 0.1], [0.2, 0.0], [5.0, 5.1], [5.2, 4.9]];
        (x, vec![3, 3, 7, 7])
    }

    #[test]
    fn fit_computes_class_means() {
        let (x, y) = two_clusters();
        let mut model = NearestCentroid::default();
        model.fit(x.view(), &y).expect("fit");

        assert_eq!(model.classes(), &[3, 7]);
        let centroid = model.centroid(7).expect("centroid for 7");
        assert!((centroid[0] - 5.1).abs() < 1e-9);
        assert!((centroid[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn predict_and_proba_agree() {
        let (x, y) = two_clusters();
        let mut model = NearestCentroid::default();
        model.fit(x.view(), &y).expect("fit");

        let query = array![[0.1, 0.0], [4.8, 5.0]];
        assert_eq!(model.predict(query.view()).expect("predict"), vec![3, 7]);

        let proba = model.predict_proba(query.view()).expect("proba");
        for row in proba.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(proba[[0, 0]] > 0.99);
        assert!(proba[[1, 1]] > 0.99);
    }

    #[test]
    fn equidistant_row_gets_equal_probabilities() {
        let x = array![[-1.0, 0.0], [1.0, 0.0]];
        let mut model = NearestCentroid::default();
        model.fit(x.view(), &[3, 7]).expect("fit");
        let midpoint = array![[0.0, 0.0]];

        let proba = model.predict_proba(midpoint.view()).expect("proba");

        assert_eq!(proba[[0, 0]], proba[[0, 1]]);
        // 同点は先に並ぶクラス
        assert_eq!(model.predict(midpoint.view()).expect("predict"), vec![3]);
    }

    #[test]
    fn cosine_metric_ignores_magnitude() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [0.0, 1.0], [0.0, 3.0]];
        let mut model = NearestCentroid::new(DistanceMetric::Cosine, 0.1);
        model.fit(x.view(), &[0, 0, 1, 1]).expect("fit");

        let query = array![[100.0, 1.0]];
        assert_eq!(model.predict(query.view()).expect("predict"), vec![0]);
    }

    #[test]
    fn fit_rejects_single_class_and_bad_shapes() {
        let mut model = NearestCentroid::default();
        let x = array![[0.0], [1.0]];
        assert!(matches!(
            model.fit(x.view(), &[1, 1]),
            Err(EstimatorError::SingleClass)
        ));
        assert!(matches!(
            model.fit(x.view(), &[1]),
            Err(EstimatorError::LengthMismatch { rows: 2, labels: 1 })
        ));

        model.fit(x.view(), &[0, 1]).expect("fit");
        let wide = array![[0.0, 1.0]];
        assert!(matches!(
            model.predict(wide.view()),
            Err(EstimatorError::DimensionMismatch { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn clone_unfitted_keeps_settings() {
        let (x, y) = two_clusters();
        let mut model = NearestCentroid::new(DistanceMetric::Cosine, 0.5);
        model.fit(x.view(), &y).expect("fit");

        let fresh = model.clone_unfitted();

        assert!(fresh.classes().is_empty());
        assert!(matches!(
            fresh.predict(x.view()),
            Err(EstimatorError::NotFitted)
        ));
        assert_eq!(fresh.name(), "nearest_centroid");
    }
}
