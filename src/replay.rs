use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::classifier::HierarchicalClassifier;
use crate::config::HierarchyConfig;
use crate::evaluation::{HierarchicalMetrics, hierarchical_metrics};
use crate::hierarchy::ClassHierarchy;

/// Configuration required by the offline replay helper.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub dataset: PathBuf,
    pub beta: f64,
    pub show_predictions: bool,
}

/// データセット中のラベル。整数で書かれたクラスも文字列として扱う。
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ReplayLabel {
    Text(String),
    Integer(i64),
}

impl From<ReplayLabel> for String {
    fn from(label: ReplayLabel) -> Self {
        match label {
            ReplayLabel::Text(text) => text,
            ReplayLabel::Integer(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplayDataset {
    #[serde(default)]
    class_hierarchy: Option<BTreeMap<String, Vec<ReplayLabel>>>,
    train: Vec<ReplayRecord>,
    #[serde(default)]
    test: Vec<ReplayRecord>,
}

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    features: Vec<f64>,
    label: ReplayLabel,
}

impl ReplayDataset {
    fn hierarchy(&self) -> Option<ClassHierarchy> {
        self.class_hierarchy.as_ref().map(|mapping| {
            mapping
                .iter()
                .map(|(parent, children)| {
                    let children = children.iter().cloned().map(String::from).collect();
                    (parent.clone(), children)
                })
                .collect()
        })
    }
}

/// Summary printed by the replay binary.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub classes: Vec<String>,
    pub accuracy: f64,
    pub h_precision: f64,
    pub h_recall: f64,
    pub h_fbeta: f64,
    pub internal_rate: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub predictions: Vec<String>,
}

impl ReplayReport {
    fn new(
        train_rows: usize,
        classes: Vec<String>,
        metrics: HierarchicalMetrics,
        predictions: Vec<String>,
    ) -> Self {
        Self {
            train_rows,
            test_rows: metrics.samples,
            classes,
            accuracy: metrics.accuracy,
            h_precision: metrics.h_precision,
            h_recall: metrics.h_recall,
            h_fbeta: metrics.h_fbeta,
            internal_rate: metrics.internal_rate,
            predictions,
        }
    }
}

/// Fit a classifier on the dataset's train split and score it on the test split.
///
/// Parameters come from [`HierarchyConfig::from_env`]; a `class_hierarchy`
/// in the dataset file takes precedence over the configured one.
///
/// # Errors
/// Fails when the dataset cannot be read or parsed, the configuration is
/// invalid, or fitting / prediction fails.
pub fn replay_dataset(config: &ReplayConfig) -> Result<ReplayReport> {
    let raw = fs::read_to_string(&config.dataset)
        .with_context(|| format!("failed to open dataset at {}", config.dataset.display()))?;
    let dataset: ReplayDataset = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse dataset at {}", config.dataset.display()))?;

    let settings = HierarchyConfig::from_env().context("failed to load hierarchy configuration")?;
    let mut classifier = HierarchicalClassifier::from_config(settings.centroid_estimator(), &settings);
    if let Some(class_hierarchy) = dataset.hierarchy() {
        classifier = classifier.with_class_hierarchy(class_hierarchy);
    }

    let (x_train, y_train) = to_matrix(&dataset.train).context("invalid train split")?;
    classifier
        .fit(x_train.view(), &y_train)
        .context("failed to fit hierarchical classifier")?;
    let classes = classifier.classes_()?.to_vec();

    if dataset.test.is_empty() {
        tracing::warn!("dataset has no test split; reporting training fit only");
        return Ok(ReplayReport::new(
            y_train.len(),
            classes,
            HierarchicalMetrics::default(),
            Vec::new(),
        ));
    }

    let (x_test, y_test) = to_matrix(&dataset.test).context("invalid test split")?;
    let predictions = classifier
        .predict(x_test.view())
        .context("failed to predict test split")?;
    let metrics = hierarchical_metrics(classifier.graph_()?, &y_test, &predictions, config.beta)
        .context("failed to score predictions")?;

    tracing::info!(
        train_rows = y_train.len(),
        test_rows = y_test.len(),
        accuracy = metrics.accuracy,
        h_fbeta = metrics.h_fbeta,
        "replay completed"
    );

    let predictions = if config.show_predictions {
        predictions
    } else {
        Vec::new()
    };
    Ok(ReplayReport::new(y_train.len(), classes, metrics, predictions))
}

fn to_matrix(records: &[ReplayRecord]) -> Result<(Array2<f64>, Vec<String>)> {
    let Some(first) = records.first() else {
        bail!("split is empty");
    };
    let dims = first.features.len();
    let mut values = Vec::with_capacity(records.len() * dims);
    let mut labels = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        if record.features.len() != dims {
            bail!(
                "record {} has {} features, expected {}",
                idx + 1,
                record.features.len(),
                dims
            );
        }
        values.extend_from_slice(&record.features);
        labels.push(String::from(record.label.clone()));
    }

    let x = Array2::from_shape_vec((records.len(), dims), values)
        .context("failed to assemble feature matrix")?;
    Ok((x, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ENV_KEYS: [&str; 6] = [
        "HIER_CONFIG",
        "HIER_ALGORITHM",
        "HIER_TRAINING_STRATEGY",
        "HIER_PREDICTION_DEPTH",
        "HIER_STOPPING_CRITERIA",
        "HIER_CENTROID_TEMPERATURE",
    ];

    fn write_dataset(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write dataset");
        file
    }

    #[test]
    fn replays_small_dataset() {
        let file = write_dataset(
            r#"{
  "class_hierarchy": {"<ROOT>": ["A", "B"], "A": ["a1", "a2"], "B": ["b1", "b2"]},
  "train": [
    {"features": [0.0, 0.0], "label": "a1"},
    {"features": [0.2, 0.1], "label": "a1"},
    {"features": [0.0, 3.0], "label": "a2"},
    {"features": [0.1, 3.2], "label": "a2"},
    {"features": [20.0, 0.0], "label": "b1"},
    {"features": [20.1, 0.2], "label": "b1"},
    {"features": [20.0, 3.0], "label": "b2"},
    {"features": [20.2, 3.1], "label": "b2"}
  ],
  "test": [
    {"features": [0.1, 0.1], "label": "a1"},
    {"features": [20.1, 3.0], "label": "b2"}
  ]
}"#,
        );
        let config = ReplayConfig {
            dataset: file.path().to_path_buf(),
            beta: 1.0,
            show_predictions: true,
        };

        let vars: Vec<(&str, Option<&str>)> = ENV_KEYS.iter().map(|key| (*key, None)).collect();
        let report = temp_env::with_vars(vars, || replay_dataset(&config)).expect("replay");

        assert_eq!(report.train_rows, 8);
        assert_eq!(report.test_rows, 2);
        assert_eq!(report.classes, vec!["a1", "a2", "b1", "b2"]);
        assert_eq!(report.predictions, vec!["a1", "b2"]);
        assert!((report.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn integer_labels_are_read_as_strings() {
        let file = write_dataset(
            r#"{
  "class_hierarchy": {"<ROOT>": ["A", "B"], "A": [1, 7], "B": [3, 8]},
  "train": [
    {"features": [0.0, 0.0], "label": 1},
    {"features": [0.1, 0.2], "label": 1},
    {"features": [0.0, 4.0], "label": 7},
    {"features": [0.2, 4.1], "label": 7},
    {"features": [20.0, 0.0], "label": 3},
    {"features": [20.1, 0.1], "label": 3},
    {"features": [20.0, 4.0], "label": 8},
    {"features": [20.2, 4.2], "label": "8"}
  ],
  "test": [
    {"features": [0.1, 3.9], "label": 7},
    {"features": [19.9, 0.1], "label": 3}
  ]
}"#,
        );
        let config = ReplayConfig {
            dataset: file.path().to_path_buf(),
            beta: 1.0,
            show_predictions: true,
        };

        let vars: Vec<(&str, Option<&str>)> = ENV_KEYS.iter().map(|key| (*key, None)).collect();
        let report = temp_env::with_vars(vars, || replay_dataset(&config)).expect("replay");

        assert_eq!(report.classes, vec!["1", "3", "7", "8"]);
        assert_eq!(report.predictions, vec!["7", "3"]);
    }

    #[test]
    fn ragged_features_are_rejected() {
        let file = write_dataset(
            r#"{"train": [{"features": [0.0, 1.0], "label": "a"}, {"features": [1.0], "label": "b"}]}"#,
        );
        let config = ReplayConfig {
            dataset: file.path().to_path_buf(),
            beta: 1.0,
            show_predictions: false,
        };

        let vars: Vec<(&str, Option<&str>)> = ENV_KEYS.iter().map(|key| (*key, None)).collect();
        let error = temp_env::with_vars(vars, || replay_dataset(&config)).expect_err("ragged");
        assert!(format!("{error:#}").contains("record 2 has 1 features"));
    }
}
