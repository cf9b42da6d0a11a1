use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::estimator::{DistanceMetric, NearestCentroid};
use crate::hierarchy::{ClassHierarchy, HierarchicalParams, StoppingCriteria};

/// `stopping_criteria` は YAML では数値でも文字列でも書ける。
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StoppingValue {
    Number(f64),
    Text(String),
}

impl From<&StoppingValue> for StoppingCriteria {
    fn from(value: &StoppingValue) -> Self {
        match value {
            StoppingValue::Number(threshold) => Self::Threshold(*threshold),
            StoppingValue::Text(raw) => Self::from_text(raw),
        }
    }
}

/// 階層分類器の実行時設定。値は未検証のまま保持し、`fit` 時に検証する。
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct HierarchyConfig {
    pub algorithm: Option<String>,
    pub training_strategy: Option<String>,
    pub prediction_depth: Option<String>,
    pub stopping_criteria: Option<StoppingValue>,
    pub class_hierarchy: Option<ClassHierarchy>,
    pub centroid_temperature: Option<f64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to read hierarchy config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse hierarchy config at {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl HierarchyConfig {
    /// 環境変数から設定を読み込む。
    ///
    /// `HIER_CONFIG` が YAML ファイルを指していればそれを土台にし、
    /// `HIER_*` の各変数で上書きする。
    ///
    /// # Errors
    /// YAML の読み込み・パース、または数値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("HIER_CONFIG") {
            Ok(raw) if !raw.trim().is_empty() => Self::load_from_path(Path::new(&raw))?,
            _ => Self::default(),
        };

        if let Some(algorithm) = optional_env("HIER_ALGORITHM") {
            config.algorithm = Some(algorithm);
        }
        if let Some(strategy) = optional_env("HIER_TRAINING_STRATEGY") {
            config.training_strategy = Some(strategy);
        }
        if let Some(depth) = optional_env("HIER_PREDICTION_DEPTH") {
            config.prediction_depth = Some(depth);
        }
        if let Some(criteria) = optional_env("HIER_STOPPING_CRITERIA") {
            config.stopping_criteria = Some(StoppingValue::Text(criteria));
        }
        if let Some(temperature) = parse_optional_f64("HIER_CENTROID_TEMPERATURE")? {
            config.centroid_temperature = Some(temperature);
        }

        Ok(config)
    }

    /// YAML ファイルから設定を読み込む。
    ///
    /// # Errors
    /// 読み込みまたはパースに失敗した場合。
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 未検証のパラメータに変換する。未指定の項目は既定値。
    #[must_use]
    pub fn params(&self) -> HierarchicalParams {
        let defaults = HierarchicalParams::default();
        HierarchicalParams {
            algorithm: self.algorithm.clone().unwrap_or(defaults.algorithm),
            training_strategy: self.training_strategy.clone(),
            prediction_depth: self
                .prediction_depth
                .clone()
                .unwrap_or(defaults.prediction_depth),
            stopping_criteria: self.stopping_criteria.as_ref().map(StoppingCriteria::from),
        }
    }

    /// 同梱のベース学習器（Nearest Centroid）を設定から作る。
    #[must_use]
    pub fn centroid_estimator(&self) -> NearestCentroid {
        NearestCentroid::new(
            DistanceMetric::Euclidean,
            self.centroid_temperature.unwrap_or(1.0),
        )
    }
}

fn optional_env(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_optional_f64(name: &'static str) -> Result<Option<f64>, ConfigError> {
    optional_env(name)
        .map(|raw| {
            raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
                name,
                source: anyhow::Error::new(error),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::ROOT;
    use std::io::Write;

    const ENV_KEYS: [&str; 6] = [
        "HIER_CONFIG",
        "HIER_ALGORITHM",
        "HIER_TRAINING_STRATEGY",
        "HIER_PREDICTION_DEPTH",
        "HIER_STOPPING_CRITERIA",
        "HIER_CENTROID_TEMPERATURE",
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        ENV_KEYS.iter().map(|key| (*key, None)).collect()
    }

    #[test]
    fn from_env_uses_defaults_when_unset() {
        temp_env::with_vars(cleared(), || {
            let config = HierarchyConfig::from_env().expect("config should load");
            assert_eq!(config, HierarchyConfig::default());

            let params = config.params();
            assert_eq!(params.algorithm, "lcpn");
            assert_eq!(params.prediction_depth, "mlnp");
            assert!(params.training_strategy.is_none());
            assert!(params.stopping_criteria.is_none());
        });
    }

    #[test]
    fn from_env_overrides_values() {
        let mut vars = cleared();
        vars.retain(|(key, _)| *key == "HIER_CONFIG");
        vars.extend([
            ("HIER_ALGORITHM", Some("lcpn")),
            ("HIER_TRAINING_STRATEGY", Some("siblings")),
            ("HIER_PREDICTION_DEPTH", Some("nmlnp")),
            ("HIER_STOPPING_CRITERIA", Some("0.75")),
            ("HIER_CENTROID_TEMPERATURE", Some("2.5")),
        ]);
        temp_env::with_vars(vars, || {
            let config = HierarchyConfig::from_env().expect("config should load");
            let validated = config.params().validate().expect("valid params");

            assert_eq!(config.training_strategy.as_deref(), Some("siblings"));
            assert!(matches!(
                validated.stopping_criteria,
                Some(StoppingCriteria::Threshold(t)) if (t - 0.75).abs() < f64::EPSILON
            ));
            assert!((config.centroid_estimator().temperature() - 2.5).abs() < f64::EPSILON);
        });
    }

    #[test]
    fn from_env_rejects_bad_temperature() {
        let mut vars = cleared();
        vars.retain(|(key, _)| *key != "HIER_CENTROID_TEMPERATURE");
        vars.push(("HIER_CENTROID_TEMPERATURE", Some("warm")));
        temp_env::with_vars(vars, || {
            let error = HierarchyConfig::from_env().expect_err("must fail");
            assert!(matches!(
                error,
                ConfigError::Invalid {
                    name: "HIER_CENTROID_TEMPERATURE",
                    ..
                }
            ));
        });
    }

    #[test]
    fn yaml_file_provides_hierarchy_and_env_overrides_it() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            r#"
algorithm: lcpn
prediction_depth: nmlnp
stopping_criteria: 0.9
class_hierarchy:
  "{ROOT}": ["A", "B"]
  "A": ["1", "7"]
  "B": ["3", "8", "9"]
"#
        )
        .expect("write yaml");
        let path = file.path().to_string_lossy().to_string();

        let mut vars: Vec<(&str, Option<&str>)> = cleared();
        vars.retain(|(key, _)| *key != "HIER_CONFIG" && *key != "HIER_ALGORITHM");
        vars.push(("HIER_CONFIG", Some(path.as_str())));
        vars.push(("HIER_ALGORITHM", Some("lcn")));

        temp_env::with_vars(vars, || {
            let config = HierarchyConfig::from_env().expect("config should load");

            assert_eq!(config.algorithm.as_deref(), Some("lcn"));
            assert_eq!(config.stopping_criteria, Some(StoppingValue::Number(0.9)));
            let hierarchy = config.class_hierarchy.expect("hierarchy");
            assert_eq!(hierarchy["B"], vec!["3", "8", "9"]);
            assert_eq!(hierarchy[ROOT], vec!["A", "B"]);
        });
    }

    #[test]
    fn missing_yaml_file_is_io_error() {
        let error = HierarchyConfig::load_from_path(Path::new("/nonexistent/hierarchy.yaml"))
            .expect_err("must fail");
        assert!(matches!(error, ConfigError::Io { .. }));
    }

    #[test]
    fn unparsable_stopping_text_fails_validation() {
        let config = HierarchyConfig {
            prediction_depth: Some("nmlnp".into()),
            stopping_criteria: Some(StoppingValue::Text("sometimes".into())),
            ..HierarchyConfig::default()
        };
        assert!(config.params().validate().expect_err("invalid").is_configuration());
    }
}
