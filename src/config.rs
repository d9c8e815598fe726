//! Analysis configuration with documented defaults, optionally loaded from TOML

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AnalyticsError, Result};

/// Top-level configuration for every analysis component
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub segmentation: SegmentationConfig,
    pub churn: ChurnConfig,
    pub emotion: EmotionConfig,
}

/// Clustering parameters shared by the primary segmentation and comparison mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Number of tiers to cluster into
    pub n_clusters: usize,
    /// Independent k-means initializations; the lowest-inertia run wins
    pub kmeans_runs: usize,
    pub max_iterations: u64,
    pub tolerance: f64,
    pub random_seed: u64,
    /// DBSCAN neighbourhood radius in standardized units
    pub dbscan_eps: f64,
    /// DBSCAN core-point threshold, the point itself included
    pub dbscan_min_samples: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            kmeans_runs: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            random_seed: 42,
            dbscan_eps: 0.5,
            dbscan_min_samples: 5,
        }
    }
}

/// Churn label rule, risk bands and ensemble hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChurnConfig {
    pub inactive_days: f64,
    pub declining_trend: f64,
    pub high_risk_threshold: f64,
    pub medium_risk_threshold: f64,
    pub min_churned: usize,
    pub n_trees: usize,
    pub max_depth: usize,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub random_seed: u64,
    /// How many high-risk listeners to list individually
    pub top_listeners: usize,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            inactive_days: 30.0,
            declining_trend: -0.2,
            high_risk_threshold: 0.7,
            medium_risk_threshold: 0.4,
            min_churned: 5,
            n_trees: 100,
            max_depth: 10,
            test_fraction: 0.2,
            cv_folds: 5,
            random_seed: 42,
            top_listeners: 10,
        }
    }
}

/// Labels of the distilroberta emotion checkpoint; `disgust` and `neutral` count as neutral mass
pub const DEFAULT_MODEL_LABELS: [&str; 7] = [
    "anger", "disgust", "fear", "joy", "neutral", "sadness", "surprise",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmotionConfig {
    /// Characters kept from each text item before scoring
    pub max_chars: usize,
    /// JSON lexicon replacing the embedded one
    pub lexicon_path: Option<PathBuf>,
    /// ONNX export of a sequence-classification model; takes precedence over any lexicon
    pub model_path: Option<PathBuf>,
    /// Hugging Face `tokenizer.json`, defaults to the one next to the model
    pub tokenizer_path: Option<PathBuf>,
    /// Model output labels in logit order
    pub model_labels: Vec<String>,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            max_chars: 512,
            lexicon_path: None,
            model_path: None,
            tokenizer_path: None,
            model_labels: DEFAULT_MODEL_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a TOML file; absent keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| AnalyticsError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AnalysisConfig =
            toml::from_str(raw).map_err(|e| AnalyticsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the algorithms cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.segmentation.n_clusters < 2 {
            return Err(AnalyticsError::Config(
                "segmentation.n_clusters must be at least 2".to_string(),
            ));
        }
        if self.segmentation.kmeans_runs == 0 {
            return Err(AnalyticsError::Config(
                "segmentation.kmeans_runs must be positive".to_string(),
            ));
        }
        if self.segmentation.dbscan_min_samples < 2 {
            return Err(AnalyticsError::Config(
                "segmentation.dbscan_min_samples must be at least 2".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.churn.test_fraction) || self.churn.test_fraction == 0.0 {
            return Err(AnalyticsError::Config(
                "churn.test_fraction must be in (0, 1)".to_string(),
            ));
        }
        if self.churn.cv_folds < 2 || self.churn.n_trees == 0 {
            return Err(AnalyticsError::Config(
                "churn.cv_folds must be at least 2 and churn.n_trees positive".to_string(),
            ));
        }
        if self.emotion.model_path.is_some() && self.emotion.model_labels.is_empty() {
            return Err(AnalyticsError::Config(
                "emotion.model_labels cannot be empty when emotion.model_path is set".to_string(),
            ));
        }
        if self.churn.medium_risk_threshold > self.churn.high_risk_threshold {
            return Err(AnalyticsError::Config(
                "churn.medium_risk_threshold cannot exceed churn.high_risk_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = AnalysisConfig::default();
        assert_eq!(config.segmentation.n_clusters, 3);
        assert_eq!(config.segmentation.dbscan_min_samples, 5);
        assert_eq!(config.churn.min_churned, 5);
        assert_eq!(config.churn.high_risk_threshold, 0.7);
        assert_eq!(config.emotion.max_chars, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml_str(
            "[segmentation]\nrandom_seed = 7\n\n[churn]\nn_trees = 25\n",
        )
        .unwrap();
        assert_eq!(config.segmentation.random_seed, 7);
        assert_eq!(config.segmentation.n_clusters, 3);
        assert_eq!(config.churn.n_trees, 25);
        assert_eq!(config.churn.cv_folds, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AnalysisConfig::from_toml_str("[segmentation]\nn_clusters = 1\n").is_err());
        assert!(AnalysisConfig::from_toml_str("[churn]\ntest_fraction = 1.5\n").is_err());
        assert!(AnalysisConfig::from_toml_str("not toml at all [").is_err());
    }

    #[test]
    fn test_emotion_model_section() {
        let config = AnalysisConfig::from_toml_str(
            "[emotion]\nmodel_path = \"models/emotion.onnx\"\n",
        )
        .unwrap();
        assert_eq!(config.emotion.model_labels.len(), 7);
        assert!(config.emotion.tokenizer_path.is_none());

        let err = AnalysisConfig::from_toml_str(
            "[emotion]\nmodel_path = \"m.onnx\"\nmodel_labels = []\n",
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[emotion]\nmax_chars = 128").unwrap();
        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.emotion.max_chars, 128);
    }
}
