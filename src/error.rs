//! Error types shared by every analysis component

use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Tagged failures surfaced by the analytics core and its boundary.
///
/// Degenerate clustering is not an error: it is reported through
/// [`crate::metrics::QualityMetrics::InsufficientClusters`] and never fails a call.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// The input batch had no usable rows
    #[error("No data available: {0}")]
    InputDataEmpty(String),

    /// Too few churned listeners to fit a classifier
    #[error(
        "Insufficient churn data: only {churned} churned listeners out of {total} ({churn_rate}). Need at least {required} for training"
    )]
    InsufficientTrainingData {
        churned: usize,
        total: usize,
        required: usize,
        churn_rate: String,
    },

    /// Churn prediction requested for an artist without a trained model
    #[error("Churn model not trained for artist {0}. Train the model first")]
    ModelNotTrained(String),

    /// The emotion classifier could not be initialized
    #[error("Emotion model not loaded: {0}")]
    ModelNotLoaded(String),

    /// A loaded model failed on one input
    #[error("Inference error: {0}")]
    Inference(String),

    /// Malformed artist or recommendation identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Identifier is well-formed but unknown to the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Clustering backend rejected the input
    #[error("Clustering error: {0}")]
    Clustering(String),

    /// Classifier backend rejected the input
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalyticsError {
    /// Short machine-readable tag, used when a sub-analysis is reported as unavailable
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyticsError::InputDataEmpty(_) => "input_data_empty",
            AnalyticsError::InsufficientTrainingData { .. } => "insufficient_training_data",
            AnalyticsError::ModelNotTrained(_) => "model_not_trained",
            AnalyticsError::ModelNotLoaded(_) => "model_not_loaded",
            AnalyticsError::Inference(_) => "inference",
            AnalyticsError::InvalidIdentifier(_) => "invalid_identifier",
            AnalyticsError::NotFound(_) => "not_found",
            AnalyticsError::Clustering(_) => "clustering",
            AnalyticsError::Training(_) => "training",
            AnalyticsError::Config(_) => "config",
            AnalyticsError::Io(_) => "io",
            AnalyticsError::Serialization(_) => "serialization",
        }
    }
}
