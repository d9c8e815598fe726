//! fanpulse: audience-growth analytics for independent musicians
//!
//! Segments listeners into superfans, casual and one-time listeners with
//! k-means, compares that segmentation against alternative clustering
//! algorithms, trains per-artist churn-risk models, scores sentiment and
//! emotion in listener and artist text, and tracks growth toward goals.

pub mod churn;
pub mod cli;
pub mod comparison;
pub mod config;
pub mod data;
pub mod emotion;
pub mod emotion_model;
pub mod error;
pub mod features;
pub mod forest;
pub mod growth;
pub mod metrics;
pub mod outcome;
pub mod pipeline;
pub mod recommendations;
pub mod report;
pub mod segmentation;
pub mod sentiment;
pub mod service;
pub mod store;

// Re-export public items for easier access
pub use cli::{Args, Command, OutputFormat};
pub use config::AnalysisConfig;
pub use data::{Dataset, ListenerRecord, NewArtist, TextItem, TrackingSnapshot};
pub use error::{AnalyticsError, Result};
pub use outcome::AnalysisOutcome;
pub use pipeline::AnalyticsContext;
pub use segmentation::{Segment, SegmentationEngine};
pub use service::AnalyticsService;
pub use store::{AudienceStore, InMemoryStore};
