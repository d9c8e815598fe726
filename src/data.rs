//! Input records, the per-batch standard scaler and dataset loading

use chrono::{DateTime, NaiveDate, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AnalyticsError, Result};
use crate::recommendations::Recommendation;

/// One listener's aggregate interaction counters for a single artist.
///
/// Missing numeric fields deserialize to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerRecord {
    pub listener_id: String,
    pub artist_id: String,
    pub total_streams: f64,
    pub saves: f64,
    pub shares: f64,
    #[serde(alias = "completion_rate")]
    pub avg_completion_rate: f64,
    pub skip_rate: f64,
    #[serde(alias = "listening_sessions")]
    pub session_count: f64,
    /// Seconds
    pub avg_session_duration: f64,
}

/// A single streaming-history entry, the raw material for churn features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub listener_id: String,
    #[serde(default)]
    pub artist_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub streams: f64,
    #[serde(default)]
    pub skip_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    #[default]
    Comment,
    Review,
    ProgressNote,
    RecommendationFeedback,
    Milestone,
}

/// Free text left by listeners (comments, reviews) or by the artist (notes, feedback)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextItem {
    pub artist_id: String,
    #[serde(alias = "comment_text")]
    pub text: String,
    pub source: TextSource,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TextItem {
    pub fn new(artist_id: impl Into<String>, text: impl Into<String>, source: TextSource) -> Self {
        Self {
            artist_id: artist_id.into(),
            text: text.into(),
            source,
            timestamp: None,
        }
    }
}

/// Aggregate metrics recorded in a tracking snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotMetrics {
    pub followers: u64,
    pub streams: u64,
    /// Fraction, 0.10 means 10%
    pub engagement_rate: f64,
}

/// One dated record of an artist's aggregate metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub artist_id: String,
    #[serde(alias = "tracking_date")]
    pub date: NaiveDate,
    pub metrics: SnapshotMetrics,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub milestones_hit: Vec<String>,
    #[serde(default)]
    pub progress_score: f64,
    #[serde(default)]
    pub recommendations_followed: Vec<String>,
}

/// An established artist, used as a mentor pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artist {
    pub artist_id: String,
    pub artist_name: String,
    pub genre: String,
    pub location: String,
    pub total_followers: u64,
}

/// Growth targets, replaced wholesale on update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalState {
    pub target_followers: u64,
    pub target_monthly_streams: u64,
    pub timeline_months: u32,
}

impl Default for GoalState {
    fn default() -> Self {
        Self {
            target_followers: 5000,
            target_monthly_streams: 10000,
            timeline_months: 12,
        }
    }
}

/// Partial goal update; omitted fields fall back to [`GoalState::default`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalUpdate {
    pub target_followers: Option<u64>,
    pub target_monthly_streams: Option<u64>,
    pub timeline_months: Option<u32>,
}

impl From<GoalUpdate> for GoalState {
    fn from(update: GoalUpdate) -> Self {
        let defaults = GoalState::default();
        GoalState {
            target_followers: update.target_followers.unwrap_or(defaults.target_followers),
            target_monthly_streams: update
                .target_monthly_streams
                .unwrap_or(defaults.target_monthly_streams),
            timeline_months: update.timeline_months.unwrap_or(defaults.timeline_months),
        }
    }
}

/// Metrics an artist reports when joining the growth program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingMetrics {
    pub platforms: Vec<String>,
    pub followers: u64,
    pub monthly_streams: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtistStatus {
    #[default]
    Onboarding,
    Active,
    Paused,
}

/// An emerging artist enrolled in growth tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtist {
    pub artist_id: String,
    pub artist_name: String,
    #[serde(default)]
    pub email: String,
    pub genre: String,
    #[serde(default)]
    pub location: String,
    pub onboarding_date: DateTime<Utc>,
    #[serde(default)]
    pub current_metrics: OnboardingMetrics,
    #[serde(default)]
    pub goals: GoalState,
    #[serde(default)]
    pub status: ArtistStatus,
    #[serde(default)]
    pub mentor_match: Option<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl NewArtist {
    pub fn days_active(&self, now: DateTime<Utc>) -> i64 {
        (now - self.onboarding_date).num_days().max(0)
    }
}

/// Everything the document store holds, as one JSON document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub listeners: Vec<ListenerRecord>,
    pub activity: Vec<ActivityEvent>,
    pub comments: Vec<TextItem>,
    pub snapshots: Vec<TrackingSnapshot>,
    pub artists: Vec<Artist>,
    pub new_artists: Vec<NewArtist>,
    pub recommendations: Vec<Recommendation>,
}

impl Dataset {
    /// Load a dataset from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let dataset: Dataset = serde_json::from_str(&raw)?;
        tracing::debug!(
            listeners = dataset.listeners.len(),
            comments = dataset.comments.len(),
            snapshots = dataset.snapshots.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }
}

/// Per-column standardization to zero mean and unit variance.
///
/// Fitted on the current batch only and never persisted. Constant columns
/// keep a unit scale so they map to zero instead of NaN.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Self {
        let n_features = data.ncols();
        if data.nrows() == 0 {
            return Self {
                mean: Array1::zeros(n_features),
                scale: Array1::ones(n_features),
            };
        }

        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        // Population standard deviation (ddof = 0)
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });

        Self { mean, scale }
    }

    pub fn transform(&self, data: Array2<f64>) -> Array2<f64> {
        (data - &self.mean) / &self.scale
    }

    pub fn fit_transform(data: Array2<f64>) -> (Self, Array2<f64>) {
        let scaler = Self::fit(&data);
        let scaled = scaler.transform(data);
        (scaler, scaled)
    }
}

/// Validate an identifier handed in by the boundary
pub fn validate_identifier(id: &str) -> Result<&str> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(AnalyticsError::InvalidIdentifier(id.to_string()))
    }
}
