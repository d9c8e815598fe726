//! Request-level operations: validate the identifier, fetch from the store,
//! run the analysis and persist what it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::churn::{PredictionReport, TrainingReport};
use crate::comparison::ComparisonResult;
use crate::data::{
    validate_identifier, ArtistStatus, GoalState, GoalUpdate, NewArtist, OnboardingMetrics,
    SnapshotMetrics, TrackingSnapshot,
};
use crate::emotion::{EmotionAnalysis, MethodologyComparison};
use crate::error::{AnalyticsError, Result};
use crate::growth::{
    self, GoalProgress, GrowthHistory, GrowthRate, MentorComparison, Milestone, TimelineEvent,
};
use crate::pipeline::{
    AnalyticsContext, ArtistAnalysis, AudienceSegments, EmotionalJourney, FullAnalysis,
    GrowthIntelligence, RetentionReport,
};
use crate::recommendations::{self, Recommendation, RecommendationStatus, StatusUpdate};
use crate::store::AudienceStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingRequest {
    pub artist_name: String,
    pub email: String,
    pub genre: String,
    pub location: String,
    pub current_metrics: OnboardingMetrics,
    pub goals: GoalUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingResult {
    pub artist_id: String,
    pub mentor_match: Option<String>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressUpdate {
    pub metrics: SnapshotMetrics,
    pub notes: Option<String>,
    pub recommendations_followed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResult {
    pub progress_score: f64,
    pub milestones_hit: Vec<Milestone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub artist: NewArtist,
    /// Newest first
    pub tracking_history: Vec<TrackingSnapshot>,
    pub pending_recommendations: Vec<Recommendation>,
    pub progress_to_goals: GoalProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistProfile {
    pub artist: NewArtist,
    pub current_metrics: Option<SnapshotMetrics>,
    pub growth_rate: GrowthRate,
    pub days_to_goal: Option<i64>,
    pub mentor_comparison: Option<MentorComparison>,
    pub days_since_onboarding: i64,
    pub status: ArtistStatus,
}

/// Entry point for every artist-facing operation
#[derive(Debug)]
pub struct AnalyticsService<S> {
    store: S,
    context: AnalyticsContext,
}

impl<S: AudienceStore> AnalyticsService<S> {
    pub fn new(store: S, context: AnalyticsContext) -> Self {
        Self { store, context }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn context(&self) -> &AnalyticsContext {
        &self.context
    }

    fn require_new_artist(&self, artist_id: &str) -> Result<NewArtist> {
        validate_identifier(artist_id)?;
        self.store
            .new_artist(artist_id)?
            .ok_or_else(|| AnalyticsError::NotFound(format!("artist {}", artist_id)))
    }

    pub fn analyze(&self, artist_id: &str, now: DateTime<Utc>) -> Result<ArtistAnalysis> {
        validate_identifier(artist_id)?;
        let listeners = self.store.listeners(artist_id)?;
        if listeners.is_empty() {
            return Err(AnalyticsError::NotFound(format!(
                "No listeners found for artist {}",
                artist_id
            )));
        }
        let comments = self.store.comments(artist_id)?;
        self.context
            .perform_analysis(artist_id, &listeners, &comments, now)
    }

    pub fn compare_clustering(&self, artist_id: &str) -> Result<ComparisonResult> {
        validate_identifier(artist_id)?;
        let listeners = self.store.listeners(artist_id)?;
        self.context.compare_clustering(&listeners)
    }

    pub fn train_churn(&self, artist_id: &str, now: DateTime<Utc>) -> Result<TrainingReport> {
        validate_identifier(artist_id)?;
        let listeners = self.store.listeners(artist_id)?;
        let activity = self.store.activity(artist_id)?;
        self.context.train_churn(artist_id, &listeners, &activity, now)
    }

    pub fn predict_churn(&self, artist_id: &str, now: DateTime<Utc>) -> Result<PredictionReport> {
        validate_identifier(artist_id)?;
        let listeners = self.store.listeners(artist_id)?;
        let activity = self.store.activity(artist_id)?;
        self.context
            .predict_churn(artist_id, &listeners, &activity, now)
    }

    pub fn emotions(&self, artist_id: &str) -> Result<EmotionAnalysis> {
        validate_identifier(artist_id)?;
        let comments = self.store.comments(artist_id)?;
        self.context.analyze_emotions(&comments)
    }

    pub fn emotion_comparison(&self, artist_id: &str) -> Result<MethodologyComparison> {
        validate_identifier(artist_id)?;
        let comments = self.store.comments(artist_id)?;
        self.context.compare_emotion_methods(&comments)
    }

    pub fn full_analysis(&self, artist_id: &str, now: DateTime<Utc>) -> Result<FullAnalysis> {
        validate_identifier(artist_id)?;
        let listeners = self.store.listeners(artist_id)?;
        let activity = self.store.activity(artist_id)?;
        let comments = self.store.comments(artist_id)?;
        Ok(self
            .context
            .full_analysis(artist_id, &listeners, &activity, &comments, now))
    }

    pub fn audience_segments(
        &self,
        artist_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AudienceSegments> {
        let artist = self.require_new_artist(artist_id)?;
        let snapshots = self.store.snapshots(artist_id)?;
        self.context.audience_segments(&artist, &snapshots, now)
    }

    pub fn supporter_retention(
        &self,
        artist_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport> {
        let artist = self.require_new_artist(artist_id)?;
        let snapshots = self.store.snapshots(artist_id)?;
        self.context.supporter_retention(&artist, &snapshots, now)
    }

    pub fn emotional_journey(
        &self,
        artist_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EmotionalJourney> {
        let artist = self.require_new_artist(artist_id)?;
        let snapshots = self.store.snapshots(artist_id)?;
        let recs = self.store.recommendations(artist_id)?;
        self.context
            .emotional_journey(&artist, &snapshots, &recs, now)
    }

    pub fn growth_intelligence(
        &self,
        artist_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GrowthIntelligence> {
        let artist = self.require_new_artist(artist_id)?;
        let snapshots = self.store.snapshots(artist_id)?;
        let recs = self.store.recommendations(artist_id)?;
        Ok(self
            .context
            .growth_intelligence(&artist, &snapshots, &recs, now))
    }

    /// Register a new artist, match a mentor and issue the starter recommendations
    pub fn onboard(
        &self,
        request: OnboardingRequest,
        now: DateTime<Utc>,
    ) -> Result<OnboardingResult> {
        let artists = self.store.artists()?;
        let mentor_match = growth::find_mentor_match(&artists, &request.genre, &request.location)
            .map(|mentor| mentor.artist_id.clone());

        let artist = NewArtist {
            artist_id: Uuid::new_v4().simple().to_string(),
            artist_name: request.artist_name,
            email: request.email,
            genre: request.genre,
            location: request.location,
            onboarding_date: now,
            current_metrics: request.current_metrics,
            goals: request.goals.into(),
            status: ArtistStatus::Onboarding,
            mentor_match: mentor_match.clone(),
            last_updated: None,
        };

        let recs = recommendations::onboarding_recommendations(&artist, now);
        for rec in &recs {
            self.store.save_recommendation(rec.clone())?;
        }
        let artist_id = artist.artist_id.clone();
        self.store.insert_new_artist(artist)?;

        tracing::info!(
            %artist_id,
            mentor = ?mentor_match,
            recommendations = recs.len(),
            "artist onboarded"
        );
        Ok(OnboardingResult {
            artist_id,
            mentor_match,
            recommendations: recs,
        })
    }

    /// Record a snapshot, scoring it against the goals and the previous snapshot
    pub fn track_progress(
        &self,
        artist_id: &str,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<ProgressResult> {
        validate_identifier(artist_id)?;
        let artist = self.store.new_artist(artist_id)?;
        let previous = self.store.snapshots(artist_id)?.pop();

        let milestones = growth::detect_milestones(
            previous.as_ref().map(|s| &s.metrics),
            &update.metrics,
        );
        let progress_score =
            growth::progress_score(artist.as_ref().map(|a| &a.goals), &update.metrics);

        self.store.insert_snapshot(TrackingSnapshot {
            artist_id: artist_id.to_string(),
            date: now.date_naive(),
            metrics: update.metrics,
            notes: update.notes,
            milestones_hit: milestones.iter().map(|m| m.description.clone()).collect(),
            progress_score,
            recommendations_followed: update.recommendations_followed,
        })?;
        if artist.is_some() {
            self.store.touch(artist_id, now)?;
        }

        tracing::debug!(
            artist_id,
            progress_score,
            milestones = milestones.len(),
            "progress tracked"
        );
        Ok(ProgressResult {
            progress_score,
            milestones_hit: milestones,
        })
    }

    pub fn dashboard(&self, artist_id: &str) -> Result<Dashboard> {
        let artist = self.require_new_artist(artist_id)?;
        let mut tracking_history = self.store.snapshots(artist_id)?;
        tracking_history.reverse();
        let pending_recommendations = self
            .store
            .recommendations(artist_id)?
            .into_iter()
            .filter(|r| r.status == RecommendationStatus::Pending)
            .collect();
        let progress_to_goals = growth::goal_progress(
            &artist.goals,
            tracking_history.first().map(|s| &s.metrics),
        );

        Ok(Dashboard {
            artist,
            tracking_history,
            pending_recommendations,
            progress_to_goals,
        })
    }

    pub fn profile(&self, artist_id: &str, now: DateTime<Utc>) -> Result<ArtistProfile> {
        let artist = self.require_new_artist(artist_id)?;
        let snapshots = self.store.snapshots(artist_id)?;
        let current_metrics = snapshots.last().map(|s| s.metrics);

        let mentor_comparison = match &artist.mentor_match {
            Some(mentor_id) => self
                .store
                .artists()?
                .iter()
                .find(|a| &a.artist_id == mentor_id)
                .map(|mentor| {
                    growth::mentor_comparison(
                        mentor,
                        current_metrics.map(|m| m.followers).unwrap_or(0),
                    )
                }),
            None => None,
        };

        Ok(ArtistProfile {
            current_metrics,
            growth_rate: growth::growth_rate(&snapshots),
            days_to_goal: growth::days_to_goal(&artist.goals, &snapshots),
            mentor_comparison,
            days_since_onboarding: artist.days_active(now),
            status: artist.status,
            artist,
        })
    }

    pub fn growth_history(&self, artist_id: &str) -> Result<GrowthHistory> {
        validate_identifier(artist_id)?;
        let snapshots = self.store.snapshots(artist_id)?;
        Ok(growth::growth_history(&snapshots))
    }

    /// Replace the goals wholesale; omitted fields fall back to the defaults
    pub fn update_goals(
        &self,
        artist_id: &str,
        update: GoalUpdate,
        now: DateTime<Utc>,
    ) -> Result<GoalState> {
        self.require_new_artist(artist_id)?;
        let goals: GoalState = update.into();
        self.store.update_goals(artist_id, goals, now)?;
        Ok(goals)
    }

    pub fn update_recommendation_status(
        &self,
        recommendation_id: &str,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<Recommendation> {
        let id = Uuid::parse_str(recommendation_id)
            .map_err(|_| AnalyticsError::InvalidIdentifier(recommendation_id.to_string()))?;
        let mut rec = self
            .store
            .recommendation(id)?
            .ok_or_else(|| AnalyticsError::NotFound(format!("recommendation {}", id)))?;

        rec.apply(update, now);
        self.store.save_recommendation(rec.clone())?;
        tracing::debug!(%id, status = ?rec.status, "recommendation status updated");
        Ok(rec)
    }

    pub fn timeline(&self, artist_id: &str) -> Result<Vec<TimelineEvent>> {
        let artist = self.require_new_artist(artist_id)?;
        let snapshots = self.store.snapshots(artist_id)?;
        let recs = self.store.recommendations(artist_id)?;
        Ok(growth::timeline(&artist, &snapshots, &recs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::data::{Artist, Dataset};
    use crate::store::InMemoryStore;
    use chrono::Duration;

    fn service() -> AnalyticsService<InMemoryStore> {
        let dataset = Dataset {
            artists: vec![
                Artist {
                    artist_id: "mentor1".into(),
                    artist_name: "Big Star".into(),
                    genre: "indie".into(),
                    location: "Lagos".into(),
                    total_followers: 12000,
                },
                Artist {
                    artist_id: "mentor2".into(),
                    artist_name: "Small Star".into(),
                    genre: "indie".into(),
                    location: "Accra".into(),
                    total_followers: 900,
                },
            ],
            ..Default::default()
        };
        AnalyticsService::new(
            InMemoryStore::from_dataset(dataset),
            AnalyticsContext::new(AnalysisConfig::default()),
        )
    }

    fn request() -> OnboardingRequest {
        OnboardingRequest {
            artist_name: "Rising".into(),
            email: "rising@example.com".into(),
            genre: "indie".into(),
            location: "Lagos".into(),
            current_metrics: OnboardingMetrics {
                platforms: vec!["instagram".into()],
                followers: 40,
                monthly_streams: 200,
            },
            goals: GoalUpdate {
                target_followers: Some(1000),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_onboard_persists_artist_and_recommendations() {
        let svc = service();
        let now = Utc::now();
        let result = svc.onboard(request(), now).unwrap();

        assert_eq!(result.mentor_match.as_deref(), Some("mentor1"));
        assert_eq!(result.recommendations.len(), 3);

        let artist = svc.store().new_artist(&result.artist_id).unwrap().unwrap();
        assert_eq!(artist.goals.target_followers, 1000);
        assert_eq!(artist.goals.target_monthly_streams, 10000);
        assert_eq!(svc.store().recommendations(&result.artist_id).unwrap().len(), 3);
    }

    #[test]
    fn test_track_progress_detects_milestones() {
        let svc = service();
        let now = Utc::now();
        let id = svc.onboard(request(), now).unwrap().artist_id;

        let first = svc
            .track_progress(
                &id,
                ProgressUpdate {
                    metrics: SnapshotMetrics {
                        followers: 90,
                        streams: 900,
                        engagement_rate: 0.05,
                    },
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert!(first.milestones_hit.is_empty());

        let second = svc
            .track_progress(
                &id,
                ProgressUpdate {
                    metrics: SnapshotMetrics {
                        followers: 200,
                        streams: 2000,
                        engagement_rate: 0.05,
                    },
                    notes: Some("crossed 100!".into()),
                    ..Default::default()
                },
                now + Duration::days(7),
            )
            .unwrap();
        assert_eq!(second.milestones_hit.len(), 2);
        // 200/1000 * 0.5 + 2000/10000 * 0.5
        assert!((second.progress_score - 0.2).abs() < 1e-9);

        let history = svc.growth_history(&id).unwrap();
        assert_eq!(history.history.len(), 2);
        assert_eq!(history.milestones.len(), 2);
        assert!(svc.store().new_artist(&id).unwrap().unwrap().last_updated.is_some());
    }

    #[test]
    fn test_update_goals_replaces_wholesale() {
        let svc = service();
        let now = Utc::now();
        let id = svc.onboard(request(), now).unwrap().artist_id;

        let goals = svc
            .update_goals(
                &id,
                GoalUpdate {
                    timeline_months: Some(6),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(goals.target_followers, 5000);
        assert_eq!(goals.timeline_months, 6);
    }

    #[test]
    fn test_recommendation_status_and_timeline() {
        let svc = service();
        let now = Utc::now();
        let result = svc.onboard(request(), now).unwrap();
        let rec_id = result.recommendations[0].id.to_string();

        let later = now + Duration::days(2);
        let rec = svc
            .update_recommendation_status(
                &rec_id,
                StatusUpdate {
                    status: RecommendationStatus::Completed,
                    feedback: Some("Loved doing this".into()),
                    effectiveness_score: Some(4.0),
                },
                later,
            )
            .unwrap();
        assert_eq!(rec.completed_at, Some(later));

        let dashboard = svc.dashboard(&result.artist_id).unwrap();
        assert_eq!(dashboard.pending_recommendations.len(), 2);

        let events = svc.timeline(&result.artist_id).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].description.starts_with("Completed: "));
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let svc = service();
        assert!(matches!(
            svc.dashboard("not valid!"),
            Err(AnalyticsError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            svc.dashboard("unknown"),
            Err(AnalyticsError::NotFound(_))
        ));
        assert!(matches!(
            svc.update_recommendation_status("xyz", StatusUpdate::default(), Utc::now()),
            Err(AnalyticsError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            svc.analyze("a1", Utc::now()),
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[test]
    fn test_profile_mentor_comparison() {
        let svc = service();
        let now = Utc::now();
        let id = svc.onboard(request(), now).unwrap().artist_id;
        let profile = svc.profile(&id, now).unwrap();

        let comparison = profile.mentor_comparison.unwrap();
        assert_eq!(comparison.mentor_name, "Big Star");
        assert_eq!(comparison.your_followers, 0);
        assert!(profile.days_to_goal.is_none());
        assert_eq!(profile.growth_rate, GrowthRate::default());
    }
}
