//! Combined reports: the per-artist analysis, the full advanced analysis and
//! growth intelligence for new artists.
//!
//! Every sub-analysis of a combined report is an [`AnalysisOutcome`]: one
//! failing section is marked unavailable and the rest still run.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::churn::{build_churn_rows, ChurnModelRegistry, PredictionReport, TrainingReport};
use crate::comparison::{ClusteringComparison, ComparisonResult};
use crate::config::AnalysisConfig;
use crate::data::{
    ActivityEvent, ArtistStatus, GoalState, ListenerRecord, NewArtist, TextItem, TextSource,
    TrackingSnapshot,
};
use crate::emotion::{
    journey_insights, EmotionAnalysis, EmotionScorer, JourneyInsights, MethodologyComparison,
};
use crate::error::{AnalyticsError, Result};
use crate::growth::{self, GrowthStage, SupporterRetention};
use crate::outcome::AnalysisOutcome;
use crate::recommendations::{self, Recommendation, RecommendationStatus};
use crate::segmentation::{Segment, SegmentationEngine, SegmentationResult};
use crate::sentiment::{SentimentScorer, SentimentSummary};

/// Shared state for every analysis request.
///
/// The emotion classifier is loaded once and shared read-only; churn fits
/// live in the registry keyed by artist.
#[derive(Debug)]
pub struct AnalyticsContext {
    config: AnalysisConfig,
    sentiment: SentimentScorer,
    emotion: Arc<EmotionScorer>,
    churn: ChurnModelRegistry,
}

/// Output of the main per-artist analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistAnalysis {
    pub artist_id: String,
    pub segmentation: SegmentationResult,
    pub sentiment: SentimentSummary,
    pub recommendations: Vec<Recommendation>,
    pub key_insights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullAnalysis {
    pub artist_id: String,
    pub generated_at: DateTime<Utc>,
    pub clustering: AnalysisOutcome<ComparisonResult>,
    pub emotions: AnalysisOutcome<EmotionAnalysis>,
    pub churn: AnalysisOutcome<PredictionReport>,
}

/// What the growth reports need to know about a new artist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistContext {
    pub artist_id: String,
    pub artist_name: String,
    pub genre: String,
    pub location: String,
    pub days_active: i64,
    pub stage: GrowthStage,
    pub status: ArtistStatus,
    pub goals: GoalState,
}

impl ArtistContext {
    pub fn new(artist: &NewArtist, now: DateTime<Utc>) -> Self {
        let days_active = artist.days_active(now);
        Self {
            artist_id: artist.artist_id.clone(),
            artist_name: artist.artist_name.clone(),
            genre: artist.genre.clone(),
            location: artist.location.clone(),
            days_active,
            stage: GrowthStage::from_days_active(days_active),
            status: artist.status,
            goals: artist.goals,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudienceSegments {
    pub comparison: ComparisonResult,
    pub stage: GrowthStage,
    /// Tier with the most estimated listeners
    pub primary_segment: Segment,
    pub superfan_ratio: f64,
    pub recommendation: String,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionReport {
    pub retention: SupporterRetention,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionalJourney {
    pub analysis: EmotionAnalysis,
    pub journey: JourneyInsights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedInsightKind {
    Combined,
    Motivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedInsight {
    pub kind: UnifiedInsightKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthIntelligence {
    pub artist_context: ArtistContext,
    pub generated_at: DateTime<Utc>,
    pub audience_segments: AnalysisOutcome<AudienceSegments>,
    pub retention: AnalysisOutcome<RetentionReport>,
    pub emotions: AnalysisOutcome<EmotionalJourney>,
    pub unified_insights: Vec<UnifiedInsight>,
}

const SEGMENT_NEXT_STEPS: [&str; 3] = [
    "Focus on converting casual listeners to superfans",
    "Create exclusive content for early supporters",
    "Track which segment grows fastest",
];

impl AnalyticsContext {
    pub fn new(config: AnalysisConfig) -> Self {
        let emotion = EmotionScorer::from_config(&config.emotion);
        Self::with_emotion_scorer(config, emotion)
    }

    pub fn with_emotion_scorer(config: AnalysisConfig, emotion: EmotionScorer) -> Self {
        Self {
            config,
            sentiment: SentimentScorer::new(),
            emotion: Arc::new(emotion),
            churn: ChurnModelRegistry::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn emotion(&self) -> &Arc<EmotionScorer> {
        &self.emotion
    }

    pub fn churn(&self) -> &ChurnModelRegistry {
        &self.churn
    }

    /// Segment listeners, score comment sentiment and derive recommendations
    pub fn perform_analysis(
        &self,
        artist_id: &str,
        listeners: &[ListenerRecord],
        comments: &[TextItem],
        now: DateTime<Utc>,
    ) -> Result<ArtistAnalysis> {
        if listeners.is_empty() {
            return Err(AnalyticsError::InputDataEmpty(
                "No listeners provided for analysis".to_string(),
            ));
        }

        let segmentation =
            SegmentationEngine::new(self.config.segmentation.clone()).segment(listeners)?;
        let sentiment = self
            .sentiment
            .summarize(comments.iter().map(|c| c.text.as_str()));
        let recommendations = recommendations::analysis_recommendations(
            artist_id,
            &segmentation.segment_counts,
            &sentiment,
            now,
        );
        let key_insights = segmentation.insights.lines();

        tracing::info!(
            artist_id,
            listeners = listeners.len(),
            comments = sentiment.total_analyzed,
            recommendations = recommendations.len(),
            "artist analysis complete"
        );

        Ok(ArtistAnalysis {
            artist_id: artist_id.to_string(),
            segmentation,
            sentiment,
            recommendations,
            key_insights,
        })
    }

    pub fn compare_clustering(&self, listeners: &[ListenerRecord]) -> Result<ComparisonResult> {
        ClusteringComparison::new(self.config.segmentation.clone()).compare(listeners)
    }

    pub fn train_churn(
        &self,
        artist_id: &str,
        listeners: &[ListenerRecord],
        activity: &[ActivityEvent],
        now: DateTime<Utc>,
    ) -> Result<TrainingReport> {
        let rows = build_churn_rows(listeners, activity, now);
        self.churn.train(artist_id, &rows, &self.config.churn)
    }

    pub fn predict_churn(
        &self,
        artist_id: &str,
        listeners: &[ListenerRecord],
        activity: &[ActivityEvent],
        now: DateTime<Utc>,
    ) -> Result<PredictionReport> {
        let rows = build_churn_rows(listeners, activity, now);
        self.churn.predict(artist_id, &rows)
    }

    pub fn analyze_emotions(&self, comments: &[TextItem]) -> Result<EmotionAnalysis> {
        self.emotion.analyze(comments.iter().map(|c| c.text.as_str()))
    }

    pub fn compare_emotion_methods(&self, comments: &[TextItem]) -> Result<MethodologyComparison> {
        self.emotion
            .compare_methods(comments.iter().map(|c| c.text.as_str()))
    }

    /// Clustering comparison, emotions and churn risk in one report.
    ///
    /// Churn is only predicted from an earlier training call; until then the
    /// section reports the model as not trained.
    pub fn full_analysis(
        &self,
        artist_id: &str,
        listeners: &[ListenerRecord],
        activity: &[ActivityEvent],
        comments: &[TextItem],
        now: DateTime<Utc>,
    ) -> FullAnalysis {
        let report = FullAnalysis {
            artist_id: artist_id.to_string(),
            generated_at: now,
            clustering: self.compare_clustering(listeners).into(),
            emotions: self.analyze_emotions(comments).into(),
            churn: self.predict_churn(artist_id, listeners, activity, now).into(),
        };
        tracing::info!(
            artist_id,
            clustering = report.clustering.is_completed(),
            emotions = report.emotions.is_completed(),
            churn = report.churn.is_completed(),
            "full analysis complete"
        );
        report
    }

    /// Cluster the audience tiers estimated from a new artist's snapshots
    pub fn audience_segments(
        &self,
        artist: &NewArtist,
        snapshots: &[TrackingSnapshot],
        now: DateTime<Utc>,
    ) -> Result<AudienceSegments> {
        let estimated = growth::estimate_audience(snapshots);
        if estimated.is_empty() {
            return Err(AnalyticsError::InputDataEmpty(
                "Need at least 2 progress updates to analyze audience segments".to_string(),
            ));
        }

        let ids = estimated
            .iter()
            .map(|row| format!("{}-{}", row.date, row.segment))
            .collect();
        let raw = Array2::from_shape_fn((estimated.len(), 2), |(i, j)| {
            if j == 0 {
                estimated[i].engagement_score
            } else {
                estimated[i].loyalty_score
            }
        });
        let comparison =
            ClusteringComparison::new(self.config.segmentation.clone()).compare_features(ids, raw)?;

        let primary_segment = Segment::ALL
            .into_iter()
            .max_by_key(|&segment| {
                estimated
                    .iter()
                    .filter(|row| row.segment == segment)
                    .map(|row| row.count)
                    .sum::<u64>()
            })
            .unwrap_or(Segment::Casual);
        let superfan_ratio = growth::superfan_ratio(&estimated);

        Ok(AudienceSegments {
            comparison,
            stage: GrowthStage::from_days_active(artist.days_active(now)),
            primary_segment,
            superfan_ratio,
            recommendation: recommendations::segment_recommendation(superfan_ratio).to_string(),
            next_steps: SEGMENT_NEXT_STEPS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn supporter_retention(
        &self,
        artist: &NewArtist,
        snapshots: &[TrackingSnapshot],
        now: DateTime<Utc>,
    ) -> Result<RetentionReport> {
        let retention = growth::supporter_retention(snapshots)?;
        let recommendations =
            recommendations::retention_recommendations(&artist.artist_id, &retention, now);
        Ok(RetentionReport {
            retention,
            recommendations,
        })
    }

    /// Emotions in the artist's own notes, feedback and milestones
    pub fn emotional_journey(
        &self,
        artist: &NewArtist,
        snapshots: &[TrackingSnapshot],
        recommendations: &[Recommendation],
        now: DateTime<Utc>,
    ) -> Result<EmotionalJourney> {
        let texts = feedback_texts(snapshots, recommendations);
        let analysis = self
            .emotion
            .analyze(texts.iter().map(|t| t.text.as_str()))
            .map_err(|err| match err {
                AnalyticsError::InputDataEmpty(_) => AnalyticsError::InputDataEmpty(
                    "No emotional data available. Add notes to your progress updates or complete recommendations with feedback"
                        .to_string(),
                ),
                other => other,
            })?;
        let stage = GrowthStage::from_days_active(artist.days_active(now));
        let journey = journey_insights(&analysis, stage);
        Ok(EmotionalJourney { analysis, journey })
    }

    pub fn growth_intelligence(
        &self,
        artist: &NewArtist,
        snapshots: &[TrackingSnapshot],
        recommendations: &[Recommendation],
        now: DateTime<Utc>,
    ) -> GrowthIntelligence {
        let audience_segments = self.audience_segments(artist, snapshots, now).into();
        let retention = self.supporter_retention(artist, snapshots, now).into();
        let emotions = self
            .emotional_journey(artist, snapshots, recommendations, now)
            .into();
        let unified_insights = unified_insights(&audience_segments, &retention, &emotions);

        tracing::info!(
            artist_id = %artist.artist_id,
            insights = unified_insights.len(),
            "growth intelligence complete"
        );

        GrowthIntelligence {
            artist_context: ArtistContext::new(artist, now),
            generated_at: now,
            audience_segments,
            retention,
            emotions,
            unified_insights,
        }
    }
}

/// Texts written by the artist: completion feedback, progress notes and
/// an "Achievement" line per milestone
pub fn feedback_texts(
    snapshots: &[TrackingSnapshot],
    recommendations: &[Recommendation],
) -> Vec<TextItem> {
    let mut texts = Vec::new();

    for rec in recommendations {
        if rec.status != RecommendationStatus::Completed {
            continue;
        }
        if let Some(feedback) = &rec.feedback {
            texts.push(TextItem {
                artist_id: rec.artist_id.clone(),
                text: feedback.clone(),
                source: TextSource::RecommendationFeedback,
                timestamp: rec.completed_at,
            });
        }
    }

    for snapshot in snapshots {
        if let Some(notes) = snapshot.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            texts.push(TextItem::new(&snapshot.artist_id, notes, TextSource::ProgressNote));
        }
    }

    for snapshot in snapshots {
        for milestone in &snapshot.milestones_hit {
            texts.push(TextItem::new(
                &snapshot.artist_id,
                format!("Achievement: {}", milestone),
                TextSource::Milestone,
            ));
        }
    }

    texts
}

pub fn unified_insights<A, R, E>(
    segments: &AnalysisOutcome<A>,
    retention: &AnalysisOutcome<R>,
    emotions: &AnalysisOutcome<E>,
) -> Vec<UnifiedInsight> {
    let mut insights = Vec::new();

    if segments.is_completed() && retention.is_completed() {
        insights.push(UnifiedInsight {
            kind: UnifiedInsightKind::Combined,
            title: "Audience Health Overview".to_string(),
            message: "Your audience segmentation and retention patterns suggest focused engagement strategies."
                .to_string(),
        });
    }

    if emotions.is_completed() {
        insights.push(UnifiedInsight {
            kind: UnifiedInsightKind::Motivation,
            title: "Emotional Journey".to_string(),
            message: "Your emotional tracking shows commitment to growth - stay consistent!"
                .to_string(),
        });
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{OnboardingMetrics, SnapshotMetrics};
    use chrono::{Duration, NaiveDate};

    fn listeners(n: usize) -> Vec<ListenerRecord> {
        (0..n)
            .map(|i| {
                let tier = (i % 3) as f64;
                ListenerRecord {
                    listener_id: format!("l{}", i),
                    artist_id: "a1".to_string(),
                    total_streams: 5.0 + tier * 60.0 + i as f64,
                    saves: tier * 8.0,
                    shares: tier * 3.0,
                    avg_completion_rate: 0.3 + tier * 0.3,
                    skip_rate: 0.6 - tier * 0.25,
                    session_count: 1.0 + tier * 10.0,
                    avg_session_duration: 120.0 + tier * 400.0,
                }
            })
            .collect()
    }

    fn comments(texts: &[&str]) -> Vec<TextItem> {
        texts
            .iter()
            .map(|t| TextItem::new("a1", *t, TextSource::Comment))
            .collect()
    }

    fn new_artist(now: DateTime<Utc>, days: i64) -> NewArtist {
        NewArtist {
            artist_id: "n1".into(),
            artist_name: "Rising".into(),
            email: String::new(),
            genre: "indie".into(),
            location: "Lagos".into(),
            onboarding_date: now - Duration::days(days),
            current_metrics: OnboardingMetrics::default(),
            goals: GoalState::default(),
            status: ArtistStatus::Active,
            mentor_match: None,
            last_updated: None,
        }
    }

    fn snapshot(
        day: u32,
        followers: u64,
        notes: Option<&str>,
        milestones: &[&str],
    ) -> TrackingSnapshot {
        TrackingSnapshot {
            artist_id: "n1".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            metrics: SnapshotMetrics {
                followers,
                streams: followers * 12,
                engagement_rate: 0.08,
            },
            notes: notes.map(String::from),
            milestones_hit: milestones.iter().map(|m| m.to_string()).collect(),
            progress_score: 0.0,
            recommendations_followed: Vec::new(),
        }
    }

    #[test]
    fn test_perform_analysis() {
        let ctx = AnalyticsContext::new(AnalysisConfig::default());
        let analysis = ctx
            .perform_analysis(
                "a1",
                &listeners(30),
                &comments(&["love this", "amazing", "great vibes", "boring"]),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(analysis.segmentation.segment_counts.total(), 30);
        assert_eq!(analysis.sentiment.total_analyzed, 4);
        assert_eq!(analysis.key_insights.len(), 3);
        assert!(!analysis.recommendations.is_empty());
    }

    #[test]
    fn test_perform_analysis_requires_listeners() {
        let ctx = AnalyticsContext::new(AnalysisConfig::default());
        let err = ctx
            .perform_analysis("a1", &[], &comments(&["love it"]), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InputDataEmpty(_)));
    }

    #[test]
    fn test_full_analysis_marks_untrained_churn() {
        let ctx = AnalyticsContext::new(AnalysisConfig::default());
        let report = ctx.full_analysis(
            "a1",
            &listeners(30),
            &[],
            &comments(&["I love this song so much"]),
            Utc::now(),
        );

        assert!(report.clustering.is_completed());
        assert!(report.emotions.is_completed());
        match &report.churn {
            AnalysisOutcome::Unavailable { kind, .. } => assert_eq!(kind, "model_not_trained"),
            AnalysisOutcome::Completed(_) => panic!("churn should need training first"),
        }
    }

    #[test]
    fn test_unloaded_emotion_model_isolated() {
        let ctx = AnalyticsContext::with_emotion_scorer(
            AnalysisConfig::default(),
            EmotionScorer::not_loaded("lexicon file missing"),
        );
        let report =
            ctx.full_analysis("a1", &listeners(30), &[], &comments(&["love it"]), Utc::now());

        assert!(report.clustering.is_completed());
        match &report.emotions {
            AnalysisOutcome::Unavailable { kind, reason } => {
                assert_eq!(kind, "model_not_loaded");
                assert!(reason.contains("lexicon file missing"));
            }
            AnalysisOutcome::Completed(_) => panic!("emotions should be unavailable"),
        }
    }

    #[test]
    fn test_feedback_texts() {
        let now = Utc::now();
        let snapshots = vec![
            snapshot(1, 50, Some("so happy with this week"), &[]),
            snapshot(8, 120, Some("   "), &["Reached 100 followers!"]),
        ];
        let mut recs = recommendations::onboarding_recommendations(&new_artist(now, 10), now);
        recs[0].status = RecommendationStatus::Completed;
        recs[0].completed_at = Some(now);
        recs[0].feedback = Some("This really worked".into());
        recs[1].feedback = Some("not done yet".into());

        let texts = feedback_texts(&snapshots, &recs);
        let sources: Vec<TextSource> = texts.iter().map(|t| t.source).collect();
        assert_eq!(
            sources,
            vec![
                TextSource::RecommendationFeedback,
                TextSource::ProgressNote,
                TextSource::Milestone,
            ]
        );
        assert_eq!(texts[2].text, "Achievement: Reached 100 followers!");
    }

    #[test]
    fn test_growth_intelligence_all_sections() {
        let now = Utc::now();
        let artist = new_artist(now, 20);
        let snapshots = vec![
            snapshot(1, 80, Some("excited and happy to start"), &[]),
            snapshot(8, 130, Some("love the support, amazing week"), &["Reached 100 followers!"]),
            snapshot(15, 170, None, &[]),
        ];

        let ctx = AnalyticsContext::new(AnalysisConfig::default());
        let report = ctx.growth_intelligence(&artist, &snapshots, &[], now);

        assert_eq!(report.artist_context.stage, GrowthStage::Early);
        assert!(report.audience_segments.is_completed());
        assert!(report.retention.is_completed());
        assert!(report.emotions.is_completed());
        assert_eq!(report.unified_insights.len(), 2);
        assert_eq!(report.unified_insights[0].title, "Audience Health Overview");
    }

    #[test]
    fn test_growth_intelligence_without_history() {
        let now = Utc::now();
        let ctx = AnalyticsContext::new(AnalysisConfig::default());
        let report = ctx.growth_intelligence(&new_artist(now, 100), &[], &[], now);

        assert!(!report.audience_segments.is_completed());
        assert!(!report.retention.is_completed());
        assert!(!report.emotions.is_completed());
        assert!(report.unified_insights.is_empty());
        assert_eq!(report.artist_context.stage, GrowthStage::Established);
    }
}
