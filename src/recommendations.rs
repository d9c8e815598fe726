//! Typed, prioritized action recommendations and their status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::NewArtist;
use crate::growth::SupporterRetention;
use crate::segmentation::SegmentCounts;
use crate::sentiment::SentimentSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Engagement,
    Conversion,
    Retention,
    Sentiment,
    Platform,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    Urgent,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub artist_id: String,
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub action_steps: Vec<String>,
    #[serde(default)]
    pub expected_impact: String,
    /// Fixed prior confidence for templated onboarding advice
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub effectiveness_score: Option<f64>,
}

/// Requested status change with the optional completion details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusUpdate {
    pub status: RecommendationStatus,
    pub feedback: Option<String>,
    pub effectiveness_score: Option<f64>,
}

impl Recommendation {
    fn draft(
        artist_id: &str,
        kind: RecommendationKind,
        priority: Priority,
        title: &str,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            artist_id: artist_id.to_string(),
            kind,
            priority,
            title: title.to_string(),
            description,
            action_steps: Vec::new(),
            expected_impact: String::new(),
            confidence: None,
            status: RecommendationStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            feedback: None,
            effectiveness_score: None,
        }
    }

    fn steps(mut self, steps: &[&str]) -> Self {
        self.action_steps = steps.iter().map(|s| s.to_string()).collect();
        self
    }

    fn impact(mut self, impact: &str) -> Self {
        self.expected_impact = impact.to_string();
        self
    }

    fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Move to the requested status, stamping the matching timestamp.
    ///
    /// Feedback and effectiveness are only recorded on completion.
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        match update.status {
            RecommendationStatus::InProgress => self.started_at = Some(now),
            RecommendationStatus::Completed => {
                self.completed_at = Some(now);
                if update.effectiveness_score.is_some() {
                    self.effectiveness_score = update.effectiveness_score;
                }
                if update.feedback.is_some() {
                    self.feedback = update.feedback;
                }
            }
            RecommendationStatus::Pending => {}
        }
    }
}

/// Advice derived from a segmentation and the sentiment of the same artist's comments
pub fn analysis_recommendations(
    artist_id: &str,
    counts: &SegmentCounts,
    sentiment: &SentimentSummary,
    now: DateTime<Utc>,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if counts.superfans > 0 {
        recommendations.push(
            Recommendation::draft(
                artist_id,
                RecommendationKind::Engagement,
                Priority::High,
                "Reward Your Superfans",
                format!(
                    "You have {} superfans. Create exclusive content or early releases for them to maintain loyalty.",
                    counts.superfans
                ),
                now,
            )
            .steps(&[
                "Share unreleased demos with your most engaged listeners",
                "Offer early access to new releases",
                "Thank top listeners personally",
            ])
            .impact("Keeps your most valuable listeners engaged and sharing"),
        );
    }

    if counts.casual > counts.superfans * 3 {
        recommendations.push(
            Recommendation::draft(
                artist_id,
                RecommendationKind::Conversion,
                Priority::Medium,
                "Convert Casual Listeners",
                format!(
                    "Focus on converting {} casual listeners into superfans through consistent engagement and quality content.",
                    counts.casual
                ),
                now,
            )
            .steps(&[
                "Release on a consistent schedule",
                "Invite listeners to follow and save your tracks",
                "Respond to comments from returning listeners",
            ])
            .impact("Grows the superfan tier from your existing audience"),
        );
    }

    if counts.onetime > counts.casual {
        recommendations.push(
            Recommendation::draft(
                artist_id,
                RecommendationKind::Retention,
                Priority::High,
                "Retain First-Time Listeners",
                format!(
                    "High one-time listener rate ({}). Improve song intros and create playlists to retain first-time listeners.",
                    counts.onetime
                ),
                now,
            )
            .steps(&[
                "Tighten the first 30 seconds of each track",
                "Build playlists that lead into your catalogue",
                "Pin your strongest track on every profile",
            ])
            .impact("Fewer listeners leave after their first stream"),
        );
    }

    let positive_ratio = if sentiment.total_analyzed > 0 {
        sentiment.positive as f64 / sentiment.total_analyzed as f64
    } else {
        0.0
    };
    if positive_ratio > 0.7 {
        recommendations.push(
            Recommendation::draft(
                artist_id,
                RecommendationKind::Sentiment,
                Priority::High,
                "Ride the Positive Momentum",
                "Your audience sentiment is highly positive (70%+)! This is the perfect time to release new content or announce shows."
                    .to_string(),
                now,
            )
            .steps(&[
                "Announce your next release or show",
                "Ask happy listeners to share your music",
            ])
            .impact("Converts goodwill into reach while it lasts"),
        );
    } else if positive_ratio < 0.5 {
        recommendations.push(
            Recommendation::draft(
                artist_id,
                RecommendationKind::Sentiment,
                Priority::Medium,
                "Improve Audience Sentiment",
                "Audience sentiment is mixed. Engage with comments and consider feedback for future releases."
                    .to_string(),
                now,
            )
            .steps(&[
                "Reply to critical comments constructively",
                "Collect feedback before your next release",
            ])
            .impact("Turns mixed reactions into a more positive community"),
        );
    }

    recommendations
}

/// Starter advice issued when an artist joins, all pending
pub fn onboarding_recommendations(artist: &NewArtist, now: DateTime<Utc>) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let platforms = artist.current_metrics.platforms.len();

    if platforms < 2 {
        recommendations.push(
            Recommendation::draft(
                &artist.artist_id,
                RecommendationKind::Platform,
                Priority::Critical,
                "Expand Your Platform Presence",
                format!(
                    "You are currently on {} platform(s). Successful {} artists use 2-3 platforms.",
                    platforms, artist.genre
                ),
                now,
            )
            .steps(&[
                "Create Spotify artist profile",
                "Upload 3-5 quality tracks",
                "Optimize your profile with bio and photos",
                "Submit to playlist curators",
            ])
            .impact("Reach 200-500 new listeners in first month")
            .confidence(0.85),
        );
    }

    recommendations.push(
        Recommendation::draft(
            &artist.artist_id,
            RecommendationKind::Content,
            Priority::High,
            "Create a Release Schedule",
            "Consistency is key. Successful artists release new content 2-4 times per month."
                .to_string(),
            now,
        )
        .steps(&[
            "Create a content calendar",
            "Plan bi-weekly releases",
            "Mix full songs with covers or acoustic versions",
            "Batch record to stay consistent",
        ])
        .impact("Increase retention by 40-60%")
        .confidence(0.92),
    );

    recommendations.push(
        Recommendation::draft(
            &artist.artist_id,
            RecommendationKind::Engagement,
            Priority::High,
            "Build Your Core Superfan Base",
            "Focus on converting your first 50-100 listeners into superfans.".to_string(),
            now,
        )
        .steps(&[
            "Reply to every comment",
            "Create exclusive content for early supporters",
            "Start a WhatsApp/Telegram group",
            "Go live weekly on Instagram/YouTube",
        ])
        .impact("Each superfan brings 3-5 new listeners")
        .confidence(0.88),
    );

    recommendations
}

/// Follow-ups for a new artist whose early supporters look at risk
pub fn retention_recommendations(
    artist_id: &str,
    retention: &SupporterRetention,
    now: DateTime<Utc>,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if retention.current_risk_level > 0.5 {
        recommendations.push(
            Recommendation::draft(
                artist_id,
                RecommendationKind::Retention,
                Priority::Urgent,
                "Re-engage Your Early Supporters",
                format!(
                    "Your latest update shows a supporter risk of {:.0}%.",
                    retention.current_risk_level * 100.0
                ),
                now,
            )
            .steps(&[
                "Post personal thank-you message to early followers",
                "Go live on Instagram/YouTube this week",
                "Share exclusive behind-the-scenes content",
                "Ask for feedback - make them feel heard",
            ])
            .impact("Win back early supporters before they drift away"),
        );
    }

    if retention.avg_engagement_trend < 0.0 {
        recommendations.push(
            Recommendation::draft(
                artist_id,
                RecommendationKind::Engagement,
                Priority::High,
                "Boost Engagement",
                "Your engagement rate has been trending down across updates.".to_string(),
                now,
            )
            .steps(&[
                "Post consistently (3-4 times per week)",
                "Reply to every comment within 24 hours",
                "Create polls/questions in stories",
                "Host a Q&A session",
            ])
            .impact("Restores engagement before it affects follower growth"),
        );
    }

    recommendations
}

/// One-line guidance from the share of superfans in an audience
pub fn segment_recommendation(superfan_ratio: f64) -> &'static str {
    if superfan_ratio > 0.3 {
        "Great superfan ratio! Focus on converting casual listeners to grow your base."
    } else if superfan_ratio > 0.15 {
        "Healthy superfan presence. Keep engaging with them while expanding reach."
    } else {
        "Build deeper connections with current listeners before expanding reach."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OnboardingMetrics;
    use crate::growth::{RetentionHealth, RiskStatus};

    fn counts(superfans: usize, casual: usize, onetime: usize) -> SegmentCounts {
        SegmentCounts {
            superfans,
            casual,
            onetime,
        }
    }

    fn sentiment(positive: usize, total: usize) -> SentimentSummary {
        SentimentSummary {
            total_analyzed: total,
            positive,
            negative: 0,
            neutral: total - positive,
            positive_ratio: positive as f64 / total as f64,
            average_compound: 0.0,
        }
    }

    fn kinds(recs: &[Recommendation]) -> Vec<RecommendationKind> {
        recs.iter().map(|r| r.kind).collect()
    }

    #[test]
    fn test_conversion_threshold_is_strict() {
        let now = Utc::now();
        let above = analysis_recommendations("a1", &counts(5, 16, 0), &sentiment(6, 10), now);
        assert!(kinds(&above).contains(&RecommendationKind::Conversion));

        let equal = analysis_recommendations("a1", &counts(5, 15, 0), &sentiment(6, 10), now);
        assert!(!kinds(&equal).contains(&RecommendationKind::Conversion));
    }

    #[test]
    fn test_single_casual_without_superfans_converts() {
        let now = Utc::now();
        let recs = analysis_recommendations("a1", &counts(0, 1, 0), &sentiment(6, 10), now);
        assert!(kinds(&recs).contains(&RecommendationKind::Conversion));
        let recs = analysis_recommendations("a1", &counts(0, 0, 0), &sentiment(6, 10), now);
        assert!(!kinds(&recs).contains(&RecommendationKind::Conversion));
    }

    #[test]
    fn test_full_rule_set() {
        let recs = analysis_recommendations("a1", &counts(2, 3, 10), &sentiment(8, 10), Utc::now());
        assert_eq!(
            kinds(&recs),
            vec![
                RecommendationKind::Engagement,
                RecommendationKind::Retention,
                RecommendationKind::Sentiment,
            ]
        );
        assert_eq!(recs[2].priority, Priority::High);
        assert!(recs.iter().all(|r| !r.action_steps.is_empty() && !r.expected_impact.is_empty()));
    }

    #[test]
    fn test_mixed_sentiment() {
        let recs = analysis_recommendations("a1", &counts(0, 0, 0), &sentiment(4, 10), Utc::now());
        assert_eq!(kinds(&recs), vec![RecommendationKind::Sentiment]);
        assert_eq!(recs[0].priority, Priority::Medium);

        // Between the two thresholds nothing is said about sentiment
        let recs = analysis_recommendations("a1", &counts(0, 0, 0), &sentiment(6, 10), Utc::now());
        assert!(recs.is_empty());
    }

    fn new_artist(platforms: &[&str]) -> NewArtist {
        NewArtist {
            artist_id: "n1".into(),
            artist_name: "Rising".into(),
            email: "r@example.com".into(),
            genre: "afrobeat".into(),
            location: "Accra".into(),
            onboarding_date: Utc::now(),
            current_metrics: OnboardingMetrics {
                platforms: platforms.iter().map(|p| p.to_string()).collect(),
                followers: 40,
                monthly_streams: 300,
            },
            goals: Default::default(),
            status: Default::default(),
            mentor_match: None,
            last_updated: None,
        }
    }

    #[test]
    fn test_onboarding_recommendations() {
        let recs = onboarding_recommendations(&new_artist(&["instagram"]), Utc::now());
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].priority, Priority::Critical);
        assert_eq!(recs[0].confidence, Some(0.85));
        assert!(recs[0].description.contains("afrobeat"));
        assert!(recs.iter().all(|r| r.status == RecommendationStatus::Pending));

        let recs = onboarding_recommendations(&new_artist(&["instagram", "spotify"]), Utc::now());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].confidence, Some(0.92));
        assert_eq!(recs[1].confidence, Some(0.88));
    }

    #[test]
    fn test_status_transitions() {
        let start = Utc::now();
        let mut rec = onboarding_recommendations(&new_artist(&[]), start).remove(0);

        rec.apply(
            StatusUpdate {
                status: RecommendationStatus::InProgress,
                ..Default::default()
            },
            start,
        );
        assert_eq!(rec.started_at, Some(start));
        assert!(rec.completed_at.is_none());

        let done = start + chrono::Duration::days(3);
        rec.apply(
            StatusUpdate {
                status: RecommendationStatus::Completed,
                feedback: Some("So happy with the response!".into()),
                effectiveness_score: Some(4.5),
            },
            done,
        );
        assert_eq!(rec.status, RecommendationStatus::Completed);
        assert_eq!(rec.completed_at, Some(done));
        assert_eq!(rec.feedback.as_deref(), Some("So happy with the response!"));
        assert_eq!(rec.effectiveness_score, Some(4.5));
    }

    #[test]
    fn test_retention_recommendations() {
        let retention = SupporterRetention {
            current_risk_level: 0.7,
            risk_status: RiskStatus::High,
            overall_health: RetentionHealth::Concerning,
            at_risk_periods: 1,
            avg_follower_growth: -3.0,
            avg_engagement_trend: -0.01,
            history: Vec::new(),
        };
        let recs = retention_recommendations("n1", &retention, Utc::now());
        let titles: Vec<&str> = recs.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Re-engage Your Early Supporters", "Boost Engagement"]);
    }

    #[test]
    fn test_segment_recommendation() {
        assert!(segment_recommendation(0.31).starts_with("Great superfan ratio"));
        assert!(segment_recommendation(0.2).starts_with("Healthy"));
        assert!(segment_recommendation(0.15).starts_with("Build deeper"));
    }

    #[test]
    fn test_serializes_kind_as_type() {
        let rec = onboarding_recommendations(&new_artist(&[]), Utc::now()).remove(0);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "platform");
        assert_eq!(json["status"], "pending");
        let back: Recommendation = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, rec.id);
    }
}
