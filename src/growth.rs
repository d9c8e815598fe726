//! Growth metrics over an artist's tracking snapshots

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{Artist, GoalState, NewArtist, SnapshotMetrics, TrackingSnapshot};
use crate::error::{AnalyticsError, Result};
use crate::recommendations::{Recommendation, RecommendationStatus};
use crate::segmentation::Segment;

/// Snapshots considered for the weekly growth rate
pub const GROWTH_WINDOW: usize = 8;

pub const FOLLOWER_MILESTONES: [u64; 6] = [100, 500, 1000, 2500, 5000, 10000];
pub const STREAM_MILESTONES: [u64; 5] = [1000, 5000, 10000, 25000, 50000];
pub const ENGAGEMENT_MILESTONE: f64 = 0.10;

/// Followers a peer needs to qualify as a same-location mentor
pub const MENTOR_MIN_FOLLOWERS: u64 = 5000;

/// Fraction of a mentor's current followers quoted as their "at your stage" figure.
///
/// A fixed approximation; no historical lookup is done.
pub const MENTOR_STAGE_PROXY: f64 = 0.2;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn ratio(current: u64, target: u64) -> f64 {
    if target == 0 {
        1.0
    } else {
        current as f64 / target as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Early,
    Growing,
    Established,
}

impl GrowthStage {
    /// Under 30 days early, under 90 growing
    pub fn from_days_active(days: i64) -> Self {
        if days < 30 {
            GrowthStage::Early
        } else if days < 90 {
            GrowthStage::Growing
        } else {
            GrowthStage::Established
        }
    }
}

impl fmt::Display for GrowthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrowthStage::Early => write!(f, "early"),
            GrowthStage::Growing => write!(f, "growing"),
            GrowthStage::Established => write!(f, "established"),
        }
    }
}

/// Equal-weight progress toward follower and stream targets, each capped at 1.
///
/// Zero when the artist (and so its goals) is unknown.
pub fn progress_score(goals: Option<&GoalState>, metrics: &SnapshotMetrics) -> f64 {
    let Some(goals) = goals else {
        return 0.0;
    };
    let followers = ratio(metrics.followers, goals.target_followers).min(1.0);
    let streams = ratio(metrics.streams, goals.target_monthly_streams).min(1.0);
    round_to(followers * 0.5 + streams * 0.5, 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricProgress {
    pub current: u64,
    pub target: u64,
    /// Capped at 100
    pub percentage: f64,
}

impl MetricProgress {
    fn new(current: u64, target: u64) -> Self {
        Self {
            current,
            target,
            percentage: (ratio(current, target) * 100.0).min(100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub followers: MetricProgress,
    pub streams: MetricProgress,
}

/// Progress of the latest snapshot against the goals; zeros without history
pub fn goal_progress(goals: &GoalState, latest: Option<&SnapshotMetrics>) -> GoalProgress {
    let latest = latest.copied().unwrap_or_default();
    GoalProgress {
        followers: MetricProgress::new(latest.followers, goals.target_followers),
        streams: MetricProgress::new(latest.streams, goals.target_monthly_streams),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthRate {
    pub followers_per_week: f64,
    pub streams_per_week: f64,
}

/// Change between the first and last of the most recent snapshots, divided by
/// the number of snapshots in that window. Zero below two snapshots.
pub fn growth_rate(snapshots: &[TrackingSnapshot]) -> GrowthRate {
    let mut ordered: Vec<&TrackingSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.date);
    let window = &ordered[ordered.len().saturating_sub(GROWTH_WINDOW)..];

    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return GrowthRate::default();
    };
    if window.len() < 2 {
        return GrowthRate::default();
    }

    let n = window.len() as f64;
    let delta = |a: u64, b: u64| b as f64 - a as f64;
    GrowthRate {
        followers_per_week: round_to(delta(first.metrics.followers, last.metrics.followers) / n, 1),
        streams_per_week: round_to(delta(first.metrics.streams, last.metrics.streams) / n, 1),
    }
}

/// Days until the follower target at the current weekly rate.
///
/// `None` without history or when followers are not growing.
pub fn days_to_goal(goals: &GoalState, snapshots: &[TrackingSnapshot]) -> Option<i64> {
    let latest = snapshots.iter().max_by_key(|s| s.date)?;
    let rate = growth_rate(snapshots).followers_per_week;
    if rate <= 0.0 {
        return None;
    }
    let needed = goals.target_followers as f64 - latest.metrics.followers as f64;
    let days = (needed / rate * 7.0).trunc() as i64;
    Some(days.max(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    FollowerMilestone,
    StreamMilestone,
    EngagementMilestone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub kind: MilestoneKind,
    pub description: String,
}

/// Thresholds crossed going from `old` to `new` (old < threshold <= new).
///
/// No previous snapshot counts as all zeros.
pub fn detect_milestones(old: Option<&SnapshotMetrics>, new: &SnapshotMetrics) -> Vec<Milestone> {
    let old = old.copied().unwrap_or_default();
    let mut milestones = Vec::new();

    for threshold in FOLLOWER_MILESTONES {
        if old.followers < threshold && new.followers >= threshold {
            milestones.push(Milestone {
                kind: MilestoneKind::FollowerMilestone,
                description: format!("Reached {} followers!", threshold),
            });
        }
    }
    for threshold in STREAM_MILESTONES {
        if old.streams < threshold && new.streams >= threshold {
            milestones.push(Milestone {
                kind: MilestoneKind::StreamMilestone,
                description: format!("Hit {} streams!", threshold),
            });
        }
    }
    if old.engagement_rate < ENGAGEMENT_MILESTONE && new.engagement_rate >= ENGAGEMENT_MILESTONE {
        milestones.push(Milestone {
            kind: MilestoneKind::EngagementMilestone,
            description: "Achieved 10% engagement rate!".to_string(),
        });
    }
    milestones
}

/// Same genre and location with an established following, else any same-genre peer
pub fn find_mentor_match<'a>(
    artists: &'a [Artist],
    genre: &str,
    location: &str,
) -> Option<&'a Artist> {
    artists
        .iter()
        .find(|a| {
            a.genre == genre && a.location == location && a.total_followers >= MENTOR_MIN_FOLLOWERS
        })
        .or_else(|| artists.iter().find(|a| a.genre == genre))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorComparison {
    pub mentor_name: String,
    pub mentor_genre: String,
    pub mentor_current_followers: u64,
    pub your_followers: u64,
    pub comparison: String,
}

pub fn mentor_comparison(mentor: &Artist, your_followers: u64) -> MentorComparison {
    let at_your_stage = (mentor.total_followers as f64 * MENTOR_STAGE_PROXY) as u64;
    MentorComparison {
        mentor_name: mentor.artist_name.clone(),
        mentor_genre: mentor.genre.clone(),
        mentor_current_followers: mentor.total_followers,
        your_followers,
        comparison: format!(
            "At your stage, {} had around {} followers",
            mentor.artist_name, at_your_stage
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionHealth {
    Excellent,
    Good,
    Concerning,
    Critical,
}

impl RetentionHealth {
    pub fn from_average_risk(risk: f64) -> Self {
        if risk < 0.2 {
            RetentionHealth::Excellent
        } else if risk < 0.4 {
            RetentionHealth::Good
        } else if risk < 0.6 {
            RetentionHealth::Concerning
        } else {
            RetentionHealth::Critical
        }
    }
}

/// Risk assessment of one snapshot relative to the one before it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionStep {
    pub date: NaiveDate,
    pub followers: u64,
    pub follower_growth: f64,
    pub engagement_rate: f64,
    pub engagement_trend: f64,
    pub stream_growth: f64,
    pub churn_risk_score: f64,
    pub is_at_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupporterRetention {
    pub current_risk_level: f64,
    pub risk_status: RiskStatus,
    pub overall_health: RetentionHealth,
    pub at_risk_periods: usize,
    pub avg_follower_growth: f64,
    pub avg_engagement_trend: f64,
    pub history: Vec<RetentionStep>,
}

/// Heuristic early-supporter churn risk from consecutive snapshot deltas
pub fn supporter_retention(snapshots: &[TrackingSnapshot]) -> Result<SupporterRetention> {
    let mut ordered: Vec<&TrackingSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.date);
    if ordered.len() < 2 {
        return Err(AnalyticsError::InputDataEmpty(format!(
            "Need at least 2 progress updates to assess supporter retention, found {}",
            ordered.len()
        )));
    }

    let history: Vec<RetentionStep> = ordered
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (&pair[0].metrics, &pair[1].metrics);
            let follower_growth = cur.followers as f64 - prev.followers as f64;
            let engagement_trend = cur.engagement_rate - prev.engagement_rate;
            let stream_growth = cur.streams as f64 - prev.streams as f64;

            let mut risk: f64 = 0.0;
            if follower_growth < 0.0 {
                risk += 0.4;
            } else if follower_growth < 10.0 {
                risk += 0.2;
            }
            if engagement_trend < 0.0 {
                risk += 0.3;
            }
            if stream_growth < 0.0 {
                risk += 0.3;
            }

            RetentionStep {
                date: pair[1].date,
                followers: cur.followers,
                follower_growth,
                engagement_rate: cur.engagement_rate,
                engagement_trend,
                stream_growth,
                churn_risk_score: risk.min(1.0),
                is_at_risk: risk > 0.5,
            }
        })
        .collect();

    let n = history.len() as f64;
    let mean = |f: fn(&RetentionStep) -> f64| history.iter().map(f).sum::<f64>() / n;
    let avg_risk = mean(|s| s.churn_risk_score);
    let current_risk_level = history.last().map(|s| s.churn_risk_score).unwrap_or(0.0);
    let risk_status = if current_risk_level > 0.5 {
        RiskStatus::High
    } else if current_risk_level > 0.3 {
        RiskStatus::Medium
    } else {
        RiskStatus::Low
    };

    Ok(SupporterRetention {
        current_risk_level,
        risk_status,
        overall_health: RetentionHealth::from_average_risk(avg_risk),
        at_risk_periods: history.iter().filter(|s| s.is_at_risk).count(),
        avg_follower_growth: mean(|s| s.follower_growth),
        avg_engagement_trend: mean(|s| s.engagement_trend),
        history,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub followers: u64,
    pub streams: u64,
    pub engagement_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedMilestone {
    pub date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthHistory {
    pub history: Vec<HistoryPoint>,
    pub milestones: Vec<DatedMilestone>,
}

/// Chart series in date order plus the milestones recorded along the way
pub fn growth_history(snapshots: &[TrackingSnapshot]) -> GrowthHistory {
    let mut ordered: Vec<&TrackingSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.date);

    GrowthHistory {
        history: ordered
            .iter()
            .map(|s| HistoryPoint {
                date: s.date,
                followers: s.metrics.followers,
                streams: s.metrics.streams,
                engagement_rate: s.metrics.engagement_rate,
            })
            .collect(),
        milestones: ordered
            .iter()
            .flat_map(|s| {
                s.milestones_hit.iter().map(move |m| DatedMilestone {
                    date: s.date,
                    description: m.clone(),
                })
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    Onboarded,
    ProgressUpdate,
    Milestone,
    RecommendationCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub date: NaiveDate,
    pub kind: TimelineEventKind,
    pub description: String,
}

/// Every dated event for an artist, newest first
pub fn timeline(
    artist: &NewArtist,
    snapshots: &[TrackingSnapshot],
    recommendations: &[Recommendation],
) -> Vec<TimelineEvent> {
    let mut events = vec![TimelineEvent {
        date: artist.onboarding_date.date_naive(),
        kind: TimelineEventKind::Onboarded,
        description: "Joined the platform".to_string(),
    }];

    let mut ordered: Vec<&TrackingSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.date);
    for snapshot in ordered {
        events.push(TimelineEvent {
            date: snapshot.date,
            kind: TimelineEventKind::ProgressUpdate,
            description: format!(
                "Updated progress: {} followers, {} streams",
                snapshot.metrics.followers, snapshot.metrics.streams
            ),
        });
        for milestone in &snapshot.milestones_hit {
            events.push(TimelineEvent {
                date: snapshot.date,
                kind: TimelineEventKind::Milestone,
                description: milestone.clone(),
            });
        }
    }

    for rec in recommendations {
        if let (RecommendationStatus::Completed, Some(completed)) = (rec.status, rec.completed_at) {
            events.push(TimelineEvent {
                date: completed.date_naive(),
                kind: TimelineEventKind::RecommendationCompleted,
                description: format!("Completed: {}", rec.title),
            });
        }
    }

    // Stable, so same-day events keep their insertion order
    events.sort_by(|a, b| b.date.cmp(&a.date));
    events
}

/// One synthesized listener tier derived from a snapshot's aggregate metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedSegment {
    pub date: NaiveDate,
    pub segment: Segment,
    pub count: u64,
    pub engagement_score: f64,
    pub loyalty_score: f64,
    pub avg_streams: f64,
}

/// Split each snapshot's followers into tiers: the engaged share are
/// superfans, 30% casual, the rest one-time.
///
/// New artists rarely have listener-level data, so tiers are estimated from
/// aggregate counts with fixed representative scores.
pub fn estimate_audience(snapshots: &[TrackingSnapshot]) -> Vec<EstimatedSegment> {
    let mut ordered: Vec<&TrackingSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.date);

    let mut rows = Vec::new();
    for snapshot in ordered {
        let m = &snapshot.metrics;
        let total = m.followers;
        let superfans = (total as f64 * m.engagement_rate) as u64;
        let casual = (total as f64 * 0.3) as u64;
        let onetime = total.saturating_sub(superfans + casual);
        let per_listener = m.streams as f64 / total.max(1) as f64;

        let tiers = [
            (Segment::Superfan, superfans, 8.5, 9.0, per_listener * 1.5),
            (Segment::Casual, casual, 5.2, 4.8, per_listener),
            (Segment::OneTime, onetime, 2.1, 1.5, per_listener * 0.3),
        ];
        for (segment, count, engagement_score, loyalty_score, avg_streams) in tiers {
            if count > 0 {
                rows.push(EstimatedSegment {
                    date: snapshot.date,
                    segment,
                    count,
                    engagement_score,
                    loyalty_score,
                    avg_streams,
                });
            }
        }
    }
    rows
}

/// Share of estimated listeners who are superfans, weighted by tier size
pub fn superfan_ratio(rows: &[EstimatedSegment]) -> f64 {
    let total: u64 = rows.iter().map(|r| r.count).sum();
    if total == 0 {
        return 0.0;
    }
    let superfans: u64 = rows
        .iter()
        .filter(|r| r.segment == Segment::Superfan)
        .map(|r| r.count)
        .sum();
    superfans as f64 / total as f64
}
