//! Composite engagement and loyalty scores engineered from raw listener counters

use serde::{Deserialize, Serialize};

use crate::data::ListenerRecord;

/// The two fixed weight sets used for the same conceptual scores.
///
/// The weights disagree and neither is known to be the intended one. Each
/// stays pinned to its call site until product clarifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFormula {
    /// Primary k-means segmentation
    Segmentation,
    /// Clustering comparison and churn features
    Advanced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineeredFeatures {
    pub engagement_score: f64,
    pub loyalty_score: f64,
}

/// A listener row augmented with its engineered scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredListener {
    pub record: ListenerRecord,
    pub features: EngineeredFeatures,
}

impl FeatureFormula {
    /// Score a single row; independent of every other row in the batch
    pub fn apply(self, record: &ListenerRecord) -> EngineeredFeatures {
        match self {
            FeatureFormula::Segmentation => EngineeredFeatures {
                engagement_score: record.total_streams * 0.3
                    + record.saves * 0.25
                    + record.shares * 0.25
                    + record.avg_completion_rate * 100.0 * 0.2,
                loyalty_score: record.session_count * 0.4
                    + record.avg_session_duration / 60.0 * 0.3
                    + (1.0 - record.skip_rate) * 100.0 * 0.3,
            },
            FeatureFormula::Advanced => EngineeredFeatures {
                engagement_score: record.total_streams * 0.4
                    + record.saves * 0.3
                    + record.shares * 0.2
                    + record.avg_completion_rate * 100.0 * 0.1,
                // skip_rate is read as a percentage on this path
                loyalty_score: record.session_count * 0.4
                    + record.avg_session_duration / 60.0 * 0.3
                    + (100.0 - record.skip_rate) * 0.3,
            },
        }
    }
}

/// Augment every row with the scores of the given formula
pub fn engineer_features(
    listeners: &[ListenerRecord],
    formula: FeatureFormula,
) -> Vec<EngineeredListener> {
    listeners
        .iter()
        .map(|record| EngineeredListener {
            record: record.clone(),
            features: formula.apply(record),
        })
        .collect()
}

/// Headline numbers reported next to the segmentation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudienceInsights {
    pub avg_streams_per_listener: f64,
    pub top10_total_streams: f64,
    /// Percentage
    pub avg_completion_rate: f64,
}

impl AudienceInsights {
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!(
                "Average streams per listener: {:.1}",
                self.avg_streams_per_listener
            ),
            format!(
                "Top 10 listeners contribute {} total streams",
                self.top10_total_streams
            ),
            format!("Average completion rate: {:.1}%", self.avg_completion_rate),
        ]
    }
}

pub fn audience_insights(listeners: &[ListenerRecord]) -> AudienceInsights {
    if listeners.is_empty() {
        return AudienceInsights::default();
    }
    let n = listeners.len() as f64;

    let mut streams: Vec<f64> = listeners.iter().map(|l| l.total_streams).collect();
    streams.sort_by(|a, b| b.total_cmp(a));

    AudienceInsights {
        avg_streams_per_listener: streams.iter().sum::<f64>() / n,
        top10_total_streams: streams.iter().take(10).sum(),
        avg_completion_rate: listeners.iter().map(|l| l.avg_completion_rate).sum::<f64>() / n
            * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(id: &str, streams: f64) -> ListenerRecord {
        ListenerRecord {
            listener_id: id.to_string(),
            artist_id: "a1".to_string(),
            total_streams: streams,
            saves: 10.0,
            shares: 4.0,
            avg_completion_rate: 0.5,
            skip_rate: 0.2,
            session_count: 20.0,
            avg_session_duration: 600.0,
        }
    }

    #[test]
    fn test_segmentation_formula() {
        let features = FeatureFormula::Segmentation.apply(&listener("l1", 100.0));
        // 30 + 2.5 + 1 + 10
        assert!((features.engagement_score - 43.5).abs() < 1e-9);
        // 8 + 3 + 24
        assert!((features.loyalty_score - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_advanced_formula() {
        let features = FeatureFormula::Advanced.apply(&listener("l1", 100.0));
        // 40 + 3 + 0.8 + 5
        assert!((features.engagement_score - 48.8).abs() < 1e-9);
        // 8 + 3 + 29.94
        assert!((features.loyalty_score - 40.94).abs() < 1e-9);
    }

    #[test]
    fn test_missing_fields_score_from_zero() {
        let empty = ListenerRecord::default();
        let features = FeatureFormula::Segmentation.apply(&empty);
        assert_eq!(features.engagement_score, 0.0);
        assert!((features.loyalty_score - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_scores_independent_of_batch() {
        let row = listener("l1", 100.0);
        let alone = engineer_features(std::slice::from_ref(&row), FeatureFormula::Segmentation);
        let batch = vec![listener("l0", 5.0), row.clone(), listener("l2", 9000.0)];
        let together = engineer_features(&batch, FeatureFormula::Segmentation);
        assert_eq!(alone[0].features, together[1].features);
    }

    #[test]
    fn test_audience_insights() {
        let listeners: Vec<ListenerRecord> =
            (1..=12).map(|i| listener(&format!("l{}", i), i as f64)).collect();
        let insights = audience_insights(&listeners);
        assert!((insights.avg_streams_per_listener - 6.5).abs() < 1e-9);
        // 12 + 11 + ... + 3
        assert_eq!(insights.top10_total_streams, 75.0);
        assert!((insights.avg_completion_rate - 50.0).abs() < 1e-9);
        assert_eq!(insights.lines().len(), 3);
    }
}
