//! Listener churn risk: feature derivation, per-artist training and risk banding

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ChurnConfig;
use crate::data::{ActivityEvent, ListenerRecord};
use crate::error::{AnalyticsError, Result};
use crate::features::FeatureFormula;
use crate::forest::{BalancedForest, ForestParams};
use crate::metrics::{self, ConfusionMatrix};

/// Column order of the churn feature matrix
pub const FEATURE_NAMES: [&str; 6] = [
    "engagement_score",
    "loyalty_score",
    "days_since_last_stream",
    "stream_sessions",
    "avg_skip_rate",
    "declining_trend",
];

/// Per-listener inputs to the churn classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChurnFeatureRow {
    pub listener_id: String,
    pub engagement_score: f64,
    pub loyalty_score: f64,
    pub days_since_last_activity: f64,
    pub session_count: f64,
    pub avg_skip_rate: f64,
    /// (recent - prior) / (prior + 1) over the two halves of the history
    pub trend: f64,
}

impl ChurnFeatureRow {
    /// Inactive for more than `inactive_days` and trending down past `declining_trend`
    pub fn is_churned(&self, config: &ChurnConfig) -> bool {
        self.days_since_last_activity > config.inactive_days && self.trend < config.declining_trend
    }

    fn values(&self) -> [f64; 6] {
        [
            self.engagement_score,
            self.loyalty_score,
            self.days_since_last_activity,
            self.session_count,
            self.avg_skip_rate,
            self.trend,
        ]
    }
}

/// Derive churn features for every listener from its streaming history.
///
/// Listeners without history get zero inactivity, one session and a flat
/// trend. Returns nothing when either input is empty.
pub fn build_churn_rows(
    listeners: &[ListenerRecord],
    history: &[ActivityEvent],
    now: DateTime<Utc>,
) -> Vec<ChurnFeatureRow> {
    if listeners.is_empty() || history.is_empty() {
        return Vec::new();
    }

    let mut by_listener: HashMap<&str, Vec<&ActivityEvent>> = HashMap::new();
    for event in history {
        by_listener
            .entry(event.listener_id.as_str())
            .or_default()
            .push(event);
    }

    listeners
        .iter()
        .map(|listener| {
            let features = FeatureFormula::Advanced.apply(listener);
            let mut row = ChurnFeatureRow {
                listener_id: listener.listener_id.clone(),
                engagement_score: features.engagement_score,
                loyalty_score: features.loyalty_score,
                days_since_last_activity: 0.0,
                session_count: 1.0,
                avg_skip_rate: 0.0,
                trend: 0.0,
            };

            if let Some(events) = by_listener.get_mut(listener.listener_id.as_str()) {
                events.sort_by_key(|e| e.timestamp);
                if let Some(last) = events.last() {
                    row.days_since_last_activity = (now - last.timestamp).num_days() as f64;
                }
                row.session_count = events.len() as f64;
                row.avg_skip_rate =
                    events.iter().map(|e| e.skip_rate).sum::<f64>() / events.len() as f64;
                row.trend = activity_trend(events);
            }
            row
        })
        .collect()
}

/// Relative change in streams between the later and earlier half of a sorted history
fn activity_trend(events: &[&ActivityEvent]) -> f64 {
    if events.len() < 2 {
        return 0.0;
    }
    let midpoint = events.len() / 2;
    let older: f64 = events[..midpoint].iter().map(|e| e.streams).sum();
    let recent: f64 = events[midpoint..].iter().map(|e| e.streams).sum();
    (recent - older) / (older + 1.0)
}

fn feature_matrix(rows: &[&ChurnFeatureRow]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), FEATURE_NAMES.len()), |(i, j)| rows[i].values()[j])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub cv_mean_accuracy: f64,
    pub cv_std_accuracy: f64,
    /// None when the holdout split contains a single class
    pub roc_auc_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnDatasetInfo {
    pub total_listeners: usize,
    pub churned_listeners: usize,
    pub churn_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub artist_id: String,
    pub metrics: TrainingMetrics,
    pub confusion_matrix: ConfusionMatrix,
    /// Descending by importance
    pub feature_importance: Vec<FeatureImportance>,
    pub dataset_info: ChurnDatasetInfo,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    High,
    Medium,
    Low,
}

impl RiskBand {
    /// `> high` is high, `(medium, high]` is medium, the rest is low
    pub fn from_probability(probability: f64, config: &ChurnConfig) -> Self {
        if probability > config.high_risk_threshold {
            RiskBand::High
        } else if probability > config.medium_risk_threshold {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBand::High => write!(f, "high"),
            RiskBand::Medium => write!(f, "medium"),
            RiskBand::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerRisk {
    pub listener_id: String,
    pub churn_risk_score: f64,
    pub days_since_last_activity: f64,
    pub band: RiskBand,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandSummary {
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPriority {
    Urgent,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionStrategy {
    pub priority: StrategyPriority,
    pub target: String,
    pub action: String,
    pub tactics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub artist_id: String,
    pub high_risk: BandSummary,
    pub medium_risk: BandSummary,
    pub low_risk: BandSummary,
    /// Highest-probability high-risk listeners, descending
    pub top_high_risk: Vec<ListenerRisk>,
    pub listeners: Vec<ListenerRisk>,
    pub recommendations: Vec<RetentionStrategy>,
}

/// A fitted classifier for one artist
#[derive(Debug)]
pub struct TrainedChurnModel {
    forest: BalancedForest,
    config: ChurnConfig,
    pub feature_importance: Vec<FeatureImportance>,
    pub trained_at: DateTime<Utc>,
}

/// Per-artist churn models.
///
/// Training runs outside the map and replaces the artist's entry in one
/// insert, so concurrent calls for different artists never see each other's fit.
#[derive(Debug, Default)]
pub struct ChurnModelRegistry {
    models: DashMap<String, Arc<TrainedChurnModel>>,
}

impl ChurnModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trained(&self, artist_id: &str) -> bool {
        self.models.contains_key(artist_id)
    }

    pub fn model(&self, artist_id: &str) -> Option<Arc<TrainedChurnModel>> {
        self.models.get(artist_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Fit a fresh model for `artist_id`, replacing any earlier fit
    pub fn train(
        &self,
        artist_id: &str,
        rows: &[ChurnFeatureRow],
        config: &ChurnConfig,
    ) -> Result<TrainingReport> {
        if rows.is_empty() {
            return Err(AnalyticsError::InputDataEmpty(
                "No data available for training".to_string(),
            ));
        }

        let labels: Vec<bool> = rows.iter().map(|r| r.is_churned(config)).collect();
        let churned = labels.iter().filter(|&&l| l).count();
        let total = rows.len();
        let churn_rate = format!("{:.1}%", churned as f64 / total as f64 * 100.0);

        if churned < config.min_churned {
            return Err(AnalyticsError::InsufficientTrainingData {
                churned,
                total,
                required: config.min_churned,
                churn_rate,
            });
        }

        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let (train_idx, test_idx) = stratified_split(&labels, config.test_fraction, &mut rng);
        tracing::info!(
            artist_id,
            train = train_idx.len(),
            test = test_idx.len(),
            churned,
            "training churn model"
        );

        let params = ForestParams {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            seed: config.random_seed,
        };
        let select = |idx: &[usize]| -> (Array2<f64>, Vec<bool>) {
            let subset: Vec<&ChurnFeatureRow> = idx.iter().map(|&i| &rows[i]).collect();
            (feature_matrix(&subset), idx.iter().map(|&i| labels[i]).collect())
        };

        let (x_train, y_train) = select(&train_idx);
        let (x_test, y_test) = select(&test_idx);
        let forest = BalancedForest::fit(&x_train, &y_train, params)?;

        let train_accuracy = metrics::accuracy(&y_train, &forest.predict(&x_train)?);
        let test_pred = forest.predict(&x_test)?;
        let test_accuracy = metrics::accuracy(&y_test, &test_pred);
        let roc_auc_score = metrics::roc_auc(&y_test, &forest.predict_proba(&x_test)?);
        let confusion_matrix = ConfusionMatrix::from_predictions(&y_test, &test_pred);

        let cv_scores = cross_validate(rows, &labels, config, params, &mut rng)?;
        let (cv_mean_accuracy, cv_std_accuracy) = metrics::mean_std(&cv_scores);

        let mut feature_importance: Vec<FeatureImportance> = FEATURE_NAMES
            .iter()
            .zip(forest.feature_importance())
            .map(|(name, importance)| FeatureImportance {
                feature: name.to_string(),
                importance,
            })
            .collect();
        feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        let trained_at = Utc::now();
        let model = TrainedChurnModel {
            forest,
            config: config.clone(),
            feature_importance: feature_importance.clone(),
            trained_at,
        };
        self.models.insert(artist_id.to_string(), Arc::new(model));

        Ok(TrainingReport {
            artist_id: artist_id.to_string(),
            metrics: TrainingMetrics {
                train_accuracy,
                test_accuracy,
                cv_mean_accuracy,
                cv_std_accuracy,
                roc_auc_score,
            },
            confusion_matrix,
            feature_importance,
            dataset_info: ChurnDatasetInfo {
                total_listeners: total,
                churned_listeners: churned,
                churn_rate,
            },
            trained_at,
        })
    }

    /// Score listeners with the artist's trained model
    pub fn predict(&self, artist_id: &str, rows: &[ChurnFeatureRow]) -> Result<PredictionReport> {
        let model = self
            .model(artist_id)
            .ok_or_else(|| AnalyticsError::ModelNotTrained(artist_id.to_string()))?;
        if rows.is_empty() {
            return Err(AnalyticsError::InputDataEmpty(
                "No listener data provided".to_string(),
            ));
        }

        let all: Vec<&ChurnFeatureRow> = rows.iter().collect();
        let probabilities = model.forest.predict_proba(&feature_matrix(&all))?;

        let listeners: Vec<ListenerRisk> = rows
            .iter()
            .zip(probabilities)
            .map(|(row, p)| ListenerRisk {
                listener_id: row.listener_id.clone(),
                churn_risk_score: p,
                days_since_last_activity: row.days_since_last_activity,
                band: RiskBand::from_probability(p, &model.config),
            })
            .collect();

        let summary = |band: RiskBand| {
            let count = listeners.iter().filter(|l| l.band == band).count();
            BandSummary {
                count,
                percentage: round1(count as f64 / listeners.len() as f64 * 100.0),
            }
        };
        let high_risk = summary(RiskBand::High);
        let medium_risk = summary(RiskBand::Medium);
        let low_risk = summary(RiskBand::Low);

        let mut top_high_risk: Vec<ListenerRisk> = listeners
            .iter()
            .filter(|l| l.band == RiskBand::High)
            .cloned()
            .collect();
        top_high_risk.sort_by(|a, b| b.churn_risk_score.total_cmp(&a.churn_risk_score));
        top_high_risk.truncate(model.config.top_listeners);

        tracing::info!(
            artist_id,
            high = high_risk.count,
            medium = medium_risk.count,
            low = low_risk.count,
            "churn risk scored"
        );

        Ok(PredictionReport {
            artist_id: artist_id.to_string(),
            high_risk,
            medium_risk,
            low_risk,
            top_high_risk,
            listeners,
            recommendations: retention_strategies(high_risk.count, medium_risk.count),
        })
    }
}

/// Shuffle each class and hold out `test_fraction` of it, keeping one row of
/// every class on the training side
fn stratified_split(
    labels: &[bool],
    test_fraction: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [false, true] {
        let mut idx: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        if idx.is_empty() {
            continue;
        }
        idx.shuffle(rng);
        let n_test = ((idx.len() as f64 * test_fraction).round() as usize).min(idx.len() - 1);
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Accuracy on each held-out fold of a stratified k-fold split
fn cross_validate(
    rows: &[ChurnFeatureRow],
    labels: &[bool],
    config: &ChurnConfig,
    params: ForestParams,
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    let k = config.cv_folds.max(2);
    let mut folds = vec![0usize; labels.len()];
    for class in [false, true] {
        let mut idx: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        idx.shuffle(rng);
        for (position, i) in idx.into_iter().enumerate() {
            folds[i] = position % k;
        }
    }

    let mut scores = Vec::with_capacity(k);
    for fold in 0..k {
        let (held_out, kept): (Vec<usize>, Vec<usize>) =
            (0..rows.len()).partition(|&i| folds[i] == fold);
        if held_out.is_empty() || kept.is_empty() {
            continue;
        }

        let kept_rows: Vec<&ChurnFeatureRow> = kept.iter().map(|&i| &rows[i]).collect();
        let kept_labels: Vec<bool> = kept.iter().map(|&i| labels[i]).collect();
        let held_rows: Vec<&ChurnFeatureRow> = held_out.iter().map(|&i| &rows[i]).collect();
        let held_labels: Vec<bool> = held_out.iter().map(|&i| labels[i]).collect();

        let forest = BalancedForest::fit(&feature_matrix(&kept_rows), &kept_labels, params)?;
        let predicted = forest.predict(&feature_matrix(&held_rows))?;
        scores.push(metrics::accuracy(&held_labels, &predicted));
    }
    tracing::debug!(folds = scores.len(), "cross-validation complete");
    Ok(scores)
}

fn retention_strategies(high: usize, medium: usize) -> Vec<RetentionStrategy> {
    let mut strategies = Vec::new();
    if high > 0 {
        strategies.push(RetentionStrategy {
            priority: StrategyPriority::Urgent,
            target: "High-risk listeners".to_string(),
            action: format!("Immediate re-engagement campaign for {} listeners", high),
            tactics: vec![
                "Send personalized \"We miss you\" message".to_string(),
                "Offer exclusive preview of upcoming release".to_string(),
                "Create custom playlist based on their history".to_string(),
            ],
        });
    }
    if medium > 0 {
        strategies.push(RetentionStrategy {
            priority: StrategyPriority::High,
            target: "Medium-risk listeners".to_string(),
            action: format!("Preventive engagement for {} listeners", medium),
            tactics: vec![
                "Invite to live sessions or Q&A".to_string(),
                "Share behind-the-scenes content".to_string(),
                "Request feedback on new music".to_string(),
            ],
        });
    }
    strategies
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(id: usize, churned: bool) -> ChurnFeatureRow {
        ChurnFeatureRow {
            listener_id: format!("l{}", id),
            engagement_score: if churned { 5.0 } else { 80.0 + (id % 7) as f64 },
            loyalty_score: if churned { 10.0 } else { 40.0 + (id % 5) as f64 },
            days_since_last_activity: if churned { 45.0 + id as f64 } else { (id % 10) as f64 },
            session_count: if churned { 3.0 } else { 20.0 },
            avg_skip_rate: if churned { 60.0 } else { 15.0 },
            trend: if churned { -0.6 } else { 0.1 },
        }
    }

    fn training_rows() -> Vec<ChurnFeatureRow> {
        (0..40).map(|i| row(i, i % 4 == 0)).collect()
    }

    fn fast_config() -> ChurnConfig {
        ChurnConfig {
            n_trees: 10,
            ..ChurnConfig::default()
        }
    }

    fn event(listener: &str, days_ago: i64, streams: f64, now: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            listener_id: listener.to_string(),
            artist_id: "a1".to_string(),
            timestamp: now - Duration::days(days_ago),
            streams,
            skip_rate: 20.0,
        }
    }

    #[test]
    fn test_label_rule() {
        let config = ChurnConfig::default();
        let mut r = row(0, true);
        assert!(r.is_churned(&config));
        r.days_since_last_activity = 30.0;
        assert!(!r.is_churned(&config));
        r.days_since_last_activity = 31.0;
        r.trend = -0.2;
        assert!(!r.is_churned(&config));
    }

    #[test]
    fn test_build_rows_from_history() {
        let now = Utc::now();
        let listeners = vec![
            ListenerRecord {
                listener_id: "l1".to_string(),
                ..Default::default()
            },
            ListenerRecord {
                listener_id: "l2".to_string(),
                ..Default::default()
            },
        ];
        let history = vec![
            event("l1", 90, 10.0, now),
            event("l1", 80, 10.0, now),
            event("l1", 50, 2.0, now),
            event("l1", 40, 1.0, now),
        ];
        let rows = build_churn_rows(&listeners, &history, now);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].days_since_last_activity, 40.0);
        assert_eq!(rows[0].session_count, 4.0);
        assert!((rows[0].avg_skip_rate - 20.0).abs() < 1e-9);
        // (3 - 20) / 21
        assert!((rows[0].trend - (-17.0 / 21.0)).abs() < 1e-9);
        assert!(rows[0].is_churned(&ChurnConfig::default()));

        assert_eq!(rows[1].days_since_last_activity, 0.0);
        assert_eq!(rows[1].session_count, 1.0);
        assert_eq!(rows[1].trend, 0.0);
    }

    #[test]
    fn test_single_event_has_flat_trend() {
        let now = Utc::now();
        let listeners = vec![ListenerRecord {
            listener_id: "l1".to_string(),
            ..Default::default()
        }];
        let rows = build_churn_rows(&listeners, &[event("l1", 3, 50.0, now)], now);
        assert_eq!(rows[0].trend, 0.0);
        assert!(build_churn_rows(&listeners, &[], now).is_empty());
    }

    #[test]
    fn test_predict_before_train_fails_closed() {
        let registry = ChurnModelRegistry::new();
        let result = registry.predict("a1", &training_rows());
        assert!(matches!(result, Err(AnalyticsError::ModelNotTrained(_))));
    }

    #[test]
    fn test_insufficient_churned_rows() {
        let rows: Vec<ChurnFeatureRow> = (0..50).map(|i| row(i, i < 4)).collect();
        match ChurnModelRegistry::new().train("a1", &rows, &fast_config()) {
            Err(AnalyticsError::InsufficientTrainingData {
                churned,
                total,
                churn_rate,
                ..
            }) => {
                assert_eq!(churned, 4);
                assert_eq!(total, 50);
                assert_eq!(churn_rate, "8.0%");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_train_then_predict() {
        let registry = ChurnModelRegistry::new();
        let rows = training_rows();
        let report = registry.train("a1", &rows, &fast_config()).unwrap();

        assert!(registry.is_trained("a1"));
        assert!(!registry.is_trained("a2"));
        assert_eq!(report.dataset_info.churned_listeners, 10);
        assert_eq!(report.dataset_info.churn_rate, "25.0%");
        assert!(report.metrics.test_accuracy > 0.9);
        assert!(report.metrics.roc_auc_score.is_some());
        assert_eq!(report.feature_importance.len(), 6);
        assert!(report
            .feature_importance
            .windows(2)
            .all(|w| w[0].importance >= w[1].importance));

        let cm = report.confusion_matrix;
        assert_eq!(
            cm.true_negatives + cm.false_positives + cm.false_negatives + cm.true_positives,
            8
        );

        let prediction = registry.predict("a1", &rows).unwrap();
        let counted =
            prediction.high_risk.count + prediction.medium_risk.count + prediction.low_risk.count;
        assert_eq!(counted, rows.len());
        assert!(prediction.high_risk.count >= 5);
        assert!(prediction.top_high_risk.len() <= 10);
        assert!(prediction
            .top_high_risk
            .windows(2)
            .all(|w| w[0].churn_risk_score >= w[1].churn_risk_score));
        assert_eq!(prediction.recommendations[0].priority, StrategyPriority::Urgent);

        assert!(matches!(
            registry.predict("a1", &[]),
            Err(AnalyticsError::InputDataEmpty(_))
        ));
    }

    #[test]
    fn test_artists_do_not_overwrite_each_other() {
        let registry = ChurnModelRegistry::new();
        registry.train("a1", &training_rows(), &fast_config()).unwrap();
        let first = registry.model("a1").unwrap().trained_at;
        registry.train("a2", &training_rows(), &fast_config()).unwrap();
        assert_eq!(registry.model("a1").unwrap().trained_at, first);
        assert!(registry.is_trained("a2"));
    }

    #[test]
    fn test_risk_bands() {
        let config = ChurnConfig::default();
        assert_eq!(RiskBand::from_probability(0.71, &config), RiskBand::High);
        assert_eq!(RiskBand::from_probability(0.7, &config), RiskBand::Medium);
        assert_eq!(RiskBand::from_probability(0.41, &config), RiskBand::Medium);
        assert_eq!(RiskBand::from_probability(0.4, &config), RiskBand::Low);
    }

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        let labels: Vec<bool> = (0..40).map(|i| i % 4 == 0).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let (train, test) = stratified_split(&labels, 0.2, &mut rng);
        assert_eq!(train.len() + test.len(), 40);
        assert_eq!(test.iter().filter(|&&i| labels[i]).count(), 2);
        assert_eq!(test.iter().filter(|&&i| !labels[i]).count(), 6);
    }

    #[test]
    fn test_retention_strategies() {
        let strategies = retention_strategies(3, 0);
        assert_eq!(strategies.len(), 1);
        assert_eq!(
            strategies[0].action,
            "Immediate re-engagement campaign for 3 listeners"
        );
        assert!(retention_strategies(0, 0).is_empty());
        assert_eq!(retention_strategies(0, 2)[0].priority, StrategyPriority::High);
    }
}
