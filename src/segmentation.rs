//! K-Means listener segmentation into batch-relative Superfan / Casual / One-time tiers

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SegmentationConfig;
use crate::data::{ListenerRecord, StandardScaler};
use crate::error::{AnalyticsError, Result};
use crate::features::{engineer_features, AudienceInsights, EngineeredFeatures, FeatureFormula};
use crate::metrics::{self, euclidean_distance};

/// Behavioral tier of a listener, relative to the batch it was scored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Superfan,
    Casual,
    OneTime,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Superfan, Segment::Casual, Segment::OneTime];
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Segment::Superfan => "Superfans",
            Segment::Casual => "Casual Listeners",
            Segment::OneTime => "One-time Listeners",
        };
        f.write_str(label)
    }
}

/// Fitted k-means partition
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters actually formed
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl KMeansModel {
    /// Nearest-centroid cluster for a standardized feature vector
    pub fn predict(&self, features: &Array1<f64>) -> Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(AnalyticsError::Clustering(format!(
                "Feature vector must have exactly {} dimensions",
                self.centroids.ncols()
            )));
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;
        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(&features.view(), &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }
        Ok(closest_cluster)
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Fit k-means on standardized features.
///
/// Runs `kmeans_runs` seeded k-means++ initializations and keeps the lowest
/// inertia. When the batch has fewer distinct points than clusters each
/// distinct point becomes its own cluster instead of failing.
pub fn fit_kmeans(features: &Array2<f64>, config: &SegmentationConfig) -> Result<KMeansModel> {
    let n_samples = features.nrows();
    if n_samples == 0 {
        return Err(AnalyticsError::InputDataEmpty(
            "No listener data available for clustering".to_string(),
        ));
    }

    let distinct = distinct_rows(features);
    if distinct.len() < config.n_clusters {
        tracing::debug!(
            distinct = distinct.len(),
            requested = config.n_clusters,
            "fewer distinct listeners than clusters, assigning one cluster per distinct point"
        );
        return Ok(degenerate_partition(features, &distinct));
    }

    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let rng = StdRng::seed_from_u64(config.random_seed);
    let model = KMeans::params_with(config.n_clusters, rng, L2Dist)
        .n_runs(config.kmeans_runs)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .fit(&dataset)
        .map_err(|e| AnalyticsError::Clustering(e.to_string()))?;

    let labels: Array1<usize> = model.predict(&dataset);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    Ok(KMeansModel {
        n_clusters: config.n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Index of the first occurrence of every distinct row
fn distinct_rows(features: &Array2<f64>) -> Vec<usize> {
    let mut seen: Vec<usize> = Vec::new();
    for (i, row) in features.outer_iter().enumerate() {
        if !seen.iter().any(|&j| features.row(j) == row) {
            seen.push(i);
        }
    }
    seen
}

fn degenerate_partition(features: &Array2<f64>, distinct: &[usize]) -> KMeansModel {
    let centroids = features.select(ndarray::Axis(0), distinct);
    let labels = features
        .outer_iter()
        .map(|row| {
            distinct
                .iter()
                .position(|&j| features.row(j) == row)
                .unwrap_or(0)
        })
        .collect::<Array1<usize>>();

    KMeansModel {
        n_clusters: distinct.len(),
        labels,
        centroids,
        inertia: 0.0,
    }
}

/// Within-cluster sum of squares
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;
    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            inertia += metrics::squared_distance(&features.row(i), &centroids.row(cluster));
        }
    }
    inertia
}

/// Linear-interpolated quantile, matching the pandas default
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

/// Label clusters by ranking their mean engagement against the 66th/33rd
/// percentile of all cluster means
pub fn label_clusters(cluster_engagement: &[f64]) -> Vec<Segment> {
    let q66 = quantile(cluster_engagement, 0.66);
    let q33 = quantile(cluster_engagement, 0.33);
    cluster_engagement
        .iter()
        .map(|&avg| {
            if avg > q66 {
                Segment::Superfan
            } else if avg > q33 {
                Segment::Casual
            } else {
                Segment::OneTime
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerSegment {
    pub listener_id: String,
    pub cluster: usize,
    pub segment: Segment,
    pub features: EngineeredFeatures,
}

/// Per-cluster means in raw (unscaled) units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub cluster: usize,
    pub segment: Segment,
    pub engagement_score: f64,
    pub loyalty_score: f64,
    pub total_streams: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCounts {
    pub superfans: usize,
    pub casual: usize,
    pub onetime: usize,
}

impl SegmentCounts {
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> Self {
        let mut counts = SegmentCounts::default();
        for segment in segments {
            match segment {
                Segment::Superfan => counts.superfans += 1,
                Segment::Casual => counts.casual += 1,
                Segment::OneTime => counts.onetime += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.superfans + self.casual + self.onetime
    }

    pub fn get(&self, segment: Segment) -> usize {
        match segment {
            Segment::Superfan => self.superfans,
            Segment::Casual => self.casual,
            Segment::OneTime => self.onetime,
        }
    }

    /// Fraction of the batch in the segment
    pub fn fraction(&self, segment: Segment) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.get(segment) as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub listeners: Vec<ListenerSegment>,
    pub cluster_stats: Vec<ClusterStats>,
    pub segment_counts: SegmentCounts,
    /// None when fewer than two clusters formed
    pub silhouette_score: Option<f64>,
    pub inertia: f64,
    pub insights: AudienceInsights,
}

/// Stateless primary segmentation; every call standardizes and clusters its own batch
#[derive(Debug, Clone, Default)]
pub struct SegmentationEngine {
    config: SegmentationConfig,
}

impl SegmentationEngine {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn segment(&self, listeners: &[ListenerRecord]) -> Result<SegmentationResult> {
        if listeners.is_empty() {
            return Err(AnalyticsError::InputDataEmpty(
                "No listener data available for clustering".to_string(),
            ));
        }

        let engineered = engineer_features(listeners, FeatureFormula::Segmentation);
        let raw = Array2::from_shape_fn((engineered.len(), 5), |(i, j)| {
            let row = &engineered[i];
            match j {
                0 => row.features.engagement_score,
                1 => row.features.loyalty_score,
                2 => row.record.total_streams,
                3 => row.record.saves,
                _ => row.record.shares,
            }
        });
        let (_, scaled) = StandardScaler::fit_transform(raw);

        let model = fit_kmeans(&scaled, &self.config)?;

        // Mean raw scores per non-empty cluster
        let sizes = model.cluster_sizes();
        let mut sums = vec![(0.0, 0.0, 0.0); model.n_clusters];
        for (row, &cluster) in engineered.iter().zip(model.labels.iter()) {
            sums[cluster].0 += row.features.engagement_score;
            sums[cluster].1 += row.features.loyalty_score;
            sums[cluster].2 += row.record.total_streams;
        }
        let occupied: Vec<usize> = (0..model.n_clusters).filter(|&c| sizes[c] > 0).collect();
        let mean_engagement: Vec<f64> = occupied
            .iter()
            .map(|&c| sums[c].0 / sizes[c] as f64)
            .collect();
        let segments = label_clusters(&mean_engagement);

        let mut cluster_segment = vec![Segment::OneTime; model.n_clusters];
        let mut cluster_stats = Vec::with_capacity(occupied.len());
        for (idx, &c) in occupied.iter().enumerate() {
            cluster_segment[c] = segments[idx];
            let n = sizes[c] as f64;
            cluster_stats.push(ClusterStats {
                cluster: c,
                segment: segments[idx],
                engagement_score: round2(sums[c].0 / n),
                loyalty_score: round2(sums[c].1 / n),
                total_streams: round2(sums[c].2 / n),
                count: sizes[c],
            });
        }

        let assigned: Vec<ListenerSegment> = engineered
            .iter()
            .zip(model.labels.iter())
            .map(|(row, &cluster)| ListenerSegment {
                listener_id: row.record.listener_id.clone(),
                cluster,
                segment: cluster_segment[cluster],
                features: row.features,
            })
            .collect();

        let silhouette_score = if occupied.len() >= 2 {
            let labels: Vec<usize> = model.labels.to_vec();
            let labels = densify(&labels, model.n_clusters);
            Some(metrics::silhouette_score(&scaled, &labels, occupied.len()))
        } else {
            None
        };

        let segment_counts = SegmentCounts::from_segments(assigned.iter().map(|l| &l.segment));
        tracing::info!(
            listeners = listeners.len(),
            superfans = segment_counts.superfans,
            casual = segment_counts.casual,
            onetime = segment_counts.onetime,
            "listener segmentation complete"
        );

        Ok(SegmentationResult {
            listeners: assigned,
            cluster_stats,
            segment_counts,
            silhouette_score,
            inertia: model.inertia,
            insights: crate::features::audience_insights(listeners),
        })
    }
}

/// Renumber labels so only occupied clusters appear, as 0..k
fn densify(labels: &[usize], n_clusters: usize) -> Vec<usize> {
    let mut remap = vec![usize::MAX; n_clusters];
    let mut next = 0;
    labels
        .iter()
        .map(|&l| {
            if remap[l] == usize::MAX {
                remap[l] = next;
                next += 1;
            }
            remap[l]
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(id: usize, streams: f64, saves: f64, sessions: f64) -> ListenerRecord {
        ListenerRecord {
            listener_id: format!("l{}", id),
            artist_id: "a1".to_string(),
            total_streams: streams,
            saves,
            shares: saves / 2.0,
            avg_completion_rate: 0.6,
            skip_rate: 0.3,
            session_count: sessions,
            avg_session_duration: 300.0,
        }
    }

    /// Three well separated behavioral groups
    fn tiered_batch() -> Vec<ListenerRecord> {
        let mut batch = Vec::new();
        for i in 0..8 {
            batch.push(listener(i, 500.0 + i as f64 * 5.0, 60.0, 80.0));
        }
        for i in 8..20 {
            batch.push(listener(i, 120.0 + i as f64 * 2.0, 12.0, 25.0));
        }
        for i in 20..35 {
            batch.push(listener(i, 5.0 + (i % 3) as f64, 0.0, 1.0));
        }
        batch
    }

    #[test]
    fn test_quantile_interpolation() {
        let values = [1.0, 2.0, 4.0];
        assert!((quantile(&values, 0.66) - 2.64).abs() < 1e-9);
        assert!((quantile(&values, 0.33) - 1.66).abs() < 1e-9);
        assert_eq!(quantile(&[7.0], 0.5), 7.0);
    }

    #[test]
    fn test_label_clusters_ranks_three_means() {
        let labels = label_clusters(&[10.0, 300.0, 80.0]);
        assert_eq!(labels, vec![Segment::OneTime, Segment::Superfan, Segment::Casual]);
    }

    #[test]
    fn test_segments_partition_whole_batch() {
        let batch = tiered_batch();
        let result = SegmentationEngine::default().segment(&batch).unwrap();

        assert_eq!(result.listeners.len(), batch.len());
        assert_eq!(result.segment_counts.total(), batch.len());
        let stats_total: usize = result.cluster_stats.iter().map(|s| s.count).sum();
        assert_eq!(stats_total, batch.len());
    }

    #[test]
    fn test_tiers_follow_engagement() {
        let batch = tiered_batch();
        let result = SegmentationEngine::default().segment(&batch).unwrap();

        let segment_of = |id: &str| {
            result
                .listeners
                .iter()
                .find(|l| l.listener_id == id)
                .map(|l| l.segment)
                .unwrap()
        };
        assert_eq!(segment_of("l0"), Segment::Superfan);
        assert_eq!(segment_of("l10"), Segment::Casual);
        assert_eq!(segment_of("l30"), Segment::OneTime);
        assert_eq!(result.segment_counts.superfans, 8);
        assert!(result.silhouette_score.unwrap() > 0.5);
    }

    #[test]
    fn test_empty_batch_is_error() {
        let result = SegmentationEngine::default().segment(&[]);
        assert!(matches!(result, Err(AnalyticsError::InputDataEmpty(_))));
    }

    #[test]
    fn test_tiny_batch_does_not_fail() {
        let batch = vec![listener(0, 10.0, 1.0, 2.0), listener(1, 400.0, 30.0, 40.0)];
        let result = SegmentationEngine::default().segment(&batch).unwrap();
        assert_eq!(result.segment_counts.total(), 2);
        assert_eq!(result.segment_counts.superfans, 1);
        assert_eq!(result.segment_counts.onetime, 1);
    }

    #[test]
    fn test_identical_listeners_single_cluster() {
        let batch: Vec<ListenerRecord> = (0..5)
            .map(|i| {
                let mut l = listener(0, 50.0, 5.0, 5.0);
                l.listener_id = format!("same{}", i);
                l
            })
            .collect();
        let result = SegmentationEngine::default().segment(&batch).unwrap();
        assert_eq!(result.segment_counts.total(), 5);
        assert_eq!(result.silhouette_score, None);
        assert_eq!(result.cluster_stats.len(), 1);
    }

    #[test]
    fn test_predict_nearest_centroid() {
        let features = Array2::from_shape_vec(
            (6, 2),
            vec![0.0, 0.0, 0.1, 0.1, 5.0, 5.0, 5.1, 5.1, 10.0, 0.0, 10.1, 0.1],
        )
        .unwrap();
        let model = fit_kmeans(&features, &SegmentationConfig::default()).unwrap();
        assert_eq!(model.cluster_sizes().iter().sum::<usize>(), 6);
        assert!(model.inertia >= 0.0 && model.inertia < 0.1);

        let cluster = model.predict(&Array1::from(vec![5.05, 5.05])).unwrap();
        assert_eq!(cluster, model.labels[2]);
        assert!(model.predict(&Array1::from(vec![1.0])).is_err());
    }
}
