//! Cluster-quality and classifier evaluation metrics

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// External cluster-quality scores, or the marker used when fewer than two
/// non-noise clusters exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QualityMetrics {
    Scored {
        /// Cohesion/separation, higher is better, in [-1, 1]
        silhouette_score: f64,
        /// Compactness, lower is better
        davies_bouldin_score: f64,
        /// Variance ratio, higher is better
        calinski_harabasz_score: f64,
    },
    InsufficientClusters {
        note: String,
    },
}

impl QualityMetrics {
    pub fn silhouette(&self) -> Option<f64> {
        match self {
            QualityMetrics::Scored {
                silhouette_score, ..
            } => Some(*silhouette_score),
            QualityMetrics::InsufficientClusters { .. } => None,
        }
    }
}

/// Score a labelling; `None` labels are noise and excluded from every metric
pub fn quality_metrics(features: &Array2<f64>, labels: &[Option<usize>]) -> QualityMetrics {
    let (points, dense_labels, n_clusters) = non_noise(features, labels);
    if n_clusters < 2 {
        return QualityMetrics::InsufficientClusters {
            note: "Insufficient clusters for metric calculation".to_string(),
        };
    }

    QualityMetrics::Scored {
        silhouette_score: silhouette_score(&points, &dense_labels, n_clusters),
        davies_bouldin_score: davies_bouldin_score(&points, &dense_labels, n_clusters),
        calinski_harabasz_score: calinski_harabasz_score(&points, &dense_labels, n_clusters),
    }
}

/// Drop noise rows and relabel the remaining clusters as 0..k
fn non_noise(features: &Array2<f64>, labels: &[Option<usize>]) -> (Array2<f64>, Vec<usize>, usize) {
    let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
    let mut rows = Vec::new();
    let mut dense = Vec::new();

    for (i, label) in labels.iter().enumerate() {
        if let Some(label) = label {
            let next = remap.len();
            let id = *remap.entry(*label).or_insert(next);
            rows.push(i);
            dense.push(id);
        }
    }

    let points = features.select(ndarray::Axis(0), &rows);
    (points, dense, remap.len())
}

/// Mean silhouette coefficient over every point.
///
/// Points alone in their cluster contribute 0.
pub fn silhouette_score(features: &Array2<f64>, labels: &[usize], n_clusters: usize) -> f64 {
    let n_samples = features.nrows();
    if n_samples < 2 || n_clusters < 2 {
        return 0.0;
    }

    let mut cluster_sizes = vec![0usize; n_clusters];
    for &label in labels {
        cluster_sizes[label] += 1;
    }

    let mut silhouette_sum = 0.0;
    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];
        if cluster_sizes[cluster_label] <= 1 {
            continue;
        }

        let mut distance_sums = vec![0.0; n_clusters];
        for j in 0..n_samples {
            if i == j {
                continue;
            }
            distance_sums[labels[j]] += euclidean_distance(&point, &features.row(j));
        }

        // a(i): mean distance to the rest of its own cluster
        let a_i = distance_sums[cluster_label] / (cluster_sizes[cluster_label] - 1) as f64;

        // b(i): smallest mean distance to another cluster
        let b_i = (0..n_clusters)
            .filter(|&c| c != cluster_label && cluster_sizes[c] > 0)
            .map(|c| distance_sums[c] / cluster_sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
            0.0
        } else {
            (b_i - a_i) / a_i.max(b_i)
        };
        silhouette_sum += silhouette_i;
    }

    silhouette_sum / n_samples as f64
}

pub fn davies_bouldin_score(features: &Array2<f64>, labels: &[usize], n_clusters: usize) -> f64 {
    let centroids = cluster_centroids(features, labels, n_clusters);

    let mut scatter = vec![0.0; n_clusters];
    let mut counts = vec![0usize; n_clusters];
    for (i, &label) in labels.iter().enumerate() {
        scatter[label] += euclidean_distance(&features.row(i), &centroids.row(label));
        counts[label] += 1;
    }
    for (s, &count) in scatter.iter_mut().zip(counts.iter()) {
        if count > 0 {
            *s /= count as f64;
        }
    }

    let mut total = 0.0;
    for i in 0..n_clusters {
        let mut worst: f64 = 0.0;
        for j in 0..n_clusters {
            if i == j {
                continue;
            }
            let separation = euclidean_distance(&centroids.row(i), &centroids.row(j));
            // Coincident centroids contribute nothing
            if separation > 0.0 {
                worst = worst.max((scatter[i] + scatter[j]) / separation);
            }
        }
        total += worst;
    }
    total / n_clusters as f64
}

pub fn calinski_harabasz_score(features: &Array2<f64>, labels: &[usize], n_clusters: usize) -> f64 {
    let n_samples = features.nrows();
    let centroids = cluster_centroids(features, labels, n_clusters);
    let overall = features
        .mean_axis(ndarray::Axis(0))
        .unwrap_or_else(|| Array1::zeros(features.ncols()));

    let mut counts = vec![0usize; n_clusters];
    let mut within = 0.0;
    for (i, &label) in labels.iter().enumerate() {
        counts[label] += 1;
        within += squared_distance(&features.row(i), &centroids.row(label));
    }

    let between: f64 = (0..n_clusters)
        .map(|c| counts[c] as f64 * squared_distance(&centroids.row(c), &overall.view()))
        .sum();

    if within == 0.0 {
        return 1.0;
    }
    between * (n_samples - n_clusters) as f64 / (within * (n_clusters - 1) as f64)
}

pub fn cluster_centroids(
    features: &Array2<f64>,
    labels: &[usize],
    n_clusters: usize,
) -> Array2<f64> {
    let mut centroids = Array2::zeros((n_clusters, features.ncols()));
    let mut counts = vec![0usize; n_clusters];
    for (i, &label) in labels.iter().enumerate() {
        let mut row = centroids.row_mut(label);
        row += &features.row(i);
        counts[label] += 1;
    }
    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            let mut row = centroids.row_mut(c);
            row /= count as f64;
        }
    }
    centroids
}

pub fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    squared_distance(point1, point2).sqrt()
}

pub fn squared_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
}

/// Binary confusion matrix, positive class = churned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[bool], y_pred: &[bool]) -> Self {
        let mut matrix = ConfusionMatrix::default();
        for (&actual, &predicted) in y_true.iter().zip(y_pred.iter()) {
            match (actual, predicted) {
                (false, false) => matrix.true_negatives += 1,
                (false, true) => matrix.false_positives += 1,
                (true, false) => matrix.false_negatives += 1,
                (true, true) => matrix.true_positives += 1,
            }
        }
        matrix
    }
}

pub fn accuracy(y_true: &[bool], y_pred: &[bool]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(a, b)| a == b)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Area under the ROC curve via the rank-sum statistic, ties counted as half.
///
/// Undefined (None) unless both classes are present.
pub fn roc_auc(y_true: &[bool], scores: &[f64]) -> Option<f64> {
    let positives: Vec<f64> = y_true
        .iter()
        .zip(scores.iter())
        .filter(|(y, _)| **y)
        .map(|(_, s)| *s)
        .collect();
    let negatives: Vec<f64> = y_true
        .iter()
        .zip(scores.iter())
        .filter(|(y, _)| !**y)
        .map(|(_, s)| *s)
        .collect();
    if positives.is_empty() || negatives.is_empty() {
        return None;
    }

    let mut wins = 0.0;
    for p in &positives {
        for n in &negatives {
            if p > n {
                wins += 1.0;
            } else if p == n {
                wins += 0.5;
            }
        }
    }
    Some(wins / (positives.len() * negatives.len()) as f64)
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> (Array2<f64>, Vec<usize>) {
        let features = Array2::from_shape_vec(
            (6, 2),
            vec![
                0.0, 0.0, 0.1, 0.0, 0.0, 0.1, //
                5.0, 5.0, 5.1, 5.0, 5.0, 5.1,
            ],
        )
        .unwrap();
        (features, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_well_separated_scores() {
        let (features, labels) = two_blobs();
        let silhouette = silhouette_score(&features, &labels, 2);
        let db = davies_bouldin_score(&features, &labels, 2);
        let ch = calinski_harabasz_score(&features, &labels, 2);

        assert!(silhouette > 0.9, "silhouette {}", silhouette);
        assert!(db < 0.1, "davies-bouldin {}", db);
        assert!(ch > 100.0, "calinski-harabasz {}", ch);
    }

    #[test]
    fn test_singleton_cluster_contributes_zero() {
        let features = Array2::from_shape_vec((3, 1), vec![0.0, 0.1, 10.0]).unwrap();
        let score = silhouette_score(&features, &[0, 0, 1], 2);
        // two cohesive points score ~1, the singleton 0
        assert!(score > 0.6 && score < 0.67);
    }

    #[test]
    fn test_all_noise_is_insufficient() {
        let (features, _) = two_blobs();
        let labels = vec![None; 6];
        assert!(matches!(
            quality_metrics(&features, &labels),
            QualityMetrics::InsufficientClusters { .. }
        ));
    }

    #[test]
    fn test_noise_excluded_from_metrics() {
        let (features, labels) = two_blobs();
        let mut with_noise: Vec<Option<usize>> = labels.iter().map(|&l| Some(l + 3)).collect();
        with_noise[0] = None;
        let metrics = quality_metrics(&features, &with_noise);
        assert!(metrics.silhouette().unwrap() > 0.9);
    }

    #[test]
    fn test_single_cluster_is_insufficient() {
        let (features, _) = two_blobs();
        let labels = vec![Some(0); 6];
        assert_eq!(quality_metrics(&features, &labels).silhouette(), None);
    }

    #[test]
    fn test_confusion_and_accuracy() {
        let y_true = [true, true, false, false, false];
        let y_pred = [true, false, false, true, false];
        let cm = ConfusionMatrix::from_predictions(&y_true, &y_pred);
        assert_eq!(cm.true_positives, 1);
        assert_eq!(cm.false_negatives, 1);
        assert_eq!(cm.false_positives, 1);
        assert_eq!(cm.true_negatives, 2);
        assert!((accuracy(&y_true, &y_pred) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc() {
        assert_eq!(roc_auc(&[true, false], &[0.9, 0.1]), Some(1.0));
        assert_eq!(roc_auc(&[true, false], &[0.1, 0.9]), Some(0.0));
        assert_eq!(roc_auc(&[true, false], &[0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[true, true], &[0.5, 0.6]), None);
    }

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(std, 2.0);
    }
}
