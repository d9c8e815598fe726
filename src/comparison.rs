//! Clustering comparison: k-means against Gaussian mixture, Ward agglomerative
//! and DBSCAN on the standardized engagement/loyalty plane.
//!
//! The comparison is diagnostic. Downstream consumers always use the primary
//! k-means segmentation, whatever scores best here.

use linfa::prelude::*;
use linfa_clustering::{Dbscan, GaussianMixtureModel};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SegmentationConfig;
use crate::data::{ListenerRecord, StandardScaler};
use crate::error::{AnalyticsError, Result};
use crate::features::{engineer_features, FeatureFormula};
use crate::metrics::{euclidean_distance, quality_metrics, QualityMetrics};
use crate::outcome::AnalysisOutcome;
use crate::segmentation::fit_kmeans;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    KMeans,
    GaussianMixture,
    Hierarchical,
    Dbscan,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::KMeans,
        Algorithm::GaussianMixture,
        Algorithm::Hierarchical,
        Algorithm::Dbscan,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Algorithm::KMeans => "K-Means (Primary)",
            Algorithm::GaussianMixture => "Gaussian Mixture Model",
            Algorithm::Hierarchical => "Hierarchical Clustering",
            Algorithm::Dbscan => "DBSCAN (Density-Based)",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Algorithm-specific fit details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Diagnostics {
    KMeans {
        centers: Vec<Vec<f64>>,
        inertia: f64,
    },
    GaussianMixture {
        weights: Vec<f64>,
        means: Vec<Vec<f64>>,
        /// Per-listener component membership probabilities
        probabilities: Vec<Vec<f64>>,
        bic: f64,
        aic: f64,
    },
    Hierarchical {
        n_leaves: usize,
        /// Ward distance of each merge, in merge order
        merge_heights: Vec<f64>,
    },
    Dbscan {
        n_clusters_found: usize,
        n_noise_points: usize,
        core_samples: Vec<usize>,
    },
}

/// One fitted algorithm; `None` labels are DBSCAN noise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModelResult {
    pub algorithm: Algorithm,
    pub name: String,
    pub labels: Vec<Option<usize>>,
    pub diagnostics: Diagnostics,
    pub metrics: QualityMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub algorithm: Algorithm,
    pub outcome: AnalysisOutcome<ClusterModelResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModel {
    pub algorithm: Algorithm,
    pub silhouette_score: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub n_listeners: usize,
    pub listener_ids: Vec<String>,
    pub models: Vec<ModelEntry>,
    pub best_model: Option<BestModel>,
    /// Always k-means; the best model is reported but never substituted
    pub primary_algorithm: Algorithm,
}

impl ComparisonResult {
    pub fn model(&self, algorithm: Algorithm) -> Option<&ClusterModelResult> {
        self.models
            .iter()
            .find(|m| m.algorithm == algorithm)
            .and_then(|m| m.outcome.completed())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusteringComparison {
    config: SegmentationConfig,
}

impl ClusteringComparison {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn compare(&self, listeners: &[ListenerRecord]) -> Result<ComparisonResult> {
        if listeners.is_empty() {
            return Err(AnalyticsError::InputDataEmpty(
                "No listener data found for this artist".to_string(),
            ));
        }

        let engineered = engineer_features(listeners, FeatureFormula::Advanced);
        let raw = Array2::from_shape_fn((engineered.len(), 2), |(i, j)| {
            if j == 0 {
                engineered[i].features.engagement_score
            } else {
                engineered[i].features.loyalty_score
            }
        });
        let ids = listeners.iter().map(|l| l.listener_id.clone()).collect();
        self.compare_features(ids, raw)
    }

    /// Compare all algorithms on raw `[engagement, loyalty]` rows, one per id
    pub fn compare_features(&self, ids: Vec<String>, raw: Array2<f64>) -> Result<ComparisonResult> {
        if raw.nrows() == 0 {
            return Err(AnalyticsError::InputDataEmpty(
                "No listener data found for this artist".to_string(),
            ));
        }
        let (_, scaled) = StandardScaler::fit_transform(raw);

        let models: Vec<ModelEntry> = Algorithm::ALL
            .iter()
            .map(|&algorithm| {
                tracing::debug!(%algorithm, "fitting clustering model");
                let outcome = self.fit_model(algorithm, &scaled).into();
                ModelEntry { algorithm, outcome }
            })
            .collect();

        let best_model = best_model(&models);
        tracing::info!(
            listeners = scaled.nrows(),
            best = ?best_model.as_ref().map(|b| b.algorithm),
            "clustering comparison complete"
        );

        Ok(ComparisonResult {
            n_listeners: scaled.nrows(),
            listener_ids: ids,
            models,
            best_model,
            primary_algorithm: Algorithm::KMeans,
        })
    }

    fn fit_model(
        &self,
        algorithm: Algorithm,
        features: &Array2<f64>,
    ) -> Result<ClusterModelResult> {
        let (labels, diagnostics) = match algorithm {
            Algorithm::KMeans => self.fit_kmeans(features)?,
            Algorithm::GaussianMixture => self.fit_gmm(features)?,
            Algorithm::Hierarchical => self.fit_hierarchical(features)?,
            Algorithm::Dbscan => self.fit_dbscan(features)?,
        };
        let metrics = quality_metrics(features, &labels);

        Ok(ClusterModelResult {
            algorithm,
            name: algorithm.display_name().to_string(),
            labels,
            diagnostics,
            metrics,
        })
    }

    fn fit_kmeans(&self, features: &Array2<f64>) -> Result<(Vec<Option<usize>>, Diagnostics)> {
        let model = fit_kmeans(features, &self.config)?;
        let labels = model.labels.iter().map(|&l| Some(l)).collect();
        let centers = model.centroids.outer_iter().map(|c| c.to_vec()).collect();
        Ok((
            labels,
            Diagnostics::KMeans {
                centers,
                inertia: model.inertia,
            },
        ))
    }

    fn fit_gmm(&self, features: &Array2<f64>) -> Result<(Vec<Option<usize>>, Diagnostics)> {
        let n_components = self.config.n_clusters;
        if features.nrows() < n_components {
            return Err(AnalyticsError::Clustering(format!(
                "Gaussian mixture needs at least {} listeners",
                n_components
            )));
        }

        let dataset = DatasetBase::from(features.clone());
        let rng = StdRng::seed_from_u64(self.config.random_seed);
        let gmm = GaussianMixtureModel::params(n_components)
            .n_runs(1)
            .tolerance(1e-3)
            .max_n_iterations(100)
            .with_rng(rng)
            .fit(&dataset)
            .map_err(|e| AnalyticsError::Clustering(e.to_string()))?;

        let weights = gmm.weights().to_owned();
        let means = gmm.means().to_owned();
        let covariances = gmm.covariances().to_owned();

        let (probabilities, log_likelihood) =
            mixture_responsibilities(features, &weights, &means, &covariances)?;

        let labels = probabilities
            .outer_iter()
            .map(|row| Some(argmax(&row)))
            .collect();

        let n = features.nrows() as f64;
        let d = features.ncols() as f64;
        let k = n_components as f64;
        // means + full covariances + free weights
        let n_params = k * d + k * d * (d + 1.0) / 2.0 + (k - 1.0);

        Ok((
            labels,
            Diagnostics::GaussianMixture {
                weights: weights.to_vec(),
                means: means.outer_iter().map(|m| m.to_vec()).collect(),
                probabilities: probabilities.outer_iter().map(|p| p.to_vec()).collect(),
                bic: -2.0 * log_likelihood + n_params * n.ln(),
                aic: -2.0 * log_likelihood + 2.0 * n_params,
            },
        ))
    }

    fn fit_hierarchical(
        &self,
        features: &Array2<f64>,
    ) -> Result<(Vec<Option<usize>>, Diagnostics)> {
        let n = features.nrows();
        let k = self.config.n_clusters;
        if n < k || n < 2 {
            return Err(AnalyticsError::Clustering(format!(
                "Hierarchical clustering needs at least {} listeners",
                k.max(2)
            )));
        }

        // Ward linkage with the Lance-Williams update on pairwise distances
        let mut dist = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in i + 1..n {
                let d = euclidean_distance(&features.row(i), &features.row(j));
                dist[[i, j]] = d;
                dist[[j, i]] = d;
            }
        }
        let mut sizes = vec![1usize; n];
        let mut active: Vec<usize> = (0..n).collect();
        let mut parent: Vec<usize> = (0..n).collect();
        let mut merge_heights = Vec::with_capacity(n - k);

        while active.len() > k {
            let mut best = (0, 1, f64::INFINITY);
            for (ai, &i) in active.iter().enumerate() {
                for &j in &active[ai + 1..] {
                    if dist[[i, j]] < best.2 {
                        best = (i, j, dist[[i, j]]);
                    }
                }
            }
            let (i, j, d_ij) = best;
            let (n_i, n_j) = (sizes[i] as f64, sizes[j] as f64);
            for &m in active.iter().filter(|&&m| m != i && m != j) {
                let n_m = sizes[m] as f64;
                let updated = ((n_i + n_m) * dist[[i, m]].powi(2)
                    + (n_j + n_m) * dist[[j, m]].powi(2)
                    - n_m * d_ij.powi(2))
                    / (n_i + n_j + n_m);
                let updated = updated.max(0.0).sqrt();
                dist[[i, m]] = updated;
                dist[[m, i]] = updated;
            }
            sizes[i] += sizes[j];
            parent[j] = i;
            merge_heights.push(d_ij);
            active.retain(|&c| c != j);
        }

        let mut roots: Vec<usize> = Vec::new();
        let labels = (0..n)
            .map(|obs| {
                let root = find_root(&mut parent, obs);
                let label = match roots.iter().position(|&r| r == root) {
                    Some(idx) => idx,
                    None => {
                        roots.push(root);
                        roots.len() - 1
                    }
                };
                Some(label)
            })
            .collect();

        Ok((
            labels,
            Diagnostics::Hierarchical {
                n_leaves: n,
                merge_heights,
            },
        ))
    }

    fn fit_dbscan(&self, features: &Array2<f64>) -> Result<(Vec<Option<usize>>, Diagnostics)> {
        let memberships: Array1<Option<usize>> = Dbscan::params(self.config.dbscan_min_samples)
            .tolerance(self.config.dbscan_eps)
            .transform(features)
            .map_err(|e| AnalyticsError::Clustering(e.to_string()))?;

        let labels: Vec<Option<usize>> = memberships.to_vec();
        let mut found: Vec<usize> = labels.iter().flatten().copied().collect();
        found.sort_unstable();
        found.dedup();
        let n_noise_points = labels.iter().filter(|l| l.is_none()).count();

        Ok((
            labels,
            Diagnostics::Dbscan {
                n_clusters_found: found.len(),
                n_noise_points,
                core_samples: core_samples(
                    features,
                    self.config.dbscan_eps,
                    self.config.dbscan_min_samples,
                ),
            },
        ))
    }
}

fn find_root(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

/// Points with at least `min_samples` neighbours within `eps`, themselves included
fn core_samples(features: &Array2<f64>, eps: f64, min_samples: usize) -> Vec<usize> {
    (0..features.nrows())
        .filter(|&i| {
            let neighbours = features
                .outer_iter()
                .filter(|other| euclidean_distance(&features.row(i), other) <= eps)
                .count();
            neighbours >= min_samples
        })
        .collect()
}

fn argmax(values: &ArrayView1<f64>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

/// Posterior component probabilities per point and the total log-likelihood
fn mixture_responsibilities(
    features: &Array2<f64>,
    weights: &Array1<f64>,
    means: &Array2<f64>,
    covariances: &ndarray::Array3<f64>,
) -> Result<(Array2<f64>, f64)> {
    let n = features.nrows();
    let k = weights.len();

    let factors = (0..k)
        .map(|c| {
            cholesky(covariances.index_axis(Axis(0), c)).ok_or_else(|| {
                AnalyticsError::Clustering(format!("covariance of component {} is singular", c))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut probabilities = Array2::zeros((n, k));
    let mut log_likelihood = 0.0;
    for i in 0..n {
        let x = features.row(i);
        let log_joint: Vec<f64> = (0..k)
            .map(|c| weights[c].ln() + gaussian_log_density(&x, &means.row(c), &factors[c]))
            .collect();
        let max = log_joint.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = log_joint.iter().map(|l| (l - max).exp()).sum();
        let log_norm = max + sum.ln();
        log_likelihood += log_norm;
        for c in 0..k {
            probabilities[[i, c]] = (log_joint[c] - log_norm).exp();
        }
    }
    Ok((probabilities, log_likelihood))
}

/// Lower-triangular Cholesky factor, None if not positive definite
fn cholesky(matrix: ArrayView2<f64>) -> Option<Array2<f64>> {
    let d = matrix.nrows();
    let mut lower = Array2::<f64>::zeros((d, d));
    for i in 0..d {
        for j in 0..=i {
            let mut sum = matrix[[i, j]];
            for p in 0..j {
                sum -= lower[[i, p]] * lower[[j, p]];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                lower[[i, j]] = sum.sqrt();
            } else {
                lower[[i, j]] = sum / lower[[j, j]];
            }
        }
    }
    Some(lower)
}

fn gaussian_log_density(x: &ArrayView1<f64>, mean: &ArrayView1<f64>, lower: &Array2<f64>) -> f64 {
    let d = x.len();
    // Forward substitution: L y = x - mean
    let mut y = vec![0.0; d];
    for i in 0..d {
        let mut sum = x[i] - mean[i];
        for p in 0..i {
            sum -= lower[[i, p]] * y[p];
        }
        y[i] = sum / lower[[i, i]];
    }
    let mahalanobis: f64 = y.iter().map(|v| v * v).sum();
    let log_det: f64 = (0..d).map(|i| lower[[i, i]].ln()).sum::<f64>() * 2.0;
    -0.5 * (d as f64 * (2.0 * std::f64::consts::PI).ln() + log_det + mahalanobis)
}

fn best_model(models: &[ModelEntry]) -> Option<BestModel> {
    let scored: Vec<(Algorithm, f64)> = models
        .iter()
        .filter_map(|m| {
            m.outcome
                .completed()
                .and_then(|r| r.metrics.silhouette())
                .map(|s| (m.algorithm, s))
        })
        .collect();

    let (algorithm, silhouette_score) = scored
        .iter()
        .copied()
        .fold(None, |best: Option<(Algorithm, f64)>, (a, s)| match best {
            Some((_, best_s)) if best_s >= s => best,
            _ => Some((a, s)),
        })?;

    let primary = scored
        .iter()
        .find(|(a, _)| *a == Algorithm::KMeans)
        .map(|(_, s)| *s);
    let recommendation = match primary {
        Some(kmeans) if algorithm == Algorithm::KMeans => format!(
            "K-Means achieved the highest silhouette ({:.3}) and remains the primary algorithm",
            kmeans
        ),
        Some(kmeans) => format!(
            "K-Means performs well (silhouette={:.3}), but {} achieved highest score ({:.3})",
            kmeans, algorithm, silhouette_score
        ),
        None => format!(
            "K-Means could not be scored; {} achieved highest score ({:.3})",
            algorithm, silhouette_score
        ),
    };

    Some(BestModel {
        algorithm,
        silhouette_score,
        recommendation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(id: usize, streams: f64, sessions: f64) -> ListenerRecord {
        ListenerRecord {
            listener_id: format!("l{}", id),
            artist_id: "a1".to_string(),
            total_streams: streams,
            saves: streams / 10.0,
            shares: streams / 20.0,
            avg_completion_rate: 0.5,
            skip_rate: 20.0,
            session_count: sessions,
            avg_session_duration: 240.0,
        }
    }

    fn grouped_batch() -> Vec<ListenerRecord> {
        let mut batch = Vec::new();
        for i in 0..10 {
            batch.push(listener(i, 400.0 + (i % 5) as f64 * 3.0, 60.0 + (i % 3) as f64));
        }
        for i in 10..22 {
            batch.push(listener(i, 150.0 + (i % 5) as f64 * 3.0, 20.0 + (i % 3) as f64));
        }
        for i in 22..36 {
            batch.push(listener(i, 10.0 + (i % 5) as f64, 1.0 + (i % 2) as f64));
        }
        batch
    }

    #[test]
    fn test_all_algorithms_reported() {
        let result = ClusteringComparison::default().compare(&grouped_batch()).unwrap();
        assert_eq!(result.models.len(), 4);
        assert_eq!(result.primary_algorithm, Algorithm::KMeans);

        let kmeans = result.model(Algorithm::KMeans).unwrap();
        assert_eq!(kmeans.labels.len(), 36);
        assert!(kmeans.metrics.silhouette().unwrap() > 0.5);

        let hierarchical = result.model(Algorithm::Hierarchical).unwrap();
        let mut distinct: Vec<usize> = hierarchical.labels.iter().flatten().copied().collect();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct, vec![0, 1, 2]);

        assert!(result.best_model.is_some());
    }

    #[test]
    fn test_ward_merges_closest_pairs_first() {
        let engine = ClusteringComparison::new(SegmentationConfig {
            n_clusters: 2,
            ..SegmentationConfig::default()
        });
        let features =
            Array2::from_shape_vec((4, 2), vec![0.0, 0.0, 0.0, 1.0, 10.0, 0.0, 10.0, 1.0])
                .unwrap();
        let (labels, diagnostics) = engine.fit_hierarchical(&features).unwrap();

        assert_eq!(labels, vec![Some(0), Some(0), Some(1), Some(1)]);
        match diagnostics {
            Diagnostics::Hierarchical {
                n_leaves,
                merge_heights,
            } => {
                assert_eq!(n_leaves, 4);
                assert_eq!(merge_heights.len(), 2);
                assert!(merge_heights.iter().all(|h| (h - 1.0).abs() < 1e-12));
            }
            other => panic!("unexpected diagnostics {:?}", other),
        }
    }

    #[test]
    fn test_dbscan_all_noise_reports_marker() {
        // Too few points for any core sample
        let batch = vec![
            listener(0, 10.0, 1.0),
            listener(1, 300.0, 40.0),
            listener(2, 900.0, 90.0),
            listener(3, 2000.0, 5.0),
        ];
        let result = ClusteringComparison::default().compare(&batch).unwrap();
        let dbscan = result.model(Algorithm::Dbscan).unwrap();

        match &dbscan.diagnostics {
            Diagnostics::Dbscan {
                n_clusters_found,
                n_noise_points,
                core_samples,
            } => {
                assert_eq!(*n_clusters_found, 0);
                assert_eq!(*n_noise_points, 4);
                assert!(core_samples.is_empty());
            }
            other => panic!("unexpected diagnostics {:?}", other),
        }
        assert!(matches!(
            dbscan.metrics,
            QualityMetrics::InsufficientClusters { .. }
        ));
    }

    #[test]
    fn test_empty_batch_is_error() {
        assert!(matches!(
            ClusteringComparison::default().compare(&[]),
            Err(AnalyticsError::InputDataEmpty(_))
        ));
    }

    #[test]
    fn test_gaussian_density_standard_normal() {
        let lower = cholesky(Array2::<f64>::eye(2).view()).unwrap();
        let origin = Array1::from(vec![0.0, 0.0]);
        let density = gaussian_log_density(&origin.view(), &origin.view(), &lower);
        assert!((density - -(2.0 * std::f64::consts::PI).ln()).abs() < 1e-12);
        assert!(cholesky(Array2::<f64>::zeros((2, 2)).view()).is_none());
    }

    #[test]
    fn test_best_model_prefers_highest_silhouette() {
        let entry = |algorithm, silhouette: f64| ModelEntry {
            algorithm,
            outcome: AnalysisOutcome::Completed(ClusterModelResult {
                algorithm,
                name: String::new(),
                labels: vec![],
                diagnostics: Diagnostics::Hierarchical {
                    n_leaves: 0,
                    merge_heights: Vec::new(),
                },
                metrics: QualityMetrics::Scored {
                    silhouette_score: silhouette,
                    davies_bouldin_score: 0.5,
                    calinski_harabasz_score: 10.0,
                },
            }),
        };
        let models = vec![
            entry(Algorithm::KMeans, 0.61),
            entry(Algorithm::GaussianMixture, 0.72),
            ModelEntry {
                algorithm: Algorithm::Dbscan,
                outcome: AnalysisOutcome::unavailable("clustering", "failed"),
            },
        ];
        let best = best_model(&models).unwrap();
        assert_eq!(best.algorithm, Algorithm::GaussianMixture);
        assert!(best.recommendation.contains("0.610"));
    }
}
