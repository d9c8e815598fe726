//! Bagged, class-balanced ensemble of linfa decision trees

use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{AnalyticsError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            seed: 42,
        }
    }
}

/// Binary classifier averaging the votes of bootstrap-trained trees.
///
/// Each tree sees a bootstrap sample of the rows, weighted so both classes
/// carry equal total mass (`n / (2 * n_class)`).
#[derive(Debug, Clone)]
pub struct BalancedForest {
    trees: Vec<DecisionTree<f64, usize>>,
    n_features: usize,
}

impl BalancedForest {
    pub fn fit(features: &Array2<f64>, labels: &[bool], params: ForestParams) -> Result<Self> {
        let n_samples = features.nrows();
        if n_samples == 0 || n_samples != labels.len() {
            return Err(AnalyticsError::Training(format!(
                "expected matching non-empty features and labels, got {} rows and {} labels",
                n_samples,
                labels.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(AnalyticsError::Training(
                "forest needs at least one tree".to_string(),
            ));
        }

        let class_weights = balanced_class_weights(labels);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);

        for _ in 0..params.n_trees {
            let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let x = features.select(Axis(0), &sample);
            let y: Array1<usize> = sample.iter().map(|&i| labels[i] as usize).collect();
            let weights: Array1<f32> = sample
                .iter()
                .map(|&i| class_weights[labels[i] as usize] as f32)
                .collect();

            let dataset = Dataset::new(x, y).with_weights(weights);
            let tree = DecisionTree::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(Some(params.max_depth))
                .fit(&dataset)
                .map_err(|e| AnalyticsError::Training(e.to_string()))?;
            trees.push(tree);
        }

        tracing::debug!(trees = trees.len(), samples = n_samples, "forest fitted");
        Ok(Self {
            trees,
            n_features: features.ncols(),
        })
    }

    /// Fraction of trees voting for the positive class, per row
    pub fn predict_proba(&self, features: &Array2<f64>) -> Result<Vec<f64>> {
        if features.ncols() != self.n_features {
            return Err(AnalyticsError::Training(format!(
                "model expects {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }

        let mut votes = vec![0usize; features.nrows()];
        for tree in &self.trees {
            let predicted: Array1<usize> = tree.predict(features);
            for (vote, &class) in votes.iter_mut().zip(predicted.iter()) {
                if class == 1 {
                    *vote += 1;
                }
            }
        }
        let n_trees = self.trees.len() as f64;
        Ok(votes.into_iter().map(|v| v as f64 / n_trees).collect())
    }

    /// Majority vote; ties go to the negative class
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<bool>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| p > 0.5)
            .collect())
    }

    /// Mean impurity-based importance across trees, normalized to sum to one
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, value) in total.iter_mut().zip(tree.feature_importance().iter()) {
                *acc += *value;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        total
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn balanced_class_weights(labels: &[bool]) -> [f64; 2] {
    let n = labels.len() as f64;
    let positives = labels.iter().filter(|&&l| l).count() as f64;
    let negatives = n - positives;
    let weight = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
    [weight(negatives), weight(positives)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Array2<f64>, Vec<bool>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let churned = i % 5 == 0;
            let days = if churned { 60.0 + i as f64 } else { i as f64 % 10.0 };
            rows.extend_from_slice(&[days, (i % 7) as f64]);
            labels.push(churned);
        }
        (Array2::from_shape_vec((30, 2), rows).unwrap(), labels)
    }

    #[test]
    fn test_balanced_weights() {
        let weights = balanced_class_weights(&[true, false, false, false]);
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_separable_data() {
        let (x, y) = separable();
        let params = ForestParams {
            n_trees: 15,
            ..ForestParams::default()
        };
        let forest = BalancedForest::fit(&x, &y, params).unwrap();
        assert_eq!(forest.n_trees(), 15);

        let proba = forest.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(forest.predict(&x).unwrap(), y);

        let importance = forest.feature_importance();
        assert!(importance[0] > importance[1]);
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let (x, y) = separable();
        let params = ForestParams {
            n_trees: 5,
            ..ForestParams::default()
        };
        let a = BalancedForest::fit(&x, &y, params).unwrap();
        let b = BalancedForest::fit(&x, &y, params).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_feature_count_mismatch() {
        let (x, y) = separable();
        let params = ForestParams {
            n_trees: 2,
            ..Default::default()
        };
        let forest = BalancedForest::fit(&x, &y, params).unwrap();
        assert!(forest.predict_proba(&Array2::zeros((1, 3))).is_err());
    }
}
