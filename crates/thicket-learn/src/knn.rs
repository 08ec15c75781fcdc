//! Brute-force k-nearest-neighbours classifier.

use tracing::{debug, instrument};

use crate::distance::DistanceMetric;
use crate::error::LearnError;
use crate::model::{Model, validate_prediction_set, validate_training_set};
use crate::vote::LabelCounter;

/// K-nearest-neighbours classifier.
///
/// `fit` stores the training set; `predict` ranks every training row by
/// distance and takes a plurality vote over the closest `k`.
///
/// # Defaults
///
/// | Parameter | Default     |
/// |-----------|-------------|
/// | `metric`  | `Euclidean` |
#[derive(Debug, Clone)]
pub struct Knn {
    k: usize,
    metric: DistanceMetric,
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl Knn {
    /// Create an untrained classifier voting over `k` neighbours.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::InvalidNeighborCount`] if `k` is zero.
    pub fn new(k: usize) -> Result<Self, LearnError> {
        if k == 0 {
            return Err(LearnError::InvalidNeighborCount { k });
        }
        Ok(Self {
            k,
            metric: DistanceMetric::default(),
            features: Vec::new(),
            labels: Vec::new(),
        })
    }

    /// Set the distance metric.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Return the neighbour count.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Return the distance metric.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn predict_row(&self, row: &[f64]) -> usize {
        let mut ranked: Vec<(f64, usize)> = self
            .features
            .iter()
            .zip(&self.labels)
            .map(|(train, &label)| (self.metric.distance(train, row), label))
            .collect();
        // Stable sort keeps training order among equal distances.
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let k = self.k.min(ranked.len());
        let counter = ranked[..k]
            .iter()
            .fold(LabelCounter::new(), |mut counter, &(_, label)| {
                counter.add(label);
                counter
            });
        counter.most_common().unwrap_or(0)
    }
}

impl Model for Knn {
    fn name(&self) -> &'static str {
        "knn"
    }

    #[instrument(skip_all, fields(k = self.k, n_samples = features.len()))]
    fn fit(&mut self, features: &[Vec<f64>], labels: &[usize]) -> Result<(), LearnError> {
        validate_training_set(features, labels)?;
        self.features = features.to_vec();
        self.labels = labels.to_vec();
        debug!(metric = ?self.metric, "knn training set stored");
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, LearnError> {
        let Some(first) = self.features.first() else {
            return Err(LearnError::UnfittedModel { model: self.name() });
        };
        validate_prediction_set(features, first.len())?;
        Ok(features.iter().map(|row| self.predict_row(row)).collect())
    }

    fn clone_model(&self) -> Result<Box<dyn Model>, LearnError> {
        Ok(Box::new(self.clone()))
    }

    fn is_fitted(&self) -> bool {
        !self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters() -> (Vec<Vec<f64>>, Vec<usize>) {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![10.0, 10.0],
            vec![10.0, 11.0],
            vec![11.0, 10.0],
        ];
        (features, vec![3, 3, 3, 8, 8, 8])
    }

    #[test]
    fn zero_k_rejected() {
        assert!(matches!(
            Knn::new(0).unwrap_err(),
            LearnError::InvalidNeighborCount { k: 0 }
        ));
    }

    #[test]
    fn predicts_nearest_cluster() {
        let (features, labels) = clusters();
        let mut knn = Knn::new(3).unwrap();
        knn.fit(&features, &labels).unwrap();
        let predicted = knn.predict(&[vec![0.5, 0.5], vec![9.0, 9.0]]).unwrap();
        assert_eq!(predicted, vec![3, 8]);
    }

    #[test]
    fn manhattan_metric_is_used() {
        // Euclidean picks label 1 (distance ~2.83 vs 3.0); Manhattan picks 0 (3 vs 4).
        let features = vec![vec![3.0, 0.0], vec![2.0, 2.0]];
        let labels = vec![0, 1];
        let query = [vec![0.0, 0.0]];

        let mut euclid = Knn::new(1).unwrap();
        euclid.fit(&features, &labels).unwrap();
        assert_eq!(euclid.predict(&query).unwrap(), vec![1]);

        let mut manhattan = Knn::new(1).unwrap().with_metric(DistanceMetric::Manhattan);
        manhattan.fit(&features, &labels).unwrap();
        assert_eq!(manhattan.predict(&query).unwrap(), vec![0]);
    }

    #[test]
    fn k_larger_than_training_set_is_clamped() {
        let (features, labels) = clusters();
        let mut knn = Knn::new(100).unwrap();
        knn.fit(&features, &labels).unwrap();
        // 3 vs 3 tie over all rows goes to the lower label.
        assert_eq!(knn.predict(&[vec![10.0, 10.0]]).unwrap(), vec![3]);
    }

    #[test]
    fn equal_distances_keep_training_order() {
        let features = vec![vec![1.0], vec![-1.0]];
        let labels = vec![5, 2];
        let mut knn = Knn::new(1).unwrap();
        knn.fit(&features, &labels).unwrap();
        assert_eq!(knn.predict(&[vec![0.0]]).unwrap(), vec![5]);
    }

    #[test]
    fn clone_is_deep() {
        let (features, labels) = clusters();
        let mut knn = Knn::new(1).unwrap();
        knn.fit(&features, &labels).unwrap();
        let mut clone = knn.clone_model().unwrap();
        clone.fit(&[vec![0.0, 0.0]], &[8]).unwrap();
        assert_eq!(knn.predict(&[vec![0.0, 0.0]]).unwrap(), vec![3]);
        assert_eq!(clone.predict(&[vec![0.0, 0.0]]).unwrap(), vec![8]);
    }

    #[test]
    fn predict_before_fit_is_unfitted() {
        let knn = Knn::new(1).unwrap();
        assert!(matches!(
            knn.predict(&[vec![0.0]]).unwrap_err(),
            LearnError::UnfittedModel { .. }
        ));
    }

    #[test]
    fn width_mismatch_rejected() {
        let (features, labels) = clusters();
        let mut knn = Knn::new(1).unwrap();
        knn.fit(&features, &labels).unwrap();
        assert!(knn.predict(&[vec![0.0]]).unwrap_err().is_invalid_input());
    }

    #[test]
    fn unlabeled_fit_is_unsupported() {
        let mut knn = Knn::new(1).unwrap();
        assert!(matches!(
            knn.fit_unlabeled(&[vec![0.0]]).unwrap_err(),
            LearnError::UnsupportedOperation { .. }
        ));
    }
}
