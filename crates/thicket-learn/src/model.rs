//! The trainable-model contract shared by every learner.

use std::fmt;

use crate::error::{InputError, LearnError};

/// A learner that can be fitted on a feature matrix and queried for labels.
///
/// `features[sample_idx][feature_idx]` is row-major; labels are arbitrary
/// non-negative class identifiers, one per row.
///
/// The trait is object safe so ensembles can hold heterogeneous learners
/// as `Box<dyn Model>`. `Send + Sync` lets a prototype be shared with the
/// bagging worker pool.
pub trait Model: Send + Sync + fmt::Debug {
    /// Short, stable name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Train on labeled data, replacing any previously fitted state.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::InvalidInput`] for empty, ragged or
    /// length-mismatched input, or a model-specific configuration error.
    fn fit(&mut self, features: &[Vec<f64>], labels: &[usize]) -> Result<(), LearnError>;

    /// Train without labels.
    ///
    /// Supervised learners keep the default, which always fails.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::UnsupportedOperation`] unless overridden.
    fn fit_unlabeled(&mut self, _features: &[Vec<f64>]) -> Result<(), LearnError> {
        Err(LearnError::UnsupportedOperation {
            model: self.name(),
            operation: "fit without labels",
        })
    }

    /// Predict one label per row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::UnfittedModel`] before a successful `fit`, and
    /// [`LearnError::InvalidInput`] for empty or ragged input.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, LearnError>;

    /// Produce an independent instance with the same configuration.
    ///
    /// Fitted state, if carried over, is deep-copied.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::UnsupportedOperation`] for models that cannot
    /// be cloned meaningfully.
    fn clone_model(&self) -> Result<Box<dyn Model>, LearnError>;

    /// Return `true` once `fit` has succeeded.
    fn is_fitted(&self) -> bool;

    /// Replace the seed of any internal random number generator.
    ///
    /// Models without internal randomness ignore it.
    fn reseed(&mut self, _seed: u64) {}
}

/// Validate a feature matrix: non-empty, rectangular, finite.
///
/// Returns the number of feature columns.
pub(crate) fn validate_features(features: &[Vec<f64>]) -> Result<usize, InputError> {
    let first = features.first().ok_or(InputError::EmptyDataset)?;
    let n_features = first.len();
    if n_features == 0 {
        return Err(InputError::ZeroFeatures);
    }
    for (row_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(InputError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                row_index,
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(InputError::NonFiniteValue {
                row_index,
                feature_index,
            });
        }
    }
    Ok(n_features)
}

/// Validate a labeled training set and return the number of feature columns.
pub(crate) fn validate_training_set(
    features: &[Vec<f64>],
    labels: &[usize],
) -> Result<usize, InputError> {
    if features.is_empty() {
        return Err(InputError::EmptyDataset);
    }
    if labels.is_empty() {
        return Err(InputError::EmptyLabels);
    }
    if features.len() != labels.len() {
        return Err(InputError::LabelCountMismatch {
            n_rows: features.len(),
            n_labels: labels.len(),
        });
    }
    validate_features(features)
}

/// Validate prediction input against the width seen at training time.
pub(crate) fn validate_prediction_set(
    features: &[Vec<f64>],
    expected: usize,
) -> Result<(), InputError> {
    let got = validate_features(features)?;
    if got != expected {
        return Err(InputError::PredictionFeatureMismatch { expected, got });
    }
    Ok(())
}
