use crate::node::{FeatureIndex, NodeIndex};

/// Concrete reasons a feature matrix or label vector was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    /// Returned when the feature matrix has zero rows.
    #[error("feature matrix has zero rows")]
    EmptyDataset,

    /// Returned when the label vector is empty.
    #[error("label vector is empty")]
    EmptyLabels,

    /// Returned when the feature matrix and label vector differ in length.
    #[error("feature matrix has {n_rows} rows but {n_labels} labels were given")]
    LabelCountMismatch {
        /// Number of rows in the feature matrix.
        n_rows: usize,
        /// Number of labels provided.
        n_labels: usize,
    },

    /// Returned when the rows of the feature matrix have no columns.
    #[error("feature matrix has zero feature columns")]
    ZeroFeatures,

    /// Returned when a row has a different number of features than the first row.
    #[error("row {row_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the row.
        got: usize,
        /// The zero-based index of the offending row.
        row_index: usize,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("non-finite value at row {row_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending row.
        row_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when prediction input has a different width than the training data.
    #[error("prediction input has {got} features, model was trained on {expected}")]
    PredictionFeatureMismatch {
        /// Number of features seen at training time.
        expected: usize,
        /// Number of features in the prediction input.
        got: usize,
    },

    /// Returned when a label does not fit in the declared number of classes.
    #[error("label {label} at position {index} is outside [0, {n_classes})")]
    LabelOutOfRange {
        /// The offending label.
        label: usize,
        /// Position of the label in its vector.
        index: usize,
        /// The declared number of classes.
        n_classes: usize,
    },
}

/// Errors from model training, prediction and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum LearnError {
    /// Wraps a rejected feature matrix or label vector.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    /// Returned when a model does not implement the requested operation.
    #[error("{model} does not support {operation}")]
    UnsupportedOperation {
        /// Name of the model.
        model: &'static str,
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// Returned when `predict` is called before a successful `fit`.
    #[error("{model} must be fitted before predicting")]
    UnfittedModel {
        /// Name of the model.
        model: &'static str,
    },

    /// Returned when a split node references a feature the input row does not have.
    #[error("corrupt tree: node {node} splits on feature {feature}, but rows have {n_features} features")]
    CorruptTree {
        /// Arena index of the offending node.
        node: NodeIndex,
        /// The out-of-range feature index.
        feature: FeatureIndex,
        /// Width of the row being traversed.
        n_features: usize,
    },

    /// Returned when every bag of a bagging ensemble failed to train.
    #[error("no weak learner trained successfully ({failed} of {bags_number} bags failed)")]
    NoLearnersTrained {
        /// Requested number of bags.
        bags_number: usize,
        /// Number of bags that failed.
        failed: usize,
    },

    /// Returned when the bag count is zero.
    #[error("bags_number must be at least 1, got {bags_number}")]
    InvalidBagCount {
        /// The invalid bag count.
        bags_number: usize,
    },

    /// Returned when the sample fraction is not in (0.0, 1.0].
    #[error("sample_fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidSampleFraction {
        /// The invalid fraction.
        fraction: f64,
    },

    /// Returned when the worker count is zero.
    #[error("worker count must be at least 1, got {workers}")]
    InvalidWorkerCount {
        /// The invalid worker count.
        workers: usize,
    },

    /// Returned when min_samples_split is zero.
    #[error("min_samples_split must be at least 1, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid value.
        min_samples_split: usize,
    },

    /// Returned when a fixed feature subsample count is zero.
    #[error("max_features must select at least 1 feature, got {max_features}")]
    InvalidMaxFeatures {
        /// The invalid value.
        max_features: usize,
    },

    /// Returned when the neighbour count of a KNN model is zero.
    #[error("k must be at least 1, got {k}")]
    InvalidNeighborCount {
        /// The invalid neighbour count.
        k: usize,
    },

    /// Returned when the cluster count of a k-means model is zero.
    #[error("k must be at least 1 cluster, got {k}")]
    InvalidClusterCount {
        /// The invalid cluster count.
        k: usize,
    },

    /// Returned when the restart count of a k-means model is zero.
    #[error("n_init must be at least 1, got {n_init}")]
    InvalidRestartCount {
        /// The invalid restart count.
        n_init: usize,
    },

    /// Returned when fewer rows are provided than the requested cluster count.
    #[error("need at least {k} rows to form {k} clusters, got {n_samples}")]
    TooFewSamples {
        /// Number of rows provided.
        n_samples: usize,
        /// Requested number of clusters.
        k: usize,
    },

    /// Returned when a cluster becomes empty and no row can be moved into it.
    #[error("cluster {cluster} became empty at iteration {iteration}")]
    EmptyCluster {
        /// The cluster that became empty.
        cluster: usize,
        /// The iteration at which it became empty.
        iteration: usize,
    },

    /// Returned when a validation ratio is not in [0.0, 1.0).
    #[error("validation_ratio must be in [0.0, 1.0), got {ratio}")]
    InvalidValidationRatio {
        /// The invalid ratio.
        ratio: f64,
    },

    /// Returned when out-of-bag evaluation cannot score any row.
    #[error("out-of-bag evaluation failed: {reason}")]
    OobEvaluationFailed {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// Returned when the per-fit worker pool cannot be created.
    #[error("failed to build worker pool")]
    WorkerPool {
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },
}

impl LearnError {
    /// Return `true` when the error stems from rejected input data.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, LearnError::InvalidInput(_))
    }
}
