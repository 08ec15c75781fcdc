//! Domain types for thicket-io.

/// A labeled classification dataset.
///
/// Produced by [`LabeledCsvReader`](crate::LabeledCsvReader). Rows and
/// labels are parallel vectors: `labels[i]` belongs to `features[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    /// Feature column names from the CSV header, label column excluded.
    feature_names: Vec<String>,
    /// Name of the label column.
    label_name: String,
    /// Feature values: `features[sample_index][feature_index]`.
    features: Vec<Vec<f64>>,
    /// Class label of each row.
    labels: Vec<usize>,
}

impl LabeledDataset {
    pub(crate) fn new(
        feature_names: Vec<String>,
        label_name: String,
        features: Vec<Vec<f64>>,
        labels: Vec<usize>,
    ) -> Self {
        Self {
            feature_names,
            label_name,
            features,
            labels,
        }
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the label column name.
    #[must_use]
    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the labels.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Return the number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Return one more than the largest label, so every label is a valid class index.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&max| max + 1)
    }

    /// Split into `(features, labels)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Vec<f64>>, Vec<usize>) {
        (self.features, self.labels)
    }
}

/// An unlabeled feature matrix, e.g. rows to predict.
///
/// Produced by [`FeatureCsvReader`](crate::FeatureCsvReader).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDataset {
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
}

impl FeatureDataset {
    pub(crate) fn new(feature_names: Vec<String>, features: Vec<Vec<f64>>) -> Self {
        Self {
            feature_names,
            features,
        }
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    /// Take ownership of the feature matrix.
    #[must_use]
    pub fn into_features(self) -> Vec<Vec<f64>> {
        self.features
    }
}
