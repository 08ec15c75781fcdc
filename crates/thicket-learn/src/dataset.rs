//! Shuffled train/validation splitting.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::{InputError, LearnError};

/// Training and validation partitions of a labeled dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    /// Training feature rows.
    pub train_features: Vec<Vec<f64>>,
    /// Training labels.
    pub train_labels: Vec<usize>,
    /// Validation feature rows.
    pub validation_features: Vec<Vec<f64>>,
    /// Validation labels.
    pub validation_labels: Vec<usize>,
}

/// Shuffle the rows with a seeded generator and split them in two.
///
/// The training side receives `floor(n * (1 - validation_ratio))` rows,
/// but never fewer than one; the rest form the validation side. A ratio
/// of 0 leaves the validation side empty.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`LearnError::InvalidValidationRatio`] | ratio outside `[0, 1)` |
/// | [`LearnError::InvalidInput`] | empty input or length mismatch |
pub fn train_validation_split(
    features: &[Vec<f64>],
    labels: &[usize],
    validation_ratio: f64,
    seed: u64,
) -> Result<DatasetSplit, LearnError> {
    if !(0.0..1.0).contains(&validation_ratio) {
        return Err(LearnError::InvalidValidationRatio {
            ratio: validation_ratio,
        });
    }
    if features.is_empty() {
        return Err(InputError::EmptyDataset.into());
    }
    if features.len() != labels.len() {
        return Err(InputError::LabelCountMismatch {
            n_rows: features.len(),
            n_labels: labels.len(),
        }
        .into());
    }

    let n_samples = features.len();
    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_train = ((n_samples as f64) * (1.0 - validation_ratio))
        .floor()
        .max(1.0) as usize;
    let (train_idx, validation_idx) = indices.split_at(n_train);

    debug!(
        n_train = train_idx.len(),
        n_validation = validation_idx.len(),
        "dataset split"
    );

    let gather_features =
        |idx: &[usize]| -> Vec<Vec<f64>> { idx.iter().map(|&i| features[i].clone()).collect() };
    let gather_labels = |idx: &[usize]| -> Vec<usize> { idx.iter().map(|&i| labels[i]).collect() };

    Ok(DatasetSplit {
        train_features: gather_features(train_idx),
        train_labels: gather_labels(train_idx),
        validation_features: gather_features(validation_idx),
        validation_labels: gather_labels(validation_idx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
        let features = (0..n).map(|i| vec![i as f64]).collect();
        let labels = (0..n).collect();
        (features, labels)
    }

    #[test]
    fn sizes_follow_ratio() {
        let (features, labels) = dataset(8);
        let split = train_validation_split(&features, &labels, 0.25, 1).unwrap();
        assert_eq!(split.train_features.len(), 6);
        assert_eq!(split.validation_features.len(), 2);
        assert_eq!(split.train_labels.len(), 6);
        assert_eq!(split.validation_labels.len(), 2);
    }

    #[test]
    fn rows_stay_paired_with_labels_and_partition_input() {
        let (features, labels) = dataset(25);
        let split = train_validation_split(&features, &labels, 0.4, 9).unwrap();

        let mut seen: Vec<usize> = Vec::new();
        for (row, &label) in split
            .train_features
            .iter()
            .zip(&split.train_labels)
            .chain(split.validation_features.iter().zip(&split.validation_labels))
        {
            assert_eq!(row[0] as usize, label);
            seen.push(label);
        }
        seen.sort_unstable();
        assert_eq!(seen, labels);
    }

    #[test]
    fn same_seed_same_split() {
        let (features, labels) = dataset(30);
        let a = train_validation_split(&features, &labels, 0.2, 5).unwrap();
        let b = train_validation_split(&features, &labels, 0.2, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_ratio_keeps_everything_for_training() {
        let (features, labels) = dataset(4);
        let split = train_validation_split(&features, &labels, 0.0, 5).unwrap();
        assert_eq!(split.train_features.len(), 4);
        assert!(split.validation_features.is_empty());
    }

    #[test]
    fn training_side_never_empty() {
        let (features, labels) = dataset(2);
        let split = train_validation_split(&features, &labels, 0.9, 5).unwrap();
        assert_eq!(split.train_features.len(), 1);
        assert_eq!(split.validation_features.len(), 1);
    }

    #[test]
    fn invalid_ratio_rejected() {
        let (features, labels) = dataset(4);
        for ratio in [-0.1, 1.0, 2.0, f64::NAN] {
            assert!(matches!(
                train_validation_split(&features, &labels, ratio, 0).unwrap_err(),
                LearnError::InvalidValidationRatio { .. }
            ));
        }
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let (features, _) = dataset(4);
        let err = train_validation_split(&features, &[0, 1], 0.5, 0).unwrap_err();
        assert!(err.is_invalid_input());
    }
}
