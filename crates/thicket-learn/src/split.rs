//! Entropy, information gain and best-split search.

use rand::Rng;

use crate::node::FeatureIndex;
use crate::vote::LabelCounter;

/// Shannon entropy (base 2) of a label vector.
///
/// An empty vector has entropy 0.
#[must_use]
pub fn entropy(labels: &[usize]) -> f64 {
    let counter = LabelCounter::from_labels(labels);
    let counts: Vec<usize> = counter.iter().map(|(_, count)| count).collect();
    entropy_from_counts(&counts, labels.len())
}

/// Reduction in entropy achieved by partitioning `parent` into `left` and `right`.
///
/// `parent_entropy - |left|/|parent| * H(left) - |right|/|parent| * H(right)`.
#[must_use]
pub fn information_gain(parent: &[usize], left: &[usize], right: &[usize]) -> f64 {
    if parent.is_empty() {
        return 0.0;
    }
    let total = parent.len() as f64;
    entropy(parent)
        - (left.len() as f64 / total) * entropy(left)
        - (right.len() as f64 / total) * entropy(right)
}

/// Entropy (base 2) from per-class counts summing to `n_samples`.
pub(crate) fn entropy_from_counts(class_counts: &[usize], n_samples: usize) -> f64 {
    if n_samples == 0 {
        return 0.0;
    }
    let n = n_samples as f64;
    class_counts
        .iter()
        .filter(|&&c| c > 0)
        .fold(0.0, |acc, &c| {
            let p = c as f64 / n;
            acc - p * p.log2()
        })
}

/// The best partition found for one node.
#[derive(Debug, Clone)]
pub(crate) struct SplitCandidate {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Samples with `value <= threshold` go left.
    pub(crate) threshold: f64,
    /// Information gain of the partition.
    pub(crate) gain: f64,
    /// Sample indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Choose `take` distinct feature columns out of `n_features` uniformly at random.
///
/// When `take >= n_features` every column is returned without touching the
/// generator. The result is sorted ascending so split search always
/// enumerates features in index order.
pub(crate) fn select_features(n_features: usize, take: usize, rng: &mut impl Rng) -> Vec<usize> {
    if take >= n_features {
        return (0..n_features).collect();
    }
    let mut selected = rand::seq::index::sample(rng, n_features, take).into_vec();
    selected.sort_unstable();
    selected
}

/// Find the highest-gain split among `candidate_features`.
///
/// Every distinct value present in a column is tried as a threshold;
/// partitions with an empty side are skipped. The scan visits features in
/// the given order and thresholds in ascending order, keeping the first
/// candidate on equal gain, so ties go to the lowest feature index and
/// then the lowest threshold.
///
/// Returns `None` when no column has two distinct values among the samples.
///
/// # Column-major layout
///
/// `columns[feature_idx][sample_idx]`; `classes[sample_idx]` is a dense
/// class slot in `0..n_classes`.
pub(crate) fn find_best_split(
    columns: &[Vec<f64>],
    classes: &[usize],
    sample_indices: &[usize],
    n_classes: usize,
    candidate_features: &[usize],
) -> Option<SplitCandidate> {
    let n_samples = sample_indices.len();
    if n_samples < 2 {
        return None;
    }

    let mut parent_counts = vec![0usize; n_classes];
    for &si in sample_indices {
        parent_counts[classes[si]] += 1;
    }
    let parent_entropy = entropy_from_counts(&parent_counts, n_samples);
    let total = n_samples as f64;

    let mut best_gain = f64::NEG_INFINITY;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for &feat_idx in candidate_features {
        let column = &columns[feat_idx];

        let mut sorted: Vec<(f64, usize)> = sample_indices
            .iter()
            .map(|&si| (column[si], classes[si]))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Left grows from empty, right shrinks from full.
        let mut left_counts = vec![0usize; n_classes];
        let mut right_counts = parent_counts.clone();

        for i in 0..(n_samples - 1) {
            let (value, class) = sorted[i];
            left_counts[class] += 1;
            right_counts[class] -= 1;

            // All copies of `value` must land on the left.
            if value == sorted[i + 1].0 {
                continue;
            }

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            let gain = parent_entropy
                - (n_left as f64 / total) * entropy_from_counts(&left_counts, n_left)
                - (n_right as f64 / total) * entropy_from_counts(&right_counts, n_right);

            if gain > best_gain {
                best_gain = gain;
                best = Some((FeatureIndex::new(feat_idx), value));
            }
        }
    }

    let (feature, threshold) = best?;

    let column = &columns[feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
        .iter()
        .copied()
        .partition(|&si| column[si] <= threshold);

    Some(SplitCandidate {
        feature,
        threshold,
        gain: best_gain,
        left_indices,
        right_indices,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn entropy_single_class_is_zero() {
        assert_eq!(entropy(&[4, 4, 4, 4]), 0.0);
    }

    #[test]
    fn entropy_balanced_pair_is_one() {
        assert_eq!(entropy(&[0, 1]), 1.0);
    }

    #[test]
    fn entropy_empty_is_zero() {
        assert_eq!(entropy(&[]), 0.0);
    }

    #[test]
    fn entropy_four_uniform_classes_is_two_bits() {
        assert!((entropy(&[0, 1, 2, 3]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn perfect_split_gains_full_parent_entropy() {
        let gain = information_gain(&[0, 0, 1, 1], &[0, 0], &[1, 1]);
        assert!((gain - 1.0).abs() < 1e-12);
    }

    #[test]
    fn uninformative_split_gains_nothing() {
        let gain = information_gain(&[0, 1, 0, 1], &[0, 1], &[0, 1]);
        assert!(gain.abs() < 1e-12);
    }

    #[test]
    fn separable_column_splits_at_last_value_of_left_class() {
        let columns = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let classes = vec![0, 0, 0, 1, 1, 1];
        let indices: Vec<usize> = (0..6).collect();

        let split = find_best_split(&columns, &classes, &indices, 2, &[0]).unwrap();
        assert_eq!(split.feature.index(), 0);
        assert_eq!(split.threshold, 3.0);
        assert_eq!(split.left_indices, vec![0, 1, 2]);
        assert_eq!(split.right_indices, vec![3, 4, 5]);
        assert!((split.gain - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_column_has_no_split() {
        let columns = vec![vec![5.0; 4]];
        let classes = vec![0, 0, 1, 1];
        let indices: Vec<usize> = (0..4).collect();
        assert!(find_best_split(&columns, &classes, &indices, 2, &[0]).is_none());
    }

    #[test]
    fn equal_gain_prefers_lower_feature_index() {
        // Both columns separate the classes perfectly.
        let columns = vec![vec![0.0, 0.0, 1.0, 1.0], vec![5.0, 5.0, 9.0, 9.0]];
        let classes = vec![0, 0, 1, 1];
        let indices: Vec<usize> = (0..4).collect();
        let split = find_best_split(&columns, &classes, &indices, 2, &[0, 1]).unwrap();
        assert_eq!(split.feature.index(), 0);
        assert_eq!(split.threshold, 0.0);
    }

    #[test]
    fn zero_gain_split_still_partitions() {
        // Every threshold leaves both sides mixed, yet a partition exists.
        let columns = vec![vec![1.0, 1.0, 2.0, 2.0]];
        let classes = vec![0, 1, 0, 1];
        let indices: Vec<usize> = (0..4).collect();
        let split = find_best_split(&columns, &classes, &indices, 2, &[0]).unwrap();
        assert_eq!(split.left_indices, vec![0, 1]);
        assert!(split.gain.abs() < 1e-12);
    }

    #[test]
    fn select_features_is_distinct_and_sorted() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let picked = select_features(10, 4, &mut rng);
            assert_eq!(picked.len(), 4);
            assert!(picked.windows(2).all(|w| w[0] < w[1]));
            assert!(picked.iter().all(|&f| f < 10));
        }
    }

    #[test]
    fn select_features_clamps_to_available_columns() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(select_features(3, 8, &mut rng), vec![0, 1, 2]);
    }
}
