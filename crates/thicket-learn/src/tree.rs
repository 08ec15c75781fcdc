use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    LearnError,
    config::MaxFeatures,
    model::{Model, validate_prediction_set, validate_training_set},
    node::{FeatureIndex, Node, NodeIndex},
    split::{find_best_split, select_features},
};

/// Configuration for a single entropy-based decision tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default      |
/// |---------------------|--------------|
/// | `min_samples_split` | 2            |
/// | `max_depth`         | `Some(100)`  |
/// | `max_features`      | `All`        |
/// | `seed`              | 42           |
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTreeConfig {
    pub(crate) min_samples_split: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) max_features: MaxFeatures,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_samples_split: 2,
            max_depth: Some(100),
            max_features: MaxFeatures::All,
            seed: 42,
        }
    }

    /// Set the minimum number of samples a node needs before it may split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the maximum tree depth.
    ///
    /// `None` grows until leaves are pure or cannot be split. `Some(d)`
    /// turns every node at depth `d` into a leaf (root is depth 0).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set how many features are considered at each split.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the seed driving per-split feature subsampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the minimum samples required to split a node.
    #[must_use]
    pub fn min_samples_split(&self) -> usize {
        self.min_samples_split
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the per-split feature subsampling strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Build an unfitted tree with this configuration.
    #[must_use]
    pub fn build(&self) -> DecisionTree {
        DecisionTree::new(self.clone())
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A decision tree classifier grown by recursive information-gain splitting.
///
/// The fitted tree is an arena (`Vec<Node>`) rooted at [`NodeIndex::ROOT`];
/// it is empty until [`Model::fit`] succeeds and is replaced wholesale on
/// every re-fit.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    config: DecisionTreeConfig,
    nodes: Vec<Node>,
    n_features: usize,
    classes: Vec<usize>,
}

impl DecisionTree {
    /// Create an unfitted tree.
    #[must_use]
    pub fn new(config: DecisionTreeConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Return the configuration.
    #[must_use]
    pub fn config(&self) -> &DecisionTreeConfig {
        &self.config
    }

    /// Return the node arena. Empty before fitting.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the number of features seen during fitting.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the distinct training labels in ascending order.
    #[must_use]
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Return the total number of nodes (splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the fitted tree; a lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 0usize;
        let mut stack = vec![(NodeIndex::ROOT, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx.index()] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((*left, d + 1));
                    stack.push((*right, d + 1));
                }
            }
        }
        max_depth
    }

    /// Predict the label of a single row by walking from the root.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`LearnError::UnfittedModel`] | The tree has not been fitted |
    /// | [`LearnError::CorruptTree`] | A split references a feature the row does not have |
    pub fn predict_row(&self, row: &[f64]) -> Result<usize, LearnError> {
        if self.nodes.is_empty() {
            return Err(LearnError::UnfittedModel { model: self.name() });
        }
        let mut idx = NodeIndex::ROOT;
        loop {
            match &self.nodes[idx.index()] {
                Node::Leaf { label, .. } => return Ok(*label),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let value = row.get(feature.index()).ok_or(LearnError::CorruptTree {
                        node: idx,
                        feature: *feature,
                        n_features: row.len(),
                    })?;
                    idx = if *value <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new(DecisionTreeConfig::new())
    }
}

impl Model for DecisionTree {
    fn name(&self) -> &'static str {
        "decision tree"
    }

    /// Grow a new tree from the full row set at depth 0.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`LearnError::InvalidInput`] | empty, ragged, non-finite or length-mismatched input |
    /// | [`LearnError::InvalidMinSamplesSplit`] | `min_samples_split` is zero |
    /// | [`LearnError::InvalidMaxFeatures`] | `MaxFeatures::Fixed(0)` |
    #[instrument(skip_all, fields(n_samples = features.len()))]
    fn fit(&mut self, features: &[Vec<f64>], labels: &[usize]) -> Result<(), LearnError> {
        let n_features = validate_training_set(features, labels)?;

        if self.config.min_samples_split == 0 {
            return Err(LearnError::InvalidMinSamplesSplit {
                min_samples_split: 0,
            });
        }
        let max_features = self.config.max_features.resolve(n_features)?;

        // Map arbitrary labels onto dense slots; slot order is label order.
        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let slots: Vec<usize> = labels
            .iter()
            .map(|label| classes.partition_point(|c| c < label))
            .collect();

        debug!(
            n_samples = features.len(),
            n_features,
            n_classes = classes.len(),
            max_features,
            "fitting decision tree"
        );

        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
            .collect();

        let mut builder = TreeBuilder {
            columns: &columns,
            slots: &slots,
            classes: &classes,
            config: &self.config,
            n_features,
            max_features,
            rng: ChaCha8Rng::seed_from_u64(self.config.seed),
            arena: Vec::new(),
        };
        let sample_indices: Vec<usize> = (0..features.len()).collect();
        builder.grow(&sample_indices, 0);
        let nodes = builder.arena;

        debug!(n_nodes = nodes.len(), "decision tree built");

        self.nodes = nodes;
        self.n_features = n_features;
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, LearnError> {
        if self.nodes.is_empty() {
            return Err(LearnError::UnfittedModel { model: self.name() });
        }
        validate_prediction_set(features, self.n_features)?;
        features.iter().map(|row| self.predict_row(row)).collect()
    }

    fn clone_model(&self) -> Result<Box<dyn Model>, LearnError> {
        Ok(Box::new(self.clone()))
    }

    fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    fn reseed(&mut self, seed: u64) {
        self.config.seed = seed;
    }
}

/// Recursive grower that appends nodes to an arena.
struct TreeBuilder<'a> {
    columns: &'a [Vec<f64>],
    slots: &'a [usize],
    classes: &'a [usize],
    config: &'a DecisionTreeConfig,
    n_features: usize,
    max_features: usize,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `sample_indices` and return its arena index.
    fn grow(&mut self, sample_indices: &[usize], depth: usize) -> NodeIndex {
        let n_samples = sample_indices.len();

        let mut class_counts = vec![0usize; self.classes.len()];
        for &si in sample_indices {
            class_counts[self.slots[si]] += 1;
        }
        let n_distinct = class_counts.iter().filter(|&&c| c > 0).count();

        let depth_reached = self.config.max_depth.is_some_and(|max_d| depth >= max_d);
        let too_few = n_samples < self.config.min_samples_split;

        if depth_reached || n_distinct <= 1 || too_few {
            return self.push_leaf(&class_counts, n_samples);
        }

        let candidates = select_features(self.n_features, self.max_features, &mut self.rng);
        let Some(split) = find_best_split(
            self.columns,
            self.slots,
            sample_indices,
            self.classes.len(),
            &candidates,
        ) else {
            return self.push_leaf(&class_counts, n_samples);
        };

        // Reserve the parent slot so it precedes its children in the arena.
        let node_idx = self.arena.len();
        self.arena.push(Node::Leaf {
            label: 0,
            n_samples,
        });

        let left = self.grow(&split.left_indices, depth + 1);
        let right = self.grow(&split.right_indices, depth + 1);

        self.arena[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            gain: split.gain,
            n_samples,
        };
        NodeIndex::new(node_idx)
    }

    /// Append a leaf holding the majority label; ties go to the lowest label.
    fn push_leaf(&mut self, class_counts: &[usize], n_samples: usize) -> NodeIndex {
        let mut best_slot = 0usize;
        for (slot, &count) in class_counts.iter().enumerate() {
            if count > class_counts[best_slot] {
                best_slot = slot;
            }
        }
        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            label: self.classes[best_slot],
            n_samples,
        });
        NodeIndex::new(idx)
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::error::InputError;

    fn fitted(config: DecisionTreeConfig, features: &[Vec<f64>], labels: &[usize]) -> DecisionTree {
        let mut tree = config.build();
        tree.fit(features, labels).unwrap();
        tree
    }

    fn and_gate() -> (Vec<Vec<f64>>, Vec<usize>) {
        (
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
            ],
            vec![0, 0, 0, 1],
        )
    }

    #[test]
    fn and_gate_isolates_last_row() {
        let (features, labels) = and_gate();
        let config = DecisionTreeConfig::new()
            .with_min_samples_split(1)
            .with_max_depth(Some(10));
        let tree = fitted(config, &features, &labels);

        assert_eq!(tree.predict(&features).unwrap(), vec![0, 0, 0, 1]);
        // Root ties between features go to feature 0 at threshold 0.
        match &tree.nodes()[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(feature.index(), 0);
                assert_eq!(*threshold, 0.0);
            }
            Node::Leaf { .. } => panic!("root should split"),
        }
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn pure_labels_give_single_leaf() {
        let features = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let tree = fitted(DecisionTreeConfig::new(), &features, &[4, 4, 4]);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict(&[vec![9.0, 9.0]]).unwrap(), vec![4]);
    }

    #[test]
    fn max_depth_zero_predicts_majority() {
        let features = vec![vec![0.0], vec![1.0], vec![2.0]];
        let config = DecisionTreeConfig::new().with_max_depth(Some(0));
        let tree = fitted(config, &features, &[2, 5, 5]);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict(&[vec![0.0]]).unwrap(), vec![5]);
    }

    #[test]
    fn majority_tie_picks_lowest_label() {
        let features = vec![vec![0.0], vec![1.0]];
        let config = DecisionTreeConfig::new().with_max_depth(Some(0));
        let tree = fitted(config, &features, &[9, 3]);
        assert_eq!(tree.predict(&[vec![0.5]]).unwrap(), vec![3]);
    }

    #[test]
    fn min_samples_split_stops_growth() {
        let (features, labels) = and_gate();
        let config = DecisionTreeConfig::new().with_min_samples_split(5);
        let tree = fitted(config, &features, &labels);
        assert_eq!(tree.n_nodes(), 1);
    }

    #[test]
    fn non_contiguous_labels_round_trip() {
        let features = vec![vec![1.0], vec![2.0], vec![10.0], vec![11.0]];
        let labels = vec![40, 40, 7, 7];
        let tree = fitted(DecisionTreeConfig::new(), &features, &labels);
        assert_eq!(tree.classes(), &[7, 40]);
        assert_eq!(tree.predict(&features).unwrap(), labels);
    }

    #[test]
    fn memorizes_distinct_rows_when_unbounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let features: Vec<Vec<f64>> = (0..80)
            .map(|i| vec![i as f64, rng.r#gen::<f64>(), rng.r#gen::<f64>()])
            .collect();
        let labels: Vec<usize> = (0..80).map(|_| rng.gen_range(0..4)).collect();
        let config = DecisionTreeConfig::new()
            .with_min_samples_split(1)
            .with_max_depth(None);
        let tree = fitted(config, &features, &labels);
        assert_eq!(tree.predict(&features).unwrap(), labels);
    }

    #[test]
    fn feature_subsampling_still_fits_training_data() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let features: Vec<Vec<f64>> = (0..60)
            .map(|_| (0..6).map(|_| rng.r#gen::<f64>()).collect())
            .collect();
        let labels: Vec<usize> = features.iter().map(|r| usize::from(r[2] > 0.5)).collect();
        let config = DecisionTreeConfig::new()
            .with_min_samples_split(1)
            .with_max_depth(None)
            .with_max_features(MaxFeatures::Fixed(2))
            .with_seed(5);
        let tree = fitted(config, &features, &labels);
        assert_eq!(tree.predict(&features).unwrap(), labels);
    }

    #[test]
    fn same_seed_same_tree() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let features: Vec<Vec<f64>> = (0..40)
            .map(|_| (0..5).map(|_| rng.r#gen::<f64>()).collect())
            .collect();
        let labels: Vec<usize> = (0..40).map(|i| i % 3).collect();
        let config = DecisionTreeConfig::new().with_max_features(MaxFeatures::Fixed(2));
        let a = fitted(config.clone(), &features, &labels);
        let b = fitted(config, &features, &labels);
        assert_eq!(a.nodes(), b.nodes());
    }

    #[test]
    fn predict_before_fit_is_unfitted() {
        let tree = DecisionTree::default();
        let err = tree.predict(&[vec![1.0]]).unwrap_err();
        assert!(matches!(err, LearnError::UnfittedModel { .. }));
    }

    #[test]
    fn fit_without_labels_is_unsupported() {
        let mut tree = DecisionTree::default();
        let err = tree.fit_unlabeled(&[vec![1.0]]).unwrap_err();
        assert!(matches!(err, LearnError::UnsupportedOperation { .. }));
    }

    #[test]
    fn invalid_input_leaves_previous_fit_intact() {
        let (features, labels) = and_gate();
        let mut tree = fitted(DecisionTreeConfig::new(), &features, &labels);
        let before = tree.nodes().to_vec();

        let err = tree.fit(&[vec![1.0, 2.0], vec![3.0]], &[0, 1]).unwrap_err();
        assert!(matches!(
            err,
            LearnError::InvalidInput(InputError::FeatureCountMismatch { .. })
        ));
        assert_eq!(tree.nodes(), before.as_slice());
    }

    #[test]
    fn label_count_mismatch_rejected() {
        let mut tree = DecisionTree::default();
        let err = tree.fit(&[vec![1.0], vec![2.0]], &[0]).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn zero_min_samples_split_rejected() {
        let mut tree = DecisionTreeConfig::new().with_min_samples_split(0).build();
        let err = tree.fit(&[vec![1.0]], &[0]).unwrap_err();
        assert!(matches!(err, LearnError::InvalidMinSamplesSplit { .. }));
    }

    #[test]
    fn prediction_width_mismatch_rejected() {
        let (features, labels) = and_gate();
        let tree = fitted(DecisionTreeConfig::new(), &features, &labels);
        let err = tree.predict(&[vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            LearnError::InvalidInput(InputError::PredictionFeatureMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn out_of_range_feature_is_corrupt_tree() {
        let tree = DecisionTree {
            config: DecisionTreeConfig::new(),
            nodes: vec![
                Node::Split {
                    feature: FeatureIndex::new(5),
                    threshold: 0.0,
                    left: NodeIndex::new(1),
                    right: NodeIndex::new(2),
                    gain: 1.0,
                    n_samples: 2,
                },
                Node::Leaf {
                    label: 0,
                    n_samples: 1,
                },
                Node::Leaf {
                    label: 1,
                    n_samples: 1,
                },
            ],
            n_features: 2,
            classes: vec![0, 1],
        };
        let err = tree.predict(&[vec![0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, LearnError::CorruptTree { .. }));
    }

    #[test]
    fn refitting_a_clone_leaves_original_untouched() {
        let (features, labels) = and_gate();
        let original = fitted(DecisionTreeConfig::new(), &features, &labels);
        let before = original.predict(&features).unwrap();

        let mut clone = original.clone_model().unwrap();
        assert!(clone.is_fitted());
        clone.fit(&features, &[1, 1, 1, 0]).unwrap();

        assert_eq!(original.predict(&features).unwrap(), before);
        assert_eq!(clone.predict(&features).unwrap(), vec![1, 1, 1, 0]);
    }
}
