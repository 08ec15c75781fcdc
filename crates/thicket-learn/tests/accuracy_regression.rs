//! Accuracy regression tests for thicket-learn.
//!
//! These tests guard the learners' accuracy on a deterministic synthetic
//! dataset and the end-to-end behaviour of the ensemble stack.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use thicket_learn::{
    Bagging, ConfusionMatrix, DecisionTree, DecisionTreeConfig, Knn, MaxFeatures, Model,
    RandomForest, RandomForestConfig, train_validation_split,
};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic classification dataset
// ---------------------------------------------------------------------------

/// Generate a 300-sample, 10-feature, 3-class classification dataset.
///
/// Features 0-2 are informative (class * 3.0 + noise in [0, 0.5]).
/// Features 3-9 are pure noise in [0, 0.5].
/// Samples are assigned round-robin across classes.
fn make_classification() -> (Vec<Vec<f64>>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let n_samples = 300;
    let n_features = 10;
    let n_classes = 3;

    let mut features = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes;
        labels.push(class);
        let row: Vec<f64> = (0..n_features)
            .map(|f| {
                let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 0.5
            })
            .collect();
        features.push(row);
    }
    (features, labels)
}

fn validation_accuracy(model: &mut dyn Model) -> f64 {
    let (features, labels) = make_classification();
    let split = train_validation_split(&features, &labels, 0.3, 42).unwrap();
    model.fit(&split.train_features, &split.train_labels).unwrap();
    let predicted = model.predict(&split.validation_features).unwrap();
    ConfusionMatrix::from_labels(&split.validation_labels, &predicted, 3)
        .unwrap()
        .accuracy()
}

// ---------------------------------------------------------------------------
// Held-out accuracy per learner
// ---------------------------------------------------------------------------

#[test]
fn forest_validation_accuracy_above_threshold() {
    let config = RandomForestConfig::new(50).unwrap().with_seed(42);
    let mut forest = RandomForest::new(config).unwrap();
    let accuracy = validation_accuracy(&mut forest);
    assert!(accuracy > 0.9, "forest accuracy {accuracy} <= 0.9");
}

#[test]
fn tree_validation_accuracy_above_threshold() {
    let mut tree = DecisionTree::default();
    let accuracy = validation_accuracy(&mut tree);
    assert!(accuracy > 0.85, "tree accuracy {accuracy} <= 0.85");
}

#[test]
fn bagged_knn_validation_accuracy_above_threshold() {
    let prototype = Knn::new(5).unwrap();
    let mut bagging = Bagging::new(Box::new(prototype), 9)
        .unwrap()
        .with_seed(42)
        .with_sample_fraction(0.8);
    let accuracy = validation_accuracy(&mut bagging);
    assert!(accuracy > 0.9, "bagged knn accuracy {accuracy} <= 0.9");
}

#[test]
fn forest_oob_accuracy_above_threshold() {
    let (features, labels) = make_classification();
    let config = RandomForestConfig::new(60).unwrap().with_seed(42);
    let mut forest = RandomForest::new(config).unwrap();
    forest.fit(&features, &labels).unwrap();
    let oob = forest.oob_score().unwrap();
    assert!(oob.accuracy > 0.85, "oob accuracy {} <= 0.85", oob.accuracy);
    assert_eq!(oob.n_oob_samples, features.len());
}

// ---------------------------------------------------------------------------
// Behavioural properties
// ---------------------------------------------------------------------------

/// A fully grown tree memorizes any non-contradictory training set.
#[test]
fn unbounded_tree_memorizes_training_data() {
    let (features, labels) = make_classification();
    let mut tree = DecisionTreeConfig::new()
        .with_max_depth(None)
        .with_min_samples_split(1)
        .build();
    tree.fit(&features, &labels).unwrap();
    assert_eq!(tree.predict(&features).unwrap(), labels);
}

/// The AND gate isolates `[1, 1]` and reproduces its labels.
#[test]
fn and_gate_end_to_end() {
    let features = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let labels = vec![0, 0, 0, 1];
    let mut tree = DecisionTreeConfig::new()
        .with_min_samples_split(1)
        .with_max_depth(Some(10))
        .with_max_features(MaxFeatures::All)
        .build();
    tree.fit(&features, &labels).unwrap();
    assert_eq!(tree.predict(&features).unwrap(), labels);
}

/// Identical seeds and a single worker give identical samples and votes.
#[test]
fn bagging_is_reproducible_with_fixed_seed() {
    let (features, labels) = make_classification();
    let run = || {
        let mut bagging = Bagging::new(Box::new(DecisionTree::default()), 8)
            .unwrap()
            .with_seed(2024)
            .with_workers(1);
        bagging.fit(&features, &labels).unwrap();
        let samples: Vec<Vec<usize>> = bagging
            .bootstrap_samples()
            .into_iter()
            .map(<[usize]>::to_vec)
            .collect();
        (samples, bagging.predict(&features).unwrap())
    };
    assert_eq!(run(), run());
}

/// Re-fitting a clone leaves the original tree's predictions untouched.
#[test]
fn cloned_tree_is_independent() {
    let (features, labels) = make_classification();
    let mut tree = DecisionTree::default();
    tree.fit(&features, &labels).unwrap();
    let before = tree.predict(&features).unwrap();

    let mut clone = tree.clone_model().unwrap();
    let flipped: Vec<usize> = labels.iter().map(|&l| 2 - l).collect();
    clone.fit(&features, &flipped).unwrap();

    assert_eq!(tree.predict(&features).unwrap(), before);
    assert_ne!(clone.predict(&features).unwrap(), before);
}
