//! Random Forest: feature-subsampling decision trees inside a bagging engine.

use tracing::{info, instrument};

use crate::bagging::{Bagging, OobScore};
use crate::config::RandomForestConfig;
use crate::error::LearnError;
use crate::model::{Model, validate_training_set};
use crate::tree::DecisionTreeConfig;

/// A Random Forest classifier.
///
/// Every tree is a clone of one untrained [`DecisionTree`](crate::DecisionTree)
/// prototype built from the forest config, trained on its own bootstrap
/// sample with one worker per tree.
#[derive(Debug)]
pub struct RandomForest {
    config: RandomForestConfig,
    bagging: Bagging,
    training_features: Vec<Vec<f64>>,
    training_labels: Vec<usize>,
}

/// Build the untrained bagging engine described by `config`.
fn build_engine(config: &RandomForestConfig) -> Result<Bagging, LearnError> {
    let prototype = DecisionTreeConfig::new()
        .with_min_samples_split(config.min_samples_split)
        .with_max_depth(config.max_depth)
        .with_max_features(config.max_features)
        .build();

    let bagging = Bagging::new(Box::new(prototype), config.n_trees)?
        .with_sample_fraction(config.sample_fraction)
        .with_workers(config.n_trees);
    Ok(match config.seed {
        Some(seed) => bagging.with_seed(seed),
        None => bagging,
    })
}

impl RandomForest {
    /// Create an untrained forest.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::InvalidBagCount`] if the config has zero trees.
    pub fn new(config: RandomForestConfig) -> Result<Self, LearnError> {
        let bagging = build_engine(&config)?;
        Ok(Self {
            config,
            bagging,
            training_features: Vec::new(),
            training_labels: Vec::new(),
        })
    }

    /// Borrow the forest configuration.
    #[must_use]
    pub fn config(&self) -> &RandomForestConfig {
        &self.config
    }

    /// Borrow the underlying bagging engine.
    #[must_use]
    pub fn bagging(&self) -> &Bagging {
        &self.bagging
    }

    /// Number of trees that trained successfully.
    #[must_use]
    pub fn n_trees_trained(&self) -> usize {
        self.bagging.learners().len()
    }

    /// Feature matrix from the last successful `fit`.
    #[must_use]
    pub fn training_features(&self) -> &[Vec<f64>] {
        &self.training_features
    }

    /// Labels from the last successful `fit`.
    #[must_use]
    pub fn training_labels(&self) -> &[usize] {
        &self.training_labels
    }

    /// Out-of-bag accuracy over the stored training set.
    ///
    /// # Errors
    ///
    /// See [`Bagging::oob_score`].
    pub fn oob_score(&self) -> Result<OobScore, LearnError> {
        self.bagging
            .oob_score(&self.training_features, &self.training_labels)
    }
}

impl Model for RandomForest {
    fn name(&self) -> &'static str {
        "random forest"
    }

    /// Validate, then train every tree through the bagging engine.
    ///
    /// Tree parameters are checked against the data up front so that a bad
    /// config fails once instead of in every bag.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`LearnError::InvalidInput`] | malformed input |
    /// | [`LearnError::InvalidMinSamplesSplit`] | `min_samples_split` is zero |
    /// | [`LearnError::InvalidMaxFeatures`] | `MaxFeatures::Fixed(0)` |
    /// | any [`Bagging`] error | see [`Bagging`]'s `fit` |
    #[instrument(skip_all, fields(n_trees = self.config.n_trees, n_samples = features.len()))]
    fn fit(&mut self, features: &[Vec<f64>], labels: &[usize]) -> Result<(), LearnError> {
        let n_features = validate_training_set(features, labels)?;
        if self.config.min_samples_split == 0 {
            return Err(LearnError::InvalidMinSamplesSplit {
                min_samples_split: 0,
            });
        }
        let max_features = self.config.max_features.resolve(n_features)?;

        info!(
            n_trees = self.config.n_trees,
            n_features,
            max_features,
            "training random forest"
        );
        self.training_features.clear();
        self.training_labels.clear();
        self.bagging.fit(features, labels)?;

        self.training_features = features.to_vec();
        self.training_labels = labels.to_vec();
        info!(
            n_trees_trained = self.n_trees_trained(),
            "random forest training complete"
        );
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, LearnError> {
        if !self.is_fitted() {
            return Err(LearnError::UnfittedModel { model: self.name() });
        }
        self.bagging.predict(features)
    }

    /// Rebuild an untrained forest from the same configuration.
    fn clone_model(&self) -> Result<Box<dyn Model>, LearnError> {
        Ok(Box::new(Self::new(self.config.clone())?))
    }

    fn is_fitted(&self) -> bool {
        self.bagging.is_fitted()
    }
}
