//! Configuration types shared by trees and forests.

use crate::error::LearnError;

/// Strategy for determining the number of features to consider at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFeatures {
    /// All features (plain decision tree).
    All,
    /// A fixed count, clamped to the number of available features.
    Fixed(usize),
    /// Square root of total features, rounded up.
    Sqrt,
    /// Log base 2 of total features, rounded up, at least 1.
    Log2,
}

impl MaxFeatures {
    /// Resolve the strategy to a concrete count in `[1, n_features]`.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::InvalidMaxFeatures`] for `Fixed(0)`.
    pub fn resolve(self, n_features: usize) -> Result<usize, LearnError> {
        let resolved = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Fixed(0) => return Err(LearnError::InvalidMaxFeatures { max_features: 0 }),
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
        };
        Ok(resolved.clamp(1, n_features.max(1)))
    }
}

/// Configuration for a Random Forest.
///
/// Construct via [`RandomForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default     |
/// |---------------------|-------------|
/// | `min_samples_split` | 2           |
/// | `max_depth`         | `Some(100)` |
/// | `max_features`      | `Sqrt`      |
/// | `sample_fraction`   | 1.0         |
/// | `seed`              | `None`      |
///
/// The worker pool always has one worker per tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) min_samples_split: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) max_features: MaxFeatures,
    pub(crate) sample_fraction: f64,
    pub(crate) seed: Option<u64>,
}

impl RandomForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::InvalidBagCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, LearnError> {
        if n_trees == 0 {
            return Err(LearnError::InvalidBagCount { bags_number: 0 });
        }
        Ok(Self {
            n_trees,
            min_samples_split: 2,
            max_depth: Some(100),
            max_features: MaxFeatures::Sqrt,
            sample_fraction: 1.0,
            seed: None,
        })
    }

    /// Set the minimum number of samples a node needs before it may split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the per-split feature subsampling strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the fraction of training rows drawn (with replacement) per tree.
    #[must_use]
    pub fn with_sample_fraction(mut self, sample_fraction: f64) -> Self {
        self.sample_fraction = sample_fraction;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
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

    /// Return the bootstrap sample fraction.
    #[must_use]
    pub fn sample_fraction(&self) -> f64 {
        self.sample_fraction
    }

    /// Return the random seed, if fixed.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}
