//! Supervised classification: decision trees, bagging, random forests.
//! Unsupervised k-means clustering shares the same [`Model`] contract.
//!
//! Every learner implements the [`Model`] trait so that the [`Bagging`]
//! engine can train independent clones of any prototype on bootstrap
//! samples, in parallel via rayon, and combine them by plurality vote.
//! A [`RandomForest`] is a bagged [`DecisionTree`] that subsamples
//! features at each split.

mod bagging;
mod binary;
mod config;
mod confusion;
mod dataset;
mod distance;
mod error;
mod forest;
mod kmeans;
mod knn;
mod model;
mod node;
mod split;
mod tree;
mod vote;

pub use bagging::{BagFailure, Bagging, OobScore, WeakLearner};
pub use binary::BinaryMetrics;
pub use config::{MaxFeatures, RandomForestConfig};
pub use confusion::{Average, AveragedMetrics, ClassMetrics, ConfusionMatrix, Metric};
pub use dataset::{DatasetSplit, train_validation_split};
pub use distance::{DistanceMetric, euclidean, manhattan};
pub use error::{InputError, LearnError};
pub use forest::RandomForest;
pub use kmeans::KMeans;
pub use knn::Knn;
pub use model::Model;
pub use node::{FeatureIndex, Node, NodeIndex};
pub use split::{entropy, information_gain};
pub use tree::{DecisionTree, DecisionTreeConfig};
pub use vote::{LabelCounter, plurality_vote};
