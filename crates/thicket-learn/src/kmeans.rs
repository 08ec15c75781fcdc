//! K-means clustering over row-major feature matrices.
//!
//! Provides k-means++ seeding, the assign/update loop with empty-cluster
//! rescue, and parallel multi-restart selection by lowest inertia.

use std::cmp::Ordering;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::distance::euclidean;
use crate::error::LearnError;
use crate::model::{Model, validate_features, validate_prediction_set};

/// Squared Euclidean distance.
fn squared(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest centroid and its squared distance.
///
/// Ties go to the lowest centroid index.
fn nearest(row: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared(row, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// Assign every row to its nearest centroid and return the total inertia.
fn assign(features: &[Vec<f64>], centroids: &[Vec<f64>]) -> (Vec<usize>, f64) {
    let closest: Vec<(usize, f64)> = features
        .par_iter()
        .map(|row| nearest(row, centroids))
        .collect();
    let inertia = closest.iter().map(|&(_, d)| d).sum();
    (closest.into_iter().map(|(c, _)| c).collect(), inertia)
}

/// Select `k` distinct row indices with k-means++ seeding.
///
/// The first index is uniform; each later one is drawn with probability
/// proportional to its squared distance from the nearest chosen row.
/// Requires `1 <= k <= features.len()`.
fn kmeans_plus_plus(features: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let n = features.len();
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n));

    while chosen.len() < k {
        let weights: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                if chosen.contains(&i) {
                    return 0.0;
                }
                chosen
                    .iter()
                    .map(|&j| squared(&features[i], &features[j]))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let total: f64 = weights.iter().sum();
        let selected = if total > 0.0 {
            let threshold = rng.gen_range(0.0..total);
            let mut cumsum = 0.0;
            weights
                .iter()
                .position(|&w| {
                    cumsum += w;
                    cumsum > threshold
                })
                .unwrap_or(n - 1)
        } else {
            // Every remaining row duplicates a chosen one.
            match (0..n).find(|i| !chosen.contains(i)) {
                Some(i) => i,
                None => break,
            }
        };
        chosen.push(selected);
    }
    chosen
}

/// Recompute centroids as member means.
///
/// An empty cluster takes the member of the largest cluster farthest from
/// that cluster's previous centroid.
fn update(
    features: &[Vec<f64>],
    assignments: &[usize],
    previous: &[Vec<f64>],
    iteration: usize,
) -> Result<Vec<Vec<f64>>, LearnError> {
    let k = previous.len();
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &c) in assignments.iter().enumerate() {
        groups[c].push(i);
    }

    for empty in 0..k {
        if !groups[empty].is_empty() {
            continue;
        }
        let donor = (0..k).max_by_key(|&c| groups[c].len()).unwrap_or(empty);
        if groups[donor].len() <= 1 {
            return Err(LearnError::EmptyCluster {
                cluster: empty,
                iteration,
            });
        }
        let farthest = groups[donor]
            .iter()
            .enumerate()
            .max_by(|&(_, &a), &(_, &b)| {
                squared(&features[a], &previous[donor])
                    .total_cmp(&squared(&features[b], &previous[donor]))
            })
            .map_or(0, |(pos, _)| pos);
        let moved = groups[donor].swap_remove(farthest);
        groups[empty].push(moved);
        debug!(
            empty_cluster = empty,
            donor_cluster = donor,
            row = moved,
            "rescued empty cluster"
        );
    }

    let n_features = previous.first().map_or(0, Vec::len);
    Ok(groups
        .iter()
        .map(|members| {
            let mut mean = vec![0.0; n_features];
            for &i in members {
                for (m, v) in mean.iter_mut().zip(&features[i]) {
                    *m += v;
                }
            }
            let size = members.len() as f64;
            mean.iter_mut().for_each(|m| *m /= size);
            mean
        })
        .collect())
}

/// Outcome of one seeded restart.
#[derive(Debug, Clone)]
struct Run {
    centroids: Vec<Vec<f64>>,
    assignments: Vec<usize>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

fn run_once(
    features: &[Vec<f64>],
    k: usize,
    max_iter: usize,
    tolerance: f64,
    seed: u64,
) -> Result<Run, LearnError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centroids: Vec<Vec<f64>> = kmeans_plus_plus(features, k, &mut rng)
        .into_iter()
        .map(|i| features[i].clone())
        .collect();

    let mut iterations = 0;
    let mut converged = false;
    for iteration in 0..max_iter {
        iterations = iteration + 1;
        let (assignments, inertia) = assign(features, &centroids);
        let updated = update(features, &assignments, &centroids, iteration)?;

        let shift = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| euclidean(old, new))
            .fold(0.0, f64::max);
        centroids = updated;
        debug!(iteration, inertia, shift, "iteration complete");

        if shift <= tolerance {
            converged = true;
            debug!(iteration, "converged");
            break;
        }
    }

    let (assignments, inertia) = assign(features, &centroids);
    Ok(Run {
        centroids,
        assignments,
        inertia,
        iterations,
        converged,
    })
}

/// K-means clustering.
///
/// Construct via [`KMeans::new`], chain `with_*` methods, then train with
/// [`Model::fit_unlabeled`] (or [`KMeans::fit_predict`]). Predicted labels
/// are cluster indices in `[0, k)`.
///
/// # Defaults
///
/// | Parameter   | Default |
/// |-------------|---------|
/// | `max_iter`  | 100     |
/// | `tolerance` | 1e-4    |
/// | `n_init`    | 10      |
/// | `seed`      | `None` (OS entropy) |
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    max_iter: usize,
    tolerance: f64,
    n_init: usize,
    seed: Option<u64>,
    centroids: Vec<Vec<f64>>,
    assignments: Vec<usize>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

impl KMeans {
    /// Create an untrained model with `k` clusters.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::InvalidClusterCount`] if `k` is zero.
    pub fn new(k: usize) -> Result<Self, LearnError> {
        if k == 0 {
            return Err(LearnError::InvalidClusterCount { k });
        }
        Ok(Self {
            k,
            max_iter: 100,
            tolerance: 1e-4,
            n_init: 10,
            seed: None,
            centroids: Vec::new(),
            assignments: Vec::new(),
            inertia: 0.0,
            iterations: 0,
            converged: false,
        })
    }

    /// Set the maximum number of assign/update iterations per restart.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the convergence tolerance. A restart stops once no centroid
    /// moves farther than this between iterations.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the number of independent restarts; the lowest inertia wins.
    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Fix the seed used for centroid seeding.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    #[must_use]
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[must_use]
    pub fn n_init(&self) -> usize {
        self.n_init
    }

    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Cluster centres from the last fit, one per cluster.
    #[must_use]
    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }

    /// Cluster index of every training row from the last fit.
    #[must_use]
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    /// Sum of squared distances from each training row to its centroid,
    /// or `None` before fitting.
    #[must_use]
    pub fn inertia(&self) -> Option<f64> {
        self.is_fitted().then_some(self.inertia)
    }

    /// Iterations run by the winning restart.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether the winning restart met the tolerance before `max_iter`.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Number of training rows in each cluster.
    #[must_use]
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &c in &self.assignments {
            sizes[c] += 1;
        }
        sizes
    }

    fn check_fitted(&self, features: &[Vec<f64>]) -> Result<(), LearnError> {
        if !self.is_fitted() {
            return Err(LearnError::UnfittedModel { model: self.name() });
        }
        let n_features = self.centroids.first().map_or(0, Vec::len);
        validate_prediction_set(features, n_features)?;
        Ok(())
    }

    /// Euclidean distance from every row to every centroid.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Model::predict`].
    pub fn transform(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, LearnError> {
        self.check_fitted(features)?;
        Ok(features
            .iter()
            .map(|row| self.centroids.iter().map(|c| euclidean(row, c)).collect())
            .collect())
    }

    /// Sum of squared distances from each row to its nearest centroid.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Model::predict`].
    pub fn score(&self, features: &[Vec<f64>]) -> Result<f64, LearnError> {
        self.check_fitted(features)?;
        Ok(assign(features, &self.centroids).1)
    }

    /// Fit on `features` and return the cluster of every row.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Model::fit_unlabeled`].
    pub fn fit_predict(&mut self, features: &[Vec<f64>]) -> Result<Vec<usize>, LearnError> {
        self.fit_unlabeled(features)?;
        Ok(self.assignments.clone())
    }

    /// Fit on `features` and return their distances to every centroid.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Model::fit_unlabeled`].
    pub fn fit_transform(&mut self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, LearnError> {
        self.fit_unlabeled(features)?;
        self.transform(features)
    }
}

impl Model for KMeans {
    fn name(&self) -> &'static str {
        "k-means"
    }

    fn fit(&mut self, _features: &[Vec<f64>], _labels: &[usize]) -> Result<(), LearnError> {
        Err(LearnError::UnsupportedOperation {
            model: self.name(),
            operation: "fit with labels",
        })
    }

    /// Run `n_init` seeded restarts in parallel and keep the lowest inertia.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`LearnError::InvalidInput`] | empty, ragged or non-finite input |
    /// | [`LearnError::InvalidRestartCount`] | `n_init` is zero |
    /// | [`LearnError::TooFewSamples`] | fewer rows than clusters |
    /// | [`LearnError::EmptyCluster`] | a cluster empties and cannot be refilled |
    #[instrument(skip_all, fields(k = self.k, n_init = self.n_init, n_samples = features.len()))]
    fn fit_unlabeled(&mut self, features: &[Vec<f64>]) -> Result<(), LearnError> {
        validate_features(features)?;
        if self.n_init == 0 {
            return Err(LearnError::InvalidRestartCount { n_init: 0 });
        }
        if features.len() < self.k {
            return Err(LearnError::TooFewSamples {
                n_samples: features.len(),
                k: self.k,
            });
        }

        let mut master_rng = ChaCha8Rng::seed_from_u64(self.seed.unwrap_or_else(rand::random));
        let seeds: Vec<u64> = (0..self.n_init).map(|_| master_rng.r#gen()).collect();

        let (k, max_iter, tolerance) = (self.k, self.max_iter, self.tolerance);
        let runs: Vec<Run> = seeds
            .into_par_iter()
            .map(|seed| run_once(features, k, max_iter, tolerance, seed))
            .collect::<Result<_, _>>()?;

        // Earliest restart wins ties.
        let mut best: Option<Run> = None;
        for run in runs {
            best = Some(match best {
                Some(prev) if run.inertia.total_cmp(&prev.inertia) != Ordering::Less => prev,
                _ => run,
            });
        }
        let Some(best) = best else {
            return Err(LearnError::InvalidRestartCount { n_init: 0 });
        };

        info!(
            k = self.k,
            inertia = best.inertia,
            iterations = best.iterations,
            converged = best.converged,
            "k-means fit complete"
        );
        self.centroids = best.centroids;
        self.assignments = best.assignments;
        self.inertia = best.inertia;
        self.iterations = best.iterations;
        self.converged = best.converged;
        Ok(())
    }

    /// Label every row with the index of its nearest centroid.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, LearnError> {
        self.check_fitted(features)?;
        Ok(assign(features, &self.centroids).0)
    }

    fn clone_model(&self) -> Result<Box<dyn Model>, LearnError> {
        Ok(Box::new(self.clone()))
    }

    fn is_fitted(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn reseed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }
}
