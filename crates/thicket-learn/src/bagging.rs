//! Bootstrap aggregation over any [`Model`].

use std::panic::{self, AssertUnwindSafe};

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, error, info, instrument, warn};

use crate::error::LearnError;
use crate::model::{Model, validate_features, validate_training_set};
use crate::vote::{LabelCounter, plurality_vote};

/// One trained ensemble member and the bootstrap sample it was fitted on.
#[derive(Debug)]
pub struct WeakLearner {
    bag: usize,
    model: Box<dyn Model>,
    sample: Vec<usize>,
}

impl WeakLearner {
    /// Return the bag index this learner was trained for.
    #[must_use]
    pub fn bag(&self) -> usize {
        self.bag
    }

    /// Borrow the trained model.
    #[must_use]
    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Return the training row indices drawn for this bag, in draw order.
    #[must_use]
    pub fn sample(&self) -> &[usize] {
        &self.sample
    }
}

/// A bag whose training task failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagFailure {
    /// The failed bag index.
    pub bag: usize,
    /// Description of the failure.
    pub message: String,
}

/// Out-of-bag evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub struct OobScore {
    /// Fraction of out-of-bag rows whose vote matched their label.
    pub accuracy: f64,
    /// Number of rows left out of at least one bag.
    pub n_oob_samples: usize,
}

/// Bootstrap-aggregation engine.
///
/// Holds an untrained prototype that is cloned once per bag. Each clone is
/// trained on its own bootstrap sample; predictions are combined by
/// per-row plurality vote.
///
/// Construct via [`Bagging::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter         | Default         |
/// |-------------------|-----------------|
/// | `sample_fraction` | 1.0             |
/// | `seed`            | `None` (random) |
/// | `workers`         | `bags_number`   |
#[derive(Debug)]
pub struct Bagging {
    prototype: Box<dyn Model>,
    bags_number: usize,
    sample_fraction: f64,
    seed: Option<u64>,
    workers: Option<usize>,
    n_training_rows: usize,
    learners: Vec<WeakLearner>,
    failures: Vec<BagFailure>,
}

impl Bagging {
    /// Create an engine that will train `bags_number` clones of `prototype`.
    ///
    /// # Errors
    ///
    /// Returns [`LearnError::InvalidBagCount`] if `bags_number` is zero.
    pub fn new(prototype: Box<dyn Model>, bags_number: usize) -> Result<Self, LearnError> {
        if bags_number == 0 {
            return Err(LearnError::InvalidBagCount { bags_number });
        }
        Ok(Self {
            prototype,
            bags_number,
            sample_fraction: 1.0,
            seed: None,
            workers: None,
            n_training_rows: 0,
            learners: Vec::new(),
            failures: Vec::new(),
        })
    }

    /// Set the fraction of training rows drawn per bag.
    #[must_use]
    pub fn with_sample_fraction(mut self, sample_fraction: f64) -> Self {
        self.sample_fraction = sample_fraction;
        self
    }

    /// Fix the seed so bootstrap samples and learners are reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the size of the worker pool used by `fit`.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Borrow the untrained prototype.
    #[must_use]
    pub fn prototype(&self) -> &dyn Model {
        self.prototype.as_ref()
    }

    /// Return the requested number of bags.
    #[must_use]
    pub fn bags_number(&self) -> usize {
        self.bags_number
    }

    /// Return the bootstrap sample fraction.
    #[must_use]
    pub fn sample_fraction(&self) -> f64 {
        self.sample_fraction
    }

    /// Return the seed, if fixed.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Return the worker pool size.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(self.bags_number)
    }

    /// Return the trained weak learners, ordered by bag index.
    ///
    /// May hold fewer than `bags_number` entries when some bags failed.
    #[must_use]
    pub fn learners(&self) -> &[WeakLearner] {
        &self.learners
    }

    /// Return the bags that failed during the last `fit`.
    #[must_use]
    pub fn failures(&self) -> &[BagFailure] {
        &self.failures
    }

    /// Return the drawn row indices of every trained learner.
    #[must_use]
    pub fn bootstrap_samples(&self) -> Vec<&[usize]> {
        self.learners.iter().map(WeakLearner::sample).collect()
    }

    /// Number of rows drawn per bag: `round(n * sample_fraction)`, at least 1.
    fn draw_count(&self, n_samples: usize) -> usize {
        ((n_samples as f64) * self.sample_fraction).round().max(1.0) as usize
    }

    /// Score the ensemble on the rows each learner never saw.
    ///
    /// `features` and `labels` must be the training set passed to `fit`.
    /// A row is voted on only by learners whose bootstrap sample excluded
    /// it; rows in every bag are skipped.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`LearnError::UnfittedModel`] | `fit` has not succeeded |
    /// | [`LearnError::InvalidInput`] | malformed input |
    /// | [`LearnError::OobEvaluationFailed`] | row count differs from training, or no row is out of bag |
    #[instrument(skip_all, fields(n_learners = self.learners.len()))]
    pub fn oob_score(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<OobScore, LearnError> {
        if self.learners.is_empty() {
            return Err(LearnError::UnfittedModel { model: self.name() });
        }
        validate_training_set(features, labels)?;
        let n_samples = features.len();
        if n_samples != self.n_training_rows {
            return Err(LearnError::OobEvaluationFailed {
                reason: format!(
                    "expected the {} training rows, got {n_samples}",
                    self.n_training_rows
                ),
            });
        }

        let mut votes: Vec<LabelCounter> = vec![LabelCounter::new(); n_samples];
        for learner in &self.learners {
            let mut in_bag = vec![false; n_samples];
            for &i in &learner.sample {
                in_bag[i] = true;
            }
            let oob_rows: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
            if oob_rows.is_empty() {
                continue;
            }
            let oob_features: Vec<Vec<f64>> =
                oob_rows.iter().map(|&i| features[i].clone()).collect();
            let predictions = learner.model.predict(&oob_features)?;
            for (&row, label) in oob_rows.iter().zip(predictions) {
                votes[row].add(label);
            }
        }

        let mut n_oob_samples = 0usize;
        let mut correct = 0usize;
        for (counter, &label) in votes.iter().zip(labels) {
            if let Some(predicted) = counter.most_common() {
                n_oob_samples += 1;
                if predicted == label {
                    correct += 1;
                }
            }
        }
        if n_oob_samples == 0 {
            return Err(LearnError::OobEvaluationFailed {
                reason: "no sample was left out of any bag".to_string(),
            });
        }

        let accuracy = correct as f64 / n_oob_samples as f64;
        debug!(accuracy, n_oob_samples, "out-of-bag score computed");
        Ok(OobScore {
            accuracy,
            n_oob_samples,
        })
    }
}

/// Draw a bootstrap sample, clone the prototype and train the clone.
fn train_bag(
    prototype: &dyn Model,
    features: &[Vec<f64>],
    labels: &[usize],
    bag: usize,
    draw_count: usize,
    seed: u64,
) -> Result<WeakLearner, LearnError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_samples = features.len();
    let sample: Vec<usize> = (0..draw_count).map(|_| rng.gen_range(0..n_samples)).collect();

    let boot_features: Vec<Vec<f64>> = sample.iter().map(|&i| features[i].clone()).collect();
    let boot_labels: Vec<usize> = sample.iter().map(|&i| labels[i]).collect();

    let mut model = prototype.clone_model()?;
    model.reseed(rng.r#gen());
    model.fit(&boot_features, &boot_labels)?;

    Ok(WeakLearner { bag, model, sample })
}

/// Render a caught panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "training task panicked".to_string()
    }
}

impl Model for Bagging {
    fn name(&self) -> &'static str {
        "bagging"
    }

    /// Train one prototype clone per bag on a dedicated worker pool.
    ///
    /// Blocks until every bag has finished. A failing bag is logged and
    /// recorded in [`Bagging::failures`] without affecting its siblings.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`LearnError::InvalidInput`] | empty, ragged or length-mismatched input |
    /// | [`LearnError::InvalidSampleFraction`] | `sample_fraction` not in (0.0, 1.0] |
    /// | [`LearnError::InvalidWorkerCount`] | `workers` is zero |
    /// | [`LearnError::WorkerPool`] | the worker pool cannot be created |
    /// | [`LearnError::NoLearnersTrained`] | every bag failed |
    #[instrument(skip_all, fields(bags_number = self.bags_number, n_samples = features.len()))]
    fn fit(&mut self, features: &[Vec<f64>], labels: &[usize]) -> Result<(), LearnError> {
        validate_training_set(features, labels)?;

        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(LearnError::InvalidSampleFraction {
                fraction: self.sample_fraction,
            });
        }
        let workers = self.workers();
        if workers == 0 {
            return Err(LearnError::InvalidWorkerCount { workers });
        }

        let draw_count = self.draw_count(features.len());
        let master_seed = self.seed.unwrap_or_else(rand::random);

        // One independent generator per bag, derived from the engine seed.
        let mut master_rng = ChaCha8Rng::seed_from_u64(master_seed);
        let bag_seeds: Vec<u64> = (0..self.bags_number).map(|_| master_rng.r#gen()).collect();

        info!(
            bags_number = self.bags_number,
            workers,
            draw_count,
            prototype = self.prototype.name(),
            "training bagging ensemble"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("bagging-worker-{i}"))
            .build()
            .map_err(|source| LearnError::WorkerPool { source })?;

        let prototype = self.prototype.as_ref();
        let outcomes: Vec<(usize, Result<WeakLearner, String>)> = pool.install(|| {
            bag_seeds
                .into_par_iter()
                .enumerate()
                .map(|(bag, seed)| {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        train_bag(prototype, features, labels, bag, draw_count, seed)
                    }));
                    let outcome = match outcome {
                        Ok(result) => result.map_err(|e| e.to_string()),
                        Err(payload) => Err(panic_message(payload.as_ref())),
                    };
                    (bag, outcome)
                })
                .collect()
        });

        let mut learners = Vec::with_capacity(self.bags_number);
        let mut failures = Vec::new();
        for (bag, outcome) in outcomes {
            match outcome {
                Ok(learner) => {
                    debug!(bag, "weak learner trained");
                    learners.push(learner);
                }
                Err(message) => {
                    warn!(bag, %message, "weak learner failed to train");
                    failures.push(BagFailure { bag, message });
                }
            }
        }

        self.n_training_rows = features.len();
        self.learners = learners;
        self.failures = failures;

        if self.learners.is_empty() {
            error!(
                bags_number = self.bags_number,
                "no weak learner was trained"
            );
            return Err(LearnError::NoLearnersTrained {
                bags_number: self.bags_number,
                failed: self.failures.len(),
            });
        }

        info!(
            n_learners = self.learners.len(),
            n_failed = self.failures.len(),
            "bagging ensemble trained"
        );
        Ok(())
    }

    /// Predict by per-row plurality vote over every weak learner.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, LearnError> {
        if self.learners.is_empty() {
            return Err(LearnError::UnfittedModel { model: self.name() });
        }
        validate_features(features)?;

        let predictions: Vec<Vec<usize>> = self
            .learners
            .par_iter()
            .map(|learner| learner.model.predict(features))
            .collect::<Result<_, _>>()?;

        Ok(plurality_vote(&predictions, features.len()))
    }

    fn clone_model(&self) -> Result<Box<dyn Model>, LearnError> {
        Err(LearnError::UnsupportedOperation {
            model: self.name(),
            operation: "clone",
        })
    }

    fn is_fitted(&self) -> bool {
        !self.learners.is_empty()
    }
}
