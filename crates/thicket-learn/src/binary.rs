//! Two-class metrics from true/false positive and negative counts.

use std::fmt;

use crate::error::{InputError, LearnError};

/// Outcome counts of a two-class problem, label 1 being the positive class.
///
/// Also produced per class by
/// [`ConfusionMatrix::one_vs_rest`](crate::ConfusionMatrix::one_vs_rest).
/// Every ratio with a zero denominator is reported as 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct BinaryMetrics {
    /// Positive rows predicted positive.
    pub true_positives: usize,
    /// Negative rows predicted negative.
    pub true_negatives: usize,
    /// Negative rows predicted positive.
    pub false_positives: usize,
    /// Positive rows predicted negative.
    pub false_negatives: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl BinaryMetrics {
    #[must_use]
    pub fn new(
        true_positives: usize,
        true_negatives: usize,
        false_positives: usize,
        false_negatives: usize,
    ) -> Self {
        Self {
            true_positives,
            true_negatives,
            false_positives,
            false_negatives,
        }
    }

    /// Count outcomes from 0/1 labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`InputError::EmptyLabels`] | Zero labels provided |
    /// | [`InputError::LabelCountMismatch`] | The two vectors differ in length |
    /// | [`InputError::LabelOutOfRange`] | A label is neither 0 nor 1 |
    pub fn from_labels(true_labels: &[usize], predicted: &[usize]) -> Result<Self, LearnError> {
        if true_labels.is_empty() {
            return Err(InputError::EmptyLabels.into());
        }
        if true_labels.len() != predicted.len() {
            return Err(InputError::LabelCountMismatch {
                n_rows: true_labels.len(),
                n_labels: predicted.len(),
            }
            .into());
        }

        let mut counts = Self::default();
        for (index, (&t, &p)) in true_labels.iter().zip(predicted).enumerate() {
            match (t, p) {
                (1, 1) => counts.true_positives += 1,
                (0, 0) => counts.true_negatives += 1,
                (0, 1) => counts.false_positives += 1,
                (1, 0) => counts.false_negatives += 1,
                _ => {
                    return Err(InputError::LabelOutOfRange {
                        label: t.max(p),
                        index,
                        n_classes: 2,
                    }
                    .into());
                }
            }
        }
        Ok(counts)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// TP / (TP + FP).
    #[must_use]
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// TP / (TP + FN), also called sensitivity.
    #[must_use]
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// TN / (TN + FP).
    #[must_use]
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_positives)
    }

    #[must_use]
    pub fn f1(&self) -> f64 {
        self.f_beta(1.0)
    }

    /// Weighted harmonic mean of precision and recall; `beta > 1` favours recall.
    #[must_use]
    pub fn f_beta(&self, beta: f64) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let beta_sq = beta * beta;
        let denominator = beta_sq * precision + recall;
        if denominator == 0.0 {
            0.0
        } else {
            (1.0 + beta_sq) * precision * recall / denominator
        }
    }

    /// Matthews correlation coefficient in [-1, 1].
    #[must_use]
    pub fn mcc(&self) -> f64 {
        let tp = self.true_positives as f64;
        let tn = self.true_negatives as f64;
        let fp = self.false_positives as f64;
        let fn_ = self.false_negatives as f64;
        let denominator = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        if denominator == 0.0 {
            0.0
        } else {
            (tp * tn - fp * fn_) / denominator
        }
    }

    /// Mean of recall and specificity.
    #[must_use]
    pub fn balanced_accuracy(&self) -> f64 {
        (self.recall() + self.specificity()) / 2.0
    }

    /// (FP + FN) / total.
    #[must_use]
    pub fn misclassification_rate(&self) -> f64 {
        ratio(self.false_positives + self.false_negatives, self.total())
    }
}

impl fmt::Display for BinaryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "accuracy:               {:.4}", self.accuracy())?;
        writeln!(f, "precision:              {:.4}", self.precision())?;
        writeln!(f, "recall:                 {:.4}", self.recall())?;
        writeln!(f, "specificity:            {:.4}", self.specificity())?;
        writeln!(f, "f1:                     {:.4}", self.f1())?;
        writeln!(f, "mcc:                    {:.4}", self.mcc())?;
        writeln!(f, "balanced accuracy:      {:.4}", self.balanced_accuracy())?;
        writeln!(f, "misclassification rate: {:.4}", self.misclassification_rate())?;
        writeln!(
            f,
            "counts: TP={} TN={} FP={} FN={}",
            self.true_positives, self.true_negatives, self.false_positives, self.false_negatives
        )
    }
}
