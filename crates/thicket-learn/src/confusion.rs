//! Confusion matrix and per-class classification metrics.

use std::fmt;

use crate::binary::BinaryMetrics;
use crate::error::{InputError, LearnError};

/// A confusion matrix for multi-class classification.
///
/// Entry `matrix[i][j]` counts how many samples of class `classes()[i]`
/// were predicted as class `classes()[j]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    classes: Vec<usize>,
}

/// Per-class metrics, each class scored one-vs-rest.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ClassMetrics {
    /// The class label.
    pub class: usize,
    /// Precision: TP / (TP + FP). 0.0 if no predictions for this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no true samples for this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Specificity: TN / (TN + FP).
    pub specificity: f64,
    /// Matthews correlation coefficient. 0.0 if undefined.
    pub mcc: f64,
    /// Number of true samples in this class.
    pub support: usize,
}

/// Metrics averaged over classes.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct AveragedMetrics {
    /// Averaged precision.
    pub precision: f64,
    /// Averaged recall.
    pub recall: f64,
    /// Averaged F1.
    pub f1: f64,
    /// Averaged specificity.
    pub specificity: f64,
    /// Averaged Matthews correlation coefficient.
    pub mcc: f64,
}

impl AveragedMetrics {
    const ZERO: Self = Self {
        precision: 0.0,
        recall: 0.0,
        f1: 0.0,
        specificity: 0.0,
        mcc: 0.0,
    };
}

/// How per-class metrics are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Average {
    /// Metrics computed once from counts pooled over every class.
    Micro,
    /// Unweighted mean over classes that occur in the true labels.
    Macro,
    /// Mean weighted by each class's support.
    Weighted,
}

/// A single scalar metric, see [`ConfusionMatrix::metric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Accuracy,
    Precision,
    Recall,
    F1,
    Specificity,
    Mcc,
}

impl ConfusionMatrix {
    /// Build a confusion matrix over the classes `0..n_classes`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`InputError::EmptyLabels`] | Zero labels provided |
    /// | [`InputError::LabelCountMismatch`] | The two vectors differ in length |
    /// | [`InputError::LabelOutOfRange`] | A label is `>= n_classes` |
    pub fn from_labels(
        true_labels: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, LearnError> {
        check_lengths(true_labels, predicted)?;
        let out_of_range = true_labels
            .iter()
            .chain(predicted)
            .enumerate()
            .find(|&(_, &label)| label >= n_classes);
        if let Some((position, &label)) = out_of_range {
            return Err(InputError::LabelOutOfRange {
                label,
                index: position % true_labels.len(),
                n_classes,
            }
            .into());
        }

        Ok(Self::tally(true_labels, predicted, (0..n_classes).collect()))
    }

    /// Build a confusion matrix over the distinct labels that actually occur.
    ///
    /// Rows and columns follow ascending label order, so sparse or very
    /// large label values cost nothing for the gaps between them.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`InputError::EmptyLabels`] | Zero labels provided |
    /// | [`InputError::LabelCountMismatch`] | The two vectors differ in length |
    pub fn from_observed_labels(
        true_labels: &[usize],
        predicted: &[usize],
    ) -> Result<Self, LearnError> {
        check_lengths(true_labels, predicted)?;
        let mut classes: Vec<usize> = true_labels.iter().chain(predicted).copied().collect();
        classes.sort_unstable();
        classes.dedup();
        Ok(Self::tally(true_labels, predicted, classes))
    }

    /// Count label pairs; every label must be present in `classes` (sorted).
    fn tally(true_labels: &[usize], predicted: &[usize], classes: Vec<usize>) -> Self {
        let slot = |label: usize| classes.partition_point(|&c| c < label);
        let mut matrix = vec![vec![0usize; classes.len()]; classes.len()];
        for (&t, &p) in true_labels.iter().zip(predicted) {
            matrix[slot(t)][slot(p)] += 1;
        }
        Self { matrix, classes }
    }

    /// Overall accuracy: proportion of correct predictions.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes()).map(|i| self.matrix[i][i]).sum();
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Total number of counted samples.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flat_map(|row| row.iter()).sum()
    }

    /// One-vs-rest counts for the class at matrix position `i`.
    fn counts_at(&self, i: usize) -> BinaryMetrics {
        let n = self.n_classes();
        let tp = self.matrix[i][i];
        let fp: usize = (0..n).filter(|&r| r != i).map(|r| self.matrix[r][i]).sum();
        let fn_: usize = (0..n).filter(|&c| c != i).map(|c| self.matrix[i][c]).sum();
        let tn = self.total() - tp - fp - fn_;
        BinaryMetrics::new(tp, tn, fp, fn_)
    }

    /// Treat `class` as positive and every other class as negative.
    ///
    /// Returns `None` if `class` is not one of [`ConfusionMatrix::classes`].
    #[must_use]
    pub fn one_vs_rest(&self, class: usize) -> Option<BinaryMetrics> {
        self.classes
            .binary_search(&class)
            .ok()
            .map(|i| self.counts_at(i))
    }

    /// Per-class precision, recall, F1, specificity, MCC and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, &class)| {
                let counts = self.counts_at(i);
                ClassMetrics {
                    class,
                    precision: counts.precision(),
                    recall: counts.recall(),
                    f1: counts.f1(),
                    specificity: counts.specificity(),
                    mcc: counts.mcc(),
                    support: counts.true_positives + counts.false_negatives,
                }
            })
            .collect()
    }

    /// Combine the per-class metrics as `average` describes.
    #[must_use]
    pub fn average(&self, average: Average) -> AveragedMetrics {
        match average {
            Average::Micro => self.micro_average(),
            Average::Macro => self.macro_average(),
            Average::Weighted => self.weighted_average(),
        }
    }

    /// Metrics from TP/TN/FP/FN counts summed over every class.
    #[must_use]
    pub fn micro_average(&self) -> AveragedMetrics {
        let pooled = (0..self.n_classes())
            .map(|i| self.counts_at(i))
            .fold(BinaryMetrics::default(), |acc, c| {
                BinaryMetrics::new(
                    acc.true_positives + c.true_positives,
                    acc.true_negatives + c.true_negatives,
                    acc.false_positives + c.false_positives,
                    acc.false_negatives + c.false_negatives,
                )
            });
        AveragedMetrics {
            precision: pooled.precision(),
            recall: pooled.recall(),
            f1: pooled.f1(),
            specificity: pooled.specificity(),
            mcc: pooled.mcc(),
        }
    }

    /// Unweighted mean of the per-class metrics over classes with support.
    ///
    /// Classes that never occur in the true labels are left out.
    #[must_use]
    pub fn macro_average(&self) -> AveragedMetrics {
        let present: Vec<ClassMetrics> = self
            .class_metrics()
            .into_iter()
            .filter(|m| m.support > 0)
            .collect();
        if present.is_empty() {
            return AveragedMetrics::ZERO;
        }
        let n = present.len() as f64;
        let mean = |value: fn(&ClassMetrics) -> f64| present.iter().map(value).sum::<f64>() / n;
        AveragedMetrics {
            precision: mean(|m| m.precision),
            recall: mean(|m| m.recall),
            f1: mean(|m| m.f1),
            specificity: mean(|m| m.specificity),
            mcc: mean(|m| m.mcc),
        }
    }

    /// Support-weighted mean of the per-class metrics.
    #[must_use]
    pub fn weighted_average(&self) -> AveragedMetrics {
        let total = self.total();
        if total == 0 {
            return AveragedMetrics::ZERO;
        }
        let metrics = self.class_metrics();
        let weighted = |value: fn(&ClassMetrics) -> f64| {
            metrics
                .iter()
                .map(|m| value(m) * m.support as f64)
                .sum::<f64>()
                / total as f64
        };
        AveragedMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            specificity: weighted(|m| m.specificity),
            mcc: weighted(|m| m.mcc),
        }
    }

    /// A single averaged metric. `average` is ignored for accuracy.
    #[must_use]
    pub fn metric(&self, metric: Metric, average: Average) -> f64 {
        let averaged = || self.average(average);
        match metric {
            Metric::Accuracy => self.accuracy(),
            Metric::Precision => averaged().precision,
            Metric::Recall => averaged().recall,
            Metric::F1 => averaged().f1,
            Metric::Specificity => averaged().specificity,
            Metric::Mcc => averaged().mcc,
        }
    }

    /// Multi-line report of accuracy and the averaged metrics, followed by
    /// the matrix itself.
    #[must_use]
    pub fn summary(&self, average: Average) -> String {
        let m = self.average(average);
        format!(
            "accuracy:    {:.4}\nprecision:   {:.4}\nrecall:      {:.4}\nf1:          {:.4}\nspecificity: {:.4}\nmcc:         {:.4}\n{self}",
            self.accuracy(),
            m.precision,
            m.recall,
            m.f1,
            m.specificity,
            m.mcc,
        )
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Class label of every row and column, ascending.
    #[must_use]
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

fn check_lengths(true_labels: &[usize], predicted: &[usize]) -> Result<(), LearnError> {
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
    Ok(())
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for class in &self.classes {
            write!(f, " pred_{class:>3}")?;
        }
        writeln!(f)?;

        for (class, row) in self.classes.iter().zip(&self.matrix) {
            write!(f, "true_{class:>3}")?;
            for val in row {
                write!(f, " {val:>8}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let labels = vec![0, 0, 1, 1, 2, 2];
        let cm = ConfusionMatrix::from_labels(&labels, &labels, 3).unwrap();
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);

        for m in cm.class_metrics() {
            assert!((m.precision - 1.0).abs() < f64::EPSILON);
            assert!((m.recall - 1.0).abs() < f64::EPSILON);
            assert!((m.f1 - 1.0).abs() < f64::EPSILON);
        }
        assert!((cm.macro_average().f1 - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn known_confusion_matrix() {
        // Each class: TP=2, FP=1, FN=1.
        let true_labels = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let predicted = vec![0, 0, 1, 1, 1, 2, 2, 2, 0];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted, 3).unwrap();

        let metrics = cm.class_metrics();
        assert!((metrics[0].precision - 2.0 / 3.0).abs() < 1e-10);
        assert!((metrics[0].recall - 2.0 / 3.0).abs() < 1e-10);
        assert_eq!(metrics[0].support, 3);
        assert!((cm.accuracy() - 6.0 / 9.0).abs() < 1e-10);
    }

    #[test]
    fn macro_and_weighted_differ_on_imbalance() {
        // Class 0 (support 4) is perfect; class 1 (support 1) is always missed.
        let true_labels = vec![0, 0, 0, 0, 1];
        let predicted = vec![0, 0, 0, 0, 0];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted, 2).unwrap();

        let recall_macro = cm.macro_average().recall;
        let recall_weighted = cm.weighted_average().recall;
        assert!((recall_macro - 0.5).abs() < 1e-10);
        assert!((recall_weighted - 0.8).abs() < 1e-10);
    }

    #[test]
    fn macro_average_skips_absent_classes() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 1], 5).unwrap();
        assert!((cm.macro_average().precision - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_labels_error() {
        let err = ConfusionMatrix::from_labels(&[], &[], 3).unwrap_err();
        assert!(matches!(
            err,
            LearnError::InvalidInput(InputError::EmptyLabels)
        ));
    }

    #[test]
    fn length_mismatch_error() {
        let err = ConfusionMatrix::from_labels(&[0, 1], &[0], 2).unwrap_err();
        assert!(matches!(
            err,
            LearnError::InvalidInput(InputError::LabelCountMismatch { .. })
        ));
    }

    #[test]
    fn out_of_range_label_error() {
        let err = ConfusionMatrix::from_labels(&[0, 1], &[0, 4], 2).unwrap_err();
        assert!(matches!(
            err,
            LearnError::InvalidInput(InputError::LabelOutOfRange {
                label: 4,
                index: 1,
                n_classes: 2
            })
        ));
    }

    #[test]
    fn display_formatting() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 1], 2).unwrap();
        let output = format!("{cm}");
        assert!(output.contains("pred_"));
        assert!(output.contains("true_"));
    }

    #[test]
    fn as_rows_returns_matrix() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 1, 1], &[0, 1, 0, 1], 2).unwrap();
        let rows = cm.as_rows();
        assert_eq!(rows[0], vec![1, 1]);
        assert_eq!(rows[1], vec![1, 1]);
    }

    #[test]
    fn zero_support_class_metrics() {
        let labels = vec![0, 0, 1, 1];
        let cm = ConfusionMatrix::from_labels(&labels, &labels, 3).unwrap();
        let metrics = cm.class_metrics();
        assert_eq!(metrics[2].support, 0);
        assert_eq!(metrics[2].recall, 0.0);
    }

    // yTrue {0,1,2,0,2,2,3}, yPred {0,1,1,0,2,2,1} over four classes.
    fn worked_example() -> ConfusionMatrix {
        ConfusionMatrix::from_labels(&[0, 1, 2, 0, 2, 2, 3], &[0, 1, 1, 0, 2, 2, 1], 4).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn worked_example_per_class() {
        let cm = worked_example();
        assert!(close(cm.accuracy(), 5.0 / 7.0));
        let m = cm.class_metrics();

        assert!(close(m[0].precision, 1.0) && close(m[0].recall, 1.0));
        assert!(close(m[0].specificity, 1.0) && close(m[0].mcc, 1.0));

        assert!(close(m[1].precision, 1.0 / 3.0));
        assert!(close(m[1].recall, 1.0));
        assert!(close(m[1].f1, 0.5));
        assert!(close(m[1].specificity, 2.0 / 3.0));
        assert!(close(m[1].mcc, 4.0 / 72.0_f64.sqrt()));

        assert!(close(m[2].recall, 2.0 / 3.0));
        assert!(close(m[2].f1, 0.8));
        assert!(close(m[2].specificity, 1.0));
        assert!(close(m[2].mcc, 8.0 / 120.0_f64.sqrt()));

        // Class 3 is never predicted: precision and MCC are undefined.
        assert_eq!(m[3].precision, 0.0);
        assert_eq!(m[3].mcc, 0.0);
        assert!(close(m[3].specificity, 1.0));
        assert_eq!(
            m.iter().map(|c| c.support).collect::<Vec<_>>(),
            vec![2, 1, 3, 1]
        );
    }

    #[test]
    fn worked_example_averages() {
        let cm = worked_example();
        let mcc = [1.0, 4.0 / 72.0_f64.sqrt(), 8.0 / 120.0_f64.sqrt(), 0.0];

        let macro_avg = cm.macro_average();
        assert!(close(macro_avg.precision, 7.0 / 12.0));
        assert!(close(macro_avg.recall, 2.0 / 3.0));
        assert!(close(macro_avg.f1, 0.575));
        assert!(close(macro_avg.specificity, 11.0 / 12.0));
        assert!(close(macro_avg.mcc, mcc.iter().sum::<f64>() / 4.0));

        let weighted = cm.weighted_average();
        assert!(close(weighted.precision, 16.0 / 21.0));
        assert!(close(weighted.recall, 5.0 / 7.0));
        assert!(close(weighted.f1, 0.7));
        assert!(close(weighted.specificity, 20.0 / 21.0));
        let weighted_mcc = (2.0 * mcc[0] + mcc[1] + 3.0 * mcc[2]) / 7.0;
        assert!(close(weighted.mcc, weighted_mcc));

        // Pooled: TP=5, TN=19, FP=2, FN=2.
        let micro = cm.micro_average();
        assert!(close(micro.precision, 5.0 / 7.0));
        assert!(close(micro.recall, 5.0 / 7.0));
        assert!(close(micro.f1, 5.0 / 7.0));
        assert!(close(micro.specificity, 19.0 / 21.0));
        assert!(close(micro.mcc, 13.0 / 21.0));
    }

    #[test]
    fn metric_selects_by_name_and_average() {
        let cm = worked_example();
        assert!(close(cm.metric(Metric::Accuracy, Average::Macro), 5.0 / 7.0));
        assert!(close(cm.metric(Metric::Accuracy, Average::Weighted), 5.0 / 7.0));
        assert!(close(cm.metric(Metric::Precision, Average::Macro), 7.0 / 12.0));
        assert!(close(cm.metric(Metric::F1, Average::Weighted), 0.7));
        assert!(close(cm.metric(Metric::Mcc, Average::Micro), 13.0 / 21.0));
        assert!(close(
            cm.metric(Metric::Specificity, Average::Macro),
            cm.average(Average::Macro).specificity
        ));
    }

    #[test]
    fn summary_reports_averages_and_matrix() {
        let text = worked_example().summary(Average::Weighted);
        assert!(text.starts_with("accuracy:    0.7143"));
        assert!(text.contains("f1:          0.7000"));
        assert!(text.contains("mcc:"));
        assert!(text.contains("true_  3"));
    }

    #[test]
    fn one_vs_rest_counts() {
        let cm = worked_example();
        let class_one = cm.one_vs_rest(1).unwrap();
        assert_eq!(class_one, BinaryMetrics::new(1, 4, 2, 0));
        assert!(close(class_one.balanced_accuracy(), 5.0 / 6.0));
        assert!(cm.one_vs_rest(9).is_none());
    }

    #[test]
    fn observed_labels_use_dense_slots() {
        let cm =
            ConfusionMatrix::from_observed_labels(&[3, 1_000_000, 3], &[3, 3, 1_000_000]).unwrap();
        assert_eq!(cm.classes(), &[3, 1_000_000]);
        assert_eq!(cm.n_classes(), 2);
        assert_eq!(cm.as_rows(), &[vec![1, 1], vec![1, 0]]);
        assert_eq!(cm.class_metrics()[1].class, 1_000_000);
        assert!(close(cm.accuracy(), 1.0 / 3.0));
        assert!(cm.to_string().contains("pred_1000000"));
    }

    #[test]
    fn observed_labels_include_predicted_only_classes() {
        let cm = ConfusionMatrix::from_observed_labels(&[0, 0], &[0, 5]).unwrap();
        assert_eq!(cm.classes(), &[0, 5]);
        assert_eq!(cm.class_metrics()[1].support, 0);
    }

    #[test]
    fn observed_labels_reject_bad_lengths() {
        assert!(ConfusionMatrix::from_observed_labels(&[], &[]).unwrap_err().is_invalid_input());
        assert!(ConfusionMatrix::from_observed_labels(&[1], &[1, 2])
            .unwrap_err()
            .is_invalid_input());
    }
}
