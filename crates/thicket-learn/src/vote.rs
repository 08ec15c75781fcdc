//! Label counting and plurality voting.

use std::collections::BTreeMap;

/// Occurrence counts of class labels.
///
/// Labels are kept in ascending order, so ties in [`LabelCounter::most_common`]
/// resolve to the lowest label.
#[derive(Debug, Clone, Default)]
pub struct LabelCounter {
    counts: BTreeMap<usize, usize>,
    total: usize,
}

impl LabelCounter {
    /// Create an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every label in `labels`.
    #[must_use]
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut counter = Self::new();
        for &label in labels {
            counter.add(label);
        }
        counter
    }

    /// Record one occurrence of `label`.
    pub fn add(&mut self, label: usize) {
        *self.counts.entry(label).or_insert(0) += 1;
        self.total += 1;
    }

    /// Return the number of occurrences of `label`.
    #[must_use]
    pub fn count(&self, label: usize) -> usize {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    /// Return the total number of recorded labels.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Return the number of distinct labels.
    #[must_use]
    pub fn n_distinct(&self) -> usize {
        self.counts.len()
    }

    /// Return the most frequent label, lowest label first on ties.
    ///
    /// `None` when nothing has been counted.
    #[must_use]
    pub fn most_common(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (&label, &count) in &self.counts {
            if best.is_none_or(|(_, best_count)| count > best_count) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label)
    }

    /// Iterate `(label, count)` pairs in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts.iter().map(|(&label, &count)| (label, count))
    }
}

/// Aggregate per-learner prediction vectors into one label per row.
///
/// `predictions[learner][row]`. Every vector must have `n_rows` entries.
/// Each row takes the plurality label across learners; ties go to the
/// lowest label, so the result does not depend on learner order.
#[must_use]
pub fn plurality_vote(predictions: &[Vec<usize>], n_rows: usize) -> Vec<usize> {
    (0..n_rows)
        .map(|row| {
            let mut counter = LabelCounter::new();
            for learner in predictions {
                counter.add(learner[row]);
            }
            counter.most_common().unwrap_or(0)
        })
        .collect()
}
