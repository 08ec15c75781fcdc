//! Point-to-point distance functions.

/// Distance used to rank neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// L1 distance.
    Manhattan,
}

impl DistanceMetric {
    /// Distance between two equal-length points.
    #[must_use]
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            DistanceMetric::Euclidean => euclidean(a, b),
            DistanceMetric::Manhattan => manhattan(a, b),
        }
    }
}

/// Euclidean distance. Extra trailing coordinates of the longer point are ignored.
#[must_use]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Manhattan distance. Extra trailing coordinates of the longer point are ignored.
#[must_use]
pub fn manhattan(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}
