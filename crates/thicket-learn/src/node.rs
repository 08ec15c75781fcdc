use std::fmt;

/// Zero-based feature column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based column position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena, identifying one node of a decision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// The root of every fitted tree.
    pub const ROOT: Self = Self(0);

    /// Create a new node index from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in a decision tree arena.
///
/// Trees are stored as `Vec<Node>` where children are referenced by
/// [`NodeIndex`]. Every node is reachable from exactly one parent, so the
/// arena is a strict tree and cloning it never shares structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// An internal decision node.
    Split {
        /// Feature used for the split.
        feature: FeatureIndex,
        /// Samples with `row[feature] <= threshold` go left.
        threshold: f64,
        /// Index of the left child node.
        left: NodeIndex,
        /// Index of the right child node.
        right: NodeIndex,
        /// Information gain (bits) achieved by this split.
        gain: f64,
        /// Number of training samples that reached this node.
        n_samples: usize,
    },
    /// A terminal leaf node.
    Leaf {
        /// Majority label of the training samples that reached this leaf.
        label: usize,
        /// Number of training samples in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureIndex, Node, NodeIndex};

    #[test]
    fn feature_index_roundtrip() {
        let fi = FeatureIndex::new(7);
        assert_eq!(fi.index(), 7);
        assert_eq!(format!("{fi}"), "7");
    }

    #[test]
    fn node_index_root_is_zero() {
        assert_eq!(NodeIndex::ROOT.index(), 0);
        assert!(NodeIndex::new(1) > NodeIndex::ROOT);
    }

    #[test]
    fn leaf_and_split_accessors() {
        let leaf = Node::Leaf {
            label: 3,
            n_samples: 10,
        };
        let split = Node::Split {
            feature: FeatureIndex::new(2),
            threshold: 3.5,
            left: NodeIndex::new(1),
            right: NodeIndex::new(2),
            gain: 0.25,
            n_samples: 20,
        };
        assert!(leaf.is_leaf());
        assert!(!split.is_leaf());
        assert_eq!(leaf.n_samples(), 10);
        assert_eq!(split.n_samples(), 20);
    }
}
