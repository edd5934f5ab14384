//! Fitted regression trees stored as flat node arrays.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        /// Rows with `value < threshold` go left.
        threshold: f64,
        /// Side taken by missing values.
        default_left: bool,
        left: usize,
        right: usize,
        gain: f64,
    },
    Leaf {
        value: f64,
    },
}

/// One boosted tree. Node 0 is the root; children always have larger
/// indices than their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                    ..
                } => {
                    let v = row[*feature];
                    let go_left = if v.is_nan() { *default_left } else { v < *threshold };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Add each split's gain to `importance[feature]`.
    pub fn accumulate_gain(&self, importance: &mut [f64]) {
        for node in &self.nodes {
            if let TreeNode::Split { feature, gain, .. } = node {
                importance[*feature] += gain;
            }
        }
    }

    /// Structural check for trees loaded from disk.
    pub(crate) fn is_well_formed(&self, n_features: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(idx, node)| match node {
                TreeNode::Leaf { value } => value.is_finite(),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    *feature < n_features
                        && !threshold.is_nan()
                        && *left > idx
                        && *right > idx
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> RegressionTree {
        RegressionTree::new(vec![
            TreeNode::Split {
                feature: 1,
                threshold: 0.5,
                default_left: false,
                left: 1,
                right: 2,
                gain: 3.0,
            },
            TreeNode::Leaf { value: -1.0 },
            TreeNode::Leaf { value: 2.0 },
        ])
    }

    #[test]
    fn routes_by_threshold_and_default_direction() {
        let tree = stump();
        assert_eq!(tree.predict_row(&[9.0, 0.1]), -1.0);
        assert_eq!(tree.predict_row(&[9.0, 0.5]), 2.0);
        assert_eq!(tree.predict_row(&[9.0, f64::NAN]), 2.0);
    }

    #[test]
    fn shape_and_importance() {
        let tree = stump();
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(RegressionTree::new(vec![TreeNode::Leaf { value: 0.3 }]).depth(), 0);

        let mut importance = vec![0.0; 2];
        tree.accumulate_gain(&mut importance);
        assert_eq!(importance, vec![0.0, 3.0]);
    }

    #[test]
    fn well_formedness() {
        assert!(stump().is_well_formed(2));
        assert!(!stump().is_well_formed(1));
        let cyclic = RegressionTree::new(vec![TreeNode::Split {
            feature: 0,
            threshold: 1.0,
            default_left: true,
            left: 0,
            right: 0,
            gain: 0.0,
        }]);
        assert!(!cyclic.is_well_formed(1));
    }
}
