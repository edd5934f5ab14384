//! Depth-wise tree growth with histogram split finding.
//!
//! Split scoring is the second-order gain
//!
//! ```text
//! gain = 0.5 * [T(G_L)²/(H_L + λ) + T(G_R)²/(H_R + λ) - T(G_P)²/(H_P + λ)]
//! ```
//!
//! where `T` soft-thresholds by the L1 penalty `α`, and leaf weights are
//! `-T(G)/(H + λ)` scaled by the learning rate. Rows whose feature value is
//! missing are sent to whichever side gives the larger gain; that side is
//! stored as the split's default direction.

use bt_types::{BoosterSettings, HyperParams};

use crate::binning::{BinnedMatrix, FeatureBinner, MISSING_BIN};
use crate::tree::{RegressionTree, TreeNode};

/// Smallest loss reduction accepted as a split.
const MIN_SPLIT_GAIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitParams {
    pub learning_rate: f64,
    pub max_depth: usize,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
}

impl SplitParams {
    pub fn new(params: &HyperParams, settings: &BoosterSettings) -> Self {
        Self {
            learning_rate: params.learning_rate,
            max_depth: params.max_depth as usize,
            reg_lambda: params.reg_lambda,
            reg_alpha: params.reg_alpha,
            gamma: settings.gamma,
            min_child_weight: settings.min_child_weight,
        }
    }

    #[inline]
    fn threshold_l1(&self, grad_sum: f64) -> f64 {
        if grad_sum > self.reg_alpha {
            grad_sum - self.reg_alpha
        } else if grad_sum < -self.reg_alpha {
            grad_sum + self.reg_alpha
        } else {
            0.0
        }
    }

    /// Unscaled optimal leaf weight.
    pub fn leaf_weight(&self, grad_sum: f64, hess_sum: f64) -> f64 {
        -self.threshold_l1(grad_sum) / (hess_sum + self.reg_lambda)
    }

    #[inline]
    fn score(&self, stats: GradStats) -> f64 {
        let g = self.threshold_l1(stats.grad);
        g * g / (stats.hess + self.reg_lambda)
    }

    /// Loss reduction from splitting `left + right` into the two children.
    pub fn split_gain(&self, left: GradStats, right: GradStats) -> f64 {
        0.5 * (self.score(left) + self.score(right) - self.score(left.plus(right)))
    }

    fn is_valid_split(&self, left: &GradStats, right: &GradStats) -> bool {
        left.count > 0
            && right.count > 0
            && left.hess >= self.min_child_weight
            && right.hess >= self.min_child_weight
    }
}

/// Gradient and hessian sums over a set of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradStats {
    pub grad: f64,
    pub hess: f64,
    pub count: usize,
}

impl GradStats {
    #[inline]
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    fn plus(self, other: Self) -> Self {
        Self {
            grad: self.grad + other.grad,
            hess: self.hess + other.hess,
            count: self.count + other.count,
        }
    }

    fn minus(self, other: Self) -> Self {
        Self {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count.saturating_sub(other.count),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    default_left: bool,
    gain: f64,
    left: GradStats,
    right: GradStats,
}

/// Grows one tree from per-row gradients over a pre-binned training matrix.
pub struct TreeGrower<'a> {
    binner: &'a FeatureBinner,
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    params: SplitParams,
}

impl<'a> TreeGrower<'a> {
    pub fn new(
        binner: &'a FeatureBinner,
        binned: &'a BinnedMatrix,
        grad: &'a [f64],
        hess: &'a [f64],
        params: SplitParams,
    ) -> Self {
        Self {
            binner,
            binned,
            grad,
            hess,
            params,
        }
    }

    /// Grow a tree on the given rows, considering only `features` for splits.
    pub fn grow(&self, rows: &[usize], features: &[usize]) -> RegressionTree {
        let mut total = GradStats::default();
        for &r in rows {
            total.add(self.grad[r], self.hess[r]);
        }
        let mut nodes = Vec::new();
        self.build(&mut nodes, rows.to_vec(), total, features, 0);
        RegressionTree::new(nodes)
    }

    fn build(
        &self,
        nodes: &mut Vec<TreeNode>,
        rows: Vec<usize>,
        stats: GradStats,
        features: &[usize],
        depth: usize,
    ) -> usize {
        let idx = nodes.len();
        let value = self.params.learning_rate * self.params.leaf_weight(stats.grad, stats.hess);
        nodes.push(TreeNode::Leaf { value });

        if depth >= self.params.max_depth
            || rows.len() < 2
            || stats.hess < 2.0 * self.params.min_child_weight
        {
            return idx;
        }
        let Some(split) = self.find_split(&rows, stats, features) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.iter().partition(|&&r| {
            let bin = self.binned.get(r, split.feature);
            if bin == MISSING_BIN {
                split.default_left
            } else {
                bin as usize <= split.bin
            }
        });
        drop(rows);

        let left = self.build(nodes, left_rows, split.left, features, depth + 1);
        let right = self.build(nodes, right_rows, split.right, features, depth + 1);
        nodes[idx] = TreeNode::Split {
            feature: split.feature,
            threshold: self.binner.threshold(split.feature, split.bin),
            default_left: split.default_left,
            left,
            right,
            gain: split.gain,
        };
        idx
    }

    fn find_split(&self, rows: &[usize], parent: GradStats, features: &[usize]) -> Option<SplitCandidate> {
        let mut histograms: Vec<Vec<GradStats>> = features
            .iter()
            .map(|&f| vec![GradStats::default(); self.binner.n_bins(f)])
            .collect();
        let mut missing = vec![GradStats::default(); features.len()];

        for &r in rows {
            let (g, h) = (self.grad[r], self.hess[r]);
            let bins = self.binned.row(r);
            for (slot, &feature) in features.iter().enumerate() {
                let bin = bins[feature];
                if bin == MISSING_BIN {
                    missing[slot].add(g, h);
                } else {
                    histograms[slot][bin as usize].add(g, h);
                }
            }
        }

        let min_gain = self.params.gamma.max(MIN_SPLIT_GAIN);
        let mut best: Option<SplitCandidate> = None;
        for (slot, &feature) in features.iter().enumerate() {
            let hist = &histograms[slot];
            if hist.len() < 2 {
                continue;
            }
            let miss = missing[slot];
            let present = parent.minus(miss);

            let mut left = GradStats::default();
            for (bin, bin_stats) in hist[..hist.len() - 1].iter().enumerate() {
                left = left.plus(*bin_stats);
                let right = present.minus(left);

                for default_left in [false, true] {
                    if default_left && miss.count == 0 {
                        continue;
                    }
                    let (l, r) = if default_left {
                        (left.plus(miss), right)
                    } else {
                        (left, right.plus(miss))
                    };
                    if !self.params.is_valid_split(&l, &r) {
                        continue;
                    }
                    let gain = self.params.split_gain(l, r);
                    if gain > min_gain && best.as_ref().map_or(true, |b| gain > b.gain) {
                        best = Some(SplitCandidate {
                            feature,
                            bin,
                            default_left,
                            gain,
                            left: l,
                            right: r,
                        });
                    }
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::LogisticLoss;
    use bt_types::Dataset;

    fn params() -> SplitParams {
        SplitParams {
            learning_rate: 1.0,
            max_depth: 3,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            min_child_weight: 0.0,
        }
    }

    /// Feature 0 separates the classes at 5.0; feature 1 is noise.
    fn separable() -> Dataset {
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            values.push(i as f64 * 0.5);
            values.push(((i * 7) % 5) as f64);
            labels.push(u8::from(i >= 10));
        }
        Dataset::from_row_major(vec!["signal".into(), "noise".into()], values, labels).unwrap()
    }

    fn gradients(dataset: &Dataset) -> (Vec<f64>, Vec<f64>) {
        let n = dataset.n_rows();
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        LogisticLoss::new(1.0).gradients(&vec![0.0; n], dataset.labels(), &mut grad, &mut hess);
        (grad, hess)
    }

    #[test]
    fn gain_and_leaf_weight_formulas() {
        let p = params();
        let left = GradStats { grad: 10.0, hess: 5.0, count: 5 };
        let right = GradStats { grad: -10.0, hess: 5.0, count: 5 };
        assert!((p.split_gain(left, right) - 100.0 / 6.0).abs() < 1e-9);
        assert!((p.leaf_weight(-10.0, 5.0) - 10.0 / 6.0).abs() < 1e-9);

        let l1 = SplitParams { reg_alpha: 2.0, ..p };
        assert_eq!(l1.leaf_weight(-1.0, 5.0), 0.0);
        assert!((l1.leaf_weight(-10.0, 5.0) - 8.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn finds_the_separating_split() {
        let dataset = separable();
        let binner = FeatureBinner::fit(&dataset, 256);
        let binned = binner.transform(&dataset);
        let (grad, hess) = gradients(&dataset);
        let rows: Vec<usize> = (0..dataset.n_rows()).collect();

        let tree = TreeGrower::new(&binner, &binned, &grad, &hess, params()).grow(&rows, &[0, 1]);
        match &tree.nodes()[0] {
            TreeNode::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert!((*threshold - 4.75).abs() < 1e-12);
            }
            other => panic!("expected a split at the root, got {other:?}"),
        }
        for r in 0..dataset.n_rows() {
            let value = tree.predict_row(dataset.row(r));
            if dataset.label(r) == 1 {
                assert!(value > 0.0);
            } else {
                assert!(value < 0.0);
            }
        }
    }

    #[test]
    fn respects_max_depth_and_feature_subset() {
        let dataset = separable();
        let binner = FeatureBinner::fit(&dataset, 256);
        let binned = binner.transform(&dataset);
        let (grad, hess) = gradients(&dataset);
        let rows: Vec<usize> = (0..dataset.n_rows()).collect();

        let shallow = SplitParams { max_depth: 1, ..params() };
        let tree = TreeGrower::new(&binner, &binned, &grad, &hess, shallow).grow(&rows, &[0, 1]);
        assert!(tree.depth() <= 1);

        let tree = TreeGrower::new(&binner, &binned, &grad, &hess, params()).grow(&rows, &[1]);
        for node in tree.nodes() {
            if let TreeNode::Split { feature, .. } = node {
                assert_eq!(*feature, 1);
            }
        }
    }

    #[test]
    fn heavy_min_child_weight_gives_a_single_leaf() {
        let dataset = separable();
        let binner = FeatureBinner::fit(&dataset, 256);
        let binned = binner.transform(&dataset);
        let (grad, hess) = gradients(&dataset);
        let rows: Vec<usize> = (0..dataset.n_rows()).collect();

        let strict = SplitParams { min_child_weight: 100.0, ..params() };
        let tree = TreeGrower::new(&binner, &binned, &grad, &hess, strict).grow(&rows, &[0, 1]);
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn learns_default_direction_for_missing_values() {
        // Positives have high values or are missing; negatives are low.
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for i in 0..12 {
            values.push(i as f64);
            labels.push(0);
        }
        for i in 0..6 {
            values.push(100.0 + i as f64);
            labels.push(1);
        }
        for _ in 0..6 {
            values.push(f64::NAN);
            labels.push(1);
        }
        let dataset = Dataset::from_row_major(vec!["x".into()], values, labels).unwrap();
        let binner = FeatureBinner::fit(&dataset, 256);
        let binned = binner.transform(&dataset);
        let (grad, hess) = gradients(&dataset);
        let rows: Vec<usize> = (0..dataset.n_rows()).collect();

        let tree = TreeGrower::new(&binner, &binned, &grad, &hess, params()).grow(&rows, &[0]);
        match &tree.nodes()[0] {
            TreeNode::Split { default_left, threshold, .. } => {
                assert!(!*default_left);
                assert!(*threshold > 11.0 && *threshold <= 100.0);
            }
            other => panic!("expected a split at the root, got {other:?}"),
        }
        assert!(tree.predict_row(&[f64::NAN]) > 0.0);
    }
}
