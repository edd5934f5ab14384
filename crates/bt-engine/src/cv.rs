//! Stratified k-fold partitioning.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use bt_types::{config_error, BtResult, ClassCounts, DataError};

/// Row indices of one train/validation split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Shuffled stratified k-fold splitter.
///
/// Rows of each class are shuffled with the seed and dealt round-robin over
/// the folds, continuing from where the previous class stopped, so per-class
/// counts differ by at most one between folds and total fold sizes stay
/// balanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    n_splits: usize,
    seed: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Partition rows by `labels`. Fails if either class has fewer members
    /// than there are folds.
    pub fn split(&self, labels: &[u8]) -> BtResult<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(config_error!("n_splits must be at least 2, got {}", self.n_splits));
        }
        let counts = ClassCounts::from_labels(labels);
        for (class, count) in [(0u8, counts.negative), (1u8, counts.positive)] {
            if count < self.n_splits {
                return Err(DataError::InsufficientClassMembers {
                    class,
                    count,
                    required: self.n_splits,
                }
                .into());
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut assignment = vec![0usize; labels.len()];
        let mut offset = 0;
        for class in [0u8, 1u8] {
            let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
            members.shuffle(&mut rng);
            for (position, &row) in members.iter().enumerate() {
                assignment[row] = (offset + position) % self.n_splits;
            }
            offset = (offset + members.len()) % self.n_splits;
        }

        let folds: Vec<Fold> = (0..self.n_splits)
            .map(|index| {
                let (validation, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&row| assignment[row] == index);
                Fold {
                    index,
                    train,
                    validation,
                }
            })
            .collect();

        for fold in &folds {
            for (part, rows) in [("train", &fold.train), ("validation", &fold.validation)] {
                let subset: Vec<u8> = rows.iter().map(|&r| labels[r]).collect();
                if !ClassCounts::from_labels(&subset).has_both_classes() {
                    return Err(DataError::SingleClassFold {
                        fold: fold.index,
                        part,
                    }
                    .into());
                }
            }
        }
        Ok(folds)
    }
}
