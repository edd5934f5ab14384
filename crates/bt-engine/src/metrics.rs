use bt_types::{validation_error, BtResult, ClassCounts, TrainingError};

/// Area under the ROC curve of `scores` against binary `labels`.
///
/// Computed as the Mann-Whitney U statistic over score ranks, with tied
/// scores sharing their average rank. Undefined (an error) unless both
/// classes are present.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> BtResult<f64> {
    if labels.len() != scores.len() {
        return Err(validation_error!(
            "roc_auc: {} labels but {} scores",
            labels.len(),
            scores.len()
        ));
    }
    let counts = ClassCounts::from_labels(labels);
    if !counts.has_both_classes() {
        return Err(TrainingError::MetricUndefined {
            message: format!(
                "AUC needs both classes, got {} positive and {} negative",
                counts.positive, counts.negative
            ),
        }
        .into());
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(TrainingError::MetricUndefined {
            message: "AUC scores contain NaN".to_string(),
        }
        .into());
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie group [start, end) shares their mean.
        let avg_rank = (start + end + 1) as f64 / 2.0;
        let positives_in_group = order[start..end].iter().filter(|&&i| labels[i] == 1).count();
        positive_rank_sum += avg_rank * positives_in_group as f64;
        start = end;
    }

    let n_pos = counts.positive as f64;
    let n_neg = counts.negative as f64;
    Ok((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_types::BtError;

    #[test]
    fn perfect_and_inverted_ranking() {
        let labels = [0, 0, 1, 1];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
    }

    #[test]
    fn ties_count_half() {
        let labels = [0, 1, 0, 1];
        assert!((roc_auc(&labels, &[0.5; 4]).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn matches_pairwise_definition() {
        let labels = [1, 0, 1, 0, 0, 1, 0];
        let scores = [0.9, 0.3, 0.4, 0.4, 0.8, 0.35, 0.1];
        let mut wins = 0.0;
        let mut pairs = 0.0;
        for (i, &li) in labels.iter().enumerate() {
            for (j, &lj) in labels.iter().enumerate() {
                if li == 1 && lj == 0 {
                    pairs += 1.0;
                    if scores[i] > scores[j] {
                        wins += 1.0;
                    } else if scores[i] == scores[j] {
                        wins += 0.5;
                    }
                }
            }
        }
        assert!((roc_auc(&labels, &scores).unwrap() - wins / pairs).abs() < 1e-12);
    }

    #[test]
    fn single_class_is_undefined() {
        let err = roc_auc(&[1, 1], &[0.2, 0.3]).unwrap_err();
        assert!(matches!(err, BtError::Training(TrainingError::MetricUndefined { .. })));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(roc_auc(&[0, 1], &[0.2]).is_err());
    }
}
