//! Masked per-task ROC-AUC for multi-task binary classification.

/// Area under the ROC curve for one task.
///
/// Computed from the Mann-Whitney U statistic with tied scores sharing their
/// average rank. `None` when the labels contain only one class.
pub fn roc_auc(scores: &[f32], labels: &[f32]) -> Option<f64> {
    let mut pairs: Vec<(f32, bool)> = scores.iter().zip(labels).map(|(&s, &l)| (s, l > 0.5)).collect();
    let positives = pairs.iter().filter(|(_, p)| *p).count();
    let negatives = pairs.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut positive_rank_sum = 0.0f64;
    let mut start = 0;
    while start < pairs.len() {
        let mut end = start;
        while end + 1 < pairs.len() && pairs[end + 1].0 == pairs[start].0 {
            end += 1;
        }
        // ranks are 1-based
        let rank = (start + end) as f64 / 2.0 + 1.0;
        positive_rank_sum += rank * pairs[start..=end].iter().filter(|(_, p)| *p).count() as f64;
        start = end + 1;
    }

    let (pos, neg) = (positives as f64, negatives as f64);
    Some((positive_rank_sum - pos * (pos + 1.0) / 2.0) / (pos * neg))
}

/// ROC-AUC per task over rows where `masks` is set.
///
/// `scores`, `labels` and `masks` are `[samples][tasks]`. Tasks with only one
/// class among the labelled rows get `None`.
pub fn masked_roc_auc(scores: &[Vec<f32>], labels: &[Vec<f32>], masks: &[Vec<f32>]) -> Vec<Option<f64>> {
    let n_tasks = labels.first().map(Vec::len).unwrap_or(0);
    (0..n_tasks)
        .map(|t| {
            let (task_scores, task_labels): (Vec<f32>, Vec<f32>) = scores
                .iter()
                .zip(labels)
                .zip(masks)
                .filter(|(_, mask)| mask[t] > 0.0)
                .map(|((score, label), _)| (score[t], label[t]))
                .unzip();
            roc_auc(&task_scores, &task_labels)
        })
        .collect()
}

/// Mean over the tasks that have a defined score.
pub fn mean_defined(values: &[Option<f64>]) -> Option<f64> {
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    if defined.is_empty() {
        None
    } else {
        Some(defined.iter().sum::<f64>() / defined.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_perfect_and_inverted() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert!(close(roc_auc(&[0.1, 0.2, 0.8, 0.9], &labels).unwrap(), 1.0));
        assert!(close(roc_auc(&[0.9, 0.8, 0.2, 0.1], &labels).unwrap(), 0.0));
    }

    #[test]
    fn test_ties_and_partial_order() {
        // classic example: 0.75
        let scores = [0.1, 0.4, 0.35, 0.8];
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert!(close(roc_auc(&scores, &labels).unwrap(), 0.75));

        // all tied -> 0.5
        assert!(close(roc_auc(&[0.3; 4], &labels).unwrap(), 0.5));
    }

    #[test]
    fn test_single_class() {
        assert_eq!(roc_auc(&[0.1, 0.9], &[1.0, 1.0]), None);
        assert_eq!(roc_auc(&[], &[]), None);
    }

    #[test]
    fn test_masked_rows_are_ignored() {
        let scores = vec![vec![0.9, 0.1], vec![0.1, 0.9], vec![0.2, 0.5]];
        let labels = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]];
        let masks = vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![0.0, 1.0]];
        let aucs = masked_roc_auc(&scores, &labels, &masks);
        assert!(close(aucs[0].unwrap(), 1.0));
        assert!(close(aucs[1].unwrap(), 1.0));
        assert!(close(mean_defined(&aucs).unwrap(), 1.0));
        assert_eq!(mean_defined(&[None, None]), None);
    }
}
