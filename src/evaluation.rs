use serde::Serialize;

use crate::sigmoid::binary_cross_entropy;

/// Predictions at or above this are counted as positive
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Validation metrics of one model
/// Rates are percentages in [0, 100]; tp + fp + tn + fn equals the number of evaluated samples
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub auc: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub log_loss: f64,
}

impl EvaluationMetrics {
    /// # Arguments
    /// * `probabilities` - predicted P(y = 1), parallel to `labels`
    /// * `labels` - 0.0 or 1.0
    pub fn compute(probabilities: &[f64], labels: &[f64]) -> Self {
        let mut true_positives = 0;
        let mut false_positives = 0;
        let mut true_negatives = 0;
        let mut false_negatives = 0;
        let mut total_loss = 0.0;

        for (&p, &label) in probabilities.iter().zip(labels.iter()) {
            let predicted_positive = p >= DECISION_THRESHOLD;
            let actual_positive = label >= 0.5;
            match (predicted_positive, actual_positive) {
                (true, true) => true_positives += 1,
                (true, false) => false_positives += 1,
                (false, false) => true_negatives += 1,
                (false, true) => false_negatives += 1,
            }
            total_loss += binary_cross_entropy(p, label);
        }

        let total = true_positives + false_positives + true_negatives + false_negatives;
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(true_positives + true_negatives, total) * 100.0,
            precision: precision * 100.0,
            recall: recall * 100.0,
            f1_score: f1 * 100.0,
            auc: roc_auc(probabilities, labels) * 100.0,
            true_positives,
            false_positives,
            true_negatives,
            false_negatives,
            log_loss: if total == 0 { 0.0 } else { total_loss / total as f64 },
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

/// Mean binary cross-entropy and accuracy (percent) of predictions
pub fn loss_and_accuracy(probabilities: &[f64], labels: &[f64]) -> (f64, f64) {
    if probabilities.is_empty() {
        return (0.0, 0.0);
    }
    let mut loss = 0.0;
    let mut correct = 0usize;
    for (&p, &label) in probabilities.iter().zip(labels.iter()) {
        loss += binary_cross_entropy(p, label);
        if (p >= DECISION_THRESHOLD) == (label >= 0.5) {
            correct += 1;
        }
    }
    let n = probabilities.len() as f64;
    (loss / n, correct as f64 / n * 100.0)
}

/// Area under the ROC curve as a fraction in [0, 1]
///
/// Computed as the Mann-Whitney statistic with average ranks for tied scores.
/// Returns 0.5 when only one class is present.
pub fn roc_auc(probabilities: &[f64], labels: &[f64]) -> f64 {
    let mut scored: Vec<(f64, bool)> = probabilities
        .iter()
        .zip(labels.iter())
        .map(|(&p, &label)| (p, label >= 0.5))
        .collect();
    let positives = scored.iter().filter(|(_, positive)| *positive).count();
    let negatives = scored.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < scored.len() {
        let mut j = i;
        while j + 1 < scored.len() && scored[j + 1].0 == scored[i].0 {
            j += 1;
        }
        // Ranks are 1-based; tied scores share the average of ranks i+1..=j+1
        let average_rank = (i + j) as f64 / 2.0 + 1.0;
        let tied_positives = scored[i..=j].iter().filter(|(_, positive)| *positive).count();
        positive_rank_sum += average_rank * tied_positives as f64;
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    (positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_counts() {
        let probabilities = [0.9, 0.8, 0.3, 0.2, 0.6, 0.4];
        let labels = [1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let metrics = EvaluationMetrics::compute(&probabilities, &labels);
        assert_eq!(metrics.true_positives, 2);
        assert_eq!(metrics.false_positives, 1);
        assert_eq!(metrics.true_negatives, 2);
        assert_eq!(metrics.false_negatives, 1);
        assert_eq!(metrics.total(), probabilities.len());
        assert!((metrics.accuracy - 66.666_666).abs() < 1e-3);
        assert!((metrics.precision - 66.666_666).abs() < 1e-3);
        assert!((metrics.recall - 66.666_666).abs() < 1e-3);
        assert!((metrics.f1_score - 66.666_666).abs() < 1e-3);
    }

    #[test]
    fn test_perfect_ranking_auc() {
        let metrics = EvaluationMetrics::compute(&[0.1, 0.2, 0.7, 0.9], &[0.0, 0.0, 1.0, 1.0]);
        assert_eq!(metrics.auc, 100.0);
        assert_eq!(roc_auc(&[0.9, 0.7, 0.2, 0.1], &[0.0, 0.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_auc_with_ties() {
        // Every prediction equal: no ranking information
        assert_eq!(roc_auc(&[0.5, 0.5, 0.5, 0.5], &[1.0, 0.0, 1.0, 0.0]), 0.5);
        // One positive tied with one negative, the other positive strictly above
        let auc = roc_auc(&[0.2, 0.5, 0.5, 0.9], &[0.0, 0.0, 1.0, 1.0]);
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_auc_is_half() {
        assert_eq!(roc_auc(&[0.1, 0.9], &[1.0, 1.0]), 0.5);
        let metrics = EvaluationMetrics::compute(&[0.1, 0.2], &[0.0, 0.0]);
        assert_eq!(metrics.auc, 50.0);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
        assert_eq!(metrics.accuracy, 100.0);
    }

    #[test]
    fn test_empty_input() {
        let metrics = EvaluationMetrics::compute(&[], &[]);
        assert_eq!(metrics.total(), 0);
        assert_eq!(metrics.log_loss, 0.0);
        assert_eq!(loss_and_accuracy(&[], &[]), (0.0, 0.0));
    }

    #[test]
    fn test_loss_and_accuracy() {
        let (loss, accuracy) = loss_and_accuracy(&[0.5, 0.5], &[1.0, 0.0]);
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-12);
        assert_eq!(accuracy, 50.0);
    }
}
