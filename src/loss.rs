use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2};

// Every label must name one of the logit columns. Anything else would index outside the row.
pub fn check_labels(labels: &[usize], num_classes: usize) -> Result<()> {
    match labels.iter().find(|&&label| label >= num_classes) {
        Some(&label) => Err(Error::InvalidLabel { label, num_classes }),
        None => Ok(()),
    }
}

// Row-wise log(softmax(logits)). Each row is shifted by its maximum before exponentiating, so the
// largest exponent is exactly 0 and nothing can overflow; the result does not change.
pub fn log_softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut log_probs = logits.to_owned();
    for mut row in log_probs.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |max, &logit| max.max(logit));
        row.mapv_inplace(|logit| logit - max);
        let log_sum = row.mapv(f32::exp).sum().ln();
        row.mapv_inplace(|shifted| shifted - log_sum);
    }
    log_probs
}

pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    log_softmax(logits).mapv_into(f32::exp)
}

/// Mean cross-entropy of a batch of logits against integer class labels.
pub fn cross_entropy(logits: ArrayView2<f32>, labels: &[usize]) -> Result<f32> {
    check_batch(logits, labels)?;
    let log_probs = log_softmax(logits);
    Ok(mean_negative_log_likelihood(&log_probs, labels))
}

/// Mean cross-entropy together with its gradient with respect to the logits,
/// `(softmax(logits) - onehot(labels)) / batch_size`.
pub fn cross_entropy_with_grad(
    logits: ArrayView2<f32>,
    labels: &[usize],
) -> Result<(f32, Array2<f32>)> {
    check_batch(logits, labels)?;
    let log_probs = log_softmax(logits);
    let loss = mean_negative_log_likelihood(&log_probs, labels);

    let mut grad = log_probs.mapv_into(f32::exp);
    for (row, &label) in labels.iter().enumerate() {
        grad[[row, label]] -= 1.0;
    }
    grad /= labels.len() as f32;

    Ok((loss, grad))
}

fn check_batch(logits: ArrayView2<f32>, labels: &[usize]) -> Result<()> {
    if logits.nrows() != labels.len() {
        return Err(Error::ShapeMismatch {
            what: "labels per batch",
            expected: logits.nrows(),
            found: labels.len(),
        });
    }
    if labels.is_empty() {
        return Err(Error::EmptyDataset {
            name: "batch".into(),
        });
    }
    check_labels(labels, logits.ncols())
}

fn mean_negative_log_likelihood(log_probs: &Array2<f32>, labels: &[usize]) -> f32 {
    let total: f32 = labels
        .iter()
        .enumerate()
        .map(|(row, &label)| -log_probs[[row, label]])
        .sum();
    total / labels.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "{actual} is not within {tolerance} of {expected}"
        );
    }

    // The textbook formula with no max shift.
    fn naive_cross_entropy(logits: &Array2<f32>, labels: &[usize]) -> f32 {
        let total: f32 = logits
            .rows()
            .into_iter()
            .zip(labels)
            .map(|(row, &label)| -(row[label].exp() / row.mapv(f32::exp).sum()).ln())
            .sum();
        total / labels.len() as f32
    }

    #[test]
    fn matches_hand_computed_example() {
        let logits = array![[2.0, 1.0, 0.0]];
        let loss = cross_entropy(logits.view(), &[0]).unwrap();
        assert_close(loss, 0.4076, 1e-4);
    }

    #[test]
    fn shifted_and_naive_formulations_agree() {
        let logits = array![
            [0.5, -1.25, 3.0, 0.0],
            [-2.0, -2.0, -2.0, -2.0],
            [10.0, 9.5, -4.0, 1.0]
        ];
        let labels = [2, 1, 0];

        let loss = cross_entropy(logits.view(), &labels).unwrap();
        assert!(loss >= 0.0);
        assert_close(loss, naive_cross_entropy(&logits, &labels), 1e-5);
    }

    #[test]
    fn large_logits_do_not_overflow() {
        let logits = array![[1000.0, 0.0], [1000.0, 0.0]];

        let confident = cross_entropy(logits.view(), &[0, 0]).unwrap();
        assert_close(confident, 0.0, 1e-6);

        let wrong = cross_entropy(logits.view(), &[1, 1]).unwrap();
        assert_close(wrong, 1000.0, 1e-2);
    }

    #[test]
    fn softmax_rows_are_distributions() {
        let probs = softmax(array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]].view());
        for row in probs.rows() {
            assert_close(row.sum(), 1.0, 1e-6);
        }
        assert_close(probs[[1, 0]], 1.0 / 3.0, 1e-6);
    }

    #[test]
    fn gradient_is_softmax_minus_onehot_over_batch() {
        let logits = array![[2.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        let (loss, grad) = cross_entropy_with_grad(logits.view(), &[0, 2]).unwrap();
        let probs = softmax(logits.view());

        assert_close(loss, cross_entropy(logits.view(), &[0, 2]).unwrap(), 0.0);
        assert_close(grad[[0, 0]], (probs[[0, 0]] - 1.0) / 2.0, 1e-7);
        assert_close(grad[[0, 1]], probs[[0, 1]] / 2.0, 1e-7);
        assert_close(grad[[1, 2]], (1.0 / 3.0 - 1.0) / 2.0, 1e-7);
        for row in grad.rows() {
            assert_close(row.sum(), 0.0, 1e-6);
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let logits = array![[0.3, -0.7, 1.1], [2.0, 0.1, -0.4]];
        let labels = [1, 0];
        let (_, grad) = cross_entropy_with_grad(logits.view(), &labels).unwrap();

        let eps = 1e-2;
        for ((row, col), &analytic) in grad.indexed_iter() {
            let mut plus = logits.clone();
            plus[[row, col]] += eps;
            let mut minus = logits.clone();
            minus[[row, col]] -= eps;

            let numeric = (cross_entropy(plus.view(), &labels).unwrap()
                - cross_entropy(minus.view(), &labels).unwrap())
                / (2.0 * eps);
            assert_close(analytic, numeric, 1e-3);
        }
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let logits = array![[0.0, 1.0, 2.0]];
        assert!(matches!(
            cross_entropy_with_grad(logits.view(), &[3]),
            Err(Error::InvalidLabel {
                label: 3,
                num_classes: 3
            })
        ));
        assert!(check_labels(&[0, 9], 10).is_ok());
        assert!(check_labels(&[0, 10], 10).is_err());
    }

    #[test]
    fn label_count_must_match_batch() {
        let logits = array![[0.0, 1.0], [1.0, 0.0]];
        assert!(matches!(
            cross_entropy(logits.view(), &[0]),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
