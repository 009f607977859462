//! Binary cross-entropy on logits and accuracy counting

use burn::prelude::*;
use burn::tensor::ElementConversion;

/// Per-sample binary cross-entropy computed from logits
///
/// Uses `max(z, 0) - z * y + ln(1 + exp(-|z|))`, which equals
/// `-(y ln σ(z) + (1 - y) ln(1 - σ(z)))` without overflowing for large `|z|`.
pub fn binary_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 1>,
    targets: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let positive_part = logits.clone().clamp_min(0.0);
    let log_term = logits.clone().abs().neg().exp().log1p();
    positive_part - logits * targets + log_term
}

/// Mean binary cross-entropy, each sample scaled by its weight when given
pub fn weighted_binary_cross_entropy<B: Backend>(
    logits: Tensor<B, 1>,
    targets: Tensor<B, 1>,
    weights: Option<Tensor<B, 1>>,
) -> Tensor<B, 1> {
    let per_sample = binary_cross_entropy_with_logits(logits, targets);
    match weights {
        Some(weights) => (per_sample * weights).mean(),
        None => per_sample.mean(),
    }
}

/// Number of samples whose logit sign matches the target
pub fn count_correct<B: Backend>(logits: Tensor<B, 1>, targets: Tensor<B, 1>) -> usize {
    let predicted = logits.greater_elem(0.0);
    let expected = targets.greater_elem(0.5);
    let correct: i64 = predicted.equal(expected).int().sum().into_scalar().elem();
    correct as usize
}
