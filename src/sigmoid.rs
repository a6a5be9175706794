//! Logistic function helpers shared by the linear model, the trainer and the synthetic label generator.
//!
//! Probabilities are clamped to [EPSILON, 1 - EPSILON] whenever a logarithm is taken,
//! so losses stay finite for confident but wrong predictions.

pub const EPSILON: f64 = 1e-7;

/// 1 / (1 + exp(-z)), evaluated without overflowing for large |z|
pub fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Inverse of the logistic function
/// Returns z such that logistic(z) = p
pub fn logit(p: f64) -> f64 {
    let p_clamped = p.clamp(EPSILON, 1.0 - EPSILON);
    p_clamped.ln() - (1.0 - p_clamped).ln()
}

/// Binary cross-entropy of a single prediction
pub fn binary_cross_entropy(probability: f64, label: f64) -> f64 {
    let p = probability.clamp(EPSILON, 1.0 - EPSILON);
    -(label * p.ln() + (1.0 - label) * (1.0 - p).ln())
}

/// Cross-entropy computed from the logit z instead of the probability, without clamping
/// Grows linearly in |z| for confident wrong predictions
pub fn logistic_loss(z: f64, label: f64) -> f64 {
    // softplus(z) - label * z
    z.max(0.0) + (-z.abs()).exp().ln_1p() - label * z
}
