//! Binary cross-entropy loss and its gradient.

const EPSILON: f32 = 1e-7;

/// BCE loss: -(1/N) sum(y ln(p) + (1-y) ln(1-p)), with predictions
/// clamped to [eps, 1-eps] so the logs stay finite.
pub fn bce_loss(predictions: &[f32], targets: &[f32]) -> f32 {
    let n = predictions.len() as f64;
    let mut total = 0.0f64;
    for (&p, &y) in predictions.iter().zip(targets) {
        let p = p.clamp(EPSILON, 1.0 - EPSILON) as f64;
        let y = y as f64;
        total += y * p.ln() + (1.0 - y) * (1.0 - p).ln();
    }
    (-total / n) as f32
}

/// Gradient of the BCE loss w.r.t. the predictions. Only used when the
/// network does not end in a sigmoid; the trainer otherwise seeds the
/// backward pass with the fused (p - y) form.
pub fn bce_gradient(predictions: &[f32], targets: &[f32]) -> Vec<f32> {
    let n = predictions.len() as f32;
    predictions
        .iter()
        .zip(targets)
        .map(|(&p, &y)| {
            let p = p.clamp(EPSILON, 1.0 - EPSILON);
            (p - y) / (p * (1.0 - p)) / n
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_predictions_give_near_zero_loss() {
        let loss = bce_loss(&[1.0, 0.0], &[1.0, 0.0]);
        assert!(loss < 1e-5);
    }

    #[test]
    fn confident_wrong_prediction_is_heavily_penalised() {
        let right = bce_loss(&[0.9], &[1.0]);
        let wrong = bce_loss(&[0.1], &[1.0]);
        assert!(wrong > right);
        assert!(wrong > 2.0);
    }

    #[test]
    fn half_probability_loss_is_ln_two() {
        assert_relative_eq!(bce_loss(&[0.5], &[1.0]), std::f32::consts::LN_2, epsilon = 1e-5);
    }

    #[test]
    fn extreme_predictions_stay_finite() {
        assert!(bce_loss(&[0.0], &[1.0]).is_finite());
        assert!(bce_loss(&[1.0], &[0.0]).is_finite());
        assert!(bce_gradient(&[0.0], &[1.0])[0].is_finite());
    }

    #[test]
    fn gradient_sign_follows_error() {
        // Prediction above the target: positive gradient.
        assert!(bce_gradient(&[0.8], &[0.0])[0] > 0.0);
        // Prediction below the target: negative gradient.
        assert!(bce_gradient(&[0.2], &[1.0])[0] < 0.0);
    }
}
