//! Stochastic gradient descent over raw parameter slices.

/// In-place SGD step: param <- param - lr * grad.
///
/// Works on any parameter buffer the layers expose, weight matrices and
/// bias vectors alike.
pub fn sgd_update(params: &mut [f32], grads: &[f32], learning_rate: f32) {
    for (p, g) in params.iter_mut().zip(grads) {
        *p -= learning_rate * g;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn moves_against_the_gradient() {
        let mut params = vec![1.0, -2.0, 0.5];
        sgd_update(&mut params, &[0.5, -1.0, 0.0], 0.1);
        assert_relative_eq!(params[0], 0.95, epsilon = 1e-6);
        assert_relative_eq!(params[1], -1.9, epsilon = 1e-6);
        assert_relative_eq!(params[2], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn zero_learning_rate_is_a_no_op() {
        let mut params = vec![1.0, 2.0];
        sgd_update(&mut params, &[5.0, 5.0], 0.0);
        assert_eq!(params, vec![1.0, 2.0]);
    }
}
