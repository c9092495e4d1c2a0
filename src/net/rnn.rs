//! Shared plumbing for the recurrent cells: the 3-D to sequence
//! reshape convention and Xavier initialisation.
//!
//! A recurrent layer fed a [channels, height, width] tensor (typically
//! a conv stack's output) treats height as time and lays the
//! channel-strided width segments of each timestep side by side, giving
//! a [seq = H, features = C * W] matrix. Gradients travelling back to a
//! 3-D caller are restored through the inverse mapping.

use rand::Rng;

use crate::error::{Error, Result};
use crate::net::tensor::Tensor;

/// Flattens a 2-D or 3-D tensor into [seq, features] form.
///
/// Returns the flattened tensor and, for 3-D inputs, the original shape
/// needed to restore the input gradient.
pub(crate) fn flatten_sequence(input: &Tensor) -> Result<(Tensor, Option<Vec<usize>>)> {
    match input.shape.len() {
        2 => Ok((input.clone(), None)),
        3 => {
            let (channels, height, width) = (input.shape[0], input.shape[1], input.shape[2]);
            let features = channels * width;
            let mut flat = Tensor::new(&[height, features]);
            for t in 0..height {
                for c in 0..channels {
                    for w in 0..width {
                        flat.data[t * features + c * width + w] =
                            input.data[c * height * width + t * width + w];
                    }
                }
            }
            Ok((flat, Some(input.shape.clone())))
        }
        n => Err(Error::ShapeMismatch(format!(
            "recurrent layer expects a 2-D or 3-D input, got {n}-D"
        ))),
    }
}

/// Maps a [seq, features] gradient back onto the original 3-D shape.
pub(crate) fn restore_sequence_grad(grad: Tensor, original_shape: &Option<Vec<usize>>) -> Tensor {
    let Some(shape) = original_shape else {
        return grad;
    };
    let (channels, height, width) = (shape[0], shape[1], shape[2]);
    let features = channels * width;
    let mut restored = Tensor::new(shape);
    for t in 0..height {
        for c in 0..channels {
            for w in 0..width {
                restored.data[c * height * width + t * width + w] =
                    grad.data[t * features + c * width + w];
            }
        }
    }
    restored
}

/// Xavier-uniform weight matrix: values in +-sqrt(6 / (fan_in + fan_out)).
pub(crate) fn xavier_tensor<R: Rng>(shape: &[usize], fan_in: usize, fan_out: usize, rng: &mut R) -> Tensor {
    let scale = (6.0 / (fan_in + fan_out) as f64).sqrt() as f32;
    let mut t = Tensor::new(shape);
    for v in &mut t.data {
        *v = (rng.gen::<f32>() * 2.0 - 1.0) * scale;
    }
    t
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
