//! The closed set of network layers with forward and backward kernels.
//!
//! Layers are a tagged variant rather than trait objects so the
//! persistence codec and the SGD path can match exhaustively, and so
//! parameter buffers can be exposed as in-place mutable views instead
//! of packed copies.

use crate::error::{Error, Result};
use crate::net::gru::GruCell;
use crate::net::lstm::LstmCell;
use crate::net::rnn::sigmoid;
use crate::net::tensor::Tensor;

/// Per-parameter gradients, aligned with [`Layer::params`] order.
pub type ParamGrads = Vec<Vec<f32>>;

#[derive(Debug, Clone)]
pub enum Layer {
    Dense {
        /// [out_units, in_size]
        weights: Tensor,
        bias: Vec<f32>,
    },
    Conv2D {
        /// [filters, in_channels, kernel_h, kernel_w]
        weights: Tensor,
        bias: Vec<f32>,
        stride: usize,
        padding: usize,
    },
    MaxPool2D {
        kernel: usize,
        stride: usize,
    },
    ReLU,
    Sigmoid,
    Gru(GruCell),
    Lstm(LstmCell),
}

impl Layer {
    pub fn dense(weights: Tensor, bias: Vec<f32>) -> Self {
        Layer::Dense { weights, bias }
    }

    pub fn conv2d(weights: Tensor, bias: Vec<f32>, stride: usize, padding: usize) -> Self {
        Layer::Conv2D {
            weights,
            bias,
            stride,
            padding,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Layer::Dense { .. } => "dense",
            Layer::Conv2D { .. } => "conv2d",
            Layer::MaxPool2D { .. } => "maxpool2d",
            Layer::ReLU => "relu",
            Layer::Sigmoid => "sigmoid",
            Layer::Gru(_) => "gru",
            Layer::Lstm(_) => "lstm",
        }
    }

    /// Forward pass. Allocates a fresh output tensor; the input is
    /// never mutated. Recurrent variants record their gate sequences
    /// for a subsequent backward call.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        match self {
            Layer::Dense { weights, bias } => dense_forward(input, weights, bias),
            Layer::Conv2D {
                weights,
                bias,
                stride,
                padding,
            } => conv2d_forward(input, weights, bias, *stride, *padding),
            Layer::MaxPool2D { kernel, stride } => maxpool2d_forward(input, *kernel, *stride),
            Layer::ReLU => Ok(relu_forward(input)),
            Layer::Sigmoid => Ok(sigmoid_forward(input)),
            Layer::Gru(cell) => cell.forward(input),
            Layer::Lstm(cell) => cell.forward(input),
        }
    }

    /// Backward pass given the layer's recorded input and the gradient
    /// of the loss w.r.t. its output. Returns the input gradient and
    /// per-parameter gradients aligned with [`Layer::params`].
    pub fn backward(&mut self, input: &Tensor, grad_out: &Tensor) -> Result<(Tensor, ParamGrads)> {
        match self {
            Layer::Dense { weights, .. } => dense_backward(input, weights, grad_out),
            Layer::Conv2D {
                weights,
                stride,
                padding,
                ..
            } => conv2d_backward(input, weights, grad_out, *stride, *padding),
            Layer::MaxPool2D { kernel, stride } => {
                Ok((maxpool2d_backward(input, grad_out, *kernel, *stride), Vec::new()))
            }
            Layer::ReLU => Ok((relu_backward(input, grad_out), Vec::new())),
            Layer::Sigmoid => Ok((sigmoid_backward(input, grad_out), Vec::new())),
            Layer::Gru(cell) => cell.backward(grad_out),
            Layer::Lstm(cell) => cell.backward(grad_out),
        }
    }

    /// Immutable views over every parameter buffer, weight matrices
    /// first, then biases, in the canonical persistence order.
    pub fn params(&self) -> Vec<&[f32]> {
        match self {
            Layer::Dense { weights, bias } => vec![weights.data.as_slice(), bias.as_slice()],
            Layer::Conv2D { weights, bias, .. } => {
                vec![weights.data.as_slice(), bias.as_slice()]
            }
            Layer::MaxPool2D { .. } | Layer::ReLU | Layer::Sigmoid => Vec::new(),
            Layer::Gru(cell) => cell.params(),
            Layer::Lstm(cell) => cell.params(),
        }
    }

    /// Mutable views over every parameter buffer, in [`Layer::params`]
    /// order, so the optimizer and the shard-averaging step can update
    /// any layer kind uniformly.
    pub fn params_mut(&mut self) -> Vec<&mut [f32]> {
        match self {
            Layer::Dense { weights, bias } => {
                vec![weights.data.as_mut_slice(), bias.as_mut_slice()]
            }
            Layer::Conv2D { weights, bias, .. } => {
                vec![weights.data.as_mut_slice(), bias.as_mut_slice()]
            }
            Layer::MaxPool2D { .. } | Layer::ReLU | Layer::Sigmoid => Vec::new(),
            Layer::Gru(cell) => cell.params_mut(),
            Layer::Lstm(cell) => cell.params_mut(),
        }
    }

    /// Clears any stateful-inference state on recurrent variants.
    pub fn reset_state(&mut self) {
        match self {
            Layer::Gru(cell) => cell.reset_state(),
            Layer::Lstm(cell) => cell.reset_state(),
            _ => {}
        }
    }
}

fn dense_forward(input: &Tensor, weights: &Tensor, bias: &[f32]) -> Result<Tensor> {
    let out_units = weights.shape[0];
    let in_size = weights.shape[1];
    if input.len() != in_size {
        return Err(Error::ShapeMismatch(format!(
            "dense expects {in_size} inputs, got {}",
            input.len()
        )));
    }

    let mut output = Tensor::new(&[out_units]);
    for i in 0..out_units {
        let row = &weights.data[i * in_size..(i + 1) * in_size];
        let mut sum = bias[i];
        for (w, x) in row.iter().zip(&input.data) {
            sum += w * x;
        }
        output.data[i] = sum;
    }
    Ok(output)
}

fn dense_backward(input: &Tensor, weights: &Tensor, grad_out: &Tensor) -> Result<(Tensor, ParamGrads)> {
    let out_units = weights.shape[0];
    let in_size = weights.shape[1];
    if input.len() != in_size {
        return Err(Error::ShapeMismatch(format!(
            "dense backward expects {in_size} inputs, got {}",
            input.len()
        )));
    }

    let mut grad_input = Tensor::new(&input.shape);
    let mut grad_weights = vec![0.0f32; weights.len()];
    let mut grad_bias = vec![0.0f32; out_units];

    for i in 0..out_units {
        let go = grad_out.data[i];
        grad_bias[i] = go;
        for j in 0..in_size {
            grad_weights[i * in_size + j] = go * input.data[j];
            grad_input.data[j] += weights.data[i * in_size + j] * go;
        }
    }

    Ok((grad_input, vec![grad_weights, grad_bias]))
}

fn conv2d_forward(
    input: &Tensor,
    weights: &Tensor,
    bias: &[f32],
    stride: usize,
    padding: usize,
) -> Result<Tensor> {
    if input.shape.len() != 3 {
        return Err(Error::ShapeMismatch(format!(
            "conv2d expects a [C, H, W] input, got shape {:?}",
            input.shape
        )));
    }
    let (in_channels, in_h, in_w) = (input.shape[0], input.shape[1], input.shape[2]);
    let (filters, w_channels, k_h, k_w) = (
        weights.shape[0],
        weights.shape[1],
        weights.shape[2],
        weights.shape[3],
    );
    if in_channels != w_channels {
        return Err(Error::ShapeMismatch(format!(
            "conv2d weights expect {w_channels} input channels, got {in_channels}"
        )));
    }

    let out_h = (in_h + 2 * padding - k_h) / stride + 1;
    let out_w = (in_w + 2 * padding - k_w) / stride + 1;
    let mut output = Tensor::new(&[filters, out_h, out_w]);

    for f in 0..filters {
        for i in 0..out_h {
            for j in 0..out_w {
                let mut sum = bias[f];
                for c in 0..in_channels {
                    for ki in 0..k_h {
                        for kj in 0..k_w {
                            let ii = (i * stride + ki) as isize - padding as isize;
                            let jj = (j * stride + kj) as isize - padding as isize;
                            if ii >= 0 && (ii as usize) < in_h && jj >= 0 && (jj as usize) < in_w {
                                let val = input.data
                                    [c * in_h * in_w + ii as usize * in_w + jj as usize];
                                let weight = weights.data
                                    [((f * in_channels + c) * k_h + ki) * k_w + kj];
                                sum += val * weight;
                            }
                        }
                    }
                }
                output.data[f * out_h * out_w + i * out_w + j] = sum;
            }
        }
    }

    Ok(output)
}

fn conv2d_backward(
    input: &Tensor,
    weights: &Tensor,
    grad_out: &Tensor,
    stride: usize,
    padding: usize,
) -> Result<(Tensor, ParamGrads)> {
    let (in_channels, in_h, in_w) = (input.shape[0], input.shape[1], input.shape[2]);
    let (filters, _, k_h, k_w) = (
        weights.shape[0],
        weights.shape[1],
        weights.shape[2],
        weights.shape[3],
    );
    let (out_h, out_w) = (grad_out.shape[1], grad_out.shape[2]);

    let mut grad_input = Tensor::new(&input.shape);
    let mut grad_weights = vec![0.0f32; weights.len()];
    let mut grad_bias = vec![0.0f32; filters];

    for f in 0..filters {
        for i in 0..out_h {
            for j in 0..out_w {
                let go = grad_out.data[f * out_h * out_w + i * out_w + j];
                grad_bias[f] += go;

                for c in 0..in_channels {
                    for ki in 0..k_h {
                        for kj in 0..k_w {
                            let ii = (i * stride + ki) as isize - padding as isize;
                            let jj = (j * stride + kj) as isize - padding as isize;
                            if ii >= 0 && (ii as usize) < in_h && jj >= 0 && (jj as usize) < in_w {
                                let in_idx = c * in_h * in_w + ii as usize * in_w + jj as usize;
                                let w_idx = ((f * in_channels + c) * k_h + ki) * k_w + kj;
                                grad_weights[w_idx] += input.data[in_idx] * go;
                                grad_input.data[in_idx] += weights.data[w_idx] * go;
                            }
                        }
                    }
                }
            }
        }
    }

    Ok((grad_input, vec![grad_weights, grad_bias]))
}

fn maxpool2d_forward(input: &Tensor, kernel: usize, stride: usize) -> Result<Tensor> {
    if input.shape.len() != 3 {
        return Err(Error::ShapeMismatch(format!(
            "maxpool2d expects a [C, H, W] input, got shape {:?}",
            input.shape
        )));
    }
    let (channels, in_h, in_w) = (input.shape[0], input.shape[1], input.shape[2]);
    let out_h = (in_h - kernel) / stride + 1;
    let out_w = (in_w - kernel) / stride + 1;
    let mut output = Tensor::new(&[channels, out_h, out_w]);

    for c in 0..channels {
        for i in 0..out_h {
            for j in 0..out_w {
                let mut max_val = f32::MIN;
                for ki in 0..kernel {
                    for kj in 0..kernel {
                        let val = input.data
                            [c * in_h * in_w + (i * stride + ki) * in_w + (j * stride + kj)];
                        if val > max_val {
                            max_val = val;
                        }
                    }
                }
                output.data[c * out_h * out_w + i * out_w + j] = max_val;
            }
        }
    }

    Ok(output)
}

/// Routes each output gradient to the argmax position of its pooling
/// window, found by re-scanning the input. Ties break to the first
/// maximum in row-major order.
fn maxpool2d_backward(input: &Tensor, grad_out: &Tensor, kernel: usize, stride: usize) -> Tensor {
    let (channels, in_h, in_w) = (input.shape[0], input.shape[1], input.shape[2]);
    let (out_h, out_w) = (grad_out.shape[1], grad_out.shape[2]);
    let mut grad_input = Tensor::new(&input.shape);

    for c in 0..channels {
        for i in 0..out_h {
            for j in 0..out_w {
                let mut max_val = f32::MIN;
                let mut max_idx = 0;
                for ki in 0..kernel {
                    for kj in 0..kernel {
                        let idx =
                            c * in_h * in_w + (i * stride + ki) * in_w + (j * stride + kj);
                        if input.data[idx] > max_val {
                            max_val = input.data[idx];
                            max_idx = idx;
                        }
                    }
                }
                grad_input.data[max_idx] += grad_out.data[c * out_h * out_w + i * out_w + j];
            }
        }
    }

    grad_input
}

fn relu_forward(input: &Tensor) -> Tensor {
    let mut output = Tensor::new(&input.shape);
    for (o, &x) in output.data.iter_mut().zip(&input.data) {
        *o = x.max(0.0);
    }
    output
}

fn relu_backward(input: &Tensor, grad_out: &Tensor) -> Tensor {
    let mut grad_input = Tensor::new(&input.shape);
    for i in 0..input.len() {
        if input.data[i] > 0.0 {
            grad_input.data[i] = grad_out.data[i];
        }
    }
    grad_input
}

fn sigmoid_forward(input: &Tensor) -> Tensor {
    let mut output = Tensor::new(&input.shape);
    for (o, &x) in output.data.iter_mut().zip(&input.data) {
        *o = sigmoid(x);
    }
    output
}

fn sigmoid_backward(input: &Tensor, grad_out: &Tensor) -> Tensor {
    let mut grad_input = Tensor::new(&input.shape);
    for i in 0..input.len() {
        let s = sigmoid(input.data[i]);
        grad_input.data[i] = grad_out.data[i] * s * (1.0 - s);
    }
    grad_input
}
