use crate::error::Result;

pub mod builder;
pub mod gru;
pub mod layer;
pub mod loss;
pub mod lstm;
pub mod persistence;
mod rnn;
pub mod sgd;
pub mod tensor;

use self::layer::Layer;
use self::tensor::Tensor;

/// An ordered stack of layers: out = L_k(...L_1(input)).
#[derive(Debug, Clone)]
pub struct Sequential {
    pub layers: Vec<Layer>,
}

impl Sequential {
    pub fn new(layers: Vec<Layer>) -> Self {
        Sequential { layers }
    }

    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let mut out = input.clone();
        for layer in &mut self.layers {
            out = layer.forward(&out)?;
        }
        Ok(out)
    }

    /// Forward pass that keeps the input fed to every layer, so the
    /// trainer can walk backward without re-running the stack. The
    /// returned vec holds layers + 1 tensors; the last one is the
    /// network output.
    pub fn forward_recording(&mut self, input: &Tensor) -> Result<Vec<Tensor>> {
        let mut inputs = Vec::with_capacity(self.layers.len() + 1);
        inputs.push(input.clone());
        for i in 0..self.layers.len() {
            let out = self.layers[i].forward(&inputs[i])?;
            inputs.push(out);
        }
        Ok(inputs)
    }

    /// Forward pass where recurrent layers only process the first
    /// `actual_len` timesteps of their sequence.
    pub fn forward_masked(&mut self, input: &Tensor, actual_len: usize) -> Result<Tensor> {
        let mut out = input.clone();
        for layer in &mut self.layers {
            out = match layer {
                Layer::Gru(cell) => cell.forward_masked(&out, actual_len)?,
                Layer::Lstm(cell) => cell.forward_masked(&out, actual_len)?,
                other => other.forward(&out)?,
            };
        }
        Ok(out)
    }

    /// Clears stateful-inference state on every recurrent layer.
    pub fn reset_state(&mut self) {
        for layer in &mut self.layers {
            layer.reset_state();
        }
    }
}
