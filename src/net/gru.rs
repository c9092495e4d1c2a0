//! Gated Recurrent Unit cell with full-sequence BPTT.

use rand::Rng;

use crate::error::{Error, Result};
use crate::net::layer::ParamGrads;
use crate::net::rnn::{flatten_sequence, restore_sequence_grad, sigmoid, xavier_tensor};
use crate::net::tensor::Tensor;

/// Values recorded during forward and consumed by backward.
#[derive(Debug, Clone)]
struct GruCache {
    input: Tensor,
    original_shape: Option<Vec<usize>>,
    /// Hidden states h_0..h_T (T+1 entries).
    hidden: Vec<Vec<f32>>,
    z: Vec<Vec<f32>>,
    r: Vec<Vec<f32>>,
    h_cand: Vec<Vec<f32>>,
}

/// GRU gates: z, r = sigmoid(W x + U h + b),
/// h~ = tanh(Wh x + Uh (r * h) + bh), h' = (1 - z) h + z h~.
/// The output is the final hidden state.
#[derive(Debug, Clone)]
pub struct GruCell {
    pub input_size: usize,
    pub hidden_size: usize,
    pub wz: Tensor,
    pub wr: Tensor,
    pub wh: Tensor,
    pub uz: Tensor,
    pub ur: Tensor,
    pub uh: Tensor,
    pub bz: Vec<f32>,
    pub br: Vec<f32>,
    pub bh: Vec<f32>,
    /// Hidden state carried between `forward_stateful` calls.
    state: Option<Vec<f32>>,
    cache: Option<GruCache>,
}

impl GruCell {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let input_shape = [hidden_size, input_size];
        let hidden_shape = [hidden_size, hidden_size];
        GruCell {
            input_size,
            hidden_size,
            wz: xavier_tensor(&input_shape, input_size, hidden_size, rng),
            wr: xavier_tensor(&input_shape, input_size, hidden_size, rng),
            wh: xavier_tensor(&input_shape, input_size, hidden_size, rng),
            uz: xavier_tensor(&hidden_shape, hidden_size, hidden_size, rng),
            ur: xavier_tensor(&hidden_shape, hidden_size, hidden_size, rng),
            uh: xavier_tensor(&hidden_shape, hidden_size, hidden_size, rng),
            bz: vec![0.0; hidden_size],
            br: vec![0.0; hidden_size],
            bh: vec![0.0; hidden_size],
            state: None,
            cache: None,
        }
    }

    /// Reassembles a cell from stored parameters (model loading).
    pub fn from_parts(
        input_size: usize,
        hidden_size: usize,
        weights: [Tensor; 6],
        biases: [Vec<f32>; 3],
    ) -> Self {
        let [wz, wr, wh, uz, ur, uh] = weights;
        let [bz, br, bh] = biases;
        GruCell {
            input_size,
            hidden_size,
            wz,
            wr,
            wh,
            uz,
            ur,
            uh,
            bz,
            br,
            bh,
            state: None,
            cache: None,
        }
    }

    /// Processes the full sequence from a zero hidden state.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        self.forward_internal(input, None, None)
    }

    /// Processes only the first `actual_len` timesteps (clamped to
    /// [1, seq]) and returns the hidden state at that position. This is
    /// the masking primitive for variable-length, zero-padded inputs.
    pub fn forward_masked(&mut self, input: &Tensor, actual_len: usize) -> Result<Tensor> {
        self.forward_internal(input, None, Some(actual_len))
    }

    /// Processes the sequence starting from the hidden state left by
    /// the previous call, for streaming inference.
    pub fn forward_stateful(&mut self, input: &Tensor) -> Result<Tensor> {
        let initial = self.state.take().unwrap_or_else(|| vec![0.0; self.hidden_size]);
        let out = self.forward_internal(input, Some(&initial), None)?;
        self.state = Some(out.data.clone());
        Ok(out)
    }

    pub fn reset_state(&mut self) {
        self.state = None;
    }

    fn forward_internal(
        &mut self,
        input: &Tensor,
        initial_h: Option<&[f32]>,
        limit: Option<usize>,
    ) -> Result<Tensor> {
        let (flat, original_shape) = flatten_sequence(input)?;
        let seq_len = flat.shape[0];
        let input_size = flat.shape[1];
        if input_size != self.input_size {
            return Err(Error::ShapeMismatch(format!(
                "gru expects {} features per step, got {input_size}",
                self.input_size
            )));
        }
        let steps = limit.map(|l| l.clamp(1, seq_len)).unwrap_or(seq_len);
        let hs = self.hidden_size;

        let mut h = vec![0.0f32; hs];
        if let Some(init) = initial_h {
            h.copy_from_slice(init);
        }

        let mut hidden = Vec::with_capacity(steps + 1);
        hidden.push(h.clone());
        let mut z_seq = Vec::with_capacity(steps);
        let mut r_seq = Vec::with_capacity(steps);
        let mut cand_seq = Vec::with_capacity(steps);

        for t in 0..steps {
            let xt = &flat.data[t * input_size..(t + 1) * input_size];

            let mut z = vec![0.0f32; hs];
            let mut r = vec![0.0f32; hs];
            for i in 0..hs {
                let mut z_sum = self.bz[i];
                let mut r_sum = self.br[i];
                for j in 0..input_size {
                    z_sum += self.wz.data[i * input_size + j] * xt[j];
                    r_sum += self.wr.data[i * input_size + j] * xt[j];
                }
                for j in 0..hs {
                    z_sum += self.uz.data[i * hs + j] * h[j];
                    r_sum += self.ur.data[i * hs + j] * h[j];
                }
                z[i] = sigmoid(z_sum);
                r[i] = sigmoid(r_sum);
            }

            let mut h_cand = vec![0.0f32; hs];
            for i in 0..hs {
                let mut sum = self.bh[i];
                for j in 0..input_size {
                    sum += self.wh.data[i * input_size + j] * xt[j];
                }
                for j in 0..hs {
                    sum += self.uh.data[i * hs + j] * (r[j] * h[j]);
                }
                h_cand[i] = sum.tanh();
            }

            let mut new_h = vec![0.0f32; hs];
            for i in 0..hs {
                new_h[i] = (1.0 - z[i]) * h[i] + z[i] * h_cand[i];
            }

            z_seq.push(z);
            r_seq.push(r);
            cand_seq.push(h_cand);
            hidden.push(new_h.clone());
            h = new_h;
        }

        self.cache = Some(GruCache {
            input: flat,
            original_shape,
            hidden,
            z: z_seq,
            r: r_seq,
            h_cand: cand_seq,
        });

        Ok(Tensor::from_vec(h, &[hs]))
    }

    /// BPTT over the recorded sequence. Returns the input gradient
    /// (restored to the caller's shape) and gradients in parameter
    /// order wz, wr, wh, uz, ur, uh, bz, br, bh.
    pub fn backward(&mut self, grad_out: &Tensor) -> Result<(Tensor, ParamGrads)> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            Error::ShapeMismatch("gru backward called without a recorded forward".into())
        })?;
        let hs = self.hidden_size;
        let input_size = self.input_size;
        let steps = cache.z.len();

        let mut d_wz = vec![0.0f32; self.wz.len()];
        let mut d_wr = vec![0.0f32; self.wr.len()];
        let mut d_wh = vec![0.0f32; self.wh.len()];
        let mut d_uz = vec![0.0f32; self.uz.len()];
        let mut d_ur = vec![0.0f32; self.ur.len()];
        let mut d_uh = vec![0.0f32; self.uh.len()];
        let mut d_bz = vec![0.0f32; hs];
        let mut d_br = vec![0.0f32; hs];
        let mut d_bh = vec![0.0f32; hs];

        let mut dh = grad_out.data.clone();
        let mut d_input = Tensor::new(&cache.input.shape);

        for t in (0..steps).rev() {
            let xt = &cache.input.data[t * input_size..(t + 1) * input_size];
            let h_prev = &cache.hidden[t];
            let z = &cache.z[t];
            let r = &cache.r[t];
            let h_cand = &cache.h_cand[t];

            let mut dz = vec![0.0f32; hs];
            let mut d_cand = vec![0.0f32; hs];
            for i in 0..hs {
                dz[i] = dh[i] * (h_cand[i] - h_prev[i]) * z[i] * (1.0 - z[i]);
                d_cand[i] = dh[i] * z[i] * (1.0 - h_cand[i] * h_cand[i]);
            }

            let mut dr = vec![0.0f32; hs];
            for i in 0..hs {
                let mut uh_h = 0.0f32;
                for j in 0..hs {
                    uh_h += self.uh.data[i * hs + j] * h_prev[j];
                }
                dr[i] = d_cand[i] * uh_h * r[i] * (1.0 - r[i]);
            }

            for i in 0..hs {
                for j in 0..input_size {
                    d_wz[i * input_size + j] += dz[i] * xt[j];
                    d_wr[i * input_size + j] += dr[i] * xt[j];
                    d_wh[i * input_size + j] += d_cand[i] * xt[j];
                }
                for j in 0..hs {
                    d_uz[i * hs + j] += dz[i] * h_prev[j];
                    d_ur[i * hs + j] += dr[i] * h_prev[j];
                    d_uh[i * hs + j] += d_cand[i] * r[j] * h_prev[j];
                }
                d_bz[i] += dz[i];
                d_br[i] += dr[i];
                d_bh[i] += d_cand[i];
            }

            for j in 0..input_size {
                let mut sum = 0.0f32;
                for i in 0..hs {
                    sum += dz[i] * self.wz.data[i * input_size + j]
                        + dr[i] * self.wr.data[i * input_size + j]
                        + d_cand[i] * self.wh.data[i * input_size + j];
                }
                d_input.data[t * input_size + j] += sum;
            }

            let mut new_dh = vec![0.0f32; hs];
            for j in 0..hs {
                new_dh[j] = dh[j] * (1.0 - z[j]);
                for i in 0..hs {
                    new_dh[j] += dz[i] * self.uz.data[i * hs + j]
                        + dr[i] * self.ur.data[i * hs + j]
                        + d_cand[i] * self.uh.data[i * hs + j] * r[j];
                }
            }
            dh = new_dh;
        }

        let grad_input = restore_sequence_grad(d_input, &cache.original_shape);
        let grads = vec![d_wz, d_wr, d_wh, d_uz, d_ur, d_uh, d_bz, d_br, d_bh];
        Ok((grad_input, grads))
    }

    pub fn params(&self) -> Vec<&[f32]> {
        vec![
            self.wz.data.as_slice(),
            self.wr.data.as_slice(),
            self.wh.data.as_slice(),
            self.uz.data.as_slice(),
            self.ur.data.as_slice(),
            self.uh.data.as_slice(),
            self.bz.as_slice(),
            self.br.as_slice(),
            self.bh.as_slice(),
        ]
    }

    pub fn params_mut(&mut self) -> Vec<&mut [f32]> {
        vec![
            self.wz.data.as_mut_slice(),
            self.wr.data.as_mut_slice(),
            self.wh.data.as_mut_slice(),
            self.uz.data.as_mut_slice(),
            self.ur.data.as_mut_slice(),
            self.uh.data.as_mut_slice(),
            self.bz.as_mut_slice(),
            self.br.as_mut_slice(),
            self.bh.as_mut_slice(),
        ]
    }
}
