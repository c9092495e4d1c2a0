//! Long Short-Term Memory cell with full-sequence BPTT.

use rand::Rng;

use crate::error::{Error, Result};
use crate::net::layer::ParamGrads;
use crate::net::rnn::{flatten_sequence, restore_sequence_grad, sigmoid, xavier_tensor};
use crate::net::tensor::Tensor;

#[derive(Debug, Clone)]
struct LstmCache {
    input: Tensor,
    original_shape: Option<Vec<usize>>,
    /// h_0..h_T and c_0..c_T (T+1 entries each).
    hidden: Vec<Vec<f32>>,
    cell: Vec<Vec<f32>>,
    i: Vec<Vec<f32>>,
    f: Vec<Vec<f32>>,
    o: Vec<Vec<f32>>,
    g: Vec<Vec<f32>>,
}

/// LSTM gates: i, f, o = sigmoid(W x + U h + b), g = tanh(W x + U h + b),
/// c' = f c + i g, h' = o tanh(c'). The output is the final hidden state.
#[derive(Debug, Clone)]
pub struct LstmCell {
    pub input_size: usize,
    pub hidden_size: usize,
    pub wi: Tensor,
    pub wf: Tensor,
    pub wo: Tensor,
    pub wg: Tensor,
    pub ui: Tensor,
    pub uf: Tensor,
    pub uo: Tensor,
    pub ug: Tensor,
    pub bi: Vec<f32>,
    pub bf: Vec<f32>,
    pub bo: Vec<f32>,
    pub bg: Vec<f32>,
    /// (h, c) carried between `forward_stateful` calls.
    state: Option<(Vec<f32>, Vec<f32>)>,
    cache: Option<LstmCache>,
}

impl LstmCell {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let input_shape = [hidden_size, input_size];
        let hidden_shape = [hidden_size, hidden_size];
        LstmCell {
            input_size,
            hidden_size,
            wi: xavier_tensor(&input_shape, input_size, hidden_size, rng),
            wf: xavier_tensor(&input_shape, input_size, hidden_size, rng),
            wo: xavier_tensor(&input_shape, input_size, hidden_size, rng),
            wg: xavier_tensor(&input_shape, input_size, hidden_size, rng),
            ui: xavier_tensor(&hidden_shape, hidden_size, hidden_size, rng),
            uf: xavier_tensor(&hidden_shape, hidden_size, hidden_size, rng),
            uo: xavier_tensor(&hidden_shape, hidden_size, hidden_size, rng),
            ug: xavier_tensor(&hidden_shape, hidden_size, hidden_size, rng),
            bi: vec![0.0; hidden_size],
            bf: vec![0.0; hidden_size],
            bo: vec![0.0; hidden_size],
            bg: vec![0.0; hidden_size],
            state: None,
            cache: None,
        }
    }

    /// Reassembles a cell from stored parameters (model loading).
    pub fn from_parts(
        input_size: usize,
        hidden_size: usize,
        weights: [Tensor; 8],
        biases: [Vec<f32>; 4],
    ) -> Self {
        let [wi, wf, wo, wg, ui, uf, uo, ug] = weights;
        let [bi, bf, bo, bg] = biases;
        LstmCell {
            input_size,
            hidden_size,
            wi,
            wf,
            wo,
            wg,
            ui,
            uf,
            uo,
            ug,
            bi,
            bf,
            bo,
            bg,
            state: None,
            cache: None,
        }
    }

    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        self.forward_internal(input, None, None)
    }

    /// Processes only the first `actual_len` timesteps (clamped to
    /// [1, seq]) and returns the hidden state at that position.
    pub fn forward_masked(&mut self, input: &Tensor, actual_len: usize) -> Result<Tensor> {
        self.forward_internal(input, None, Some(actual_len))
    }

    pub fn forward_stateful(&mut self, input: &Tensor) -> Result<Tensor> {
        let initial = self.state.take();
        let out = self.forward_internal(input, initial.as_ref(), None)?;
        if let Some(final_c) = self.cache.as_ref().and_then(|c| c.cell.last()) {
            self.state = Some((out.data.clone(), final_c.clone()));
        }
        Ok(out)
    }

    pub fn reset_state(&mut self) {
        self.state = None;
    }

    fn forward_internal(
        &mut self,
        input: &Tensor,
        initial: Option<&(Vec<f32>, Vec<f32>)>,
        limit: Option<usize>,
    ) -> Result<Tensor> {
        let (flat, original_shape) = flatten_sequence(input)?;
        let seq_len = flat.shape[0];
        let input_size = flat.shape[1];
        if input_size != self.input_size {
            return Err(Error::ShapeMismatch(format!(
                "lstm expects {} features per step, got {input_size}",
                self.input_size
            )));
        }
        let steps = limit.map(|l| l.clamp(1, seq_len)).unwrap_or(seq_len);
        let hs = self.hidden_size;

        let (mut h, mut c) = match initial {
            Some((h0, c0)) => (h0.clone(), c0.clone()),
            None => (vec![0.0f32; hs], vec![0.0f32; hs]),
        };

        let mut hidden = Vec::with_capacity(steps + 1);
        let mut cell = Vec::with_capacity(steps + 1);
        hidden.push(h.clone());
        cell.push(c.clone());
        let mut i_seq = Vec::with_capacity(steps);
        let mut f_seq = Vec::with_capacity(steps);
        let mut o_seq = Vec::with_capacity(steps);
        let mut g_seq = Vec::with_capacity(steps);

        for t in 0..steps {
            let xt = &flat.data[t * input_size..(t + 1) * input_size];

            let mut i_gate = vec![0.0f32; hs];
            let mut f_gate = vec![0.0f32; hs];
            let mut o_gate = vec![0.0f32; hs];
            let mut g_gate = vec![0.0f32; hs];

            for j in 0..hs {
                let mut i_sum = self.bi[j];
                let mut f_sum = self.bf[j];
                let mut o_sum = self.bo[j];
                let mut g_sum = self.bg[j];
                for k in 0..input_size {
                    let xv = xt[k];
                    i_sum += self.wi.data[j * input_size + k] * xv;
                    f_sum += self.wf.data[j * input_size + k] * xv;
                    o_sum += self.wo.data[j * input_size + k] * xv;
                    g_sum += self.wg.data[j * input_size + k] * xv;
                }
                for k in 0..hs {
                    let hv = h[k];
                    i_sum += self.ui.data[j * hs + k] * hv;
                    f_sum += self.uf.data[j * hs + k] * hv;
                    o_sum += self.uo.data[j * hs + k] * hv;
                    g_sum += self.ug.data[j * hs + k] * hv;
                }
                i_gate[j] = sigmoid(i_sum);
                f_gate[j] = sigmoid(f_sum);
                o_gate[j] = sigmoid(o_sum);
                g_gate[j] = g_sum.tanh();
            }

            let mut new_c = vec![0.0f32; hs];
            let mut new_h = vec![0.0f32; hs];
            for j in 0..hs {
                new_c[j] = f_gate[j] * c[j] + i_gate[j] * g_gate[j];
                new_h[j] = o_gate[j] * new_c[j].tanh();
            }

            i_seq.push(i_gate);
            f_seq.push(f_gate);
            o_seq.push(o_gate);
            g_seq.push(g_gate);
            hidden.push(new_h.clone());
            cell.push(new_c.clone());
            h = new_h;
            c = new_c;
        }

        self.cache = Some(LstmCache {
            input: flat,
            original_shape,
            hidden,
            cell,
            i: i_seq,
            f: f_seq,
            o: o_seq,
            g: g_seq,
        });

        Ok(Tensor::from_vec(h, &[hs]))
    }

    /// BPTT over the recorded sequence. Gradients come back in
    /// parameter order wi, wf, wo, wg, ui, uf, uo, ug, bi, bf, bo, bg.
    pub fn backward(&mut self, grad_out: &Tensor) -> Result<(Tensor, ParamGrads)> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            Error::ShapeMismatch("lstm backward called without a recorded forward".into())
        })?;
        let hs = self.hidden_size;
        let input_size = self.input_size;
        let steps = cache.i.len();

        let mut d_wi = vec![0.0f32; self.wi.len()];
        let mut d_wf = vec![0.0f32; self.wf.len()];
        let mut d_wo = vec![0.0f32; self.wo.len()];
        let mut d_wg = vec![0.0f32; self.wg.len()];
        let mut d_ui = vec![0.0f32; self.ui.len()];
        let mut d_uf = vec![0.0f32; self.uf.len()];
        let mut d_uo = vec![0.0f32; self.uo.len()];
        let mut d_ug = vec![0.0f32; self.ug.len()];
        let mut d_bi = vec![0.0f32; hs];
        let mut d_bf = vec![0.0f32; hs];
        let mut d_bo = vec![0.0f32; hs];
        let mut d_bg = vec![0.0f32; hs];

        let mut dh = grad_out.data.clone();
        let mut dc = vec![0.0f32; hs];
        let mut d_input = Tensor::new(&cache.input.shape);

        for t in (0..steps).rev() {
            let xt = &cache.input.data[t * input_size..(t + 1) * input_size];
            let h_prev = &cache.hidden[t];
            let c_prev = &cache.cell[t];
            let c_curr = &cache.cell[t + 1];
            let (i, f, o, g) = (&cache.i[t], &cache.f[t], &cache.o[t], &cache.g[t]);

            let mut di = vec![0.0f32; hs];
            let mut df = vec![0.0f32; hs];
            let mut do_ = vec![0.0f32; hs];
            let mut dg = vec![0.0f32; hs];
            let mut dc_curr = vec![0.0f32; hs];

            for j in 0..hs {
                let tc = c_curr[j].tanh();
                do_[j] = dh[j] * tc * o[j] * (1.0 - o[j]);
                dc_curr[j] = dc[j] + dh[j] * o[j] * (1.0 - tc * tc);
                df[j] = dc_curr[j] * c_prev[j] * f[j] * (1.0 - f[j]);
                di[j] = dc_curr[j] * g[j] * i[j] * (1.0 - i[j]);
                dg[j] = dc_curr[j] * i[j] * (1.0 - g[j] * g[j]);

                d_bi[j] += di[j];
                d_bf[j] += df[j];
                d_bo[j] += do_[j];
                d_bg[j] += dg[j];

                for k in 0..input_size {
                    let xv = xt[k];
                    d_wi[j * input_size + k] += di[j] * xv;
                    d_wf[j * input_size + k] += df[j] * xv;
                    d_wo[j * input_size + k] += do_[j] * xv;
                    d_wg[j * input_size + k] += dg[j] * xv;
                    d_input.data[t * input_size + k] += di[j] * self.wi.data[j * input_size + k]
                        + df[j] * self.wf.data[j * input_size + k]
                        + do_[j] * self.wo.data[j * input_size + k]
                        + dg[j] * self.wg.data[j * input_size + k];
                }
                for k in 0..hs {
                    let hv = h_prev[k];
                    d_ui[j * hs + k] += di[j] * hv;
                    d_uf[j * hs + k] += df[j] * hv;
                    d_uo[j * hs + k] += do_[j] * hv;
                    d_ug[j * hs + k] += dg[j] * hv;
                }
            }

            let mut new_dh = vec![0.0f32; hs];
            let mut new_dc = vec![0.0f32; hs];
            for k in 0..hs {
                for j in 0..hs {
                    new_dh[k] += di[j] * self.ui.data[j * hs + k]
                        + df[j] * self.uf.data[j * hs + k]
                        + do_[j] * self.uo.data[j * hs + k]
                        + dg[j] * self.ug.data[j * hs + k];
                }
                new_dc[k] = dc_curr[k] * f[k];
            }
            dh = new_dh;
            dc = new_dc;
        }

        let grad_input = restore_sequence_grad(d_input, &cache.original_shape);
        let grads = vec![
            d_wi, d_wf, d_wo, d_wg, d_ui, d_uf, d_uo, d_ug, d_bi, d_bf, d_bo, d_bg,
        ];
        Ok((grad_input, grads))
    }

    pub fn params(&self) -> Vec<&[f32]> {
        vec![
            self.wi.data.as_slice(),
            self.wf.data.as_slice(),
            self.wo.data.as_slice(),
            self.wg.data.as_slice(),
            self.ui.data.as_slice(),
            self.uf.data.as_slice(),
            self.uo.data.as_slice(),
            self.ug.data.as_slice(),
            self.bi.as_slice(),
            self.bf.as_slice(),
            self.bo.as_slice(),
            self.bg.as_slice(),
        ]
    }

    pub fn params_mut(&mut self) -> Vec<&mut [f32]> {
        vec![
            self.wi.data.as_mut_slice(),
            self.wf.data.as_mut_slice(),
            self.wo.data.as_mut_slice(),
            self.wg.data.as_mut_slice(),
            self.ui.data.as_mut_slice(),
            self.uf.data.as_mut_slice(),
            self.uo.data.as_mut_slice(),
            self.ug.data.as_mut_slice(),
            self.bi.as_mut_slice(),
            self.bf.as_mut_slice(),
            self.bo.as_mut_slice(),
            self.bg.as_mut_slice(),
        ]
    }
}
