//! Single-threaded trainer: sample-at-a-time SGD with the fused
//! BCE-sigmoid gradient.

use log::{info, warn};

use crate::error::Result;
use crate::net::layer::Layer;
use crate::net::loss::{bce_gradient, bce_loss};
use crate::net::sgd::sgd_update;
use crate::net::tensor::Tensor;
use crate::net::Sequential;
use crate::train::augment::Augmentor;
use crate::train::dataset::Dataset;

pub struct Trainer {
    learning_rate: f32,
}

impl Trainer {
    pub fn new(learning_rate: f32) -> Self {
        Trainer { learning_rate }
    }

    /// One SGD step on a single sample. Returns the pre-update loss.
    ///
    /// When the network ends in a sigmoid the backward pass is seeded
    /// with the fused BCE-sigmoid gradient (prediction - target) and the
    /// sigmoid layer itself is skipped; chaining through the sigmoid is
    /// slower and numerically unstable near 0 and 1. Any other tail
    /// gets the plain BCE gradient and the full backward walk.
    pub fn train_step(&self, model: &mut Sequential, features: &Tensor, target: f32) -> Result<f32> {
        let inputs = model.forward_recording(features)?;
        let prediction = inputs[inputs.len() - 1].data[0];
        let loss = bce_loss(&[prediction], &[target]);

        let fused = matches!(model.layers.last(), Some(Layer::Sigmoid));
        let (mut grad, top) = if fused {
            (
                Tensor::from_vec(vec![prediction - target], &[1]),
                model.layers.len() - 1,
            )
        } else {
            (
                Tensor::from_vec(bce_gradient(&[prediction], &[target]), &[1]),
                model.layers.len(),
            )
        };

        for i in (0..top).rev() {
            let (grad_input, grads) = model.layers[i].backward(&inputs[i], &grad)?;
            if !grads.is_empty() {
                for (param, g) in model.layers[i].params_mut().into_iter().zip(&grads) {
                    sgd_update(param, g, self.learning_rate);
                }
            }
            grad = grad_input;
        }

        Ok(loss)
    }

    /// Runs the epoch loop over the dataset. Positive samples pass
    /// through the augmentor when one is provided; clips too short for
    /// the feature extractor are skipped.
    pub fn train<F>(
        &self,
        model: &mut Sequential,
        dataset: &Dataset,
        epochs: usize,
        mut augmentor: Option<&mut Augmentor>,
        extract: &F,
    ) -> Result<()>
    where
        F: Fn(&[f32]) -> Option<Tensor>,
    {
        for epoch in 1..=epochs {
            let mut total_loss = 0.0f32;
            let mut counted = 0usize;

            for sample in &dataset.samples {
                let features = if sample.is_hotword {
                    match augmentor.as_deref_mut() {
                        Some(aug) => extract(&aug.augment(&sample.audio)),
                        None => extract(&sample.audio),
                    }
                } else {
                    extract(&sample.audio)
                };
                let Some(features) = features else {
                    warn!("Sample too short for feature extraction, skipping");
                    continue;
                };

                let target = if sample.is_hotword { 1.0 } else { 0.0 };
                total_loss += self.train_step(model, &features, target)?;
                counted += 1;
            }

            info!(
                "Epoch {epoch}/{epochs} - loss {:.4}",
                total_loss / counted.max(1) as f32
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::builder::build_model;
    use crate::train::dataset::Sample;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_model() -> Sequential {
        let mut rng = StdRng::seed_from_u64(17);
        build_model(&[], &[4], &mut rng).unwrap()
    }

    #[test]
    fn train_step_reduces_loss_on_repeats() {
        let mut model = tiny_model();
        let trainer = Trainer::new(0.5);
        let features = Tensor::from_vec(vec![0.2, 0.8, -0.1, 0.4], &[4]);

        let first = trainer.train_step(&mut model, &features, 1.0).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = trainer.train_step(&mut model, &features, 1.0).unwrap();
        }
        assert!(last < first, "loss should fall: {first} -> {last}");
    }

    #[test]
    fn fused_gradient_skips_trailing_sigmoid() {
        // With a dense+sigmoid model, one step from a known state must
        // apply dW = (p - y) * x to the dense weights.
        let weights = Tensor::from_vec(vec![0.0, 0.0], &[1, 2]);
        let mut model = Sequential::new(vec![
            Layer::dense(weights, vec![0.0]),
            Layer::Sigmoid,
        ]);
        let trainer = Trainer::new(1.0);
        let features = Tensor::from_vec(vec![1.0, 2.0], &[2]);

        // Prediction starts at sigmoid(0) = 0.5; target 1 gives a
        // fused seed of -0.5.
        trainer.train_step(&mut model, &features, 1.0).unwrap();
        let w = model.layers[0].params()[0].to_vec();
        assert!((w[0] - 0.5).abs() < 1e-6, "w0 {}", w[0]);
        assert!((w[1] - 1.0).abs() < 1e-6, "w1 {}", w[1]);
    }

    #[test]
    fn non_sigmoid_tail_takes_the_standard_path() {
        // Dense-only model: backward must walk every layer.
        let weights = Tensor::from_vec(vec![0.1, 0.1], &[1, 2]);
        let mut model = Sequential::new(vec![Layer::dense(weights, vec![0.0])]);
        let trainer = Trainer::new(0.1);
        let features = Tensor::from_vec(vec![1.0, 1.0], &[2]);

        let before = model.layers[0].params()[0].to_vec();
        trainer.train_step(&mut model, &features, 1.0).unwrap();
        let after = model.layers[0].params()[0].to_vec();
        assert_ne!(before, after);
    }

    #[test]
    fn learns_to_separate_constant_samples() {
        let mut rng = StdRng::seed_from_u64(23);
        let mut model = build_model(&[], &[8], &mut rng).unwrap();
        let trainer = Trainer::new(0.5);

        let dataset = Dataset {
            samples: vec![
                Sample {
                    audio: vec![0.8; 8],
                    is_hotword: true,
                    actual_len: 8,
                },
                Sample {
                    audio: vec![-0.5; 8],
                    is_hotword: false,
                    actual_len: 8,
                },
            ],
        };
        let extract = |s: &[f32]| Some(Tensor::from_vec(s.to_vec(), &[s.len()]));

        trainer.train(&mut model, &dataset, 200, None, &extract).unwrap();

        let pos = model.forward(&Tensor::from_vec(vec![0.8; 8], &[8])).unwrap();
        let neg = model.forward(&Tensor::from_vec(vec![-0.5; 8], &[8])).unwrap();
        assert!(pos.data[0] > 0.9, "positive {}", pos.data[0]);
        assert!(neg.data[0] < 0.1, "negative {}", neg.data[0]);
    }
}
