//! Data-sharded parallel training.
//!
//! Each epoch the dataset is split into contiguous shards, one worker
//! per shard trains its own deep clone of the master model, and the
//! master parameters are replaced by the component-wise mean over the
//! clones. Workers share nothing but the progress counter.

use log::info;
use rayon::prelude::*;

use crate::error::Result;
use crate::net::tensor::Tensor;
use crate::net::Sequential;
use crate::train::augment::Augmentor;
use crate::train::dataset::Dataset;
use crate::train::progress::ProgressBar;
use crate::train::trainer::Trainer;

pub struct ParallelTrainer {
    learning_rate: f32,
    threads: usize,
}

impl ParallelTrainer {
    /// `threads == 0` selects one worker per available core.
    pub fn new(learning_rate: f32, threads: usize) -> Self {
        let threads = if threads == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            threads
        };
        ParallelTrainer {
            learning_rate,
            threads,
        }
    }

    pub fn train<F>(
        &self,
        model: &mut Sequential,
        dataset: &Dataset,
        epochs: usize,
        augmentor: Option<&Augmentor>,
        extract: &F,
    ) -> Result<()>
    where
        F: Fn(&[f32]) -> Option<Tensor> + Sync,
    {
        let num_samples = dataset.len();
        if num_samples == 0 {
            return Ok(());
        }

        let workers = self.threads.min(num_samples);
        let shard_size = num_samples.div_ceil(workers);
        info!("Parallel training: {workers} workers, shard size {shard_size}");

        for epoch in 1..=epochs {
            let pb = ProgressBar::new(num_samples, &format!("Epoch {epoch}/{epochs}"));
            let master: &Sequential = model;

            let results: Vec<Result<(Sequential, f32, usize)>> = (0..workers)
                .into_par_iter()
                .map(|worker| {
                    let start = worker * shard_size;
                    let end = (start + shard_size).min(num_samples);

                    let mut local = master.clone();
                    let trainer = Trainer::new(self.learning_rate);
                    // Every worker draws from its own RNG stream so an
                    // epoch is reproducible regardless of scheduling.
                    let mut aug = augmentor
                        .map(|a| a.reseeded(epoch as u64 * 1000 + worker as u64));

                    let mut shard_loss = 0.0f32;
                    let mut counted = 0usize;
                    for sample in &dataset.samples[start..end] {
                        let features = if sample.is_hotword {
                            match aug.as_mut() {
                                Some(a) => extract(&a.augment(&sample.audio)),
                                None => extract(&sample.audio),
                            }
                        } else {
                            extract(&sample.audio)
                        };
                        if let Some(features) = features {
                            let target = if sample.is_hotword { 1.0 } else { 0.0 };
                            shard_loss += trainer.train_step(&mut local, &features, target)?;
                            counted += 1;
                        }
                        pb.inc();
                    }

                    Ok((local, shard_loss, counted))
                })
                .collect();

            let mut clones = Vec::with_capacity(workers);
            let mut total_loss = 0.0f32;
            let mut total_counted = 0usize;
            for result in results {
                let (local, loss, counted) = result?;
                clones.push(local);
                total_loss += loss;
                total_counted += counted;
            }

            average_parameters(model, &clones);
            pb.finish();
            info!(
                "Epoch {epoch}/{epochs} - loss {:.4}",
                total_loss / total_counted.max(1) as f32
            );
        }

        Ok(())
    }
}

/// Master parameters become the mean over the shard clones.
fn average_parameters(master: &mut Sequential, clones: &[Sequential]) {
    let n = clones.len() as f32;
    for (layer_idx, layer) in master.layers.iter_mut().enumerate() {
        let mut views = layer.params_mut();
        for (param_idx, view) in views.iter_mut().enumerate() {
            for v in view.iter_mut() {
                *v = 0.0;
            }
            for clone in clones {
                let src = clone.layers[layer_idx].params()[param_idx];
                for (dst, s) in view.iter_mut().zip(src) {
                    *dst += s;
                }
            }
            for v in view.iter_mut() {
                *v /= n;
            }
        }
    }
}
