//! Fit loop
//!
//! A plain epoch loop in place of burn's `Learner`: shuffle, augment, forward,
//! class-weighted loss plus L2 penalty, backward and an Adam step, then an
//! optional validation pass on the inference model.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::TrainingConfig;
use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::burn_dataset::{AugmentingBatcher, ImageFolderDataset};
use crate::dataset::class_weights::ClassWeights;
use crate::model::resnet::ResNet;
use crate::training::evaluator::evaluate;
use crate::training::history::{EpochMetrics, TrainingHistory};
use crate::training::loss::{count_correct, weighted_binary_cross_entropy};
use crate::utils::error::{ResNetError, Result};
use crate::utils::logging::TrainingLogger;

/// Drives training of a [`ResNet`] for a fixed number of epochs
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
    augmentation: AugmentationConfig,
    batch_size: usize,
    seed: u64,
}

impl Trainer {
    pub fn new(
        config: TrainingConfig,
        augmentation: AugmentationConfig,
        batch_size: usize,
        seed: u64,
    ) -> Self {
        Self {
            config,
            augmentation,
            batch_size: batch_size.max(1),
            seed,
        }
    }

    /// Train `model` on `train`, validating on `valid` every
    /// `validation_freq` epochs
    ///
    /// Every training label must have an entry in `class_weights`.
    pub fn fit<B: AutodiffBackend>(
        &self,
        mut model: ResNet<B>,
        train: &ImageFolderDataset,
        valid: &ImageFolderDataset,
        class_weights: &ClassWeights,
        device: &B::Device,
    ) -> Result<(ResNet<B>, TrainingHistory)> {
        if train.is_empty() {
            return Err(ResNetError::Training("training split is empty".into()));
        }
        // Every training label needs a weight
        class_weights.sample_weights(&train.labels())?;

        let batcher = AugmentingBatcher::<B>::new(self.augmentation.clone(), self.seed);
        let mut optimizer = AdamConfig::new()
            .with_epsilon(self.config.adam_epsilon)
            .init();

        let mut epoch_rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut history = TrainingHistory::new();
        let mut logger = TrainingLogger::new(self.config.epochs);

        for epoch in 0..self.config.epochs {
            logger.start_epoch(epoch);

            let mut indices: Vec<usize> = (0..train.len()).collect();
            indices.shuffle(&mut epoch_rng);

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            let mut seen = 0usize;
            let num_batches = indices.len().div_ceil(self.batch_size);

            for (batch_idx, chunk) in indices.chunks(self.batch_size).enumerate() {
                let items: Vec<_> = chunk.iter().filter_map(|&i| train.get(i)).collect();
                if items.is_empty() {
                    continue;
                }

                let n = items.len();
                let batch = batcher.batch(items, device);
                let weights = Tensor::<B, 1>::from_floats(
                    TensorData::new(class_weights.sample_weights(&batch.labels)?, [n]),
                    device,
                );

                let logits = model.forward(batch.images).reshape([n]);
                let data_loss =
                    weighted_binary_cross_entropy(logits.clone(), batch.targets.clone(), Some(weights));
                let loss = data_loss + model.l2_penalty().mul_scalar(self.config.l2_regularization);

                let loss_value: f64 = loss.clone().into_scalar().elem();
                if !loss_value.is_finite() {
                    return Err(ResNetError::Training(format!(
                        "loss became {loss_value} in epoch {}",
                        epoch + 1
                    )));
                }
                loss_sum += loss_value * n as f64;
                correct += count_correct(logits, batch.targets);
                seen += n;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(self.config.learning_rate, model, grads);

                debug!(
                    "Batch {}/{}: loss = {:.4}",
                    batch_idx + 1,
                    num_batches,
                    loss_value
                );
            }

            let loss = loss_sum / seen.max(1) as f64;
            let accuracy = correct as f64 / seen.max(1) as f64;

            let validation = if self.config.validates_after(epoch) && !valid.is_empty() {
                let result = evaluate(
                    &model.valid(),
                    valid,
                    self.batch_size,
                    self.config.l2_regularization,
                    device,
                )?;
                Some((result.loss, result.accuracy))
            } else {
                None
            };

            logger.end_epoch(loss, accuracy, validation);
            history.push(EpochMetrics {
                epoch: epoch + 1,
                loss,
                accuracy,
                val_loss: validation.map(|(l, _)| l),
                val_accuracy: validation.map(|(_, a)| a),
            });
        }

        history.finish();
        logger.finish(history.best_val_accuracy());

        Ok((model, history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::burn_dataset::ImageItem;
    use crate::model::resnet::ResNetConfig;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = Autodiff<NdArray>;

    fn dataset(labels: &[u32]) -> ImageFolderDataset {
        let items = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| ImageItem {
                image: RgbImage::from_pixel(32, 32, Rgb([200 * label as u8, 30 + i as u8, 60])),
                label,
                path: format!("mem://{i}"),
            })
            .collect();
        ImageFolderDataset::from_items(items, 32)
    }

    fn tiny_model() -> ResNet<TestBackend> {
        ResNetConfig::new()
            .with_stem_filters(4)
            .with_stage_depths([1, 1, 1, 1])
            .with_stage_filters([2, 2, 2, 2])
            .init(&Default::default())
    }

    fn trainer(epochs: usize, validation_freq: usize) -> Trainer {
        let config = TrainingConfig {
            epochs,
            validation_freq,
            ..TrainingConfig::default()
        };
        Trainer::new(config, AugmentationConfig::default(), 3, 123)
    }

    #[test]
    fn test_fit_records_every_epoch_and_validation_schedule() {
        let train_labels = [0, 0, 0, 1, 0, 1, 0];
        let train = dataset(&train_labels);
        let valid = dataset(&[0, 1]);
        let weights = ClassWeights::balanced(&train_labels);

        let (_, history) = trainer(3, 2)
            .fit(tiny_model(), &train, &valid, &weights, &Default::default())
            .unwrap();

        assert_eq!(history.len(), 3);
        assert!(history.epochs[0].val_accuracy.is_none());
        assert!(history.epochs[1].val_accuracy.is_some());
        assert!(history.epochs[2].val_loss.is_none());
        assert!(history.epochs.iter().all(|m| m.loss.is_finite()));
        assert!(history.finished_at.is_some());
    }

    #[test]
    fn test_fit_rejects_missing_class_weight() {
        let train = dataset(&[0, 1, 1]);
        let weights = ClassWeights::balanced(&[0, 0]);

        let result = trainer(1, 1).fit(tiny_model(), &train, &train, &weights, &Default::default());
        assert!(matches!(result, Err(ResNetError::Training(_))));
    }

    #[test]
    fn test_fit_rejects_empty_training_split() {
        let empty = ImageFolderDataset::from_items(Vec::new(), 32);
        let result = trainer(1, 1).fit(
            tiny_model(),
            &empty,
            &empty,
            &ClassWeights::default(),
            &Default::default(),
        );
        assert!(result.is_err());
    }
}
