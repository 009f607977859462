//! Evaluation pass over a dataset

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};

use crate::dataset::burn_dataset::{ImageBatcher, ImageFolderDataset};
use crate::model::resnet::ResNet;
use crate::training::loss::{binary_cross_entropy_with_logits, count_correct};
use crate::utils::error::{ResNetError, Result};
use crate::MIN_IMAGE_SIZE;

/// Loss and accuracy over a whole dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Mean unweighted cross-entropy plus the L2 penalty
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
}

/// Run the model over `dataset` in order, without augmentation
///
/// The model should already be in inference mode (`model.valid()` for an
/// autodiff model) so batch norm uses its running statistics.
pub fn evaluate<B: Backend>(
    model: &ResNet<B>,
    dataset: &ImageFolderDataset,
    batch_size: usize,
    l2_regularization: f64,
    device: &B::Device,
) -> Result<EvaluationResult> {
    let len = dataset.len();
    if len == 0 {
        return Err(ResNetError::Training(
            "cannot evaluate on an empty dataset".into(),
        ));
    }
    if dataset.image_size() < MIN_IMAGE_SIZE {
        return Err(ResNetError::Training(format!(
            "images must be at least {MIN_IMAGE_SIZE}x{MIN_IMAGE_SIZE}, got {0}x{0}",
            dataset.image_size()
        )));
    }
    if batch_size == 0 {
        return Err(ResNetError::Training("batch_size must be positive".into()));
    }

    let batcher = ImageBatcher::<B>::new();
    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        let n = items.len();
        let batch = batcher.batch(items, device);
        let logits = model.forward(batch.images).reshape([n]);

        let batch_loss: f64 = binary_cross_entropy_with_logits(logits.clone(), batch.targets.clone())
            .sum()
            .into_scalar()
            .elem();
        loss_sum += batch_loss;
        correct += count_correct(logits, batch.targets);
        total += n;
    }

    let penalty: f64 = model.l2_penalty().into_scalar().elem();

    Ok(EvaluationResult {
        loss: loss_sum / total as f64 + l2_regularization * penalty,
        accuracy: correct as f64 / total as f64,
        samples: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::burn_dataset::ImageItem;
    use crate::model::resnet::ResNetConfig;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray;

    fn dataset(n: usize) -> ImageFolderDataset {
        let items = (0..n)
            .map(|i| ImageItem {
                image: RgbImage::from_pixel(32, 32, Rgb([(i * 40) as u8, 90, 200])),
                label: (i % 2) as u32,
                path: format!("mem://{i}"),
            })
            .collect();
        ImageFolderDataset::from_items(items, 32)
    }

    fn model() -> ResNet<TestBackend> {
        ResNetConfig::new()
            .with_stem_filters(4)
            .with_stage_depths([1, 1, 1, 1])
            .with_stage_filters([2, 2, 2, 2])
            .init(&Default::default())
    }

    #[test]
    fn test_counts_every_sample_with_short_last_batch() {
        let result = evaluate(&model(), &dataset(5), 2, 0.0, &Default::default()).unwrap();
        assert_eq!(result.samples, 5);
        assert!(result.loss.is_finite() && result.loss > 0.0);
        assert!((0.0..=1.0).contains(&result.accuracy));
    }

    #[test]
    fn test_l2_term_increases_loss() {
        let model = model();
        let data = dataset(3);
        let device = Default::default();

        let plain = evaluate(&model, &data, 4, 0.0, &device).unwrap();
        let regularized = evaluate(&model, &data, 4, 1e-2, &device).unwrap();
        assert!(regularized.loss > plain.loss);
        assert_eq!(regularized.accuracy, plain.accuracy);
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let empty = ImageFolderDataset::from_items(Vec::new(), 32);
        let result = evaluate(&model(), &empty, 4, 0.0, &Default::default());
        assert!(matches!(result, Err(ResNetError::Training(_))));
    }

    #[test]
    fn test_undersized_images_are_an_error() {
        let items = vec![ImageItem {
            image: RgbImage::from_pixel(2, 2, Rgb([10, 20, 30])),
            label: 0,
            path: "mem://tiny".into(),
        }];
        let tiny = ImageFolderDataset::from_items(items, 2);
        let result = evaluate(&model(), &tiny, 4, 0.0, &Default::default());
        assert!(matches!(result, Err(ResNetError::Training(_))));
    }

    #[test]
    fn test_zero_batch_size_is_an_error() {
        let result = evaluate(&model(), &dataset(3), 0, 0.0, &Default::default());
        assert!(matches!(result, Err(ResNetError::Training(_))));
    }
}
