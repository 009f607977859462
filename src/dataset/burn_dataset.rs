//! Burn dataset integration
//!
//! Decoded images are cached in memory at the target size, then turned into
//! tensors by one of two batchers:
//!
//! - `ImageBatcher`: plain batching, used for validation and evaluation
//! - `AugmentingBatcher`: runs the augmentation chain first, used for training
//!
//! Pixel values stay in the 0..=255 range; the network sees raw intensities.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::dataset::augmentation::{to_chw, AugmentationConfig, Augmenter};
use crate::dataset::loader::ImageFolder;
use crate::utils::error::{ResNetError, Result, ResultExt};

/// A decoded image resized to the training resolution
#[derive(Clone, Debug)]
pub struct ImageItem {
    pub image: RgbImage,
    pub label: u32,
    pub path: String,
}

impl ImageItem {
    /// Decode an image, convert it to RGB and resize it to `image_size`
    pub fn from_path(path: &Path, label: u32, image_size: usize) -> Result<Self> {
        let size = image_size as u32;
        let image = ImageReader::open(path)
            .for_image(path)?
            .with_guessed_format()
            .for_image(path)?
            .decode()
            .for_image(path)?
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().into_owned(),
        })
    }
}

/// In-memory dataset of decoded images
#[derive(Clone)]
pub struct ImageFolderDataset {
    items: Vec<ImageItem>,
    image_size: usize,
}

impl std::fmt::Debug for ImageFolderDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFolderDataset")
            .field("len", &self.items.len())
            .field("image_size", &self.image_size)
            .finish()
    }
}

impl ImageFolderDataset {
    /// Decode every sample of `folder` in parallel
    ///
    /// Files that fail to decode are skipped with a warning. Sample order is
    /// preserved.
    pub fn load(folder: &ImageFolder, image_size: usize) -> Result<Self> {
        let total = folder.len();
        info!(
            "Decoding {} images from {:?} at {}x{}",
            total, folder.root_dir, image_size, image_size
        );

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let loaded = AtomicUsize::new(0);

        let decoded: Vec<Option<ImageItem>> = folder
            .samples
            .par_iter()
            .map(|sample| {
                let result = ImageItem::from_path(&sample.path, sample.label, image_size);
                let count = loaded.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 50 == 0 || count == total {
                    pb.set_position(count as u64);
                }
                match result {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Skipping unreadable image: {e}");
                        None
                    }
                }
            })
            .collect();

        let items: Vec<ImageItem> = decoded.into_iter().flatten().collect();
        pb.finish_and_clear();

        if items.is_empty() {
            return Err(ResNetError::Dataset(format!(
                "none of the {} images under {:?} could be decoded",
                total, folder.root_dir
            )));
        }

        info!("Loaded {}/{} images", items.len(), total);

        Ok(Self { items, image_size })
    }

    /// Build a dataset from already decoded items
    pub fn from_items(items: Vec<ImageItem>, image_size: usize) -> Self {
        Self { items, image_size }
    }

    /// Side length every item was resized to
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Labels of all loaded items, in dataset order
    pub fn labels(&self) -> Vec<u32> {
        self.items.iter().map(|item| item.label).collect()
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images with binary targets
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Shape `[batch_size, 3, height, width]`, values in 0..=255
    pub images: Tensor<B, 4>,
    /// Shape `[batch_size]`, 0.0 or 1.0
    pub targets: Tensor<B, 1>,
    /// Integer labels, used for class-weight lookup
    pub labels: Vec<u32>,
}

fn assemble_batch<B: Backend>(
    images: Vec<RgbImage>,
    labels: Vec<u32>,
    device: &B::Device,
) -> ImageBatch<B> {
    let batch_size = images.len();
    let (width, height) = images
        .first()
        .map(|img| (img.width() as usize, img.height() as usize))
        .unwrap_or((0, 0));

    let images_data: Vec<f32> = images.iter().flat_map(to_chw).collect();
    let images = Tensor::<B, 4>::from_floats(
        TensorData::new(images_data, [batch_size, 3, height, width]),
        device,
    );

    let targets_data: Vec<f32> = labels.iter().map(|&label| label as f32).collect();
    let targets = Tensor::<B, 1>::from_floats(TensorData::new(targets_data, [batch_size]), device);

    ImageBatch {
        images,
        targets,
        labels,
    }
}

/// Batcher without augmentation
#[derive(Clone, Debug, Default)]
pub struct ImageBatcher<B: Backend> {
    _backend: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new() -> Self {
        Self {
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let (images, labels) = items.into_iter().map(|item| (item.image, item.label)).unzip();
        assemble_batch(images, labels, device)
    }
}

/// Batcher that augments every image before batching
///
/// Each call draws a fresh RNG seeded from the base seed and a batch
/// counter, so a run is reproducible for a given seed.
pub struct AugmentingBatcher<B: Backend> {
    augmenter: Augmenter,
    seed: u64,
    batches: AtomicU64,
    _backend: PhantomData<B>,
}

impl<B: Backend> Clone for AugmentingBatcher<B> {
    fn clone(&self) -> Self {
        Self {
            augmenter: self.augmenter.clone(),
            seed: self.seed,
            batches: AtomicU64::new(self.batches.load(Ordering::Relaxed)),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> std::fmt::Debug for AugmentingBatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AugmentingBatcher")
            .field("augmentation", self.augmenter.config())
            .field("seed", &self.seed)
            .finish()
    }
}

impl<B: Backend> AugmentingBatcher<B> {
    pub fn new(config: AugmentationConfig, seed: u64) -> Self {
        Self {
            augmenter: Augmenter::new(config),
            seed,
            batches: AtomicU64::new(0),
            _backend: PhantomData,
        }
    }

    fn next_rng(&self) -> ChaCha8Rng {
        let index = self.batches.fetch_add(1, Ordering::Relaxed);
        ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for AugmentingBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let mut rng = self.next_rng();

        let (images, labels) = items
            .into_iter()
            .map(|item| (self.augmenter.augment(&item.image, &mut rng), item.label))
            .unzip();

        assemble_batch(images, labels, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::write_class;
    use burn_ndarray::NdArray;
    use image::Rgb;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn item(label: u32, shade: u8) -> ImageItem {
        ImageItem {
            image: RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade])),
            label,
            path: format!("mem://{label}/{shade}"),
        }
    }

    #[test]
    fn test_load_resizes_and_keeps_order() {
        let tmp = TempDir::new().unwrap();
        write_class(tmp.path(), "a", 3, 40);
        write_class(tmp.path(), "b", 2, 220);
        std::fs::write(tmp.path().join("b").join("broken.png"), b"not an image").unwrap();

        let folder = ImageFolder::scan(tmp.path()).unwrap();
        assert_eq!(folder.len(), 6);

        let dataset = ImageFolderDataset::load(&folder, 16).unwrap();
        assert_eq!(dataset.len(), 5);
        assert_eq!(dataset.labels(), vec![0, 0, 0, 1, 1]);

        let first = dataset.get(0).unwrap();
        assert_eq!(first.image.dimensions(), (16, 16));
        assert!(dataset.get(5).is_none());
    }

    #[test]
    fn test_image_batcher_shapes_and_range() {
        let device = Default::default();
        let batcher = ImageBatcher::<TestBackend>::new();
        let batch = batcher.batch(vec![item(0, 0), item(1, 255), item(1, 128)], &device);

        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [3]);
        assert_eq!(batch.labels, vec![0, 1, 1]);

        let max: f32 = batch.images.clone().max().into_scalar();
        let min: f32 = batch.images.min().into_scalar();
        assert_eq!(max, 255.0);
        assert_eq!(min, 0.0);

        let targets: Vec<f32> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_augmenting_batcher_keeps_shape_and_range() {
        let device = Default::default();
        let batcher = AugmentingBatcher::<TestBackend>::new(AugmentationConfig::default(), 123);
        let items: Vec<ImageItem> = (0..4).map(|i| item(i % 2, 60 * i as u8)).collect();

        let batch = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [4, 3, 8, 8]);

        let max: f32 = batch.images.clone().max().into_scalar();
        let min: f32 = batch.images.min().into_scalar();
        assert!(max <= 255.0);
        assert!(min >= 0.0);
    }

    #[test]
    fn test_augmenting_batcher_is_seeded() {
        let device = Default::default();
        let items: Vec<ImageItem> = (0..2).map(|i| item(i, 100)).collect();

        let a = AugmentingBatcher::<TestBackend>::new(AugmentationConfig::default(), 9);
        let b = AugmentingBatcher::<TestBackend>::new(AugmentationConfig::default(), 9);

        let batch_a: Vec<f32> = a.batch(items.clone(), &device).images.into_data().to_vec().unwrap();
        let batch_b: Vec<f32> = b.batch(items, &device).images.into_data().to_vec().unwrap();
        assert_eq!(batch_a, batch_b);
    }
}
