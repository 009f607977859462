//! Dataset loading, augmentation and class balancing

pub mod augmentation;
pub mod burn_dataset;
pub mod class_weights;
pub mod loader;

pub use augmentation::{AugmentationConfig, Augmenter, FillMode, FlipMode};
pub use burn_dataset::{AugmentingBatcher, ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem};
pub use class_weights::ClassWeights;
pub use loader::{ImageFolder, ImageSample};

use tracing::info;

use crate::config::DataConfig;
use crate::utils::error::Result;

/// Decoded training and validation splits
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub class_names: Vec<String>,
    pub train: ImageFolderDataset,
    pub valid: ImageFolderDataset,
}

impl DatasetSplits {
    /// Balanced class weights from the decoded training labels
    pub fn class_weights(&self) -> ClassWeights {
        ClassWeights::balanced(&self.train.labels())
    }
}

/// Scan, shuffle and decode both splits
///
/// Both directories must hold the same two classes.
pub fn load_splits(config: &DataConfig) -> Result<DatasetSplits> {
    let mut train = ImageFolder::scan_binary(&config.train_dir)?;
    let mut valid = ImageFolder::scan_binary(&config.valid_dir)?;
    train.ensure_same_classes(&valid)?;

    train.shuffle(config.seed);
    valid.shuffle(config.seed);

    info!(
        "Classes: {} | train: {} images | valid: {} images",
        train.class_names.join(", "),
        train.len(),
        valid.len()
    );

    Ok(DatasetSplits {
        class_names: train.class_names.clone(),
        train: ImageFolderDataset::load(&train, config.image_size)?,
        valid: ImageFolderDataset::load(&valid, config.image_size)?,
    })
}
