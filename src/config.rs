//! Run configuration
//!
//! A full training run is described by [`RunConfig`]. Every section has
//! defaults that reproduce the reference training setup, so an empty TOML
//! file is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::model::resnet::ResNetConfig;
use crate::utils::error::{ResNetError, Result, ResultExt};
use crate::{BATCH_SIZE, DATASET_SEED, IMAGE_SIZE, MIN_IMAGE_SIZE};

/// Complete configuration of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data: DataConfig,
    pub augmentation: AugmentationConfig,
    #[serde(with = "model_table")]
    pub model: ResNetConfig,
    pub training: TrainingConfig,
    pub output: OutputConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            augmentation: AugmentationConfig::default(),
            model: ResNetConfig::resnet101(),
            training: TrainingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load a configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.training.validate()?;
        self.augmentation.validate().in_config("augmentation")?;
        self.model.validate().in_config("model")?;
        Ok(())
    }

    /// Point both splits at `<root>/train` and `<root>/valid`
    pub fn with_dataset_root(mut self, root: &Path) -> Self {
        self.data.train_dir = root.join("train");
        self.data.valid_dir = root.join("valid");
        self
    }
}

/// Dataset location and input pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub train_dir: PathBuf,
    pub valid_dir: PathBuf,
    /// Images are resized to `image_size x image_size`
    pub image_size: usize,
    pub batch_size: usize,
    /// Seed for sample shuffling and augmentation
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("dataset/train"),
            valid_dir: PathBuf::from("dataset/valid"),
            image_size: IMAGE_SIZE,
            batch_size: BATCH_SIZE,
            seed: DATASET_SEED,
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_size < MIN_IMAGE_SIZE {
            return Err(ResNetError::Config(format!(
                "image_size must be at least {MIN_IMAGE_SIZE}, got {}",
                self.image_size
            )));
        }
        if self.batch_size == 0 {
            return Err(ResNetError::Config("batch_size must be positive".into()));
        }
        Ok(())
    }
}

/// Optimizer and fit loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Validate every N epochs
    pub validation_freq: usize,
    /// L2 factor applied to main-path convolution kernels
    pub l2_regularization: f64,
    pub adam_epsilon: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.001,
            validation_freq: 1,
            l2_regularization: 1e-4,
            adam_epsilon: 1e-7,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(ResNetError::Config("epochs must be positive".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ResNetError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.validation_freq == 0 {
            return Err(ResNetError::Config("validation_freq must be positive".into()));
        }
        if self.l2_regularization < 0.0 {
            return Err(ResNetError::Config(format!(
                "l2_regularization must be non-negative, got {}",
                self.l2_regularization
            )));
        }
        Ok(())
    }

    /// Whether validation runs after the zero-based `epoch`
    pub fn validates_after(&self, epoch: usize) -> bool {
        (epoch + 1) % self.validation_freq.max(1) == 0
    }
}

/// Where artifacts are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Model path without extension; the record gets `.mpk`, the
    /// configuration `.config.json` and the history `.history.json`
    pub model_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("cnn/resnet101/resnet101"),
        }
    }
}

/// `[model]` table in which every key is optional
///
/// `ResNetConfig` requires all fields when deserialized, so the table goes
/// through this mirror and missing keys keep the ResNet-101 preset.
mod model_table {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::model::resnet::ResNetConfig;

    #[derive(Serialize, Deserialize)]
    #[serde(default)]
    struct ModelTable {
        in_channels: usize,
        stem_filters: usize,
        stage_depths: [usize; 4],
        stage_filters: [usize; 4],
        stage_strides: [usize; 4],
    }

    impl Default for ModelTable {
        fn default() -> Self {
            Self::from(&ResNetConfig::resnet101())
        }
    }

    impl From<&ResNetConfig> for ModelTable {
        fn from(config: &ResNetConfig) -> Self {
            Self {
                in_channels: config.in_channels,
                stem_filters: config.stem_filters,
                stage_depths: config.stage_depths,
                stage_filters: config.stage_filters,
                stage_strides: config.stage_strides,
            }
        }
    }

    impl From<ModelTable> for ResNetConfig {
        fn from(table: ModelTable) -> Self {
            ResNetConfig::new()
                .with_in_channels(table.in_channels)
                .with_stem_filters(table.stem_filters)
                .with_stage_depths(table.stage_depths)
                .with_stage_filters(table.stage_filters)
                .with_stage_strides(table.stage_strides)
        }
    }

    pub fn serialize<S: Serializer>(config: &ResNetConfig, serializer: S) -> Result<S::Ok, S::Error> {
        ModelTable::from(config).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ResNetConfig, D::Error> {
        ModelTable::deserialize(deserializer).map(ResNetConfig::from)
    }
}

/// Read and deserialize a TOML file
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Err(ResNetError::PathNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).in_config(&format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).in_config(&format!("Failed to parse {}", path.display()))
}
