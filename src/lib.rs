//! # ResNet-101 binary image classifier
//!
//! Trains a bottleneck ResNet-101 on a two-class image dataset laid out as
//! `dataset/train/<class>/*` and `dataset/valid/<class>/*`, using the Burn
//! framework.
//!
//! ## Modules
//!
//! - `dataset`: folder scanning, decoding, augmentation and class weights
//! - `model`: residual blocks, the network and artifact persistence
//! - `training`: weighted loss, the fit loop, evaluation and the full run
//! - `config`: TOML-backed run configuration
//! - `utils`: errors, logging and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resnet101::backend::{default_device, TrainingBackend};
//! use resnet101::config::RunConfig;
//!
//! let report = resnet101::training::run::<TrainingBackend>(
//!     &RunConfig::default(),
//!     &default_device(),
//! )?;
//! println!("validation accuracy: {:.4}", report.evaluation.accuracy);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

pub use config::RunConfig;
pub use dataset::{ClassWeights, ImageFolder, ImageFolderDataset};
pub use model::{ModelSummary, ResNet, ResNetConfig};
pub use training::{EvaluationResult, RunReport, Trainer, TrainingHistory};
pub use utils::error::{ResNetError, Result};

/// Side length images are resized to
pub const IMAGE_SIZE: usize = 227;

/// Smallest side length the stem and the four stages can downsample
pub const MIN_IMAGE_SIZE: usize = 32;

/// Images per training batch
pub const BATCH_SIZE: usize = 24;

/// Seed for shuffling and augmentation
pub const DATASET_SEED: u64 = 123;
