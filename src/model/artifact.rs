//! Saving and loading trained models
//!
//! An artifact is a burn record (`<path>.mpk`) next to the run configuration
//! (`<path>.config.json`) it was trained with. The model section rebuilds the
//! network; the data and training sections let evaluation reuse the image
//! size and L2 factor of the run.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use tracing::info;

use crate::config::RunConfig;
use crate::model::resnet::ResNet;
use crate::utils::error::{ResNetError, Result};

/// Path of the burn record for a model path
pub fn record_path(path: &Path) -> PathBuf {
    path.with_extension("mpk")
}

/// Path of the configuration file for a model path
pub fn config_path(path: &Path) -> PathBuf {
    path.with_extension("config.json")
}

/// Path of the training history file for a model path
pub fn history_path(path: &Path) -> PathBuf {
    path.with_extension("history.json")
}

/// Write the model record and the run configuration, creating parent
/// directories
///
/// Returns the path of the written record.
pub fn save_artifact<B: Backend>(
    model: &ResNet<B>,
    config: &RunConfig,
    path: &Path,
) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    model
        .clone()
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .map_err(|e| ResNetError::Model(format!("Failed to save model to {:?}: {e:?}", path)))?;

    fs::write(config_path(path), serde_json::to_string_pretty(config)?)?;

    let record = record_path(path);
    info!("Saved model to {:?}", record);
    Ok(record)
}

/// Rebuild a model from a path written by [`save_artifact`]
pub fn load_artifact<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(ResNet<B>, RunConfig)> {
    let config_file = config_path(path);
    if !config_file.exists() {
        return Err(ResNetError::PathNotFound(config_file));
    }
    let record = record_path(path);
    if !record.exists() {
        return Err(ResNetError::PathNotFound(record));
    }

    let config: RunConfig = serde_json::from_str(&fs::read_to_string(&config_file)?)?;
    let model = config
        .model
        .init::<B>(device)
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .map_err(|e| ResNetError::Model(format!("Failed to load model from {:?}: {e:?}", record)))?;

    info!("Loaded model from {:?}", record);
    Ok((model, config))
}
