//! End-to-end training run
//!
//! load splits -> class weights -> build model -> fit -> evaluate -> save

use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use serde::Serialize;
use tracing::info;

use crate::config::RunConfig;
use crate::dataset::{load_splits, ClassWeights};
use crate::model::artifact::{history_path, save_artifact};
use crate::model::resnet::ModelSummary;
use crate::training::evaluator::{evaluate, EvaluationResult};
use crate::training::history::TrainingHistory;
use crate::training::trainer::Trainer;
use crate::utils::error::Result;

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub class_names: Vec<String>,
    pub class_weights: ClassWeights,
    pub summary: ModelSummary,
    pub history: TrainingHistory,
    pub evaluation: EvaluationResult,
    /// Path of the written model record
    pub model_path: PathBuf,
}

/// Train, evaluate and save a model as described by `config`
pub fn run<B: AutodiffBackend>(config: &RunConfig, device: &B::Device) -> Result<RunReport> {
    config.validate()?;

    let splits = load_splits(&config.data)?;

    let class_weights = splits.class_weights();
    for (label, weight) in class_weights.iter() {
        let name = splits
            .class_names
            .get(label as usize)
            .map(String::as_str)
            .unwrap_or("?");
        info!("Class weight {label} ({name}): {weight:.4}");
    }

    let model = config.model.init::<B>(device);
    let summary = ModelSummary::new(&model, &config.model, config.data.image_size);
    info!("{summary}");

    let trainer = Trainer::new(
        config.training.clone(),
        config.augmentation.clone(),
        config.data.batch_size,
        config.data.seed,
    );
    let (model, history) = trainer.fit(model, &splits.train, &splits.valid, &class_weights, device)?;

    let evaluation = evaluate(
        &model.valid(),
        &splits.valid,
        config.data.batch_size,
        config.training.l2_regularization,
        device,
    )?;
    info!(
        "Validation: loss {:.4} | accuracy {:.4} over {} images",
        evaluation.loss, evaluation.accuracy, evaluation.samples
    );

    let model_path = save_artifact(&model, config, &config.output.model_path)?;
    history.save(&history_path(&config.output.model_path))?;

    Ok(RunReport {
        class_names: splits.class_names,
        class_weights,
        summary,
        history,
        evaluation,
        model_path,
    })
}
