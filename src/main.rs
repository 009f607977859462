//! ResNet-101 training CLI

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use resnet101::backend::{default_device, DefaultBackend, TrainingBackend, BACKEND_NAME};
use resnet101::config::{DataConfig, RunConfig};
use resnet101::dataset::{ClassWeights, ImageFolder, ImageFolderDataset};
use resnet101::model::{load_artifact, ModelSummary, ResNetConfig};
use resnet101::training::evaluate;
use resnet101::utils::logging::{init_logging, LogConfig};
use resnet101::utils::{format_duration, format_number};

/// Binary image classification with ResNet-101
#[derive(Parser, Debug)]
#[command(name = "resnet101")]
#[command(version)]
#[command(about = "Train and evaluate a binary ResNet-101 classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model and save it
    Train {
        /// TOML run configuration; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset root containing `train/` and `valid/`
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Model path without extension
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        image_size: Option<usize>,
    },

    /// Evaluate a saved model on the validation split
    Evaluate {
        /// Model path without extension
        #[arg(short, long)]
        model: PathBuf,

        /// Dataset root containing `valid/`
        #[arg(short, long, default_value = "dataset")]
        dataset: PathBuf,

        /// Defaults to the batch size the model was trained with
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Defaults to the image size the model was trained with
        #[arg(long)]
        image_size: Option<usize>,
    },

    /// Print balanced class weights for the training split
    ClassWeights {
        /// Dataset root containing `train/`
        #[arg(short, long, default_value = "dataset")]
        dataset: PathBuf,
    },

    /// Print the ResNet-101 architecture summary
    Summary {
        #[arg(long, default_value = "227")]
        image_size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config)?;

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            dataset,
            epochs,
            batch_size,
            learning_rate,
            output,
            seed,
            image_size,
        } => {
            let mut run_config = match config {
                Some(path) => RunConfig::from_file(&path)?,
                None => RunConfig::default(),
            };
            if let Some(root) = dataset {
                run_config = run_config.with_dataset_root(&root);
            }
            if let Some(epochs) = epochs {
                run_config.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                run_config.data.batch_size = batch_size;
            }
            if let Some(lr) = learning_rate {
                run_config.training.learning_rate = lr;
            }
            if let Some(output) = output {
                run_config.output.model_path = output;
            }
            if let Some(seed) = seed {
                run_config.data.seed = seed;
            }
            if let Some(size) = image_size {
                run_config.data.image_size = size;
            }
            cmd_train(&run_config)?;
        }

        Commands::Evaluate {
            model,
            dataset,
            batch_size,
            image_size,
        } => {
            cmd_evaluate(&model, &dataset, batch_size, image_size)?;
        }

        Commands::ClassWeights { dataset } => {
            cmd_class_weights(&dataset)?;
        }

        Commands::Summary { image_size } => {
            cmd_summary(image_size)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!();
    println!("{}", "ResNet-101 Binary Classifier".green().bold());
    println!("  Backend: {}", BACKEND_NAME);
    println!();
}

fn cmd_train(config: &RunConfig) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Train dir:     {:?}", config.data.train_dir);
    println!("  Valid dir:     {:?}", config.data.valid_dir);
    println!(
        "  Image size:    {}x{}",
        config.data.image_size, config.data.image_size
    );
    println!("  Epochs:        {}", config.training.epochs);
    println!("  Batch size:    {}", config.data.batch_size);
    println!("  Learning rate: {}", config.training.learning_rate);
    println!("  Output:        {:?}", config.output.model_path);
    println!();

    let start = std::time::Instant::now();
    let report = resnet101::training::run::<TrainingBackend>(config, &default_device())
        .context("Training failed")?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  Duration:            {}",
        format_duration(start.elapsed())
    );
    println!("  Parameters:          {}", format_number(report.summary.parameters));
    if let Some((epoch, acc)) = report.history.best_val_accuracy() {
        println!("  Best val accuracy:   {:.4} (epoch {})", acc, epoch);
    }
    println!("  Final val loss:      {:.4}", report.evaluation.loss);
    println!("  Final val accuracy:  {:.4}", report.evaluation.accuracy);
    println!("  Model saved to:      {:?}", report.model_path);
    println!();

    Ok(())
}

fn cmd_evaluate(
    model_path: &Path,
    dataset: &Path,
    batch_size: Option<usize>,
    image_size: Option<usize>,
) -> Result<()> {
    let device = default_device();
    let (model, run_config) = load_artifact::<DefaultBackend>(model_path, &device)
        .with_context(|| format!("Failed to load model {:?}", model_path))?;

    let mut data = run_config.data;
    if let Some(batch_size) = batch_size {
        data.batch_size = batch_size;
    }
    if let Some(size) = image_size {
        data.image_size = size;
    }
    data.validate()?;

    let mut folder = ImageFolder::scan_binary(dataset.join("valid"))?;
    folder.shuffle(data.seed);
    let valid = ImageFolderDataset::load(&folder, data.image_size)?;

    let l2 = run_config.training.l2_regularization;
    let result = evaluate(&model, &valid, data.batch_size, l2, &device)?;
    info!("Evaluated {} images", result.samples);

    println!("{}", "Evaluation:".cyan().bold());
    println!("  Loss:     {:.4}", result.loss);
    println!("  Accuracy: {:.4}", result.accuracy);
    println!("  Samples:  {}", result.samples);

    Ok(())
}

fn cmd_class_weights(dataset: &Path) -> Result<()> {
    let folder = ImageFolder::scan_binary(dataset.join("train"))?;
    let weights = ClassWeights::balanced(&folder.labels());
    let counts = folder.class_counts();

    println!("{}", "Class Weights:".cyan().bold());
    for (label, weight) in weights.iter() {
        let name = folder
            .class_names
            .get(label as usize)
            .map(String::as_str)
            .unwrap_or("?");
        let count = counts.get(&label).copied().unwrap_or(0);
        println!("  {label} {name:<20} {count:>7} images  weight {weight:.4}");
    }

    Ok(())
}

fn cmd_summary(image_size: usize) -> Result<()> {
    DataConfig {
        image_size,
        ..DataConfig::default()
    }
    .validate()?;

    let config = ResNetConfig::resnet101();
    let model = config.init::<DefaultBackend>(&default_device());
    let summary = ModelSummary::new(&model, &config, image_size);

    println!("{}", "Model Summary:".cyan().bold());
    println!("{summary}");

    Ok(())
}
