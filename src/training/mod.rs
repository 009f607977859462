//! Training, evaluation and the end-to-end run

pub mod evaluator;
pub mod history;
pub mod loss;
pub mod pipeline;
pub mod trainer;

pub use evaluator::{evaluate, EvaluationResult};
pub use history::{EpochMetrics, TrainingHistory};
pub use pipeline::{run, RunReport};
pub use trainer::Trainer;
