//! Per-epoch training history

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Metrics recorded at the end of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// One-based epoch number
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    /// Present only for epochs where validation ran
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// History of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub epochs: Vec<EpochMetrics>,
}

impl Default for TrainingHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            epochs: Vec::new(),
        }
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Highest validation accuracy and the epoch it was reached in
    pub fn best_val_accuracy(&self) -> Option<(usize, f64)> {
        self.epochs
            .iter()
            .filter_map(|m| m.val_accuracy.map(|acc| (m.epoch, acc)))
            .fold(None, |best, (epoch, acc)| match best {
                Some((_, best_acc)) if best_acc >= acc => best,
                _ => Some((epoch, acc)),
            })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
