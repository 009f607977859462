//! Inverse-frequency class weights for imbalanced training data

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils::error::{ResNetError, Result};

/// Per-label loss multipliers
///
/// `weight(c) = total / (num_classes * count(c))`, so `weight(c) * count(c)`
/// is the same for every observed class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    weights: BTreeMap<u32, f64>,
}

impl ClassWeights {
    /// Balanced weights over the labels observed in `labels`
    ///
    /// An empty slice yields an empty map.
    pub fn balanced(labels: &[u32]) -> Self {
        let counts = class_counts(labels);
        let total = labels.len() as f64;
        let num_classes = counts.len() as f64;

        let weights = counts
            .into_iter()
            .map(|(label, count)| (label, total / (num_classes * count as f64)))
            .collect();

        Self { weights }
    }

    pub fn get(&self, label: u32) -> Option<f64> {
        self.weights.get(&label).copied()
    }

    /// Weight for `label`, failing for a label never seen in training
    pub fn weight_for(&self, label: u32) -> Result<f64> {
        self.get(label).ok_or_else(|| {
            ResNetError::Training(format!("no class weight for label {label}"))
        })
    }

    /// Per-sample weights for a batch of labels
    pub fn sample_weights(&self, labels: &[u32]) -> Result<Vec<f32>> {
        labels
            .iter()
            .map(|&label| self.weight_for(label).map(|w| w as f32))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.weights.iter().map(|(&label, &weight)| (label, weight))
    }
}

/// Number of occurrences of each label
pub fn class_counts(labels: &[u32]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}
