//! Sample and metric types shared across the session and its collaborators.

use serde::{Deserialize, Serialize};

/// A labeled 2-D sample.
///
/// `is_validation` is a partition tag: it defaults to `false` on raw input
/// and is set by the splitter when a point lands in the validation set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate, nominally in [-1, 1].
    pub x: f64,
    /// Vertical coordinate, nominally in [-1, 1].
    pub y: f64,
    /// Class label.
    pub label: u32,
    /// Whether the splitter assigned this point to the validation partition.
    #[serde(default)]
    pub is_validation: bool,
}

impl Point {
    /// Creates an untagged sample.
    #[must_use]
    pub fn new(x: f64, y: f64, label: u32) -> Self {
        Self {
            x,
            y,
            label,
            is_validation: false,
        }
    }
}

/// The built-in dataset families served by a dataset repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Two concentric rings.
    Circle,
    /// Four quadrants with alternating labels.
    Xor,
    /// Two Gaussian blobs.
    Gauss,
    /// Interleaved spirals.
    Spiral,
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Circle => write!(f, "circle"),
            Self::Xor => write!(f, "xor"),
            Self::Gauss => write!(f, "gauss"),
            Self::Spiral => write!(f, "spiral"),
        }
    }
}

/// Metrics reported by the model collaborator for one trained epoch.
///
/// Only `loss` is guaranteed; accuracy and validation metrics are present
/// when the model computes them (e.g. when a validation partition exists).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Training loss over the epoch.
    pub loss: f64,
    /// Training accuracy, if the model tracks it.
    pub accuracy: Option<f64>,
    /// Validation loss, if a validation partition was evaluated.
    pub val_loss: Option<f64>,
    /// Validation accuracy, if a validation partition was evaluated.
    pub val_accuracy: Option<f64>,
}

impl EpochMetrics {
    /// Creates metrics carrying only a training loss.
    #[must_use]
    pub fn from_loss(loss: f64) -> Self {
        Self {
            loss,
            accuracy: None,
            val_loss: None,
            val_accuracy: None,
        }
    }
}
