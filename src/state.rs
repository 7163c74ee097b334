//! Session status, training history, and the immutable state snapshot.
//!
//! The session hands out [`TrainingSnapshot`] values to listeners and
//! callers; a snapshot is a self-contained copy and never aliases live
//! session state. The history is append-only: records are pushed one per
//! epoch with strictly increasing epoch numbers and only ever cleared
//! wholesale on reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a training run came to a halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured epoch limit was reached.
    EpochLimit,
    /// The early-stopping monitor signalled stagnation.
    EarlyStopping,
    /// An unrecovered error occurred inside a step.
    Error,
}

/// The externally visible state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No hyperparameters set yet.
    Uninitialized,
    /// Model initialized, no dataset loaded.
    Initialized,
    /// Model initialized and dataset loaded; ready to train.
    DataLoaded,
    /// The guard-rail loop is scheduling epochs.
    Running,
    /// Running, but no further epochs are scheduled until resumed.
    Paused,
    /// A run ended; `reset()` returns the session to `DataLoaded`.
    Stopped(StopReason),
}

impl SessionStatus {
    /// Whether a training run is in progress (running or paused).
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Whether the run is paused. Only meaningful while running.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }
}

/// One epoch's outcome, appended to the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRecord {
    /// 1-based epoch number.
    pub epoch: u32,
    /// Training loss.
    pub loss: f64,
    /// Training accuracy, when the model reports it.
    pub accuracy: Option<f64>,
    /// Learning rate that was in effect for this epoch.
    pub learning_rate: f64,
    /// Validation loss, when a validation partition exists.
    pub val_loss: Option<f64>,
    /// Validation accuracy, when a validation partition exists.
    pub val_accuracy: Option<f64>,
    /// When the epoch completed.
    pub timestamp: DateTime<Utc>,
}

/// Append-only sequence of per-epoch records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    records: Vec<TrainingRecord>,
}

impl TrainingHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    ///
    /// Records must arrive with epoch numbers increasing by exactly one;
    /// the session guarantees this by construction.
    pub fn push(&mut self, record: TrainingRecord) {
        debug_assert_eq!(
            record.epoch,
            self.records.last().map_or(0, |r| r.epoch) + 1,
            "history epochs must increase by 1"
        );
        self.records.push(record);
    }

    /// The recorded epochs, oldest first.
    #[must_use]
    pub fn records(&self) -> &[TrainingRecord] {
        &self.records
    }

    /// Number of recorded epochs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no epochs have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recent record.
    #[must_use]
    pub fn last(&self) -> Option<&TrainingRecord> {
        self.records.last()
    }

    /// The lowest training loss observed, with its epoch.
    #[must_use]
    pub fn best_loss(&self) -> Option<(u32, f64)> {
        self.records
            .iter()
            .min_by(|a, b| a.loss.total_cmp(&b.loss))
            .map(|r| (r.epoch, r.loss))
    }

    /// Drops all records. Only the session calls this, on reset.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Serializes the history to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}

/// Immutable snapshot of session state, delivered to listeners.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSnapshot {
    /// Derived state-machine status.
    pub status: SessionStatus,
    /// Epochs completed since the last reset.
    pub current_epoch: u32,
    /// Most recent training loss.
    pub current_loss: Option<f64>,
    /// Most recent training accuracy.
    pub current_accuracy: Option<f64>,
    /// Most recent validation loss.
    pub current_val_loss: Option<f64>,
    /// Most recent validation accuracy.
    pub current_val_accuracy: Option<f64>,
    /// Whether a run is in progress (running or paused).
    pub is_running: bool,
    /// Whether the run is paused.
    pub is_paused: bool,
    /// Whether hyperparameters have been applied to the model.
    pub is_initialized: bool,
    /// Whether a dataset has been loaded.
    pub dataset_loaded: bool,
    /// Configured epoch limit.
    pub max_epochs: u32,
    /// Configured mini-batch size.
    pub batch_size: usize,
    /// Configured tick rate.
    pub target_fps: u32,
    /// Configured validation fraction.
    pub validation_split: f64,
    /// Copy of the per-epoch history.
    pub history: TrainingHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: u32, loss: f64) -> TrainingRecord {
        TrainingRecord {
            epoch,
            loss,
            accuracy: None,
            learning_rate: 0.03,
            val_loss: None,
            val_accuracy: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn history_tracks_best_loss() {
        let mut history = TrainingHistory::new();
        history.push(record(1, 0.9));
        history.push(record(2, 0.4));
        history.push(record(3, 0.6));

        assert_eq!(history.len(), 3);
        assert_eq!(history.best_loss(), Some((2, 0.4)));
        assert_eq!(history.last().unwrap().epoch, 3);
    }

    #[test]
    fn history_clear_empties_records() {
        let mut history = TrainingHistory::new();
        history.push(record(1, 1.0));
        history.clear();
        assert!(history.is_empty());
        // Numbering restarts after a clear.
        history.push(record(1, 0.8));
        assert_eq!(history.records()[0].epoch, 1);
    }

    #[test]
    fn status_flags() {
        assert!(SessionStatus::Running.is_running());
        assert!(SessionStatus::Paused.is_running());
        assert!(SessionStatus::Paused.is_paused());
        assert!(!SessionStatus::DataLoaded.is_running());
        assert!(!SessionStatus::Stopped(StopReason::EpochLimit).is_running());
    }

    #[test]
    fn history_serializes_to_json() {
        let mut history = TrainingHistory::new();
        history.push(record(1, 0.5));
        let json = history.to_json().unwrap();
        assert!(json.contains("\"epoch\": 1"));
    }
}
