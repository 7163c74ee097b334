//! Error types for the training session and its collaborators.
//!
//! The taxonomy mirrors how failures surface to callers:
//!
//! - **Validation failures** are not errors at all: the command layer
//!   returns them as [`crate::command::ValidationResult`] values before any
//!   execution happens.
//! - **Precondition failures** are synchronous guards on session operations
//!   invoked outside the command layer (for example `start()` without
//!   hyperparameters).
//! - **Execution failures** are raised by collaborators mid-operation and
//!   are either returned to the direct caller (manual step, command
//!   execution) or logged and reflected in the next state notification
//!   (guard-rail loop).

use thiserror::Error;

use crate::data::DatasetKind;

/// The main error type for session orchestration.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A synchronous guard on `start()`/`step()` rejected the call.
    #[error("precondition failed: {reason}")]
    Precondition {
        /// Why the operation cannot run in the current state.
        reason: String,
    },

    /// The model collaborator rejected the hyperparameter configuration.
    #[error("model initialization failed: {reason}")]
    InitializationFailed {
        /// Description reported by the model collaborator.
        reason: String,
    },

    /// The dataset repository could not produce the requested dataset.
    #[error("dataset {kind} unavailable: {reason}")]
    DatasetUnavailable {
        /// The dataset that was requested.
        kind: DatasetKind,
        /// Description reported by the repository.
        reason: String,
    },

    /// A training or prediction call failed inside an epoch.
    #[error("training step failed at epoch {epoch}: {reason}")]
    StepFailed {
        /// The epoch that was being executed.
        epoch: u32,
        /// Description reported by the model collaborator.
        reason: String,
    },

    /// The model reported a non-finite or diverging loss.
    #[error("numerical instability at epoch {epoch}: loss {loss}")]
    NumericalInstability {
        /// The epoch at which divergence was observed.
        epoch: u32,
        /// The offending loss value.
        loss: f64,
    },

    /// Configuration could not be loaded, parsed, or serialized.
    #[error("configuration error: {detail}")]
    Config {
        /// Description of the configuration problem.
        detail: String,
    },
}

impl TrainError {
    /// Shorthand for a precondition failure.
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type TrainResult<T> = Result<T, TrainError>;
