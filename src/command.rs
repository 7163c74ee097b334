//! Validate-then-execute command layer.
//!
//! Mutating operations reach the session through commands that validate
//! their inputs and the session state before anything runs. The executor
//! wraps the whole flow in a uniform [`CommandOutcome`] envelope, so UI
//! callers never need error handling of their own and never confuse an
//! expected validation rejection with an unexpected execution failure.

use std::collections::BTreeMap;
use std::future::Future;

use crate::config::{Hyperparameters, TrainingConfig};
use crate::error::{TrainError, TrainResult};
use crate::session::TrainingSession;
use crate::{DatasetRepository, ModelService, Ticker, Visualizer};

/// Immutable result of validating a command's inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    valid: bool,
    message: Option<String>,
    errors: BTreeMap<String, String>,
}

impl ValidationResult {
    /// A passing validation.
    #[must_use]
    pub fn success() -> Self {
        Self {
            valid: true,
            message: None,
            errors: BTreeMap::new(),
        }
    }

    /// A failing validation with a single message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
            errors: BTreeMap::new(),
        }
    }

    /// A failing validation from a field-to-message map; the combined
    /// message is the individual messages joined by `", "`.
    #[must_use]
    pub fn from_errors(errors: BTreeMap<String, String>) -> Self {
        let message = errors.values().cloned().collect::<Vec<_>>().join(", ");
        Self {
            valid: false,
            message: Some(message),
            errors,
        }
    }

    /// Whether validation passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The combined failure message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The per-field failure messages.
    #[must_use]
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }
}

/// A mutating operation with a validate-then-execute contract.
pub trait Command {
    /// What a successful execution produces.
    type Output;

    /// Checks inputs and session state without side effects.
    fn validate(&self) -> ValidationResult;

    /// Runs the operation. Only called after `validate` passed.
    fn execute(self) -> impl Future<Output = TrainResult<Self::Output>> + Send;
}

/// Uniform result envelope for command execution.
#[derive(Debug)]
pub enum CommandOutcome<O> {
    /// Validation failed; the command never executed.
    Invalid(ValidationResult),
    /// The command executed successfully.
    Completed(O),
    /// The command executed and failed.
    Failed(TrainError),
}

impl<O> CommandOutcome<O> {
    /// Whether the command executed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The validation result, when validation rejected the command.
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationResult> {
        match self {
            Self::Invalid(result) => Some(result),
            _ => None,
        }
    }

    /// The execution error, when execution failed.
    #[must_use]
    pub fn error(&self) -> Option<&TrainError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Runs commands through the validate-then-execute contract.
pub struct CommandExecutor;

impl CommandExecutor {
    /// Validates `command` and, on success, executes it. Execution errors
    /// are captured in the envelope rather than propagated.
    pub async fn execute<C: Command>(command: C) -> CommandOutcome<C::Output> {
        let validation = command.validate();
        if !validation.is_valid() {
            return CommandOutcome::Invalid(validation);
        }
        match command.execute().await {
            Ok(output) => CommandOutcome::Completed(output),
            Err(error) => CommandOutcome::Failed(error),
        }
    }
}

/// Initializes the model collaborator with validated hyperparameters.
pub struct InitializeNetworkCommand<'a, M, V, R, T> {
    session: &'a TrainingSession<M, V, R, T>,
    hyperparameters: Hyperparameters,
}

impl<'a, M, V, R, T> InitializeNetworkCommand<'a, M, V, R, T> {
    /// Creates the command.
    pub fn new(
        session: &'a TrainingSession<M, V, R, T>,
        hyperparameters: Hyperparameters,
    ) -> Self {
        Self {
            session,
            hyperparameters,
        }
    }
}

impl<M, V, R, T> Command for InitializeNetworkCommand<'_, M, V, R, T>
where
    M: ModelService,
    V: Visualizer,
    R: DatasetRepository,
    T: Ticker,
{
    type Output = ();

    fn validate(&self) -> ValidationResult {
        let hp = &self.hyperparameters;
        let mut errors = BTreeMap::new();

        if hp.learning_rate <= 0.0 {
            errors.insert(
                "learning_rate".to_string(),
                "learning rate must be greater than 0".to_string(),
            );
        } else if hp.learning_rate > 1.0 {
            errors.insert(
                "learning_rate".to_string(),
                "learning rate must be at most 1.0; rates above 1 diverge, try 0.03".to_string(),
            );
        }
        if hp.hidden_layers.is_empty() {
            errors.insert(
                "hidden_layers".to_string(),
                "at least one hidden layer is required".to_string(),
            );
        } else if hp.hidden_layers.contains(&0) {
            errors.insert(
                "hidden_layers".to_string(),
                "every hidden layer needs a positive number of units".to_string(),
            );
        }
        if hp.optimizer.momentum_applies() && !(0.0..1.0).contains(&hp.momentum) {
            errors.insert(
                "momentum".to_string(),
                "momentum must be in [0, 1)".to_string(),
            );
        }
        if hp.l1_strength < 0.0 {
            errors.insert(
                "l1_strength".to_string(),
                "l1 regularization strength must be non-negative".to_string(),
            );
        }
        if hp.l2_strength < 0.0 {
            errors.insert(
                "l2_strength".to_string(),
                "l2 regularization strength must be non-negative".to_string(),
            );
        }
        if !(0.0..1.0).contains(&hp.dropout_rate) {
            errors.insert(
                "dropout_rate".to_string(),
                "dropout rate must be in [0, 1)".to_string(),
            );
        }
        if hp.clip_norm < 0.0 {
            errors.insert(
                "clip_norm".to_string(),
                "gradient clip norm must be non-negative".to_string(),
            );
        }
        if hp.num_classes < 2 {
            errors.insert(
                "num_classes".to_string(),
                "at least two output classes are required".to_string(),
            );
        }
        if let Some(activations) = &hp.activations {
            if activations.len() != hp.hidden_layers.len() {
                errors.insert(
                    "activations".to_string(),
                    "per-layer activations must match the hidden layer count".to_string(),
                );
            }
        }

        if errors.is_empty() {
            ValidationResult::success()
        } else {
            ValidationResult::from_errors(errors)
        }
    }

    async fn execute(self) -> TrainResult<()> {
        self.session.set_hyperparameters(self.hyperparameters).await
    }
}

/// Applies new runtime knobs after range-checking them.
pub struct UpdateTrainingConfigCommand<'a, M, V, R, T> {
    session: &'a TrainingSession<M, V, R, T>,
    config: TrainingConfig,
}

impl<'a, M, V, R, T> UpdateTrainingConfigCommand<'a, M, V, R, T> {
    /// Creates the command.
    pub fn new(session: &'a TrainingSession<M, V, R, T>, config: TrainingConfig) -> Self {
        Self { session, config }
    }
}

impl<M, V, R, T> Command for UpdateTrainingConfigCommand<'_, M, V, R, T>
where
    M: ModelService,
    V: Visualizer,
    R: DatasetRepository,
    T: Ticker,
{
    type Output = ();

    fn validate(&self) -> ValidationResult {
        let config = &self.config;
        let mut errors = BTreeMap::new();

        if config.batch_size == 0 {
            errors.insert(
                "batch_size".to_string(),
                "batch size must be positive".to_string(),
            );
        }
        if config.max_epochs == 0 {
            errors.insert(
                "max_epochs".to_string(),
                "max epochs must be positive".to_string(),
            );
        }
        if !(1..=120).contains(&config.target_fps) {
            errors.insert(
                "target_fps".to_string(),
                "target fps must be between 1 and 120".to_string(),
            );
        }
        if !(0.0..1.0).contains(&config.validation_split) {
            errors.insert(
                "validation_split".to_string(),
                "validation split must be in [0, 1)".to_string(),
            );
        }
        if let Some(min_lr) = config.lr_schedule.min_lr {
            if min_lr <= 0.0 {
                errors.insert(
                    "min_lr".to_string(),
                    "minimum learning rate must be positive".to_string(),
                );
            }
        }
        if let Some(cycle_length) = config.lr_schedule.cycle_length {
            if cycle_length == 0 {
                errors.insert(
                    "cycle_length".to_string(),
                    "cycle length must be positive".to_string(),
                );
            }
        }

        if errors.is_empty() {
            ValidationResult::success()
        } else {
            ValidationResult::from_errors(errors)
        }
    }

    async fn execute(self) -> TrainResult<()> {
        self.session.update_config(self.config);
        Ok(())
    }
}

/// Starts the guard-rail loop after checking the session is ready.
pub struct StartTrainingCommand<'a, M, V, R, T> {
    session: &'a TrainingSession<M, V, R, T>,
}

impl<'a, M, V, R, T> StartTrainingCommand<'a, M, V, R, T> {
    /// Creates the command.
    pub fn new(session: &'a TrainingSession<M, V, R, T>) -> Self {
        Self { session }
    }
}

impl<M, V, R, T> Command for StartTrainingCommand<'_, M, V, R, T>
where
    M: ModelService,
    V: Visualizer,
    R: DatasetRepository,
    T: Ticker,
{
    type Output = ();

    fn validate(&self) -> ValidationResult {
        let state = self.session.state();
        if !state.is_initialized {
            return ValidationResult::error(
                "session is not initialized; set hyperparameters first",
            );
        }
        if !state.dataset_loaded {
            return ValidationResult::error("no dataset loaded");
        }
        if self.session.training_partition_len() == 0 {
            return ValidationResult::error(
                "validation split leaves no training samples",
            );
        }
        if state.is_running && !state.is_paused {
            return ValidationResult::error("training is already running");
        }
        ValidationResult::success()
    }

    async fn execute(self) -> TrainResult<()> {
        self.session.start()
    }
}

/// Executes a single epoch after checking the session is idle.
pub struct StepTrainingCommand<'a, M, V, R, T> {
    session: &'a TrainingSession<M, V, R, T>,
}

impl<'a, M, V, R, T> StepTrainingCommand<'a, M, V, R, T> {
    /// Creates the command.
    pub fn new(session: &'a TrainingSession<M, V, R, T>) -> Self {
        Self { session }
    }
}

impl<M, V, R, T> Command for StepTrainingCommand<'_, M, V, R, T>
where
    M: ModelService,
    V: Visualizer,
    R: DatasetRepository,
    T: Ticker,
{
    /// `true` when an epoch actually ran, `false` for a silent no-op.
    type Output = bool;

    fn validate(&self) -> ValidationResult {
        let state = self.session.state();
        if !state.is_initialized {
            return ValidationResult::error(
                "session is not initialized; set hyperparameters first",
            );
        }
        if !state.dataset_loaded {
            return ValidationResult::error("no dataset loaded");
        }
        if state.is_running {
            return ValidationResult::error("cannot step while training is running");
        }
        ValidationResult::success()
    }

    async fn execute(self) -> TrainResult<bool> {
        self.session.step().await
    }
}
