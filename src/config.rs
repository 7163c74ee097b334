//! Configuration types for the training session.
//!
//! Two surfaces are exposed to callers:
//!
//! - [`Hyperparameters`] describe the network and optimizer and are
//!   immutable for the lifetime of one initialized session; changing them
//!   requires re-initialization through the session.
//! - [`TrainingConfig`] holds the runtime knobs (batch size, epoch limit,
//!   tick rate, learning-rate schedule, early-stopping patience, validation
//!   split) and may be adjusted mid-session without re-initializing the
//!   model.
//!
//! Both serialize with serde and round-trip through TOML files, and
//! [`TrainingConfig::builder`] provides a builder for programmatic setup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};

/// Activation functions the model collaborator may be asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified linear unit.
    Relu,
    /// Hyperbolic tangent.
    Tanh,
    /// Logistic sigmoid.
    Sigmoid,
    /// Identity.
    Linear,
}

/// Optimizer families the model collaborator may be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Plain stochastic gradient descent.
    Sgd,
    /// SGD with momentum.
    Momentum,
    /// RMSProp.
    RmsProp,
    /// Adam.
    Adam,
}

impl OptimizerKind {
    /// Whether the momentum hyperparameter applies to this optimizer.
    #[must_use]
    pub fn momentum_applies(&self) -> bool {
        matches!(self, Self::Sgd | Self::Momentum)
    }
}

/// Architecture and optimizer description handed to the model collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Units per hidden layer.
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,
    /// Default activation applied to every hidden layer.
    #[serde(default = "default_activation")]
    pub activation: Activation,
    /// Optional per-layer activation overrides; when present the length
    /// must equal the hidden layer count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activations: Option<Vec<Activation>>,
    /// Optimizer family.
    #[serde(default = "default_optimizer")]
    pub optimizer: OptimizerKind,
    /// Initial learning rate, in (0, 1].
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Momentum coefficient, in [0, 1); only meaningful for momentum-style
    /// optimizers.
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    /// L1 regularization strength, >= 0.
    #[serde(default)]
    pub l1_strength: f64,
    /// L2 regularization strength, >= 0.
    #[serde(default)]
    pub l2_strength: f64,
    /// Number of output classes, >= 2.
    #[serde(default = "default_num_classes")]
    pub num_classes: u32,
    /// Dropout rate, in [0, 1).
    #[serde(default)]
    pub dropout_rate: f64,
    /// Gradient clip norm, >= 0; zero disables clipping.
    #[serde(default)]
    pub clip_norm: f64,
    /// Whether batch normalization is enabled.
    #[serde(default)]
    pub batch_norm: bool,
}

fn default_hidden_layers() -> Vec<usize> {
    vec![4, 4]
}
fn default_activation() -> Activation {
    Activation::Relu
}
fn default_optimizer() -> OptimizerKind {
    OptimizerKind::Adam
}
fn default_learning_rate() -> f64 {
    0.03
}
fn default_momentum() -> f64 {
    0.9
}
fn default_num_classes() -> u32 {
    2
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            hidden_layers: default_hidden_layers(),
            activation: default_activation(),
            activations: None,
            optimizer: default_optimizer(),
            learning_rate: default_learning_rate(),
            momentum: default_momentum(),
            l1_strength: 0.0,
            l2_strength: 0.0,
            num_classes: default_num_classes(),
            dropout_rate: 0.0,
            clip_norm: 0.0,
            batch_norm: false,
        }
    }
}

impl Hyperparameters {
    /// Loads hyperparameters from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Config`] if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TrainResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| TrainError::Config {
            detail: format!("failed to read hyperparameter file: {e}"),
        })?;
        toml::from_str(&content).map_err(|e| TrainError::Config {
            detail: format!("failed to parse hyperparameters: {e}"),
        })
    }

    /// Saves hyperparameters to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Config`] if serialization or writing fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> TrainResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TrainError::Config {
            detail: format!("failed to serialize hyperparameters: {e}"),
        })?;
        std::fs::write(path.as_ref(), content).map_err(|e| TrainError::Config {
            detail: format!("failed to write hyperparameter file: {e}"),
        })
    }
}

/// Learning-rate schedule families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrScheduleKind {
    /// Constant learning rate.
    None,
    /// `initial * decay_rate^epoch`.
    Exponential,
    /// `initial * decay_rate^floor(epoch / decay_steps)`.
    Step,
    /// Half-cosine decay from `initial` towards zero over the epoch horizon.
    Cosine,
    /// Triangular oscillation between `min_lr` and `initial`.
    CyclicTriangular,
    /// Cosine-shaped oscillation between `min_lr` and `initial`.
    CyclicCosine,
}

/// Learning-rate schedule configuration.
///
/// Optional parameters fall back to per-policy defaults documented on
/// [`crate::scheduler::LearningRateScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrScheduleConfig {
    /// The schedule family.
    #[serde(default = "default_schedule_kind")]
    pub kind: LrScheduleKind,
    /// Decay factor for exponential and step schedules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_rate: Option<f64>,
    /// Epochs per decay step for the step schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_steps: Option<u32>,
    /// Epochs of linear warmup before the policy takes over.
    #[serde(default)]
    pub warmup_epochs: u32,
    /// Cycle length in epochs for the cyclic schedules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_length: Option<u32>,
    /// Floor learning rate for the cyclic schedules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_lr: Option<f64>,
}

fn default_schedule_kind() -> LrScheduleKind {
    LrScheduleKind::None
}

impl Default for LrScheduleConfig {
    fn default() -> Self {
        Self {
            kind: default_schedule_kind(),
            decay_rate: None,
            decay_steps: None,
            warmup_epochs: 0,
            cycle_length: None,
            min_lr: None,
        }
    }
}

impl LrScheduleConfig {
    /// Creates a schedule of the given kind with all parameters defaulted.
    #[must_use]
    pub fn of_kind(kind: LrScheduleKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// Mutable runtime knobs for an active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Mini-batch size handed to the model collaborator.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Epoch limit for a training run.
    #[serde(default = "default_max_epochs")]
    pub max_epochs: u32,
    /// Target tick rate of the guard-rail loop, in [1, 120].
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// Learning-rate schedule.
    #[serde(default)]
    pub lr_schedule: LrScheduleConfig,
    /// Early-stopping patience in epochs; zero disables early stopping.
    #[serde(default = "default_patience")]
    pub early_stopping_patience: u32,
    /// Fraction of the dataset reserved for validation, in [0, 1).
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
}

fn default_batch_size() -> usize {
    32
}
fn default_max_epochs() -> u32 {
    100
}
fn default_target_fps() -> u32 {
    60
}
fn default_patience() -> u32 {
    5
}
fn default_validation_split() -> f64 {
    0.2
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_epochs: default_max_epochs(),
            target_fps: default_target_fps(),
            lr_schedule: LrScheduleConfig::default(),
            early_stopping_patience: default_patience(),
            validation_split: default_validation_split(),
        }
    }
}

impl TrainingConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Config`] if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TrainResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| TrainError::Config {
            detail: format!("failed to read config file: {e}"),
        })?;
        toml::from_str(&content).map_err(|e| TrainError::Config {
            detail: format!("failed to parse config: {e}"),
        })
    }

    /// Saves the configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Config`] if serialization or writing fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> TrainResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TrainError::Config {
            detail: format!("failed to serialize config: {e}"),
        })?;
        std::fs::write(path.as_ref(), content).map_err(|e| TrainError::Config {
            detail: format!("failed to write config file: {e}"),
        })
    }
}

/// Builder for [`TrainingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrainingConfigBuilder {
    config: TrainingConfig,
}

impl TrainingConfigBuilder {
    /// Sets the mini-batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Sets the epoch limit.
    #[must_use]
    pub fn max_epochs(mut self, max_epochs: u32) -> Self {
        self.config.max_epochs = max_epochs;
        self
    }

    /// Sets the target tick rate.
    #[must_use]
    pub fn target_fps(mut self, target_fps: u32) -> Self {
        self.config.target_fps = target_fps;
        self
    }

    /// Sets the learning-rate schedule.
    #[must_use]
    pub fn lr_schedule(mut self, schedule: LrScheduleConfig) -> Self {
        self.config.lr_schedule = schedule;
        self
    }

    /// Sets the early-stopping patience.
    #[must_use]
    pub fn early_stopping_patience(mut self, patience: u32) -> Self {
        self.config.early_stopping_patience = patience;
        self
    }

    /// Sets the validation split fraction.
    #[must_use]
    pub fn validation_split(mut self, split: f64) -> Self {
        self.config.validation_split = split;
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> TrainingConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sensible() {
        let config = TrainingConfig::default();
        assert_eq!(config.max_epochs, 100);
        assert_eq!(config.target_fps, 60);
        assert!(config.validation_split < 1.0);
        assert_eq!(config.lr_schedule.kind, LrScheduleKind::None);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = TrainingConfig::builder()
            .batch_size(16)
            .max_epochs(250)
            .target_fps(30)
            .early_stopping_patience(0)
            .validation_split(0.1)
            .build();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.max_epochs, 250);
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.early_stopping_patience, 0);
        assert!((config.validation_split - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn config_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.toml");

        let config = TrainingConfig::builder()
            .max_epochs(42)
            .lr_schedule(LrScheduleConfig {
                kind: LrScheduleKind::Step,
                decay_rate: Some(0.5),
                decay_steps: Some(10),
                warmup_epochs: 3,
                cycle_length: None,
                min_lr: None,
            })
            .build();
        config.to_file(&path).unwrap();

        let loaded = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn hyperparameters_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.toml");

        let hp = Hyperparameters {
            hidden_layers: vec![8, 8, 4],
            activations: Some(vec![Activation::Relu, Activation::Tanh, Activation::Relu]),
            optimizer: OptimizerKind::Momentum,
            ..Hyperparameters::default()
        };
        hp.to_file(&path).unwrap();

        let loaded = Hyperparameters::from_file(&path).unwrap();
        assert_eq!(loaded, hp);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = TrainingConfig::from_file("/nonexistent/training.toml").unwrap_err();
        assert!(matches!(err, TrainError::Config { .. }));
    }
}
