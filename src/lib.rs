//! # interactive-trainer-rs
//!
//! Orchestrates iterative, interruptible training of a model against an
//! in-memory dataset inside a live interactive session: start, pause,
//! resume, single-step, and reset training while guaranteeing at most one
//! unit of training work is ever in flight, with pluggable learning-rate
//! schedules, early-stopping policy, and train/validation partitioning.
//!
//! ## Overview
//!
//! The crate is an in-process library with no wire protocol of its own. A
//! UI layer drives it through the command layer, and it in turn drives
//! three opaque collaborators: a model service that trains and predicts, a
//! visualizer that draws points and decision boundaries, and a dataset
//! repository that serves raw samples. A fourth port, the [`Ticker`],
//! abstracts the recurring tick that paces the guard-rail loop, keeping the
//! loop itself host-agnostic.
//!
//! ```text
//!  commands ──▶ TrainingSession ──▶ ModelService (train/predict)
//!                    │  ▲                │
//!                    │  └── Ticker ◀─────┘ (suspension points)
//!                    ├────▶ Visualizer (boundary + raw points)
//!                    └────▶ DatasetRepository (fetch)
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use interactive_trainer_rs::prelude::*;
//!
//! let session = TrainingSession::new(
//!     model,
//!     visualizer,
//!     repository,
//!     IntervalTicker::new(),
//!     TrainingConfig::default(),
//! );
//!
//! let init = InitializeNetworkCommand::new(&session, Hyperparameters::default());
//! assert!(CommandExecutor::execute(init).await.is_success());
//!
//! session.load_data(DatasetKind::Circle).await?;
//! session.start()?;
//! ```
//!
//! ## Why a trait-generic session?
//!
//! The session is framework-agnostic: by requiring only the four ports, it
//! works with any model backend or rendering host that can implement them,
//! and tests substitute hand-written mocks. Collaborator futures are
//! `Send` so the guard-rail loop can run as a spawned Tokio task.
//!
//! ## Modules
//!
//! - [`session`] — the state machine and guard-railed execution loop
//! - [`scheduler`] — learning-rate schedules
//! - [`early_stopping`] — validation-loss stagnation monitor
//! - [`splitter`] — train/validation partitioning
//! - [`command`] — validate-then-execute command layer
//! - [`config`] — hyperparameters and runtime knobs
//! - [`state`] — status, history, snapshots
//! - [`grid`] — pre-allocated prediction grid
//! - [`data`] — sample and metric types
//! - [`error`] — error taxonomy

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
// Precision-loss casts are acceptable in this numerical code.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]

pub mod command;
pub mod config;
pub mod data;
pub mod early_stopping;
pub mod error;
pub mod grid;
pub mod scheduler;
pub mod session;
pub mod splitter;
pub mod state;

pub use command::{
    Command, CommandExecutor, CommandOutcome, InitializeNetworkCommand, StartTrainingCommand,
    StepTrainingCommand, UpdateTrainingConfigCommand, ValidationResult,
};
pub use config::{
    Activation, Hyperparameters, LrScheduleConfig, LrScheduleKind, OptimizerKind, TrainingConfig,
    TrainingConfigBuilder,
};
pub use data::{DatasetKind, EpochMetrics, Point};
pub use early_stopping::EarlyStopping;
pub use error::{TrainError, TrainResult};
pub use grid::BoundaryGrid;
pub use scheduler::{LearningRateScheduler, LR_SIGNIFICANCE_THRESHOLD};
pub use session::{Subscription, TrainingSession};
pub use splitter::{ClassCounts, DataSplitter, SplitData, SplitStatistics};
pub use state::{
    SessionStatus, StopReason, TrainingHistory, TrainingRecord, TrainingSnapshot,
};

use std::future::Future;
use std::time::Duration;

/// The opaque model collaborator.
///
/// `train` and `predict` are the session's only suspension points; both
/// must return `Send` futures so the loop can run as a spawned task. The
/// session never calls [`dispose`](Self::dispose) — the model is owned by
/// the composition root.
pub trait ModelService: Send + 'static {
    /// Builds (or rebuilds) the model for the given hyperparameters.
    fn initialize(
        &mut self,
        hyperparameters: &Hyperparameters,
    ) -> impl Future<Output = TrainResult<()>> + Send;

    /// Trains one epoch over `points` and reports the epoch's metrics.
    fn train(&mut self, points: &[Point]) -> impl Future<Output = TrainResult<EpochMetrics>> + Send;

    /// Predicts class scores for `points`, in input order.
    fn predict(&mut self, points: &[Point])
        -> impl Future<Output = TrainResult<Vec<f64>>> + Send;

    /// Updates the optimizer's learning rate.
    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Layer sizes of the current network, input to output.
    fn structure(&self) -> Vec<usize>;

    /// Weight matrices per layer, for introspection displays.
    fn weight_matrices(&self) -> Vec<Vec<Vec<f64>>>;

    /// The hyperparameters the model was initialized with, if any.
    fn config(&self) -> Option<&Hyperparameters>;

    /// Whether the model has been initialized and can train.
    fn is_ready(&self) -> bool;

    /// Releases model resources. Called by the composition root, never by
    /// the session.
    fn dispose(&mut self);
}

/// The opaque rendering collaborator.
///
/// Receives read-only views of session-owned buffers; implementations must
/// not retain them.
pub trait Visualizer: Send + 'static {
    /// Draws raw samples.
    fn render_data(&mut self, points: &[Point]);

    /// Draws the decision boundary from row-major grid `predictions` at
    /// `grid_size` resolution per axis.
    fn render_boundary(&mut self, predictions: &[f64], grid_size: usize);

    /// Clears the drawing surface.
    fn clear(&mut self);
}

/// The opaque dataset source.
pub trait DatasetRepository: Send + Sync + 'static {
    /// Produces the raw points for a dataset family.
    fn fetch(&self, kind: DatasetKind) -> impl Future<Output = TrainResult<Vec<Point>>> + Send;
}

/// The injected scheduling port pacing the guard-rail loop.
///
/// Interactive hosts can back this with a display-refresh callback;
/// non-interactive hosts use [`IntervalTicker`]. Implementations should
/// coalesce ticks that fire while the caller is busy — the loop's contract
/// is "skip, don't queue".
pub trait Ticker: Send + 'static {
    /// Completes at the next tick, at most `period` from now.
    fn wait(&mut self, period: Duration) -> impl Future<Output = ()> + Send;
}

/// Timer-backed [`Ticker`] for non-interactive hosts.
///
/// Wraps a Tokio interval with skip semantics: ticks missed while a step
/// was running are dropped rather than delivered in a burst.
#[derive(Debug, Default)]
pub struct IntervalTicker {
    interval: Option<tokio::time::Interval>,
    period: Duration,
}

impl IntervalTicker {
    /// Creates a ticker; the interval is materialized on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ticker for IntervalTicker {
    async fn wait(&mut self, period: Duration) {
        let needs_rebuild = match &self.interval {
            Some(_) => period != self.period,
            None => true,
        };
        if needs_rebuild {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            self.period = period;
            self.interval = Some(interval);
        }
        if let Some(interval) = &mut self.interval {
            interval.tick().await;
        }
    }
}

/// Convenient imports for hosts wiring up a session.
pub mod prelude {
    pub use crate::command::{
        Command, CommandExecutor, CommandOutcome, InitializeNetworkCommand, StartTrainingCommand,
        StepTrainingCommand, UpdateTrainingConfigCommand, ValidationResult,
    };
    pub use crate::config::{
        Activation, Hyperparameters, LrScheduleConfig, LrScheduleKind, OptimizerKind,
        TrainingConfig,
    };
    pub use crate::data::{DatasetKind, EpochMetrics, Point};
    pub use crate::error::{TrainError, TrainResult};
    pub use crate::session::TrainingSession;
    pub use crate::state::{SessionStatus, StopReason, TrainingSnapshot};
    pub use crate::{DatasetRepository, IntervalTicker, ModelService, Ticker, Visualizer};
}
