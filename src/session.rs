//! The training session: state machine and guard-railed execution loop.
//!
//! [`TrainingSession`] composes the splitter, scheduler, and early-stopping
//! monitor and drives the opaque model/visualizer/repository collaborators.
//! It is generic over the collaborator ports so hosts can wire real
//! implementations while tests substitute mocks, the same way the trainer
//! is parameterized in larger training stacks.
//!
//! # Guard rail
//!
//! At most one unit of training work is in flight per session, enforced by
//! a single atomic flag. Ticks that fire while a step is outstanding are
//! dropped, never queued; manual [`TrainingSession::step`] calls made while
//! a step is outstanding resolve as silent no-ops. Because compute time can
//! exceed the tick interval, "skip, don't queue" is what keeps a slow model
//! from building an unbounded backlog.
//!
//! # Session generations
//!
//! `reset()` and `set_hyperparameters()` bump a monotonically increasing
//! generation counter and clear the in-flight flag synchronously. A step
//! that was already awaiting the model when that happened re-checks the
//! generation after every suspension point and discards its completion
//! logic wholesale when stale: no epoch bump, no history record, no
//! listener notification, and no release of an in-flight flag it no longer
//! owns. Stale results can therefore never resurrect pre-reset state.
//!
//! # Locking discipline
//!
//! Cheap session state lives behind a `parking_lot` mutex that is never
//! held across an await; the model sits behind a Tokio mutex because its
//! calls suspend. Partitions are shared with collaborators as read-only
//! `Arc` slices.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::config::{Hyperparameters, TrainingConfig};
use crate::data::{DatasetKind, Point};
use crate::early_stopping::EarlyStopping;
use crate::error::{TrainError, TrainResult};
use crate::grid::BoundaryGrid;
use crate::scheduler::{LearningRateScheduler, LR_SIGNIFICANCE_THRESHOLD};
use crate::splitter::DataSplitter;
use crate::state::{SessionStatus, StopReason, TrainingHistory, TrainingRecord, TrainingSnapshot};
use crate::{DatasetRepository, ModelService, Ticker, Visualizer};

/// Epochs between decision-boundary redraws.
const RENDER_INTERVAL: u32 = 10;
/// Per-axis resolution of the prediction grid.
const GRID_SIZE: usize = 50;

type ListenerFn = Arc<dyn Fn(&TrainingSnapshot) + Send + Sync>;

/// Handle returned by [`TrainingSession::on_state_change`]; pass it back to
/// [`TrainingSession::unsubscribe`] to remove the listener.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
}

/// Whether a run is in progress, and how the last one ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Paused,
    Stopped(StopReason),
}

/// Outcome of one attempt to execute an epoch.
enum EpochOutcome {
    /// The epoch ran and committed; `stopped` carries a terminal reason
    /// when this epoch ended the run.
    Completed { stopped: Option<StopReason> },
    /// Another step was already in flight; nothing ran.
    SkippedInFlight,
    /// The session generation changed mid-step; the result was discarded.
    Stale,
}

/// Mutable session state guarded by a single cheap mutex.
struct SessionCore {
    initialized: bool,
    data_loaded: bool,
    run: RunState,
    loop_active: bool,
    hyperparameters: Option<Hyperparameters>,
    config: TrainingConfig,
    raw_points: Vec<Point>,
    training: Arc<Vec<Point>>,
    validation: Arc<Vec<Point>>,
    all: Arc<Vec<Point>>,
    current_epoch: u32,
    current_loss: Option<f64>,
    current_accuracy: Option<f64>,
    current_val_loss: Option<f64>,
    current_val_accuracy: Option<f64>,
    last_propagated_lr: Option<f64>,
    history: TrainingHistory,
    scheduler: LearningRateScheduler,
    early_stopping: EarlyStopping,
    splitter: DataSplitter,
    grid: Arc<BoundaryGrid>,
}

impl SessionCore {
    fn new(config: TrainingConfig) -> Self {
        let patience = config.early_stopping_patience;
        let schedule = config.lr_schedule.clone();
        Self {
            initialized: false,
            data_loaded: false,
            run: RunState::Idle,
            loop_active: false,
            hyperparameters: None,
            config,
            raw_points: Vec::new(),
            training: Arc::new(Vec::new()),
            validation: Arc::new(Vec::new()),
            all: Arc::new(Vec::new()),
            current_epoch: 0,
            current_loss: None,
            current_accuracy: None,
            current_val_loss: None,
            current_val_accuracy: None,
            last_propagated_lr: None,
            history: TrainingHistory::new(),
            scheduler: LearningRateScheduler::new(0.0, schedule),
            early_stopping: EarlyStopping::new(patience),
            splitter: DataSplitter::new(),
            grid: Arc::new(BoundaryGrid::new(GRID_SIZE)),
        }
    }

    fn status(&self) -> SessionStatus {
        if !self.initialized {
            return SessionStatus::Uninitialized;
        }
        if !self.data_loaded {
            return SessionStatus::Initialized;
        }
        match self.run {
            RunState::Idle => SessionStatus::DataLoaded,
            RunState::Running => SessionStatus::Running,
            RunState::Paused => SessionStatus::Paused,
            RunState::Stopped(reason) => SessionStatus::Stopped(reason),
        }
    }

    fn snapshot(&self) -> TrainingSnapshot {
        let status = self.status();
        TrainingSnapshot {
            status,
            current_epoch: self.current_epoch,
            current_loss: self.current_loss,
            current_accuracy: self.current_accuracy,
            current_val_loss: self.current_val_loss,
            current_val_accuracy: self.current_val_accuracy,
            is_running: status.is_running(),
            is_paused: status.is_paused(),
            is_initialized: self.initialized,
            dataset_loaded: self.data_loaded,
            max_epochs: self.config.max_epochs,
            batch_size: self.config.batch_size,
            target_fps: self.config.target_fps,
            validation_split: self.config.validation_split,
            history: self.history.clone(),
        }
    }

    fn repartition(&mut self) {
        let split = self
            .splitter
            .split(&self.raw_points, self.config.validation_split, true);
        self.training = Arc::new(split.training);
        self.validation = Arc::new(split.validation);
        self.all = Arc::new(split.all);
    }

    fn zero_progress(&mut self) {
        self.current_epoch = 0;
        self.current_loss = None;
        self.current_accuracy = None;
        self.current_val_loss = None;
        self.current_val_accuracy = None;
        self.last_propagated_lr = None;
        self.history.clear();
        self.scheduler.reset();
        self.early_stopping.reset();
    }

    fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.config.target_fps.max(1)))
    }
}

struct SessionInner<M, V, R, T> {
    model: AsyncMutex<M>,
    visualizer: Mutex<V>,
    repository: R,
    ticker: AsyncMutex<T>,
    core: Mutex<SessionCore>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    disposed: AtomicBool,
    listeners: Mutex<Vec<(u64, ListenerFn)>>,
    next_listener_id: AtomicU64,
}

impl<M, V, R, T> SessionInner<M, V, R, T> {
    fn notify(&self, snapshot: &TrainingSnapshot) {
        let callbacks: Vec<ListenerFn> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }

    /// Invalidates any outstanding step and frees the in-flight flag so the
    /// next step can start immediately.
    fn invalidate_in_flight(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Releases the in-flight flag on scope exit, but only while the step still
/// owns it: after a generation bump the flag belongs to whoever comes next.
struct InFlightGuard<'a> {
    in_flight: &'a AtomicBool,
    generation: &'a AtomicU64,
    token: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.generation.load(Ordering::SeqCst) == self.token {
            self.in_flight.store(false, Ordering::SeqCst);
        }
    }
}

/// Orchestrates interruptible training of a model against an in-memory
/// dataset.
///
/// The session is cheaply cloneable (it is a handle to shared state) so the
/// guard-rail loop, UI commands, and listeners can all hold it at once.
pub struct TrainingSession<M, V, R, T> {
    inner: Arc<SessionInner<M, V, R, T>>,
}

impl<M, V, R, T> Clone for TrainingSession<M, V, R, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M, V, R, T> TrainingSession<M, V, R, T>
where
    M: ModelService,
    V: Visualizer,
    R: DatasetRepository,
    T: Ticker,
{
    /// Creates a session owning its collaborators.
    ///
    /// The model is owned but never disposed by the session; that call
    /// stays with the composition root.
    pub fn new(model: M, visualizer: V, repository: R, ticker: T, config: TrainingConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                model: AsyncMutex::new(model),
                visualizer: Mutex::new(visualizer),
                repository,
                ticker: AsyncMutex::new(ticker),
                core: Mutex::new(SessionCore::new(config)),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Reseeds the splitter so subsequent partitions are reproducible.
    pub fn seed_splitter(&self, seed: u64) {
        self.inner.core.lock().splitter = DataSplitter::seeded(seed);
    }

    /// Initializes the model collaborator with `hyperparameters` and zeroes
    /// all training progress.
    ///
    /// Any step still awaiting the model is invalidated first, so a slow
    /// epoch from the previous configuration can never commit into the new
    /// one.
    ///
    /// # Errors
    ///
    /// [`TrainError::InitializationFailed`] when the model rejects the
    /// configuration; [`TrainError::Precondition`] on a disposed session.
    pub async fn set_hyperparameters(&self, hyperparameters: Hyperparameters) -> TrainResult<()> {
        self.ensure_not_disposed()?;
        self.inner.invalidate_in_flight();

        {
            let mut model = self.inner.model.lock().await;
            model
                .initialize(&hyperparameters)
                .await
                .map_err(|e| TrainError::InitializationFailed {
                    reason: e.to_string(),
                })?;
        }

        let snapshot = {
            let mut core = self.inner.core.lock();
            core.scheduler
                .set_initial_lr(hyperparameters.learning_rate);
            let lr_schedule = core.config.lr_schedule.clone();
            core.scheduler.set_schedule(lr_schedule);
            core.hyperparameters = Some(hyperparameters);
            core.initialized = true;
            core.run = RunState::Idle;
            core.zero_progress();
            core.snapshot()
        };
        info!(status = ?snapshot.status, "network initialized");
        self.inner.notify(&snapshot);
        Ok(())
    }

    /// Fetches a dataset from the repository, partitions it, and renders
    /// the raw points.
    ///
    /// # Errors
    ///
    /// [`TrainError::DatasetUnavailable`] when the repository fails;
    /// [`TrainError::Precondition`] on a disposed session.
    pub async fn load_data(&self, kind: DatasetKind) -> TrainResult<()> {
        self.ensure_not_disposed()?;

        let points =
            self.inner
                .repository
                .fetch(kind)
                .await
                .map_err(|e| TrainError::DatasetUnavailable {
                    kind,
                    reason: e.to_string(),
                })?;

        let (snapshot, all) = {
            let mut core = self.inner.core.lock();
            core.raw_points = points;
            core.repartition();
            core.data_loaded = true;
            (core.snapshot(), Arc::clone(&core.all))
        };
        info!(dataset = %kind, samples = all.len(), "dataset loaded");
        self.inner.visualizer.lock().render_data(&all);
        self.inner.notify(&snapshot);
        Ok(())
    }

    /// Starts (or resumes) the guard-rail loop.
    ///
    /// A no-op when already running unpaused. Must be called from within a
    /// Tokio runtime; the loop runs as a spawned task and `start` returns
    /// immediately, so step failures surface only through state
    /// notifications.
    ///
    /// # Errors
    ///
    /// [`TrainError::Precondition`] when hyperparameters are not set, no
    /// dataset is loaded, or the validation split left the training
    /// partition empty.
    pub fn start(&self) -> TrainResult<()> {
        self.ensure_not_disposed()?;

        let (snapshot, needs_spawn) = {
            let mut core = self.inner.core.lock();
            if !core.initialized {
                return Err(TrainError::precondition(
                    "hyperparameters not set; initialize the network before training",
                ));
            }
            if !core.data_loaded {
                return Err(TrainError::precondition(
                    "no dataset loaded; load data before training",
                ));
            }
            if core.training.is_empty() {
                return Err(TrainError::precondition(
                    "training partition is empty; lower the validation split",
                ));
            }
            if core.run == RunState::Running {
                return Ok(());
            }
            core.run = RunState::Running;
            let needs_spawn = !core.loop_active;
            if needs_spawn {
                core.loop_active = true;
            }
            (core.snapshot(), needs_spawn)
        };

        if needs_spawn {
            spawn_loop(Arc::clone(&self.inner));
        }
        info!("training started");
        self.inner.notify(&snapshot);
        Ok(())
    }

    /// Pauses the loop. The in-flight step, if any, completes; no further
    /// step is scheduled until [`start`](Self::start) is called again.
    pub fn pause(&self) {
        let snapshot = {
            let mut core = self.inner.core.lock();
            if core.run != RunState::Running {
                return;
            }
            core.run = RunState::Paused;
            core.snapshot()
        };
        info!("training paused");
        self.inner.notify(&snapshot);
    }

    /// Executes exactly one epoch, sharing the mutual-exclusion flag with
    /// the loop.
    ///
    /// Returns `Ok(false)` without doing anything when a step is already in
    /// flight (or when the session was reset mid-step).
    ///
    /// # Errors
    ///
    /// [`TrainError::Precondition`] when hyperparameters are not set or no
    /// dataset is loaded; otherwise whatever the model reports for this
    /// epoch.
    pub async fn step(&self) -> TrainResult<bool> {
        self.ensure_not_disposed()?;
        {
            let core = self.inner.core.lock();
            if !core.initialized {
                return Err(TrainError::precondition(
                    "hyperparameters not set; initialize the network before stepping",
                ));
            }
            if !core.data_loaded {
                return Err(TrainError::precondition(
                    "no dataset loaded; load data before stepping",
                ));
            }
        }

        match run_epoch(&self.inner).await {
            Ok(EpochOutcome::Completed { .. }) => Ok(true),
            Ok(EpochOutcome::SkippedInFlight | EpochOutcome::Stale) => Ok(false),
            Err(err) => {
                let snapshot = {
                    let mut core = self.inner.core.lock();
                    if matches!(core.run, RunState::Running | RunState::Paused) {
                        core.run = RunState::Stopped(StopReason::Error);
                    }
                    core.snapshot()
                };
                self.inner.notify(&snapshot);
                Err(err)
            }
        }
    }

    /// Stops the loop, invalidates any in-flight step, zeroes all progress,
    /// and re-renders the raw points without a decision boundary.
    ///
    /// Hyperparameters and loaded data are preserved; the session returns
    /// to the data-loaded state.
    pub fn reset(&self) {
        self.inner.invalidate_in_flight();

        let (snapshot, all, loaded) = {
            let mut core = self.inner.core.lock();
            core.run = RunState::Idle;
            core.zero_progress();
            (core.snapshot(), Arc::clone(&core.all), core.data_loaded)
        };

        if loaded {
            let mut visualizer = self.inner.visualizer.lock();
            visualizer.clear();
            visualizer.render_data(&all);
        }
        info!("session reset");
        self.inner.notify(&snapshot);
    }

    /// Stops the loop and clears all listener registrations.
    ///
    /// The model collaborator is not disposed; it belongs to the
    /// composition root. Further `start`/`step` calls fail their
    /// precondition check.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.invalidate_in_flight();
        {
            let mut core = self.inner.core.lock();
            if matches!(core.run, RunState::Running | RunState::Paused) {
                core.run = RunState::Idle;
            }
        }
        self.inner.listeners.lock().clear();
        info!("session disposed");
    }

    /// Applies new runtime knobs.
    ///
    /// Takes effect on the next epoch; when the validation split changed
    /// and data is loaded, the dataset is re-partitioned immediately.
    pub fn update_config(&self, config: TrainingConfig) {
        let snapshot = {
            let mut core = self.inner.core.lock();
            let split_changed = (config.validation_split - core.config.validation_split).abs()
                > f64::EPSILON;
            core.scheduler.set_schedule(config.lr_schedule.clone());
            core.early_stopping
                .set_patience(config.early_stopping_patience);
            core.config = config;
            if split_changed && core.data_loaded {
                core.repartition();
            }
            core.snapshot()
        };
        debug!("training config updated");
        self.inner.notify(&snapshot);
    }

    /// Registers a state-change listener; returns the handle that removes
    /// it again.
    pub fn on_state_change(
        &self,
        callback: impl Fn(&TrainingSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(callback)));
        Subscription { id }
    }

    /// Removes a previously registered listener.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.inner
            .listeners
            .lock()
            .retain(|(id, _)| *id != subscription.id);
    }

    /// An immutable snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> TrainingSnapshot {
        self.inner.core.lock().snapshot()
    }

    /// The derived state-machine status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.core.lock().status()
    }

    /// A copy of the per-epoch history.
    #[must_use]
    pub fn history(&self) -> TrainingHistory {
        self.inner.core.lock().history.clone()
    }

    /// Size of the current training partition.
    #[must_use]
    pub fn training_partition_len(&self) -> usize {
        self.inner.core.lock().training.len()
    }

    /// Size of the current validation partition.
    #[must_use]
    pub fn validation_partition_len(&self) -> usize {
        self.inner.core.lock().validation.len()
    }

    fn ensure_not_disposed(&self) -> TrainResult<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(TrainError::precondition("session has been disposed"));
        }
        Ok(())
    }
}

/// Spawns the tick-driven loop task.
///
/// The task keeps ticking while paused (a paused tick just skips) and exits
/// when the run leaves the running/paused states or the session is
/// disposed.
fn spawn_loop<M, V, R, T>(inner: Arc<SessionInner<M, V, R, T>>)
where
    M: ModelService,
    V: Visualizer,
    R: DatasetRepository,
    T: Ticker,
{
    tokio::spawn(async move {
        let mut ticker = inner.ticker.lock().await;
        loop {
            run_ticks(&inner, &mut ticker).await;

            // `start()` may have resumed the run between the tick loop
            // ending and this check; exiting then would leave a running
            // session with no loop. Deciding under the lock closes that
            // window.
            let mut core = inner.core.lock();
            let resumed = !inner.disposed.load(Ordering::SeqCst)
                && matches!(core.run, RunState::Running | RunState::Paused);
            if !resumed {
                core.loop_active = false;
                break;
            }
        }
    });
}

/// Runs ticks until the run leaves the running/paused states or the
/// session is disposed.
async fn run_ticks<M, V, R, T>(inner: &Arc<SessionInner<M, V, R, T>>, ticker: &mut T)
where
    M: ModelService,
    V: Visualizer,
    R: DatasetRepository,
    T: Ticker,
{
    loop {
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        let (run, period) = {
            let core = inner.core.lock();
            (core.run, core.tick_period())
        };
        if !matches!(run, RunState::Running | RunState::Paused) {
            return;
        }

        ticker.wait(period).await;

        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        match inner.core.lock().run {
            RunState::Running => {}
            RunState::Paused => continue,
            _ => return,
        }

        // A run resumed past its epoch limit has nothing left to do.
        let limit_reached = {
            let mut core = inner.core.lock();
            if core.current_epoch >= core.config.max_epochs {
                core.run = RunState::Stopped(StopReason::EpochLimit);
                Some(core.snapshot())
            } else {
                None
            }
        };
        if let Some(snapshot) = limit_reached {
            inner.notify(&snapshot);
            return;
        }

        match run_epoch(inner).await {
            Ok(EpochOutcome::Completed {
                stopped: Some(reason),
            }) => {
                info!(?reason, "training run ended");
                return;
            }
            Ok(EpochOutcome::Completed { stopped: None }) => {}
            Ok(EpochOutcome::SkippedInFlight) => {
                debug!("tick skipped; step still in flight");
            }
            Ok(EpochOutcome::Stale) => return,
            Err(err) => {
                error!(error = %err, "training step failed; stopping");
                let snapshot = {
                    let mut core = inner.core.lock();
                    core.run = RunState::Stopped(StopReason::Error);
                    core.snapshot()
                };
                inner.notify(&snapshot);
                return;
            }
        }
    }
}

/// Executes one epoch under the in-flight guard.
///
/// Shared by the loop and manual stepping. Every suspension point is
/// followed by a generation check; a stale step discards everything.
async fn run_epoch<M, V, R, T>(inner: &SessionInner<M, V, R, T>) -> TrainResult<EpochOutcome>
where
    M: ModelService,
    V: Visualizer,
    R: DatasetRepository,
    T: Ticker,
{
    if inner
        .in_flight
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(EpochOutcome::SkippedInFlight);
    }
    let token = inner.generation.load(Ordering::SeqCst);
    let _guard = InFlightGuard {
        in_flight: &inner.in_flight,
        generation: &inner.generation,
        token,
    };

    let (epoch, lr, propagate, training, max_epochs) = {
        let mut core = inner.core.lock();
        let epoch = core.current_epoch + 1;
        // Scheduler epochs are 0-based; records are 1-based.
        let max_epochs_cfg = core.config.max_epochs;
        let lr = core
            .scheduler
            .calculate_lr(epoch - 1, Some(max_epochs_cfg));
        let propagate = match core.last_propagated_lr {
            None => true,
            Some(previous) => core
                .scheduler
                .has_significant_change(previous, LR_SIGNIFICANCE_THRESHOLD),
        };
        (
            epoch,
            lr,
            propagate,
            Arc::clone(&core.training),
            core.config.max_epochs,
        )
    };

    let metrics = {
        let mut model = inner.model.lock().await;
        if inner.generation.load(Ordering::SeqCst) != token {
            debug!("discarding step: session generation changed before training");
            return Ok(EpochOutcome::Stale);
        }
        if propagate {
            model.set_learning_rate(lr);
        }
        model.train(&training).await
    };
    if inner.generation.load(Ordering::SeqCst) != token {
        debug!("discarding stale step result");
        return Ok(EpochOutcome::Stale);
    }
    let metrics = metrics.map_err(|e| TrainError::StepFailed {
        epoch,
        reason: e.to_string(),
    })?;
    if !metrics.loss.is_finite() {
        return Err(TrainError::NumericalInstability {
            epoch,
            loss: metrics.loss,
        });
    }

    let (snapshot, stopped, should_render, grid, all) = {
        let mut core = inner.core.lock();
        core.current_epoch = epoch;
        core.current_loss = Some(metrics.loss);
        core.current_accuracy = metrics.accuracy;
        core.current_val_loss = metrics.val_loss;
        core.current_val_accuracy = metrics.val_accuracy;
        if propagate {
            core.last_propagated_lr = Some(lr);
        }

        let stopped = if core.early_stopping.should_stop(metrics.val_loss) {
            Some(StopReason::EarlyStopping)
        } else if epoch >= max_epochs {
            Some(StopReason::EpochLimit)
        } else {
            None
        };
        if let Some(reason) = stopped {
            if matches!(core.run, RunState::Running | RunState::Paused) {
                core.run = RunState::Stopped(reason);
            }
            if reason == StopReason::EarlyStopping {
                warn!(epoch, "early stopping: validation loss stagnated");
            }
        }

        core.history.push(TrainingRecord {
            epoch,
            loss: metrics.loss,
            accuracy: metrics.accuracy,
            learning_rate: lr,
            val_loss: metrics.val_loss,
            val_accuracy: metrics.val_accuracy,
            timestamp: Utc::now(),
        });

        (
            core.snapshot(),
            stopped,
            epoch % RENDER_INTERVAL == 0,
            Arc::clone(&core.grid),
            Arc::clone(&core.all),
        )
    };

    if should_render {
        let predictions = {
            let mut model = inner.model.lock().await;
            if inner.generation.load(Ordering::SeqCst) != token {
                return Ok(EpochOutcome::Stale);
            }
            model.predict(grid.points()).await
        };
        if inner.generation.load(Ordering::SeqCst) != token {
            return Ok(EpochOutcome::Stale);
        }
        let predictions = predictions.map_err(|e| TrainError::StepFailed {
            epoch,
            reason: e.to_string(),
        })?;

        let mut visualizer = inner.visualizer.lock();
        visualizer.render_boundary(&predictions, grid.size());
        visualizer.render_data(&all);
    }

    inner.notify(&snapshot);
    Ok(EpochOutcome::Completed { stopped })
}
