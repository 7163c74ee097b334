//! Hand-written mock collaborators shared by the integration suites.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use interactive_trainer_rs::prelude::*;

/// Two-way handshake for blocking the mock model mid-train.
///
/// `entered` gains a permit when a train call reaches the gate; `release`
/// must be granted a permit before the call returns.
pub struct Gate {
    pub entered: Semaphore,
    pub release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }
}

/// Observable side effects of the mock model.
#[derive(Default)]
pub struct ModelCounters {
    pub init_calls: AtomicU32,
    pub train_calls: AtomicU32,
    pub predict_calls: AtomicU32,
    pub lr_updates: Mutex<Vec<f64>>,
}

/// Scriptable model collaborator.
///
/// Losses follow `1 / call_index`; validation losses are scripted via
/// `val_losses` (the last entry repeats) and absent when the script is
/// empty.
pub struct MockModel {
    pub counters: Arc<ModelCounters>,
    pub val_losses: Vec<f64>,
    pub gate: Option<Arc<Gate>>,
    pub fail_init: bool,
    pub fail_train_at: Option<u32>,
    hyperparameters: Option<Hyperparameters>,
}

impl MockModel {
    pub fn new(counters: Arc<ModelCounters>) -> Self {
        Self {
            counters,
            val_losses: Vec::new(),
            gate: None,
            fail_init: false,
            fail_train_at: None,
            hyperparameters: None,
        }
    }
}

impl ModelService for MockModel {
    async fn initialize(&mut self, hyperparameters: &Hyperparameters) -> TrainResult<()> {
        self.counters.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(TrainError::Config {
                detail: "mock rejects this configuration".to_string(),
            });
        }
        self.hyperparameters = Some(hyperparameters.clone());
        Ok(())
    }

    async fn train(&mut self, _points: &[Point]) -> TrainResult<EpochMetrics> {
        let call = self.counters.train_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.entered.add_permits(1);
            gate.release.acquire().await.expect("gate closed").forget();
        }
        if self.fail_train_at == Some(call) {
            return Err(TrainError::Config {
                detail: "mock train failure".to_string(),
            });
        }
        let loss = 1.0 / f64::from(call);
        let val_loss = match self.val_losses.as_slice() {
            [] => None,
            script => {
                let index = (call as usize - 1).min(script.len() - 1);
                Some(script[index])
            }
        };
        Ok(EpochMetrics {
            loss,
            accuracy: Some(1.0 - loss),
            val_loss,
            val_accuracy: val_loss.map(|v| 1.0 - v.min(1.0)),
        })
    }

    async fn predict(&mut self, points: &[Point]) -> TrainResult<Vec<f64>> {
        self.counters.predict_calls.fetch_add(1, Ordering::SeqCst);
        Ok(points.iter().map(|p| if p.x + p.y > 0.0 { 1.0 } else { 0.0 }).collect())
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.counters.lr_updates.lock().push(learning_rate);
    }

    fn structure(&self) -> Vec<usize> {
        let mut layers = vec![2];
        if let Some(hp) = &self.hyperparameters {
            layers.extend_from_slice(&hp.hidden_layers);
            layers.push(hp.num_classes as usize);
        }
        layers
    }

    fn weight_matrices(&self) -> Vec<Vec<Vec<f64>>> {
        Vec::new()
    }

    fn config(&self) -> Option<&Hyperparameters> {
        self.hyperparameters.as_ref()
    }

    fn is_ready(&self) -> bool {
        self.hyperparameters.is_some()
    }

    fn dispose(&mut self) {
        self.hyperparameters = None;
    }
}

/// Observable side effects of the mock visualizer.
#[derive(Default)]
pub struct VisualizerCounters {
    pub data_renders: AtomicU32,
    pub boundary_renders: AtomicU32,
    pub clears: AtomicU32,
}

pub struct MockVisualizer {
    pub counters: Arc<VisualizerCounters>,
}

impl Visualizer for MockVisualizer {
    fn render_data(&mut self, _points: &[Point]) {
        self.counters.data_renders.fetch_add(1, Ordering::SeqCst);
    }

    fn render_boundary(&mut self, _predictions: &[f64], _grid_size: usize) {
        self.counters.boundary_renders.fetch_add(1, Ordering::SeqCst);
    }

    fn clear(&mut self) {
        self.counters.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Repository serving a fixed balanced dataset.
pub struct MockRepository {
    pub size: usize,
}

impl DatasetRepository for MockRepository {
    async fn fetch(&self, _kind: DatasetKind) -> TrainResult<Vec<Point>> {
        Ok((0..self.size)
            .map(|i| {
                let t = i as f64 / self.size.max(1) as f64;
                Point::new(2.0 * t - 1.0, 1.0 - 2.0 * t, (i % 2) as u32)
            })
            .collect())
    }
}

/// Test-controlled ticker: each `notify_one` delivers at most one tick, and
/// ticks fired while the loop is busy coalesce into a single pending one.
pub struct ManualTicker {
    pub ticks: Arc<Notify>,
}

impl ManualTicker {
    pub fn new() -> (Self, Arc<Notify>) {
        let ticks = Arc::new(Notify::new());
        (
            Self {
                ticks: Arc::clone(&ticks),
            },
            ticks,
        )
    }
}

impl Ticker for ManualTicker {
    async fn wait(&mut self, _period: std::time::Duration) {
        self.ticks.notified().await;
    }
}

/// Convenience bundle wiring a session out of fresh mocks.
pub struct Harness {
    pub session: TrainingSession<MockModel, MockVisualizer, MockRepository, ManualTicker>,
    pub model_counters: Arc<ModelCounters>,
    pub visualizer_counters: Arc<VisualizerCounters>,
    pub ticks: Arc<Notify>,
}

pub fn harness_with(model: MockModel, config: TrainingConfig) -> Harness {
    let model_counters = Arc::clone(&model.counters);
    let visualizer_counters = Arc::new(VisualizerCounters::default());
    let visualizer = MockVisualizer {
        counters: Arc::clone(&visualizer_counters),
    };
    let (ticker, ticks) = ManualTicker::new();
    let session = TrainingSession::new(
        model,
        visualizer,
        MockRepository { size: 100 },
        ticker,
        config,
    );
    session.seed_splitter(42);
    Harness {
        session,
        model_counters,
        visualizer_counters,
        ticks,
    }
}

pub fn harness(config: TrainingConfig) -> Harness {
    let counters = Arc::new(ModelCounters::default());
    harness_with(MockModel::new(Arc::clone(&counters)), config)
}

/// Polls until `predicate` holds or the deadline passes.
pub async fn wait_until(
    mut predicate: impl FnMut() -> bool,
    deadline: std::time::Duration,
) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    predicate()
}
