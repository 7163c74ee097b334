//! Interactive session demo: wires a tiny synthetic model, a logging
//! visualizer, and generated 2-D datasets into a full session, then drives
//! it through start / pause / step / reset from the command layer.
//!
//! Run with: `cargo run --example interactive_session`

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use interactive_trainer_rs::prelude::*;

/// A fake model whose loss decays geometrically with each epoch. The decay
/// speed follows the learning rate it was last given, which makes schedule
/// changes visible in the logged history.
struct SyntheticModel {
    hyperparameters: Option<Hyperparameters>,
    learning_rate: f64,
    epochs_seen: u32,
}

impl SyntheticModel {
    fn new() -> Self {
        Self {
            hyperparameters: None,
            learning_rate: 0.03,
            epochs_seen: 0,
        }
    }
}

impl ModelService for SyntheticModel {
    async fn initialize(&mut self, hyperparameters: &Hyperparameters) -> TrainResult<()> {
        self.learning_rate = hyperparameters.learning_rate;
        self.hyperparameters = Some(hyperparameters.clone());
        self.epochs_seen = 0;
        Ok(())
    }

    async fn train(&mut self, points: &[Point]) -> TrainResult<EpochMetrics> {
        self.epochs_seen += 1;
        let progress = f64::from(self.epochs_seen) * self.learning_rate.max(1e-4) * 10.0;
        let loss = 0.08 + 0.9 * (-progress).exp();
        let accuracy = 1.0 - loss;
        // Pretend the validation set lags slightly behind the training set.
        let val_loss = loss * 1.08;
        info!(
            epoch = self.epochs_seen,
            samples = points.len(),
            loss = %format!("{loss:.4}"),
            "trained one epoch"
        );
        Ok(EpochMetrics {
            loss,
            accuracy: Some(accuracy),
            val_loss: Some(val_loss),
            val_accuracy: Some(1.0 - val_loss.min(1.0)),
        })
    }

    async fn predict(&mut self, points: &[Point]) -> TrainResult<Vec<f64>> {
        Ok(points
            .iter()
            .map(|p| if p.x * p.y > 0.0 { 1.0 } else { 0.0 })
            .collect())
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        info!(lr = %format!("{learning_rate:.5}"), "learning rate propagated");
        self.learning_rate = learning_rate;
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

/// Logs what a real canvas renderer would draw.
struct LoggingVisualizer;

impl Visualizer for LoggingVisualizer {
    fn render_data(&mut self, points: &[Point]) {
        let validation = points.iter().filter(|p| p.is_validation).count();
        info!(
            total = points.len(),
            validation, "rendered raw points"
        );
    }

    fn render_boundary(&mut self, predictions: &[f64], grid_size: usize) {
        let positive = predictions.iter().filter(|&&p| p > 0.5).count();
        info!(
            grid = %format!("{grid_size}x{grid_size}"),
            positive_fraction = %format!("{:.2}", positive as f64 / predictions.len() as f64),
            "rendered decision boundary"
        );
    }

    fn clear(&mut self) {
        info!("cleared canvas");
    }
}

/// Generates the four canonical 2-D datasets with seeded randomness.
struct SyntheticDatasets {
    rng: Mutex<ChaCha8Rng>,
}

impl SyntheticDatasets {
    fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl DatasetRepository for SyntheticDatasets {
    async fn fetch(&self, kind: DatasetKind) -> TrainResult<Vec<Point>> {
        let mut rng = self.rng.lock().await;
        let n = 200;
        let points = (0..n)
            .map(|i| match kind {
                DatasetKind::Circle => {
                    let label = (i % 2) as u32;
                    let radius = if label == 0 {
                        rng.gen_range(0.0..0.4)
                    } else {
                        rng.gen_range(0.6..1.0)
                    };
                    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
                    Point::new(radius * angle.cos(), radius * angle.sin(), label)
                }
                DatasetKind::Xor => {
                    let x: f64 = rng.gen_range(-1.0..1.0);
                    let y: f64 = rng.gen_range(-1.0..1.0);
                    Point::new(x, y, u32::from(x * y < 0.0))
                }
                DatasetKind::Gauss => {
                    let label = (i % 2) as u32;
                    let center = if label == 0 { -0.5 } else { 0.5 };
                    Point::new(
                        center + rng.gen_range(-0.3..0.3),
                        center + rng.gen_range(-0.3..0.3),
                        label,
                    )
                }
                DatasetKind::Spiral => {
                    let label = (i % 2) as u32;
                    let t = f64::from(i / 2) / f64::from(n / 2) * 3.0 * std::f64::consts::PI;
                    let radius = t / (3.0 * std::f64::consts::PI);
                    let phase = if label == 0 { 0.0 } else { std::f64::consts::PI };
                    Point::new(
                        radius * (t + phase).cos(),
                        radius * (t + phase).sin(),
                        label,
                    )
                }
            })
            .collect();
        Ok(points)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = TrainingConfig::builder()
        .max_epochs(60)
        .target_fps(30)
        .lr_schedule(LrScheduleConfig {
            kind: LrScheduleKind::Exponential,
            warmup_epochs: 5,
            ..LrScheduleConfig::default()
        })
        .build();

    let session = TrainingSession::new(
        SyntheticModel::new(),
        LoggingVisualizer,
        SyntheticDatasets::seeded(7),
        IntervalTicker::new(),
        config,
    );
    session.seed_splitter(7);

    let subscription = session.on_state_change(|snapshot| {
        if snapshot.current_epoch % 10 == 0 && snapshot.current_epoch > 0 {
            info!(
                epoch = snapshot.current_epoch,
                loss = ?snapshot.current_loss,
                val_loss = ?snapshot.current_val_loss,
                "progress"
            );
        }
    });

    let init = InitializeNetworkCommand::new(&session, Hyperparameters::default());
    anyhow::ensure!(
        CommandExecutor::execute(init).await.is_success(),
        "network initialization was rejected"
    );

    session.load_data(DatasetKind::Circle).await?;

    info!("starting training");
    match CommandExecutor::execute(StartTrainingCommand::new(&session)).await {
        CommandOutcome::Completed(()) => {}
        CommandOutcome::Invalid(validation) => {
            anyhow::bail!("start rejected: {}", validation.message().unwrap_or("?"))
        }
        CommandOutcome::Failed(error) => return Err(error.into()),
    }

    tokio::time::sleep(Duration::from_millis(700)).await;
    session.pause();
    info!(state = ?session.status(), "paused mid-run");

    // While paused the loop keeps ticking but skips; manual steps still
    // advance one epoch at a time.
    for _ in 0..2 {
        session.step().await?;
    }
    info!(epochs = session.history().len(), "stepped manually while paused");

    // Start over from scratch and let the run finish on its own.
    session.reset();
    session.start()?;
    while session.status().is_running() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!(state = ?session.status(), "run finished");

    let history = session.history();
    if let Some((epoch, loss)) = history.best_loss() {
        info!(epoch, loss = %format!("{loss:.4}"), "best epoch");
    }
    println!("{}", history.to_json()?);

    session.unsubscribe(subscription);
    session.dispose();
    Ok(())
}
