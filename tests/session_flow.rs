//! End-to-end tests of the session state machine against mock
//! collaborators.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{harness, harness_with, wait_until, MockModel, ModelCounters};
use interactive_trainer_rs::prelude::*;

fn spawn_tick_pump(ticks: Arc<tokio::sync::Notify>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            ticks.notify_one();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
}

#[tokio::test]
async fn lifecycle_walks_the_state_machine() {
    let h = harness(TrainingConfig::default());

    assert_eq!(h.session.status(), SessionStatus::Uninitialized);

    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    assert_eq!(h.session.status(), SessionStatus::Initialized);
    assert_eq!(h.model_counters.init_calls.load(Ordering::SeqCst), 1);

    h.session.load_data(DatasetKind::Circle).await.unwrap();
    assert_eq!(h.session.status(), SessionStatus::DataLoaded);
    // Loading renders the raw points once.
    assert_eq!(h.visualizer_counters.data_renders.load(Ordering::SeqCst), 1);

    let state = h.session.state();
    assert!(state.is_initialized);
    assert!(state.dataset_loaded);
    assert!(!state.is_running);
    assert_eq!(state.current_epoch, 0);
}

#[tokio::test]
async fn start_requires_initialization_and_data() {
    let h = harness(TrainingConfig::default());

    let err = h.session.start().unwrap_err();
    assert!(matches!(err, TrainError::Precondition { .. }));

    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    let err = h.session.start().unwrap_err();
    assert!(err.to_string().contains("dataset"));
}

#[tokio::test]
async fn start_rejects_an_empty_training_partition() {
    let h = harness(
        TrainingConfig::builder().validation_split(0.995).build(),
    );
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Gauss).await.unwrap();
    assert_eq!(h.session.training_partition_len(), 0);

    let err = h.session.start().unwrap_err();
    assert!(err.to_string().contains("validation split"));
}

#[tokio::test]
async fn manual_steps_build_a_contiguous_history() {
    let h = harness(TrainingConfig::default());
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Xor).await.unwrap();

    for _ in 0..3 {
        assert!(h.session.step().await.unwrap());
    }

    let history = h.session.history();
    assert_eq!(history.len(), 3);
    for (index, record) in history.records().iter().enumerate() {
        assert_eq!(record.epoch, index as u32 + 1);
    }
    // Constant schedule: the learning rate is propagated exactly once.
    assert_eq!(h.model_counters.lr_updates.lock().as_slice(), &[0.03]);

    let state = h.session.state();
    assert_eq!(state.current_epoch, 3);
    assert!(state.current_loss.is_some());
}

#[tokio::test]
async fn reset_preserves_initialization_and_data() {
    let h = harness(TrainingConfig::default());
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Spiral).await.unwrap();
    for _ in 0..4 {
        h.session.step().await.unwrap();
    }

    h.session.reset();

    let state = h.session.state();
    assert_eq!(state.current_epoch, 0);
    assert_eq!(state.current_loss, None);
    assert!(!state.is_running);
    assert!(!state.is_paused);
    assert!(state.is_initialized);
    assert!(state.dataset_loaded);
    assert!(state.history.is_empty());
    assert_eq!(h.session.status(), SessionStatus::DataLoaded);
    // The raw points are redrawn without a boundary.
    assert!(h.visualizer_counters.clears.load(Ordering::SeqCst) >= 1);

    // Numbering restarts cleanly after the reset.
    h.session.step().await.unwrap();
    assert_eq!(h.session.history().records()[0].epoch, 1);
}

#[tokio::test]
async fn loop_stops_at_the_epoch_limit() {
    let h = harness(TrainingConfig::builder().max_epochs(5).build());
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Circle).await.unwrap();
    h.session.start().unwrap();
    assert_eq!(h.session.status(), SessionStatus::Running);

    let pump = spawn_tick_pump(Arc::clone(&h.ticks));
    let session = h.session.clone();
    let stopped = wait_until(
        move || session.status() == SessionStatus::Stopped(StopReason::EpochLimit),
        Duration::from_secs(5),
    )
    .await;
    pump.abort();

    assert!(stopped, "loop should stop at the epoch limit");
    let history = h.session.history();
    assert_eq!(history.len(), 5);
    assert_eq!(history.last().unwrap().epoch, 5);
}

#[tokio::test]
async fn loop_early_stops_on_stagnating_validation_loss() {
    let counters = Arc::new(ModelCounters::default());
    let mut model = MockModel::new(Arc::clone(&counters));
    // Seed, then only non-improvements.
    model.val_losses = vec![1.0, 2.0, 3.0, 4.0];
    let h = harness_with(
        model,
        TrainingConfig::builder()
            .max_epochs(1000)
            .early_stopping_patience(3)
            .build(),
    );
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Gauss).await.unwrap();
    h.session.start().unwrap();

    let pump = spawn_tick_pump(Arc::clone(&h.ticks));
    let session = h.session.clone();
    let stopped = wait_until(
        move || session.status() == SessionStatus::Stopped(StopReason::EarlyStopping),
        Duration::from_secs(5),
    )
    .await;
    pump.abort();

    assert!(stopped, "loop should early-stop");
    // One seeding epoch plus exactly `patience` non-improvements.
    assert_eq!(h.session.history().len(), 4);
}

#[tokio::test]
async fn loop_error_stops_silently_and_surfaces_via_state() {
    let counters = Arc::new(ModelCounters::default());
    let mut model = MockModel::new(Arc::clone(&counters));
    model.fail_train_at = Some(2);
    let h = harness_with(model, TrainingConfig::default());
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Circle).await.unwrap();
    // start() itself succeeds; the failure is only observable via state.
    h.session.start().unwrap();

    let pump = spawn_tick_pump(Arc::clone(&h.ticks));
    let session = h.session.clone();
    let stopped = wait_until(
        move || session.status() == SessionStatus::Stopped(StopReason::Error),
        Duration::from_secs(5),
    )
    .await;
    pump.abort();

    assert!(stopped, "loop should stop on a step failure");
    // The failing epoch never reaches the history.
    assert_eq!(h.session.history().len(), 1);
}

#[tokio::test]
async fn pause_and_resume() {
    let h = harness(TrainingConfig::default());
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Circle).await.unwrap();

    h.session.start().unwrap();
    assert_eq!(h.session.status(), SessionStatus::Running);

    h.session.pause();
    assert_eq!(h.session.status(), SessionStatus::Paused);
    let state = h.session.state();
    assert!(state.is_running && state.is_paused);

    // Paused ticks do not execute steps.
    let before = h.model_counters.train_calls.load(Ordering::SeqCst);
    for _ in 0..5 {
        h.ticks.notify_one();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.model_counters.train_calls.load(Ordering::SeqCst), before);

    h.session.start().unwrap();
    assert_eq!(h.session.status(), SessionStatus::Running);

    // A tick now runs exactly one epoch.
    h.ticks.notify_one();
    let counters = Arc::clone(&h.model_counters);
    assert!(
        wait_until(
            move || counters.train_calls.load(Ordering::SeqCst) == before + 1,
            Duration::from_secs(2),
        )
        .await
    );
    h.session.pause();
}

#[tokio::test]
async fn boundary_renders_every_tenth_epoch() {
    let h = harness(TrainingConfig::default());
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Circle).await.unwrap();

    for _ in 0..10 {
        h.session.step().await.unwrap();
    }
    assert_eq!(
        h.visualizer_counters.boundary_renders.load(Ordering::SeqCst),
        1
    );
    assert_eq!(h.model_counters.predict_calls.load(Ordering::SeqCst), 1);

    for _ in 0..9 {
        h.session.step().await.unwrap();
    }
    assert_eq!(
        h.visualizer_counters.boundary_renders.load(Ordering::SeqCst),
        1
    );
    h.session.step().await.unwrap();
    assert_eq!(
        h.visualizer_counters.boundary_renders.load(Ordering::SeqCst),
        2
    );
}

#[tokio::test]
async fn listeners_receive_snapshots_until_unsubscribed() {
    let h = harness(TrainingConfig::default());
    let seen = Arc::new(AtomicU32::new(0));
    let seen_in_listener = Arc::clone(&seen);
    let subscription = h.session.on_state_change(move |snapshot| {
        assert!(snapshot.current_epoch <= snapshot.max_epochs);
        seen_in_listener.fetch_add(1, Ordering::SeqCst);
    });

    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Circle).await.unwrap();
    h.session.step().await.unwrap();

    let after_step = seen.load(Ordering::SeqCst);
    assert!(after_step >= 3, "init, load, and step each notify");

    h.session.unsubscribe(subscription);
    h.session.step().await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), after_step);
}

#[tokio::test]
async fn update_config_repartitions_on_split_change() {
    let h = harness(TrainingConfig::default());
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Circle).await.unwrap();
    assert_eq!(h.session.training_partition_len(), 80);
    assert_eq!(h.session.validation_partition_len(), 20);

    h.session.update_config(
        TrainingConfig::builder().validation_split(0.5).build(),
    );
    assert_eq!(h.session.training_partition_len(), 50);
    assert_eq!(h.session.validation_partition_len(), 50);
}

#[tokio::test]
async fn failed_initialization_leaves_the_session_uninitialized() {
    let counters = Arc::new(ModelCounters::default());
    let mut model = MockModel::new(Arc::clone(&counters));
    model.fail_init = true;
    let h = harness_with(model, TrainingConfig::default());

    let err = h
        .session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TrainError::InitializationFailed { .. }));
    assert_eq!(h.session.status(), SessionStatus::Uninitialized);
}

#[tokio::test]
async fn dispose_clears_listeners_and_blocks_further_use() {
    let h = harness(TrainingConfig::default());
    h.session
        .set_hyperparameters(Hyperparameters::default())
        .await
        .unwrap();
    h.session.load_data(DatasetKind::Circle).await.unwrap();

    let seen = Arc::new(AtomicU32::new(0));
    let seen_in_listener = Arc::clone(&seen);
    let _subscription = h.session.on_state_change(move |_| {
        seen_in_listener.fetch_add(1, Ordering::SeqCst);
    });

    h.session.dispose();
    let err = h.session.step().await.unwrap_err();
    assert!(matches!(err, TrainError::Precondition { .. }));
    assert!(h.session.start().is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}
