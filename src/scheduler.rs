//! Learning-rate schedules.
//!
//! The scheduler computes the effective learning rate for a given epoch
//! under a configurable policy. All policies share an optional linear
//! warmup: for `epoch < warmup_epochs` the rate ramps as
//! `initial * (epoch + 1) / warmup_epochs`, and beyond warmup the policy is
//! evaluated against `effective_epoch = epoch - warmup_epochs`.
//!
//! Policies and their parameter defaults:
//!
//! | Kind | Formula | Defaults |
//! |---|---|---|
//! | `None` | `initial` | — |
//! | `Exponential` | `initial * r^e` | `r = 0.95` |
//! | `Step` | `initial * r^floor(e / s)` | `r = 0.5`, `s = 10` |
//! | `Cosine` | `initial * (1 + cos(π·min(e/E, 1))) / 2` | `E = max(max_epochs − warmup, 1)`, `max_epochs` defaults to 100 |
//! | `CyclicTriangular` | triangular wave between `min_lr` and `initial` | `cycle = 20`, `min_lr = initial/10` |
//! | `CyclicCosine` | `min + (initial − min)·(1 + cos(π·pos/cycle)) / 2` | same |
//!
//! [`LearningRateScheduler::has_significant_change`] lets the session skip
//! propagating near-identical rates to the model's optimizer.

use std::f64::consts::PI;

use crate::config::{LrScheduleConfig, LrScheduleKind};

/// Relative change below which a new learning rate is not worth
/// propagating to the model.
pub const LR_SIGNIFICANCE_THRESHOLD: f64 = 0.01;

const DEFAULT_EXPONENTIAL_DECAY: f64 = 0.95;
const DEFAULT_STEP_DECAY: f64 = 0.5;
const DEFAULT_DECAY_STEPS: u32 = 10;
const DEFAULT_CYCLE_LENGTH: u32 = 20;
const DEFAULT_MAX_EPOCHS: u32 = 100;

/// Computes per-epoch learning rates under a configurable policy.
#[derive(Debug, Clone)]
pub struct LearningRateScheduler {
    initial_lr: f64,
    current_lr: f64,
    schedule: LrScheduleConfig,
}

impl LearningRateScheduler {
    /// Creates a scheduler with the given base rate and schedule.
    #[must_use]
    pub fn new(initial_lr: f64, schedule: LrScheduleConfig) -> Self {
        Self {
            initial_lr,
            current_lr: initial_lr,
            schedule,
        }
    }

    /// Computes the learning rate for `epoch` (0-based) and remembers it as
    /// the current rate.
    ///
    /// `max_epochs` bounds the cosine decay; when absent it defaults to
    /// 100 epochs.
    pub fn calculate_lr(&mut self, epoch: u32, max_epochs: Option<u32>) -> f64 {
        let warmup = self.schedule.warmup_epochs;

        let lr = if warmup > 0 && epoch < warmup {
            self.initial_lr * f64::from(epoch + 1) / f64::from(warmup)
        } else {
            let effective = f64::from(epoch - warmup);
            match self.schedule.kind {
                LrScheduleKind::None => self.initial_lr,
                LrScheduleKind::Exponential => {
                    let rate = self.schedule.decay_rate.unwrap_or(DEFAULT_EXPONENTIAL_DECAY);
                    self.initial_lr * rate.powf(effective)
                }
                LrScheduleKind::Step => {
                    let rate = self.schedule.decay_rate.unwrap_or(DEFAULT_STEP_DECAY);
                    let steps = self.schedule.decay_steps.unwrap_or(DEFAULT_DECAY_STEPS).max(1);
                    let exponent = (effective / f64::from(steps)).floor();
                    self.initial_lr * rate.powf(exponent)
                }
                LrScheduleKind::Cosine => {
                    let max = max_epochs.unwrap_or(DEFAULT_MAX_EPOCHS);
                    let effective_max = max.saturating_sub(warmup).max(1);
                    let progress = (effective / f64::from(effective_max)).min(1.0);
                    self.initial_lr * 0.5 * (1.0 + (PI * progress).cos())
                }
                LrScheduleKind::CyclicTriangular => {
                    let (cycle, min_lr) = self.cyclic_params();
                    let pos = effective % f64::from(cycle);
                    let half = f64::from(cycle) / 2.0;
                    if pos <= half {
                        min_lr + (self.initial_lr - min_lr) * pos / half
                    } else {
                        self.initial_lr - (self.initial_lr - min_lr) * (pos - half) / half
                    }
                }
                LrScheduleKind::CyclicCosine => {
                    let (cycle, min_lr) = self.cyclic_params();
                    let pos = effective % f64::from(cycle);
                    min_lr
                        + (self.initial_lr - min_lr)
                            * 0.5
                            * (1.0 + (PI * pos / f64::from(cycle)).cos())
                }
            }
        };

        self.current_lr = lr;
        lr
    }

    /// The rate computed by the most recent [`calculate_lr`] call.
    ///
    /// [`calculate_lr`]: Self::calculate_lr
    #[must_use]
    pub fn current_lr(&self) -> f64 {
        self.current_lr
    }

    /// The base learning rate.
    #[must_use]
    pub fn initial_lr(&self) -> f64 {
        self.initial_lr
    }

    /// Replaces the base learning rate and resets the current rate to it.
    pub fn set_initial_lr(&mut self, lr: f64) {
        self.initial_lr = lr;
        self.current_lr = lr;
    }

    /// Replaces the schedule configuration.
    pub fn set_schedule(&mut self, schedule: LrScheduleConfig) {
        self.schedule = schedule;
    }

    /// Restores the current rate to the base rate.
    pub fn reset(&mut self) {
        self.current_lr = self.initial_lr;
    }

    /// Whether the current rate differs from `previous` by more than
    /// `threshold`, relative to `previous`.
    ///
    /// A non-positive `previous` always counts as a significant change.
    #[must_use]
    pub fn has_significant_change(&self, previous: f64, threshold: f64) -> bool {
        if previous <= 0.0 {
            return true;
        }
        (self.current_lr - previous).abs() / previous > threshold
    }

    fn cyclic_params(&self) -> (u32, f64) {
        let cycle = self.schedule.cycle_length.unwrap_or(DEFAULT_CYCLE_LENGTH).max(1);
        let min_lr = self.schedule.min_lr.unwrap_or(self.initial_lr / 10.0);
        (cycle, min_lr)
    }
}
