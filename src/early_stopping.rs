//! Early stopping on stagnating validation loss.

/// Stateful monitor that signals when validation loss has stopped
/// improving for `patience` consecutive epochs.
///
/// With `patience == 0` or without a validation loss the monitor is inert
/// and never signals. `reset()` must run on re-initialization and on
/// session reset, otherwise stale patience state leaks across runs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: u32,
    best_val_loss: Option<f64>,
    epochs_without_improvement: u32,
}

impl EarlyStopping {
    /// Creates a monitor with the given patience.
    #[must_use]
    pub fn new(patience: u32) -> Self {
        Self {
            patience,
            best_val_loss: None,
            epochs_without_improvement: 0,
        }
    }

    /// Observes one epoch's validation loss and reports whether training
    /// should halt.
    ///
    /// The first observed value seeds the best; an improvement resets the
    /// counter; otherwise the counter grows and the monitor signals once it
    /// reaches the patience.
    pub fn should_stop(&mut self, val_loss: Option<f64>) -> bool {
        if self.patience == 0 {
            return false;
        }
        let Some(val_loss) = val_loss else {
            return false;
        };

        match self.best_val_loss {
            None => {
                self.best_val_loss = Some(val_loss);
                false
            }
            Some(best) if val_loss < best => {
                self.best_val_loss = Some(val_loss);
                self.epochs_without_improvement = 0;
                false
            }
            Some(_) => {
                self.epochs_without_improvement += 1;
                self.epochs_without_improvement >= self.patience
            }
        }
    }

    /// Updates the patience without touching the counters.
    pub fn set_patience(&mut self, patience: u32) {
        self.patience = patience;
    }

    /// The best validation loss observed so far.
    #[must_use]
    pub fn best_val_loss(&self) -> Option<f64> {
        self.best_val_loss
    }

    /// Consecutive epochs without improvement.
    #[must_use]
    pub fn epochs_without_improvement(&self) -> u32 {
        self.epochs_without_improvement
    }

    /// Clears the best value and the counter.
    pub fn reset(&mut self) {
        self.best_val_loss = None;
        self.epochs_without_improvement = 0;
    }
}
