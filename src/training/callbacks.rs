//! Epoch-end callbacks: early stopping and best-only checkpoint selection
//!
//! Both monitor validation accuracy (higher is better). A NaN value never
//! counts as an improvement.

use tracing::debug;

fn improves(value: f64, best: Option<f64>) -> bool {
    !value.is_nan() && best.map_or(true, |b| value > b)
}

/// Stop training once validation accuracy has plateaued
///
/// Epochs before `start_from_epoch` (1-based) are ignored entirely: they set
/// no best value and add nothing to `wait`. From then on `wait` counts
/// consecutive epochs without a strict improvement and training stops once
/// `wait >= patience`.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    start_from_epoch: usize,
    best: Option<f64>,
    best_epoch: usize,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(patience: usize, start_from_epoch: usize) -> Self {
        Self {
            patience,
            start_from_epoch,
            best: None,
            best_epoch: 0,
            wait: 0,
            stopped_epoch: None,
        }
    }

    /// Record the end of `epoch`; returns true if training should stop
    pub fn on_epoch_end(&mut self, epoch: usize, val_accuracy: f64) -> bool {
        if epoch < self.start_from_epoch {
            return false;
        }

        if improves(val_accuracy, self.best) {
            self.best = Some(val_accuracy);
            self.best_epoch = epoch;
            self.wait = 0;
        } else {
            self.wait += 1;
            debug!(
                "No improvement for {} epochs (best: {:.4} at epoch {})",
                self.wait,
                self.best.unwrap_or(f64::NAN),
                self.best_epoch
            );
        }

        let stop = self.wait >= self.patience;
        if stop {
            self.stopped_epoch = Some(epoch);
        }
        stop
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn wait(&self) -> usize {
        self.wait
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

/// Decides when the model should be written: only on a strict improvement
/// over every earlier epoch.
#[derive(Debug, Clone, Default)]
pub struct ModelCheckpoint {
    best: Option<f64>,
    best_epoch: usize,
    /// (epoch, val_accuracy) of every save, in order
    saves: Vec<(usize, f64)>,
}

impl ModelCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the model of `epoch` should overwrite the checkpoint
    pub fn on_epoch_end(&mut self, epoch: usize, val_accuracy: f64) -> bool {
        if !improves(val_accuracy, self.best) {
            return false;
        }
        self.best = Some(val_accuracy);
        self.best_epoch = epoch;
        self.saves.push((epoch, val_accuracy));
        true
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn saves(&self) -> &[(usize, f64)] {
        &self.saves
    }
}
