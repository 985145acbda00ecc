//! Per-epoch training history
//!
//! Append-only record of train/validation loss and accuracy, saved as JSON
//! next to the checkpoint and read back for plotting.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{ClassifierError, Result};

/// Metrics of one finished epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next epoch; epochs must arrive in order starting at 1
    pub fn push(&mut self, record: EpochRecord) -> Result<()> {
        let expected = self.epochs.len() + 1;
        if record.epoch != expected {
            return Err(ClassifierError::Training(format!(
                "history expected epoch {} but got {}",
                expected, record.epoch
            )));
        }
        self.epochs.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.epochs
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    pub fn losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.loss).collect()
    }

    pub fn accuracies(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.accuracy).collect()
    }

    pub fn val_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.val_loss).collect()
    }

    pub fn val_accuracies(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.val_accuracy).collect()
    }

    /// Epoch with the highest validation accuracy (first one on ties)
    pub fn best_epoch(&self) -> Option<&EpochRecord> {
        self.epochs.iter().fold(None, |best: Option<&EpochRecord>, r| match best {
            Some(b) if b.val_accuracy >= r.val_accuracy || r.val_accuracy.is_nan() => Some(b),
            None if r.val_accuracy.is_nan() => None,
            _ => Some(r),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClassifierError::PathNotFound(path.to_path_buf()));
        }
        let history: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, val_accuracy: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            loss: 1.0 / epoch as f64,
            accuracy: 0.5,
            val_loss: 0.9,
            val_accuracy,
        }
    }

    #[test]
    fn test_push_in_order() {
        let mut history = TrainingHistory::new();
        history.push(record(1, 0.4)).unwrap();
        history.push(record(2, 0.6)).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.val_accuracies(), vec![0.4, 0.6]);
        assert!(history.push(record(4, 0.7)).is_err());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_best_epoch_prefers_first_on_tie() {
        let mut history = TrainingHistory::new();
        for (i, acc) in [0.3, 0.7, 0.7, f64::NAN, 0.5].iter().enumerate() {
            history.push(record(i + 1, *acc)).unwrap();
        }
        assert_eq!(history.best_epoch().unwrap().epoch, 2);
        assert!(TrainingHistory::new().best_epoch().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = TrainingHistory::new();
        history.push(record(1, 0.25)).unwrap();
        history.save(&path).unwrap();

        assert_eq!(TrainingHistory::load(&path).unwrap(), history);
    }
}
