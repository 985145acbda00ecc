//! Logging Module
//!
//! Structured logging with the `tracing` crate, plus small helpers that keep
//! the training loop's log lines consistent.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::utils::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name, falling back to `Info`
    pub fn from_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Install the global tracing subscriber
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Progress logger for long-running operations such as image preloading
pub struct ProgressLogger {
    operation: String,
    total: usize,
    current: usize,
    log_interval: usize,
    start_time: Instant,
}

impl ProgressLogger {
    pub fn new(operation: &str, total: usize) -> Self {
        Self {
            operation: operation.to_string(),
            total,
            current: 0,
            log_interval: (total / 10).max(1),
            start_time: Instant::now(),
        }
    }

    /// Increment progress by 1, logging every tenth of the way
    pub fn increment(&mut self) {
        self.current += 1;

        if self.current % self.log_interval == 0 || self.current == self.total {
            let percentage = 100.0 * self.current as f64 / self.total.max(1) as f64;
            tracing::debug!(
                "{}: {}/{} ({:.1}%)",
                self.operation,
                self.current,
                self.total,
                percentage
            );
        }
    }

    /// Log completion
    pub fn finish(&self) {
        tracing::info!(
            "{}: completed {} items in {}",
            self.operation,
            self.current,
            format_duration(self.start_time.elapsed().as_secs_f64())
        );
    }
}

/// Training progress logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (1-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::info!("Epoch {}/{} started", epoch, self.total_epochs);
    }

    /// Log end of an epoch with its metrics
    pub fn end_epoch(&self, loss: f64, accuracy: f64, val_loss: f64, val_accuracy: f64) {
        tracing::info!(
            "Epoch {}/{} completed in {} | loss: {:.4} | acc: {:.2}% | val_loss: {:.4} | val_acc: {:.2}%",
            self.epoch,
            self.total_epochs,
            format_duration(self.epoch_start.elapsed().as_secs_f64()),
            loss,
            accuracy * 100.0,
            val_loss,
            val_accuracy * 100.0
        );
    }

    /// Log a new best model
    pub fn log_new_best(&self, previous: Option<f64>, accuracy: f64) {
        match previous {
            Some(prev) => tracing::info!(
                "val_accuracy improved from {:.2}% to {:.2}%, saving checkpoint",
                prev * 100.0,
                accuracy * 100.0
            ),
            None => tracing::info!(
                "val_accuracy {:.2}% is the first result, saving checkpoint",
                accuracy * 100.0
            ),
        }
    }

    /// Log early stopping
    pub fn log_early_stop(&self, patience: usize, best_epoch: usize) {
        tracing::warn!(
            "Early stopping at epoch {}: no val_accuracy improvement for {} epochs (best at epoch {})",
            self.epoch,
            patience,
            best_epoch
        );
    }

    /// Log training completion
    pub fn log_complete(&self, epochs_run: usize, best_accuracy: f64) {
        tracing::info!(
            "Training finished after {} epochs in {} | best val_accuracy: {:.2}%",
            epochs_run,
            format_duration(self.training_start.elapsed().as_secs_f64()),
            best_accuracy * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_name() {
        assert_eq!(LogLevel::from_name("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_name("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from_name("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from_name("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
    }

    #[test]
    fn test_progress_logger_counts() {
        let mut logger = ProgressLogger::new("Test", 20);
        for _ in 0..5 {
            logger.increment();
        }
        assert_eq!(logger.current, 5);
    }
}
