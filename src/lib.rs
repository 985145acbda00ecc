//! # Image Classifier
//!
//! Trains a small convolutional network on images laid out as
//! `data/{train,val,test}/<class>/*`, keeps the checkpoint with the best
//! validation accuracy, then reloads it, evaluates every split and plots the
//! training curves. Built on the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: Directory discovery, augmentation, split storage and Burn batcher, batch streams
//! - `model`: CNN architecture and run configuration
//! - `training`: Trainer state machine, callbacks, checkpoints, history
//! - `evaluation`: Split evaluation, reports and training curves
//! - `pipeline`: The end-to-end run
//! - `utils`: Logging, metrics, charts and errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use image_classifier::backend::{default_device, TrainingBackend};
//! use image_classifier::{run_pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let summary = run_pipeline::<TrainingBackend>(&config, &default_device())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod evaluation;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

pub use dataset::{AugmentationConfig, DataSource, DirectoryDataset, Split};
pub use evaluation::{evaluate_model, plot_train_history, EvaluationReport};
pub use model::{ImageClassifier, ImageClassifierConfig, PipelineConfig, TrainingConfig};
pub use pipeline::{run_pipeline, PipelineSummary};
pub use training::{FitOutcome, Trainer, TrainingHistory, TrainingPhase};
pub use utils::error::{ClassifierError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Number of classes in the reference dataset
pub const NUM_CLASSES: usize = 6;

/// Default image size (square)
pub const IMAGE_SIZE: usize = 256;

pub const BATCH_SIZE: usize = 32;

/// Seed used for weight init, shuffling and augmentation unless configured
pub const DEFAULT_SEED: u64 = 42;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
