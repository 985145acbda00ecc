//! Model module
//!
//! - The CNN architecture (`cnn`)
//! - Run configuration: data, training and pipeline settings (`config`)

pub mod cnn;
pub mod config;

pub use cnn::{ImageClassifier, ImageClassifierConfig};
pub use config::{DataConfig, PipelineConfig, TrainingConfig};
