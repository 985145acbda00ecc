//! Training module
//!
//! - The trainer state machine and epoch loop (`trainer`)
//! - Early stopping and best-only checkpoint callbacks (`callbacks`)
//! - Checkpoint storage with Burn's recorder (`checkpoint`)
//! - Per-epoch history (`history`)

pub mod callbacks;
pub mod checkpoint;
pub mod history;
pub mod trainer;

pub use callbacks::{EarlyStopping, ModelCheckpoint};
pub use checkpoint::CheckpointManager;
pub use history::{EpochRecord, TrainingHistory};
pub use trainer::{FitOutcome, Trainer, TrainingPhase};
