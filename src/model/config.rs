//! Run configuration
//!
//! Defines the data, training and pipeline settings. Defaults reproduce the
//! reference run: 256×256 RGB input, batch size 32, Adam at 0.001, up to 200
//! epochs with early stopping (patience 20, not before epoch 50), seed 42.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::stream::DataSourceConfig;
use crate::model::cnn::ImageClassifierConfig;
use crate::utils::error::{ClassifierError, Result};

/// Where the splits live and how they are batched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    pub test_dir: PathBuf,

    /// Images are resized to `image_size × image_size`
    pub image_size: usize,

    pub batch_size: usize,

    /// Shuffle the training split every epoch
    pub shuffle_train: bool,

    /// Shuffle validation/test streams (does not change their metrics)
    pub shuffle_eval: bool,

    /// Decode all images once and keep them in memory
    pub cache_images: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self::from_root(Path::new("data"))
    }
}

impl DataConfig {
    /// Use `<root>/train`, `<root>/val` and `<root>/test`
    pub fn from_root(root: &Path) -> Self {
        Self {
            train_dir: root.join("train"),
            val_dir: root.join("val"),
            test_dir: root.join("test"),
            image_size: crate::IMAGE_SIZE,
            batch_size: crate::BATCH_SIZE,
            shuffle_train: true,
            shuffle_eval: true,
            cache_images: false,
        }
    }

    /// Point the three splits at `<root>/{train,val,test}`
    pub fn set_root(&mut self, root: &Path) {
        self.train_dir = root.join("train");
        self.val_dir = root.join("val");
        self.test_dir = root.join("test");
    }

    /// Batching settings for one split
    pub fn source_config(&self, shuffle: bool, seed: u64) -> DataSourceConfig {
        DataSourceConfig {
            image_size: self.image_size as u32,
            batch_size: self.batch_size,
            shuffle,
            seed,
            cache_images: self.cache_images,
        }
    }
}

/// Optimizer and stopping settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Upper bound on the number of epochs
    pub epochs: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    pub early_stopping: bool,

    /// Epochs without val accuracy improvement before stopping
    pub patience: usize,

    /// First epoch (1-based) that early stopping monitors; earlier ones are ignored
    pub start_from_epoch: usize,

    /// Log the running loss every N training steps (0 = never)
    pub log_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.001,
            early_stopping: true,
            patience: 20,
            start_from_epoch: 50,
            log_interval: 50,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.epochs == 0 {
            return Err("epochs must be greater than 0".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err("learning_rate must be a positive number".to_string());
        }
        if self.early_stopping && self.patience == 0 {
            return Err("patience must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Everything needed to reproduce one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub model: ImageClassifierConfig,
    pub training: TrainingConfig,
    /// Applied to the training split; other splits are only rescaled
    pub augmentation: AugmentationConfig,
    /// Checkpoint, history, reports and charts go here
    pub output_dir: PathBuf,
    /// Checkpoint file stem (the recorder appends `.mpk`)
    pub checkpoint_name: String,
    /// Seeds the backend, weight init, shuffling and augmentation
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            model: ImageClassifierConfig::new(),
            training: TrainingConfig::default(),
            augmentation: AugmentationConfig::default(),
            output_dir: PathBuf::from("artifacts"),
            checkpoint_name: "best_model".to_string(),
            seed: crate::DEFAULT_SEED,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClassifierError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check internal consistency before any data is touched
    pub fn validate(&self) -> Result<()> {
        if self.data.image_size != self.model.input_size {
            return Err(ClassifierError::Config(format!(
                "data.image_size ({}) must equal model.input_size ({})",
                self.data.image_size, self.model.input_size
            )));
        }
        if self.data.batch_size == 0 {
            return Err(ClassifierError::Config("batch_size must be greater than 0".to_string()));
        }
        if self.checkpoint_name.is_empty() {
            return Err(ClassifierError::Config("checkpoint_name must not be empty".to_string()));
        }
        self.model.validate().map_err(ClassifierError::Config)?;
        self.training.validate().map_err(ClassifierError::Config)?;
        self.augmentation.validate().map_err(ClassifierError::Config)?;
        Ok(())
    }

    /// The model's output width must match the classes found on disk
    pub fn check_num_classes(&self, found: usize) -> Result<()> {
        if self.model.num_classes != found {
            return Err(ClassifierError::Config(format!(
                "model.num_classes is {} but the training split has {} classes",
                self.model.num_classes, found
            )));
        }
        Ok(())
    }

    /// Path of the best checkpoint without extension
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(&self.checkpoint_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = PipelineConfig::default();
        assert_eq!(config.data.train_dir, PathBuf::from("data/train"));
        assert_eq!(config.data.image_size, 256);
        assert_eq!(config.data.batch_size, 32);
        assert_eq!(config.training.epochs, 200);
        assert_eq!(config.training.patience, 20);
        assert_eq!(config.training.start_from_epoch, 50);
        assert!((config.training.learning_rate - 0.001).abs() < 1e-12);
        assert_eq!(config.seed, 42);
        assert_eq!(config.checkpoint_path(), PathBuf::from("artifacts/best_model"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_image_size_must_match_model() {
        let mut config = PipelineConfig::default();
        config.data.image_size = 128;
        assert!(matches!(config.validate(), Err(ClassifierError::Config(_))));
    }

    #[test]
    fn test_num_classes_check() {
        let config = PipelineConfig::default();
        assert!(config.check_num_classes(6).is_ok());
        assert!(config.check_num_classes(5).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run_config.json");

        let mut config = PipelineConfig::default();
        config.training.epochs = 7;
        config.data.set_root(Path::new("/srv/images"));
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.training.epochs, 7);
        assert_eq!(loaded.data.val_dir, PathBuf::from("/srv/images/val"));
        assert_eq!(loaded.model.conv_filters, [32, 64, 128]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"training": {"epochs": 3}, "seed": 7}"#).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.training.epochs, 3);
        assert_eq!(loaded.training.patience, 20);
        assert_eq!(loaded.seed, 7);
    }
}
