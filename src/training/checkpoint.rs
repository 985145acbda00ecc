//! Checkpoint storage
//!
//! The best model is written at full precision with Burn's MessagePack
//! recorder to
//! `<dir>/<name>.mpk`, overwriting the previous best. A small JSON sidecar
//! records which epoch it came from, and the run configuration is stored
//! beside it so the architecture can be rebuilt before loading weights.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::cnn::{ImageClassifier, ImageClassifierConfig};
use crate::model::config::PipelineConfig;
use crate::utils::error::{ClassifierError, Result};

/// Extension appended by the recorder
pub const MODEL_EXTENSION: &str = "mpk";
pub const RUN_CONFIG_FILE: &str = "run_config.json";

/// Where and when the stored weights were produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub epoch: usize,
    pub val_accuracy: f64,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    name: String,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.output_dir, &config.checkpoint_name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path handed to the recorder (no extension)
    pub fn stem_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Path of the file on disk
    pub fn model_path(&self) -> PathBuf {
        self.stem_path().with_extension(MODEL_EXTENSION)
    }

    fn info_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    pub fn exists(&self) -> bool {
        self.model_path().is_file()
    }

    /// Overwrite the stored weights with `model`
    pub fn save_model<B: Backend>(
        &self,
        model: &ImageClassifier<B>,
        epoch: usize,
        val_accuracy: f64,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(self.stem_path(), &recorder)
            .map_err(|e| ClassifierError::Checkpoint(format!("Failed to save model: {:?}", e)))?;

        let info = CheckpointInfo {
            epoch,
            val_accuracy,
            saved_at: Utc::now(),
        };
        std::fs::write(self.info_path(), serde_json::to_string_pretty(&info)?)?;

        debug!("Saved checkpoint {:?} (epoch {})", self.model_path(), epoch);
        Ok(())
    }

    /// Build a fresh model from `config` and load the stored weights into it
    pub fn load_model<B: Backend>(
        &self,
        config: &ImageClassifierConfig,
        device: &B::Device,
    ) -> Result<ImageClassifier<B>> {
        let path = self.model_path();
        if !path.is_file() {
            return Err(ClassifierError::Checkpoint(format!(
                "no checkpoint at {:?}; was any epoch an improvement?",
                path
            )));
        }

        info!("Loading checkpoint from {:?}", path);
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        ImageClassifier::new(config, device)
            .load_file(self.stem_path(), &recorder, device)
            .map_err(|e| ClassifierError::Checkpoint(format!("Failed to load model: {:?}", e)))
    }

    pub fn load_info(&self) -> Result<CheckpointInfo> {
        let path = self.info_path();
        if !path.is_file() {
            return Err(ClassifierError::PathNotFound(path));
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    pub fn save_run_config(&self, config: &PipelineConfig) -> Result<()> {
        config.save(&self.dir.join(RUN_CONFIG_FILE))
    }
}
