//! Training driver
//!
//! Runs the bounded epoch loop with Burn:
//! - Forward/backward passes with automatic differentiation
//! - Categorical cross-entropy loss and Adam updates
//! - A full validation pass after every epoch
//! - Best-only checkpointing and early stopping on validation accuracy
//!
//! The trainer is a small state machine: it starts in `Configuring`,
//! `compile` binds the optimizer and moves it to `Running`, and `fit` ends in
//! `EarlyStopped`, `Completed` or `Failed`.

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::burn_dataset::ClassifierBatcher;
use crate::dataset::stream::{BatchStream, DataSource};
use crate::evaluation::run_inference;
use crate::model::cnn::ImageClassifier;
use crate::model::config::TrainingConfig;
use crate::training::callbacks::{EarlyStopping, ModelCheckpoint};
use crate::training::checkpoint::CheckpointManager;
use crate::training::history::{EpochRecord, TrainingHistory};
use crate::utils::error::{ClassifierError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, RunningAverage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingPhase {
    /// Model built, optimizer not bound yet
    Configuring,
    /// Compiled; fitting allowed
    Running,
    /// Validation accuracy plateaued after the warm-up
    EarlyStopped,
    /// The epoch ceiling was reached
    Completed,
    /// An error aborted fitting
    Failed,
}

impl std::fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrainingPhase::Configuring => "configuring",
            TrainingPhase::Running => "running",
            TrainingPhase::EarlyStopped => "early stopped",
            TrainingPhase::Completed => "completed",
            TrainingPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a call to `fit` ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome {
    pub phase: TrainingPhase,
    pub epochs_run: usize,
    /// Epoch of the stored checkpoint (0 if none was saved)
    pub best_epoch: usize,
    pub best_val_accuracy: Option<f64>,
}

/// Loss and accuracy of one pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Trainer for the ImageClassifier model
pub struct Trainer<B: AutodiffBackend> {
    model: ImageClassifier<B>,
    config: TrainingConfig,
    device: B::Device,
    phase: TrainingPhase,
    optimizer_config: Option<AdamConfig>,
    history: TrainingHistory,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: ImageClassifier<B>, config: TrainingConfig, device: B::Device) -> Self {
        Self {
            model,
            config,
            device,
            phase: TrainingPhase::Configuring,
            optimizer_config: None,
            history: TrainingHistory::new(),
        }
    }

    /// Bind the optimizer; loss is categorical cross-entropy and the
    /// reported metric is accuracy
    pub fn compile(&mut self, optimizer: AdamConfig) -> Result<()> {
        if self.phase != TrainingPhase::Configuring {
            return Err(ClassifierError::Training(format!(
                "compile called while {}",
                self.phase
            )));
        }
        self.config.validate().map_err(ClassifierError::Config)?;

        info!(
            "Compiled: Adam (lr = {}), categorical cross-entropy, metric = accuracy",
            self.config.learning_rate
        );
        self.optimizer_config = Some(optimizer);
        self.phase = TrainingPhase::Running;
        Ok(())
    }

    /// Train until the epoch ceiling or early stopping.
    ///
    /// Validation accuracy drives both callbacks; the model is written to
    /// `checkpoints` every time it strictly improves.
    pub fn fit(
        &mut self,
        train: &DataSource,
        val: &DataSource,
        checkpoints: &CheckpointManager,
    ) -> Result<FitOutcome> {
        let optimizer_config = match (self.phase, &self.optimizer_config) {
            (TrainingPhase::Running, Some(config)) => config.clone(),
            (TrainingPhase::Configuring, _) => {
                return Err(ClassifierError::Training(
                    "fit called before compile".to_string(),
                ))
            }
            (phase, _) => {
                return Err(ClassifierError::Training(format!("fit called while {}", phase)))
            }
        };

        match self.run_epochs(optimizer_config, train, val, checkpoints) {
            Ok(outcome) => {
                self.phase = outcome.phase;
                Ok(outcome)
            }
            Err(e) => {
                self.phase = TrainingPhase::Failed;
                Err(e)
            }
        }
    }

    fn run_epochs(
        &mut self,
        optimizer_config: AdamConfig,
        train: &DataSource,
        val: &DataSource,
        checkpoints: &CheckpointManager,
    ) -> Result<FitOutcome> {
        let mut optimizer = optimizer_config.init();
        let mut early_stopping =
            EarlyStopping::new(self.config.patience, self.config.start_from_epoch);
        let mut checkpoint = ModelCheckpoint::new();
        let mut logger = TrainingLogger::new(self.config.epochs);

        let steps = train.steps_per_epoch();
        let mut train_stream = train.stream();
        let mut phase = TrainingPhase::Completed;
        let mut epochs_run = 0;

        info!(
            "Training on {} samples ({} steps/epoch), validating on {}",
            train.len(),
            steps,
            val.len()
        );

        for epoch in 1..=self.config.epochs {
            logger.start_epoch(epoch);

            let train_metrics =
                self.train_epoch(&mut optimizer, &mut train_stream, steps, train.num_classes())?;
            let val_metrics = self.validate(val)?;

            logger.end_epoch(
                train_metrics.loss,
                train_metrics.accuracy,
                val_metrics.loss,
                val_metrics.accuracy,
            );
            self.history.push(EpochRecord {
                epoch,
                loss: train_metrics.loss,
                accuracy: train_metrics.accuracy,
                val_loss: val_metrics.loss,
                val_accuracy: val_metrics.accuracy,
            })?;
            epochs_run = epoch;

            let previous_best = checkpoint.best();
            if checkpoint.on_epoch_end(epoch, val_metrics.accuracy) {
                logger.log_new_best(previous_best, val_metrics.accuracy);
                checkpoints.save_model(&self.model.valid(), epoch, val_metrics.accuracy)?;
            }

            if self.config.early_stopping
                && early_stopping.on_epoch_end(epoch, val_metrics.accuracy)
            {
                logger.log_early_stop(early_stopping.patience(), early_stopping.best_epoch());
                phase = TrainingPhase::EarlyStopped;
                break;
            }
        }

        logger.log_complete(epochs_run, checkpoint.best().unwrap_or(0.0));
        if checkpoint.best().is_none() {
            warn!("Validation accuracy never produced a checkpoint");
        }

        Ok(FitOutcome {
            phase,
            epochs_run,
            best_epoch: checkpoint.best_epoch(),
            best_val_accuracy: checkpoint.best(),
        })
    }

    /// One pass of `steps` batches from the training stream
    pub fn train_epoch<O>(
        &mut self,
        optimizer: &mut O,
        stream: &mut BatchStream<'_>,
        steps: usize,
        num_classes: usize,
    ) -> Result<EpochMetrics>
    where
        O: Optimizer<ImageClassifier<B>, B>,
    {
        let batcher = ClassifierBatcher::<B>::new(self.device.clone(), stream.image_size());
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let mut loss_avg = RunningAverage::new();
        let mut accuracy = AccuracyTracker::new();

        for step in 1..=steps {
            let items = stream
                .next()
                .ok_or_else(|| ClassifierError::Training("training stream is empty".to_string()))??;
            let batch = batcher.batch(items);
            let batch_size = batch.len();

            let logits = self.model.forward(batch.images);
            if logits.dims()[1] != num_classes {
                return Err(ClassifierError::Training(format!(
                    "model outputs {} classes but the data has {}",
                    logits.dims()[1],
                    num_classes
                )));
            }
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            loss_avg.add(loss_value, batch_size);
            accuracy.add_counts(count_correct(logits, batch.targets), batch_size);

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = optimizer.step(self.config.learning_rate, self.model.clone(), grads);

            if self.config.log_interval > 0 && step % self.config.log_interval == 0 {
                debug!(
                    "  step {}/{}: loss {:.4} (running {:.4})",
                    step,
                    steps,
                    loss_value,
                    loss_avg.average()
                );
            }
        }

        Ok(EpochMetrics {
            loss: loss_avg.average(),
            accuracy: accuracy.accuracy(),
        })
    }

    /// Full pass over `val` with dropout disabled
    pub fn validate(&self, val: &DataSource) -> Result<EpochMetrics> {
        let output = run_inference(&self.model.valid(), val, &self.device)?;
        Ok(EpochMetrics {
            loss: output.loss,
            accuracy: output.accuracy(),
        })
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn model(&self) -> &ImageClassifier<B> {
        &self.model
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

/// Number of rows whose argmax equals the target
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use crate::dataset::stream::DataSourceConfig;
    use crate::dataset::Split;
    use crate::model::cnn::ImageClassifierConfig;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn make_split(root: &Path) {
        for (c, class) in ["dark", "light"].iter().enumerate() {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..3 {
                let value = (c * 200 + i * 10) as u8;
                RgbImage::from_pixel(24, 24, Rgb([value, value, value]))
                    .save(dir.join(format!("{}.png", i)))
                    .unwrap();
            }
        }
    }

    fn source(root: &Path, split: Split) -> DataSource {
        DataSource::from_directory(
            root,
            split,
            None,
            DataSourceConfig {
                image_size: 24,
                batch_size: 4,
                shuffle: true,
                seed: 1,
                cache_images: true,
            },
            AugmentationConfig::rescale_only(),
        )
        .unwrap()
    }

    fn trainer(epochs: usize) -> Trainer<TestBackend> {
        trainer_with(TrainingConfig {
            epochs,
            log_interval: 1,
            ..TrainingConfig::default()
        })
    }

    fn trainer_with(config: TrainingConfig) -> Trainer<TestBackend> {
        let device = Default::default();
        let model_config = ImageClassifierConfig::new()
            .with_num_classes(2)
            .with_input_size(24)
            .with_conv_filters([2, 2, 2])
            .with_hidden_units(4);
        let model = ImageClassifier::new(&model_config, &device);
        Trainer::new(model, config, device)
    }

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let logits = Tensor::<NdArray<f32>, 2>::from_data(
            TensorData::new(vec![0.9f32, 0.1, 0.2, 0.8, 0.7, 0.3], [3, 2]),
            &device,
        );
        let targets =
            Tensor::<NdArray<f32>, 1, Int>::from_data(TensorData::new(vec![0i64, 1, 1], [3]), &device);

        assert_eq!(count_correct(logits, targets), 2);
    }

    #[test]
    fn test_fit_before_compile_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path());
        let data = source(tmp.path(), Split::Train);
        let checkpoints = CheckpointManager::new(tmp.path().join("out"), "best_model");

        let mut trainer = trainer(1);
        assert_eq!(trainer.phase(), TrainingPhase::Configuring);
        assert!(trainer.fit(&data, &data, &checkpoints).is_err());
        assert_eq!(trainer.phase(), TrainingPhase::Configuring);
    }

    #[test]
    fn test_compile_twice_is_rejected() {
        let mut trainer = trainer(1);
        trainer.compile(AdamConfig::new()).unwrap();
        assert_eq!(trainer.phase(), TrainingPhase::Running);
        assert!(trainer.compile(AdamConfig::new()).is_err());
    }

    #[test]
    fn test_fit_runs_to_ceiling_and_checkpoints() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path());
        let train = source(tmp.path(), Split::Train);
        let val = train.for_inference(false);
        let checkpoints = CheckpointManager::new(tmp.path().join("out"), "best_model");

        let mut trainer = trainer(2);
        trainer.compile(AdamConfig::new()).unwrap();
        let outcome = trainer.fit(&train, &val, &checkpoints).unwrap();

        assert_eq!(outcome.phase, TrainingPhase::Completed);
        assert_eq!(trainer.phase(), TrainingPhase::Completed);
        assert_eq!(outcome.epochs_run, 2);
        assert_eq!(trainer.history().len(), 2);
        assert!(outcome.best_epoch >= 1);
        assert!(checkpoints.exists());
        for record in trainer.history().records() {
            assert!((0.0..=1.0).contains(&record.accuracy));
            assert!((0.0..=1.0).contains(&record.val_accuracy));
            assert!(record.loss.is_finite());
        }

        // a finished trainer cannot be fitted again
        assert!(trainer.fit(&train, &val, &checkpoints).is_err());
    }

    #[test]
    fn test_fit_early_stops() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path());
        let train = source(tmp.path(), Split::Train);
        let val = train.for_inference(false);
        let checkpoints = CheckpointManager::new(tmp.path().join("out"), "best_model");

        // a vanishing learning rate keeps validation accuracy flat
        let mut trainer = trainer_with(TrainingConfig {
            epochs: 10,
            learning_rate: 1e-12,
            patience: 1,
            start_from_epoch: 0,
            ..TrainingConfig::default()
        });
        trainer.compile(AdamConfig::new()).unwrap();
        let outcome = trainer.fit(&train, &val, &checkpoints).unwrap();

        assert_eq!(outcome.phase, TrainingPhase::EarlyStopped);
        assert_eq!(trainer.phase(), TrainingPhase::EarlyStopped);
        assert_eq!(outcome.epochs_run, 2);
        assert_eq!(trainer.history().len(), 2);
        assert_eq!(outcome.best_epoch, 1);
    }
}
