//! End-to-end training pipeline
//!
//! configure data → define model → fit → reload best checkpoint →
//! evaluate train/val/test → plot history
//!
//! The model returned by training (`trained_model`) holds the last epoch's
//! weights. It is dropped and a fresh `best_model` is restored from the
//! checkpoint for evaluation.

use std::path::{Path, PathBuf};

use burn::{
    optim::AdamConfig,
    tensor::backend::{AutodiffBackend, Backend},
};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::loader::DirectoryDataset;
use crate::dataset::stream::DataSource;
use crate::dataset::Split;
use crate::evaluation::{evaluate_model, plot_train_history, EvaluationConfig, EvaluationReport};
use crate::model::cnn::ImageClassifier;
use crate::model::config::PipelineConfig;
use crate::training::checkpoint::{CheckpointManager, RUN_CONFIG_FILE};
use crate::training::trainer::{FitOutcome, Trainer};
use crate::utils::error::Result;

pub const HISTORY_FILE: &str = "history.json";
pub const SUMMARY_FILE: &str = "summary.json";

/// Outcome of a full run, also written to `summary.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub outcome: FitOutcome,
    pub class_names: Vec<String>,
    pub checkpoint: PathBuf,
    /// Train, validation and test reports, in that order
    pub reports: Vec<EvaluationReport>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineSummary {
    pub fn report(&self, split: Split) -> Option<&EvaluationReport> {
        self.reports.iter().find(|r| r.split == split.as_str())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn print(&self) {
        println!("\n{}", "Run Summary".green().bold());
        println!(
            "  Stopped: {} after {} epochs (best epoch {})",
            self.outcome.phase, self.outcome.epochs_run, self.outcome.best_epoch
        );
        for report in &self.reports {
            println!(
                "  {:<6} loss {:>8.4}  accuracy {:>6.2}%",
                report.split,
                report.loss,
                report.accuracy() * 100.0
            );
        }
        println!("  Checkpoint: {:?}", self.checkpoint);
    }
}

/// Train, reload the best checkpoint, evaluate all splits and plot history
pub fn run_pipeline<B: AutodiffBackend>(
    config: &PipelineConfig,
    device: &B::Device,
) -> Result<PipelineSummary> {
    config.validate()?;
    std::fs::create_dir_all(&config.output_dir)?;

    // Data
    println!("{}", "Loading Dataset...".cyan());
    let train = DataSource::from_directory(
        &config.data.train_dir,
        Split::Train,
        None,
        config.data.source_config(config.data.shuffle_train, config.seed),
        config.augmentation.clone(),
    )?;
    let class_names = train.class_names().to_vec();
    config.check_num_classes(class_names.len())?;

    let val = DataSource::from_directory(
        &config.data.val_dir,
        Split::Validation,
        Some(&class_names),
        config.data.source_config(config.data.shuffle_eval, config.seed),
        config.augmentation.without_random_transforms(),
    )?;
    // only checked here; the test split is read again at evaluation time
    DirectoryDataset::scan_with_classes(&config.data.test_dir, Split::Test, &class_names)?
        .get_stats()
        .print();

    // Model
    println!("{}", "Building Model...".cyan());
    B::seed(config.seed);
    let trained_model = ImageClassifier::<B>::new(&config.model, device);
    info!(
        "ImageClassifier: {} classes, {} features into the dense head",
        config.model.num_classes,
        config.model.flattened_features()
    );

    // Fit
    println!("{}", "Training...".green().bold());
    let checkpoints = CheckpointManager::from_config(config);
    checkpoints.save_run_config(config)?;

    let mut trainer = Trainer::new(trained_model, config.training.clone(), device.clone());
    trainer.compile(AdamConfig::new())?;
    let outcome = trainer.fit(&train, &val, &checkpoints)?;

    let history = trainer.history().clone();
    history.save(&config.output_dir.join(HISTORY_FILE))?;
    drop(trainer);

    // Evaluate the best checkpoint, not the last epoch
    println!("{}", "Evaluating Best Model...".green().bold());
    let best_model = checkpoints.load_model::<B::InnerBackend>(&config.model, device)?;
    let reports = evaluate_splits(&best_model, config, &class_names, device)?;

    plot_train_history(&history, &config.output_dir)?;

    let summary = PipelineSummary {
        outcome,
        class_names,
        checkpoint: checkpoints.model_path(),
        reports,
        finished_at: Utc::now(),
    };
    summary.save(&config.output_dir.join(SUMMARY_FILE))?;
    summary.print();

    Ok(summary)
}

/// Evaluate `model` on train, validation and test in that order
pub fn evaluate_splits<B: Backend>(
    model: &ImageClassifier<B>,
    config: &PipelineConfig,
    class_names: &[String],
    device: &B::Device,
) -> Result<Vec<EvaluationReport>> {
    let eval_config = EvaluationConfig {
        data: config.data.source_config(config.data.shuffle_eval, config.seed),
        class_names: class_names.to_vec(),
        output_dir: Some(config.output_dir.clone()),
    };

    let splits = [
        (Split::Train, &config.data.train_dir),
        (Split::Validation, &config.data.val_dir),
        (Split::Test, &config.data.test_dir),
    ];

    splits
        .into_iter()
        .map(|(split, dir)| {
            evaluate_model(model, &config.augmentation, dir, split, &eval_config, device)
        })
        .collect()
}

/// Reload a finished run from its output directory and evaluate it again
pub fn evaluate_run<B: Backend>(run_dir: &Path, device: &B::Device) -> Result<Vec<EvaluationReport>> {
    let mut config = PipelineConfig::load(&run_dir.join(RUN_CONFIG_FILE))?;
    config.output_dir = run_dir.to_path_buf();

    let checkpoints = CheckpointManager::from_config(&config);
    let model = checkpoints.load_model::<B>(&config.model, device)?;
    match checkpoints.load_info() {
        Ok(saved) => info!(
            "Best checkpoint: epoch {}, val_accuracy {:.2}%, saved {}",
            saved.epoch,
            saved.val_accuracy * 100.0,
            saved.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        Err(e) => warn!("No checkpoint metadata: {}", e),
    }

    let class_names = DirectoryDataset::scan(&config.data.train_dir)?.class_names;
    config.check_num_classes(class_names.len())?;

    evaluate_splits(&model, &config, &class_names, device)
}
