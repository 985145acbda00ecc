//! Evaluation and reporting
//!
//! - `run_inference`: one full pass over a data source (used for validation)
//! - `evaluate_model`: reload-time evaluation of a split with metrics, a
//!   printed report and JSON/CSV outputs
//! - `plot_train_history`: accuracy and loss curves as SVG

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, ElementConversion},
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::burn_dataset::ClassifierBatcher;
use crate::dataset::stream::{DataSource, DataSourceConfig};
use crate::dataset::Split;
use crate::model::cnn::ImageClassifier;
use crate::training::history::TrainingHistory;
use crate::utils::charts::{generate_line_chart, DataSeries, YAxis, COLOR_PRIMARY, COLOR_SECONDARY};
use crate::utils::error::{ClassifierError, Result};
use crate::utils::logging::ProgressLogger;
use crate::utils::metrics::{Metrics, RunningAverage};

pub const ACCURACY_CHART: &str = "accuracy.svg";
pub const LOSS_CHART: &str = "loss.svg";

/// Predictions and mean loss over one pass
#[derive(Debug, Clone, Default)]
pub struct InferenceOutput {
    /// Mean categorical cross-entropy per sample
    pub loss: f64,
    pub predictions: Vec<usize>,
    pub targets: Vec<usize>,
}

impl InferenceOutput {
    pub fn accuracy(&self) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }
        let correct = self
            .predictions
            .iter()
            .zip(self.targets.iter())
            .filter(|(p, t)| p == t)
            .count();
        correct as f64 / self.targets.len() as f64
    }
}

/// Run `model` over exactly one pass of `source`
pub fn run_inference<B: Backend>(
    model: &ImageClassifier<B>,
    source: &DataSource,
    device: &B::Device,
) -> Result<InferenceOutput> {
    let batcher = ClassifierBatcher::<B>::new(device.clone(), source.config().image_size as usize);
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let steps = source.steps_per_epoch();

    let mut loss_avg = RunningAverage::new();
    let mut output = InferenceOutput {
        predictions: Vec::with_capacity(source.len()),
        targets: Vec::with_capacity(source.len()),
        ..Default::default()
    };
    let mut progress = ProgressLogger::new(&format!("Inference on {} split", source.split()), steps);

    for items in source.stream().take(steps) {
        let batch = batcher.batch(items?);
        let batch_size = batch.len();

        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        loss_avg.add(loss.into_scalar().elem::<f64>(), batch_size);

        output.predictions.extend(to_indices(logits.argmax(1).reshape([batch_size]))?);
        output.targets.extend(to_indices(batch.targets)?);
        progress.increment();
    }

    progress.finish();
    output.loss = loss_avg.average();
    Ok(output)
}

fn to_indices<B: Backend>(tensor: burn::tensor::Tensor<B, 1, burn::tensor::Int>) -> Result<Vec<usize>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ClassifierError::Training(format!("Failed to read predictions: {:?}", e)))?;
    Ok(values.into_iter().map(|v| v.max(0) as usize).collect())
}

/// Settings shared by every evaluated split
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub data: DataSourceConfig,
    /// Training class names; each split must match them
    pub class_names: Vec<String>,
    /// Where `<split>_metrics.json` and `<split>_confusion.csv` are written
    pub output_dir: Option<PathBuf>,
}

/// Result of evaluating one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub split: String,
    pub loss: f64,
    pub metrics: Metrics,
}

impl EvaluationReport {
    pub fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }

    /// Write `<split>_metrics.json` and `<split>_confusion.csv` into `dir`
    pub fn save(&self, dir: &Path, class_names: &[String]) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let json_path = dir.join(format!("{}_metrics.json", self.split));
        std::fs::write(&json_path, serde_json::to_string_pretty(self)?)?;

        let csv_path = dir.join(format!("{}_confusion.csv", self.split));
        self.metrics.confusion_matrix.save_csv(&csv_path, class_names)?;

        info!("Saved {} report to {:?}", self.split, json_path);
        Ok(())
    }
}

/// Evaluate `model` on the images under `directory`.
///
/// Random transforms in `augmentation` are always stripped: only the
/// rescaling is applied. Metrics do not depend on shuffling.
pub fn evaluate_model<B: Backend>(
    model: &ImageClassifier<B>,
    augmentation: &AugmentationConfig,
    directory: &Path,
    split: Split,
    config: &EvaluationConfig,
    device: &B::Device,
) -> Result<EvaluationReport> {
    let source = DataSource::from_directory(
        directory,
        split,
        Some(&config.class_names),
        config.data.clone(),
        augmentation.without_random_transforms(),
    )?;

    let output = run_inference(model, &source, device)?;
    let mut metrics = Metrics::from_predictions(
        &output.predictions,
        &output.targets,
        config.class_names.len(),
    )
    .with_class_names(&config.class_names);
    metrics.loss = Some(output.loss);

    info!(
        "{} split: loss {:.4}, accuracy {:.2}%",
        split,
        output.loss,
        metrics.accuracy * 100.0
    );

    println!("\n{}", format!("Evaluation on {} split", split).bold());
    println!("{}", metrics.display());
    println!("{}", metrics.confusion_matrix.display(Some(&config.class_names)));

    let report = EvaluationReport {
        split: split.to_string(),
        loss: output.loss,
        metrics,
    };

    if let Some(ref dir) = config.output_dir {
        report.save(dir, &config.class_names)?;
    }

    Ok(report)
}

/// Render training curves into `output_dir`; returns the written files
pub fn plot_train_history(history: &TrainingHistory, output_dir: &Path) -> Result<Vec<PathBuf>> {
    if history.is_empty() {
        return Err(ClassifierError::Training("cannot plot an empty history".to_string()));
    }

    let percent = |values: Vec<f64>| values.into_iter().map(|v| v * 100.0).collect::<Vec<_>>();
    let accuracy_series = vec![
        DataSeries::from_values("train", &percent(history.accuracies()), COLOR_PRIMARY),
        DataSeries::from_values("validation", &percent(history.val_accuracies()), COLOR_SECONDARY),
    ];
    let loss_series = vec![
        DataSeries::from_values("train", &history.losses(), COLOR_PRIMARY),
        DataSeries::from_values("validation", &history.val_losses(), COLOR_SECONDARY),
    ];

    let accuracy_path = output_dir.join(ACCURACY_CHART);
    generate_line_chart(
        "Training and Validation Accuracy",
        "Epoch",
        "Accuracy",
        &accuracy_series,
        YAxis::Percent,
        &accuracy_path,
    )?;

    let loss_path = output_dir.join(LOSS_CHART);
    generate_line_chart(
        "Training and Validation Loss",
        "Epoch",
        "Loss",
        &loss_series,
        YAxis::Auto,
        &loss_path,
    )?;

    info!("Saved training curves to {:?}", output_dir);
    Ok(vec![accuracy_path, loss_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cnn::ImageClassifierConfig;
    use crate::training::history::EpochRecord;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn make_split(root: &Path, classes: &[&str]) {
        for class in classes {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..3u8 {
                RgbImage::from_pixel(24, 24, Rgb([i * 40, 80, 120]))
                    .save(dir.join(format!("{}.png", i)))
                    .unwrap();
            }
        }
    }

    fn eval_config(output_dir: Option<PathBuf>) -> EvaluationConfig {
        EvaluationConfig {
            data: DataSourceConfig {
                image_size: 24,
                batch_size: 4,
                shuffle: true,
                seed: 3,
                cache_images: false,
            },
            class_names: vec!["a".to_string(), "b".to_string()],
            output_dir,
        }
    }

    fn model() -> ImageClassifier<TestBackend> {
        let config = ImageClassifierConfig::new()
            .with_num_classes(2)
            .with_input_size(24)
            .with_conv_filters([2, 2, 2])
            .with_hidden_units(4);
        ImageClassifier::new(&config, &Default::default())
    }

    #[test]
    fn test_inference_output_accuracy() {
        let output = InferenceOutput {
            loss: 0.0,
            predictions: vec![0, 1, 1, 0],
            targets: vec![0, 1, 0, 0],
        };
        assert!((output.accuracy() - 0.75).abs() < 1e-12);
        assert_eq!(InferenceOutput::default().accuracy(), 0.0);
    }

    #[test]
    fn test_evaluate_model_writes_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("test");
        make_split(&data, &["a", "b"]);
        let out = tmp.path().join("out");

        let report = evaluate_model(
            &model(),
            &AugmentationConfig::default(),
            &data,
            Split::Test,
            &eval_config(Some(out.clone())),
            &Default::default(),
        )
        .unwrap();

        assert_eq!(report.split, "test");
        assert_eq!(report.metrics.total_samples, 6);
        assert!((0.0..=1.0).contains(&report.accuracy()));
        assert!(report.loss.is_finite());
        assert!(out.join("test_metrics.json").is_file());
        assert!(out.join("test_confusion.csv").is_file());
    }

    #[test]
    fn test_shuffling_does_not_change_metrics() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["a", "b"]);
        let model = model();

        let mut shuffled = eval_config(None);
        shuffled.data.seed = 11;
        let mut ordered = eval_config(None);
        ordered.data.shuffle = false;

        let augmentation = AugmentationConfig::default();
        let run = |config: &EvaluationConfig| {
            evaluate_model(
                &model,
                &augmentation,
                tmp.path(),
                Split::Validation,
                config,
                &Default::default(),
            )
            .unwrap()
        };
        let a = run(&shuffled);
        let b = run(&ordered);

        assert_eq!(a.metrics.correct_predictions, b.metrics.correct_predictions);
        assert_eq!(a.metrics.confusion_matrix.matrix, b.metrics.confusion_matrix.matrix);
        assert!((a.loss - b.loss).abs() < 1e-4);
    }

    #[test]
    fn test_mismatched_split_fails() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["a", "z"]);

        let err = evaluate_model(
            &model(),
            &AugmentationConfig::rescale_only(),
            tmp.path(),
            Split::Test,
            &eval_config(None),
            &Default::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ClassifierError::ClassMismatch { .. }));
    }

    #[test]
    fn test_plot_train_history() {
        let tmp = tempfile::tempdir().unwrap();
        let mut history = TrainingHistory::new();
        for epoch in 1..=3 {
            history
                .push(EpochRecord {
                    epoch,
                    loss: 1.0 / epoch as f64,
                    accuracy: 0.3 * epoch as f64,
                    val_loss: 1.2 / epoch as f64,
                    val_accuracy: 0.25 * epoch as f64,
                })
                .unwrap();
        }

        let files = plot_train_history(&history, tmp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(tmp.path().join(ACCURACY_CHART).is_file());
        assert!(tmp.path().join(LOSS_CHART).is_file());

        assert!(plot_train_history(&TrainingHistory::new(), tmp.path()).is_err());
    }
}
