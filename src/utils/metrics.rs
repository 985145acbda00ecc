//! Classification metrics
//!
//! - Accuracy
//! - Per-class precision, recall and F1
//! - Macro and support-weighted averages
//! - Confusion matrix (rows = actual, columns = predicted)

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Metrics for one evaluated split
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Mean categorical cross-entropy, filled in by the evaluator
    pub loss: Option<f64>,

    /// Average of per-class precisions over classes with support
    pub macro_precision: f64,

    pub macro_recall: f64,

    pub macro_f1: f64,

    /// F1 weighted by class support
    pub weighted_f1: f64,

    pub per_class: Vec<ClassMetrics>,

    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Build metrics from predicted and ground-truth class indices
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        assert_eq!(
            predictions.len(),
            ground_truth.len(),
            "Predictions and ground truth must have same length"
        );

        let total_samples = predictions.len();
        if total_samples == 0 {
            return Self {
                confusion_matrix: ConfusionMatrix::new(num_classes),
                ..Self::default()
            };
        }

        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);
        let correct_predictions = confusion_matrix.correct();
        let accuracy = correct_predictions as f64 / total_samples as f64;

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        let supported: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let macro_avg = |f: fn(&ClassMetrics) -> f64| {
            if supported.is_empty() {
                0.0
            } else {
                supported.iter().map(|m| f(m)).sum::<f64>() / supported.len() as f64
            }
        };

        let macro_precision = macro_avg(|m| m.precision);
        let macro_recall = macro_avg(|m| m.recall);
        let macro_f1 = macro_avg(|m| m.f1);

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted_f1 = if total_support > 0 {
            per_class
                .iter()
                .map(|m| m.f1 * m.support as f64)
                .sum::<f64>()
                / total_support as f64
        } else {
            0.0
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            loss: None,
            macro_precision,
            macro_recall,
            macro_f1,
            weighted_f1,
            per_class,
            confusion_matrix,
        }
    }

    /// Attach class names to the per-class entries
    pub fn with_class_names(mut self, names: &[String]) -> Self {
        for class in &mut self.per_class {
            class.class_name = names.get(class.class_idx).cloned();
        }
        self
    }

    /// Render a summary table
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str("╔══════════════════════════════════════════════╗\n");
        output.push_str("║              Evaluation Metrics              ║\n");
        output.push_str("╠══════════════════════════════════════════════╣\n");
        if let Some(loss) = self.loss {
            output.push_str(&format!("║ Loss:              {:>10.4}                ║\n", loss));
        }
        output.push_str(&format!("║ Accuracy:          {:>9.2}%                ║\n", self.accuracy * 100.0));
        output.push_str(&format!("║ Macro Precision:   {:>9.2}%                ║\n", self.macro_precision * 100.0));
        output.push_str(&format!("║ Macro Recall:      {:>9.2}%                ║\n", self.macro_recall * 100.0));
        output.push_str(&format!("║ Macro F1:          {:>9.2}%                ║\n", self.macro_f1 * 100.0));
        output.push_str(&format!("║ Weighted F1:       {:>9.2}%                ║\n", self.weighted_f1 * 100.0));
        output.push_str(&format!("║ Total Samples:     {:>10}                ║\n", self.total_samples));
        output.push_str("╚══════════════════════════════════════════════╝\n");

        for class in &self.per_class {
            let name = class
                .class_name
                .clone()
                .unwrap_or_else(|| class.class_idx.to_string());
            output.push_str(&format!(
                "  {:<20} precision {:>6.2}%  recall {:>6.2}%  f1 {:>6.2}%  support {}\n",
                name,
                class.precision * 100.0,
                class.recall * 100.0,
                class.f1 * 100.0,
                class.support
            ));
        }

        output
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub class_name: Option<String>,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// TP / (TP + FP)
    pub precision: f64,
    /// TP / (TP + FN)
    pub recall: f64,
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Confusion matrix for multi-class classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,

    /// Row-major counts, row = actual, column = predicted
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Record one prediction; out-of-range indices are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Render the matrix with optional class names
    pub fn display(&self, class_names: Option<&[String]>) -> String {
        let mut output = String::new();
        output.push_str("\nConfusion Matrix (rows=actual, cols=predicted):\n\n");

        let short = |idx: usize, width: usize| -> String {
            match class_names.and_then(|names| names.get(idx)) {
                Some(name) => name.chars().take(width).collect(),
                None => idx.to_string(),
            }
        };

        output.push_str("          ");
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>6}", short(col, 6)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>8} ", short(row, 8)));
            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    output.push_str(&format!("[{:>4}]", count));
                } else if count > 0 {
                    output.push_str(&format!(" {:>4} ", count));
                } else {
                    output.push_str("    . ");
                }
            }
            output.push('\n');
        }

        output.push_str(&format!("\nAccuracy: {:.2}%\n", self.accuracy() * 100.0));
        output
    }

    /// Save as CSV with a header row of predicted labels
    pub fn save_csv(&self, path: &Path, class_names: &[String]) -> std::io::Result<()> {
        let label = |idx: usize| {
            class_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| idx.to_string())
        };

        let mut content = String::from("actual\\predicted");
        for col in 0..self.num_classes {
            content.push_str(&format!(",{}", label(col)));
        }
        content.push('\n');

        for row in 0..self.num_classes {
            content.push_str(&label(row));
            for col in 0..self.num_classes {
                content.push_str(&format!(",{}", self.get(row, col)));
            }
            content.push('\n');
        }

        std::fs::write(path, content)
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display(None))
    }
}

/// Running average for per-batch losses
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value observed over `weight` samples
    pub fn add(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.count += weight;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Accuracy tracker for training batches
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_counts(&mut self, correct: usize, total: usize) {
        self.correct += correct;
        self.total += total;
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    pub fn count(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.get(1, 0), 1);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_from_predictions() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(metrics.total_samples, 10);
        assert_eq!(metrics.correct_predictions, 7);
        assert!((metrics.accuracy - 0.7).abs() < 1e-9);
        assert_eq!(metrics.per_class.len(), 3);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 1, 0];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);
        let class0 = ClassMetrics::from_confusion_matrix(&cm, 0);

        assert_eq!(class0.true_positives, 2);
        assert_eq!(class0.false_positives, 1);
        assert_eq!(class0.false_negatives, 1);
        assert_eq!(class0.support, 3);
        assert!((class0.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((class0.recall - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_predictions_keep_matrix_shape() {
        let metrics = Metrics::from_predictions(&[], &[], 6);
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.confusion_matrix.num_classes, 6);
    }

    #[test]
    fn test_class_names_and_csv() {
        let names = vec!["cat".to_string(), "dog".to_string()];
        let metrics = Metrics::from_predictions(&[0, 1, 1], &[0, 1, 0], 2).with_class_names(&names);
        assert_eq!(metrics.per_class[1].class_name.as_deref(), Some("dog"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.csv");
        metrics.confusion_matrix.save_csv(&path, &names).unwrap();
        let csv = std::fs::read_to_string(&path).unwrap();
        assert!(csv.starts_with("actual\\predicted,cat,dog\n"));
        assert!(csv.contains("cat,1,1\n"));
        assert!(csv.contains("dog,0,1\n"));
    }

    #[test]
    fn test_running_average_is_sample_weighted() {
        let mut avg = RunningAverage::new();
        avg.add(1.0, 3);
        avg.add(3.0, 1);
        assert_eq!(avg.count(), 4);
        assert!((avg.average() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_tracker() {
        let mut tracker = AccuracyTracker::new();
        tracker.add_counts(2, 3);
        tracker.add_counts(1, 1);
        assert_eq!(tracker.count(), 4);
        assert!((tracker.accuracy() - 0.75).abs() < 1e-9);
    }
}
