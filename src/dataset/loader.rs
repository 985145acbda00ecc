//! Class-per-directory dataset discovery
//!
//! A split root is expected to look like:
//!
//! ```text
//! data/train/
//! ├── class_a/
//! │   ├── 0001.jpg
//! │   └── 0002.jpg
//! └── class_b/
//!     └── ...
//! ```
//!
//! Class indices follow the sorted order of the class folder names, so every
//! split that has the same folders gets the same mapping.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dataset::{Split, IMAGE_EXTENSIONS};
use crate::utils::error::{ClassifierError, Result};

/// A single image file with its class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
    pub class_name: String,
}

/// All labeled image files under one split root
#[derive(Debug, Clone)]
pub struct DirectoryDataset {
    pub root_dir: PathBuf,
    /// Sorted class names; position = label index
    pub class_names: Vec<String>,
    pub samples: Vec<ImageSample>,
}

impl DirectoryDataset {
    /// Scan a split root, inferring classes from its subdirectories.
    ///
    /// Fails if the directory is missing, has no class folders, or contains
    /// no image files at all.
    pub fn scan<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Scanning image directory {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(ClassifierError::PathNotFound(root_dir));
        }

        let class_names = discover_classes(&root_dir)?;
        if class_names.is_empty() {
            return Err(ClassifierError::EmptyDataset(
                root_dir,
                "no class subdirectories".to_string(),
            ));
        }

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root_dir.join(class_name);
            let mut files: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            files.sort();

            debug!("Class '{}' (label {}): {} images", class_name, label, files.len());

            samples.extend(files.into_iter().map(|path| ImageSample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        if samples.is_empty() {
            return Err(ClassifierError::EmptyDataset(
                root_dir,
                "no image files in any class directory".to_string(),
            ));
        }

        info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            root_dir,
            class_names,
            samples,
        })
    }

    /// Scan a split root and require its classes to match `expected`.
    pub fn scan_with_classes<P: AsRef<Path>>(
        root_dir: P,
        split: Split,
        expected: &[String],
    ) -> Result<Self> {
        let dataset = Self::scan(root_dir)?;
        check_class_consistency(split, expected, &dataset.class_names)?;
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Number of images per class, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    pub fn get_stats(&self) -> DatasetStats {
        DatasetStats {
            total_samples: self.samples.len(),
            num_classes: self.num_classes(),
            class_counts: self.class_counts(),
            class_names: self.class_names.clone(),
        }
    }
}

/// Verify a split exposes exactly the training class set.
///
/// Both slices are sorted class names, so equal sets imply equal indices.
pub fn check_class_consistency(split: Split, expected: &[String], found: &[String]) -> Result<()> {
    if expected == found {
        return Ok(());
    }

    let expected_set: BTreeSet<&String> = expected.iter().collect();
    let found_set: BTreeSet<&String> = found.iter().collect();

    let missing: Vec<String> = expected_set
        .difference(&found_set)
        .map(|s| s.to_string())
        .collect();
    let unexpected: Vec<String> = found_set
        .difference(&expected_set)
        .map(|s| s.to_string())
        .collect();

    Err(ClassifierError::ClassMismatch {
        split: split.to_string(),
        missing,
        unexpected,
    })
}

fn discover_classes(root_dir: &Path) -> Result<Vec<String>> {
    let mut class_names = Vec::new();
    for entry in std::fs::read_dir(root_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    class_names.push(name.to_string());
                }
            }
        }
    }
    class_names.sort();
    Ok(class_names)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Statistics about one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);

        for (idx, name) in self.class_names.iter().enumerate() {
            let count = self.class_counts[idx];
            let bar_len = (count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            println!("    {:3}. {:30} {:5} {}", idx, name, count, "█".repeat(bar_len));
        }
    }
}
