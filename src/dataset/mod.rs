//! Dataset module for directory-backed image data
//!
//! This module provides functionality for:
//! - Discovering labeled images in a `<split>/<class>/*` layout
//! - Rescaling and random geometric augmentation
//! - Split storage and the Burn `Batcher`
//! - Seeded, cyclic batch streams (one pass per epoch)

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod stream;

pub use augmentation::{AugmentationConfig, Augmenter, FillMode};
pub use burn_dataset::{ClassifierBatch, ClassifierBatcher, ClassifierDataset, ClassifierItem};
pub use loader::{check_class_consistency, DatasetStats, DirectoryDataset, ImageSample};
pub use stream::{BatchStream, DataSource, DataSourceConfig};

/// File extensions recognised as images (compared lowercase)
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// One of the three directory trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "val",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
