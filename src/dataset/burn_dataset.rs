//! Split storage and Burn batching
//!
//! `ClassifierDataset` owns the sample list of one split and knows how to
//! decode its images (a file that fails to decode is an error, never skipped); `ClassifierBatcher` turns processed items into tensors.
//! Random augmentation is applied upstream by the batch stream so that the
//! batcher stays deterministic.

use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::augmentation::Augmenter;
use crate::dataset::loader::DirectoryDataset;
use crate::utils::error::{ClassifierError, Result};

/// A single preprocessed item ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifierItem {
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

/// Decode an image file and resize it to `size × size` RGB
pub fn load_rgb(path: &Path, size: u32) -> Result<RgbImage> {
    let img = ImageReader::open(path)
        .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    Ok(img.resize_exact(size, size, FilterType::Nearest).to_rgb8())
}

/// Images of one split, decoded lazily or held in memory
#[derive(Debug, Clone)]
pub struct ClassifierDataset {
    /// (image_path, label) pairs
    samples: Vec<(PathBuf, usize)>,
    image_size: u32,
    augmenter: Augmenter,
    /// Resized images, present when preloaded
    cached_images: Option<Vec<RgbImage>>,
}

impl ClassifierDataset {
    /// Create a dataset that decodes images on demand
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: u32, augmenter: Augmenter) -> Self {
        Self {
            samples,
            image_size,
            augmenter,
            cached_images: None,
        }
    }

    pub fn from_directory(dataset: &DirectoryDataset, image_size: u32, augmenter: Augmenter) -> Self {
        let samples = dataset
            .samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect();
        Self::new(samples, image_size, augmenter)
    }

    /// Decode and resize every image up front (parallel).
    ///
    /// Unlike lazy loading, a broken file fails here rather than mid-epoch.
    pub fn preload(mut self) -> Result<Self> {
        let total = self.samples.len();
        info!("Pre-loading {} images into memory", total);

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let size = self.image_size;
        let images = self
            .samples
            .par_iter()
            .map(|(path, _)| {
                let img = load_rgb(path, size);
                pb.inc(1);
                img
            })
            .collect::<Result<Vec<_>>>()?;

        pb.finish_and_clear();
        info!("Loaded {} images", images.len());

        self.cached_images = Some(images);
        Ok(self)
    }

    pub fn is_cached(&self) -> bool {
        self.cached_images.is_some()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn augmenter(&self) -> &Augmenter {
        &self.augmenter
    }

    pub fn set_augmenter(&mut self, augmenter: Augmenter) {
        self.augmenter = augmenter;
    }

    pub fn label(&self, index: usize) -> Option<usize> {
        self.samples.get(index).map(|(_, label)| *label)
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.samples.get(index).map(|(path, _)| path.as_path())
    }

    /// The resized RGB image at `index`
    pub fn load_image(&self, index: usize) -> Result<RgbImage> {
        if let Some(ref cached) = self.cached_images {
            return cached.get(index).cloned().ok_or_else(|| out_of_range(index));
        }
        let (path, _) = self.samples.get(index).ok_or_else(|| out_of_range(index))?;
        load_rgb(path, self.image_size)
    }

    /// Load `index` and rescale it without random transforms
    pub fn load_item(&self, index: usize) -> Result<ClassifierItem> {
        let img = self.load_image(index)?;
        let (path, label) = &self.samples[index];
        Ok(ClassifierItem {
            image: self.augmenter.rescale(&img),
            label: *label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

fn out_of_range(index: usize) -> ClassifierError {
    ClassifierError::Training(format!("sample index {} out of range", index))
}

/// A batch of images with class-index targets
#[derive(Clone, Debug)]
pub struct ClassifierBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Class indices with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassifierBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Targets as one-hot rows, shape [batch_size, num_classes]
    pub fn one_hot_targets(&self, num_classes: usize) -> Tensor<B, 2> {
        let device = self.targets.device();
        let batch_size = self.len();
        let classes = Tensor::<B, 1, Int>::arange(0..num_classes as i64, &device)
            .reshape([1, num_classes])
            .repeat_dim(0, batch_size);
        let targets = self
            .targets
            .clone()
            .reshape([batch_size, 1])
            .repeat_dim(1, num_classes);
        classes.equal(targets).float()
    }
}

/// Stacks processed items into tensors on a device
#[derive(Clone, Debug)]
pub struct ClassifierBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> ClassifierBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<ClassifierItem, ClassifierBatch<B>> for ClassifierBatcher<B> {
    fn batch(&self, items: Vec<ClassifierItem>) -> ClassifierBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.image_size, self.image_size);

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            &self.device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        ClassifierBatch { images, targets }
    }
}
