//! Seeded, cyclic batch streams over a split
//!
//! A `DataSource` is one split plus its batching settings. Its `stream()`
//! yields batches forever: each pass over the data is reshuffled (if enabled)
//! and ends with a short batch holding the remainder, so one epoch is exactly
//! `steps_per_epoch()` batches.

use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::augmentation::{AugmentationConfig, Augmenter, TransformParams};
use crate::dataset::burn_dataset::{ClassifierDataset, ClassifierItem};
use crate::dataset::loader::DirectoryDataset;
use crate::dataset::Split;
use crate::utils::error::{ClassifierError, Result};

/// Batching settings for one data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Images are resized to `image_size × image_size`
    pub image_size: u32,
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
    /// Decode every image once up front instead of on every pass
    pub cache_images: bool,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            image_size: crate::IMAGE_SIZE as u32,
            batch_size: crate::BATCH_SIZE,
            shuffle: true,
            seed: crate::DEFAULT_SEED,
            cache_images: false,
        }
    }
}

/// A directory split wired to batching and augmentation
#[derive(Debug, Clone)]
pub struct DataSource {
    split: Split,
    class_names: Vec<String>,
    dataset: ClassifierDataset,
    config: DataSourceConfig,
}

impl DataSource {
    /// Scan `dir` and prepare batching.
    ///
    /// With `expected_classes` set, the split must expose exactly those classes.
    pub fn from_directory(
        dir: &Path,
        split: Split,
        expected_classes: Option<&[String]>,
        config: DataSourceConfig,
        augmentation: AugmentationConfig,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(ClassifierError::Config("batch_size must be > 0".to_string()));
        }
        if config.image_size == 0 {
            return Err(ClassifierError::Config("image_size must be > 0".to_string()));
        }
        augmentation.validate().map_err(ClassifierError::Config)?;

        let directory = match expected_classes {
            Some(expected) => DirectoryDataset::scan_with_classes(dir, split, expected)?,
            None => DirectoryDataset::scan(dir)?,
        };

        info!(
            "{} split: {} images, {} classes, batch size {}",
            split,
            directory.len(),
            directory.num_classes(),
            config.batch_size
        );

        let mut dataset = ClassifierDataset::from_directory(
            &directory,
            config.image_size,
            Augmenter::new(augmentation),
        );
        if config.cache_images {
            dataset = dataset.preload()?;
        }

        Ok(Self {
            split,
            class_names: directory.class_names,
            dataset,
            config,
        })
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub fn dataset(&self) -> &ClassifierDataset {
        &self.dataset
    }

    pub fn augmentation(&self) -> &AugmentationConfig {
        self.dataset.augmenter().config()
    }

    /// Batches per full pass: `ceil(len / batch_size)`
    pub fn steps_per_epoch(&self) -> usize {
        self.len().div_ceil(self.config.batch_size)
    }

    /// Copy of this source with random transforms removed and shuffling set as given
    pub fn for_inference(&self, shuffle: bool) -> Self {
        let augmenter = Augmenter::new(self.augmentation().without_random_transforms());
        let mut dataset = self.dataset.clone();
        dataset.set_augmenter(augmenter);
        debug!(
            "{} split prepared for inference (images cached: {})",
            self.split,
            dataset.is_cached()
        );
        Self {
            split: self.split,
            class_names: self.class_names.clone(),
            dataset,
            config: DataSourceConfig {
                shuffle,
                ..self.config.clone()
            },
        }
    }

    /// Infinite batch iterator, reproducible from `config.seed`
    pub fn stream(&self) -> BatchStream<'_> {
        BatchStream::new(&self.dataset, self.config.batch_size, self.config.shuffle, self.config.seed)
    }
}

/// Infinite iterator of processed batches
pub struct BatchStream<'a> {
    dataset: &'a ClassifierDataset,
    batch_size: usize,
    shuffle: bool,
    order: Vec<usize>,
    cursor: usize,
    shuffle_rng: ChaCha8Rng,
    augment_rng: ChaCha8Rng,
}

impl<'a> BatchStream<'a> {
    fn new(dataset: &'a ClassifierDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        let len = dataset.len();
        Self {
            dataset,
            batch_size,
            shuffle,
            order: (0..len).collect(),
            // forces a (re)shuffle before the first batch
            cursor: len,
            shuffle_rng: ChaCha8Rng::seed_from_u64(seed),
            augment_rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
        }
    }

    /// Side length of the square images this stream yields
    pub fn image_size(&self) -> usize {
        self.dataset.image_size() as usize
    }

    fn start_pass(&mut self) {
        self.cursor = 0;
        if self.shuffle {
            self.order.shuffle(&mut self.shuffle_rng);
        }
    }

    fn next_batch(&mut self) -> Result<Vec<ClassifierItem>> {
        if self.cursor >= self.order.len() {
            self.start_pass();
        }

        let dataset = self.dataset;
        let augmenter = dataset.augmenter();
        let size = dataset.image_size();

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        // parameters are drawn in order so parallel decoding stays reproducible
        let params: Vec<TransformParams> = indices
            .iter()
            .map(|_| {
                if augmenter.config().is_random() {
                    augmenter.sample_params(size, size, &mut self.augment_rng)
                } else {
                    TransformParams::identity()
                }
            })
            .collect();

        indices
            .par_iter()
            .zip(params.par_iter())
            .map(|(&index, params)| -> Result<ClassifierItem> {
                let img = dataset.load_image(index)?;
                Ok(ClassifierItem {
                    image: augmenter.apply(&img, params),
                    label: dataset.label(index).unwrap_or_default(),
                    path: dataset
                        .path(index)
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_default(),
                })
            })
            .collect()
    }
}

impl Iterator for BatchStream<'_> {
    type Item = Result<Vec<ClassifierItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.order.is_empty() {
            return None;
        }
        Some(self.next_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn make_split(root: &Path, classes: &[&str], per_class: usize) {
        for (c, class) in classes.iter().enumerate() {
            let dir = root.join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let img = RgbImage::from_fn(8, 8, |x, y| {
                    Rgb([(x * 30) as u8, (y * 30) as u8, (c * 100 + i * 10) as u8])
                });
                img.save(dir.join(format!("{:02}.png", i))).unwrap();
            }
        }
    }

    fn config(batch_size: usize, shuffle: bool) -> DataSourceConfig {
        DataSourceConfig {
            image_size: 8,
            batch_size,
            shuffle,
            seed: 42,
            cache_images: false,
        }
    }

    fn collect_labels(source: &DataSource, batches: usize) -> Vec<Vec<usize>> {
        source
            .stream()
            .take(batches)
            .map(|b| b.unwrap().iter().map(|item| item.label).collect())
            .collect()
    }

    #[test]
    fn test_steps_per_epoch_rounds_up() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["a", "b"], 5);

        let source = DataSource::from_directory(
            tmp.path(),
            Split::Train,
            None,
            config(4, false),
            AugmentationConfig::rescale_only(),
        )
        .unwrap();

        assert_eq!(source.len(), 10);
        assert_eq!(source.steps_per_epoch(), 3);

        let sizes: Vec<usize> = source.stream().take(6).map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2, 4, 4, 2]);
    }

    #[test]
    fn test_unshuffled_stream_follows_sorted_order() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["a", "b"], 2);

        let source = DataSource::from_directory(
            tmp.path(),
            Split::Validation,
            None,
            config(3, false),
            AugmentationConfig::rescale_only(),
        )
        .unwrap();

        assert_eq!(collect_labels(&source, 2), vec![vec![0, 0, 1], vec![1]]);
    }

    #[test]
    fn test_same_seed_gives_identical_batches() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["a", "b", "c"], 4);

        let build = || {
            DataSource::from_directory(
                tmp.path(),
                Split::Train,
                None,
                config(5, true),
                AugmentationConfig::default(),
            )
            .unwrap()
        };
        let first = build();
        let second = build();

        let a: Vec<Vec<ClassifierItem>> = first.stream().take(6).map(|b| b.unwrap()).collect();
        let b: Vec<Vec<ClassifierItem>> = second.stream().take(6).map(|b| b.unwrap()).collect();

        for (x, y) in a.iter().zip(b.iter()) {
            let labels_x: Vec<usize> = x.iter().map(|i| i.label).collect();
            let labels_y: Vec<usize> = y.iter().map(|i| i.label).collect();
            assert_eq!(labels_x, labels_y);
            for (ix, iy) in x.iter().zip(y.iter()) {
                assert_eq!(ix.image, iy.image);
            }
        }
    }

    #[test]
    fn test_each_pass_visits_every_sample_once() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["a", "b"], 5);

        let source = DataSource::from_directory(
            tmp.path(),
            Split::Train,
            None,
            config(3, true),
            AugmentationConfig::rescale_only(),
        )
        .unwrap();

        let steps = source.steps_per_epoch();
        let mut stream = source.stream();
        for _ in 0..2 {
            let mut paths: Vec<String> = (0..steps)
                .flat_map(|_| stream.next().unwrap().unwrap())
                .map(|item| item.path)
                .collect();
            paths.sort();
            paths.dedup();
            assert_eq!(paths.len(), 10);
        }
    }

    #[test]
    fn test_validation_split_must_match_training_classes() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["a", "c"], 1);
        let expected = vec!["a".to_string(), "b".to_string()];

        let err = DataSource::from_directory(
            tmp.path(),
            Split::Validation,
            Some(&expected),
            config(2, false),
            AugmentationConfig::rescale_only(),
        )
        .unwrap_err();

        assert!(matches!(err, ClassifierError::ClassMismatch { .. }));
    }

    #[test]
    fn test_for_inference_strips_random_transforms() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["a"], 2);

        let source = DataSource::from_directory(
            tmp.path(),
            Split::Train,
            None,
            config(2, true),
            AugmentationConfig::default(),
        )
        .unwrap();
        let plain = source.for_inference(false);

        assert!(source.augmentation().is_random());
        assert!(!plain.augmentation().is_random());
        assert!(!plain.config().shuffle);
    }
}
