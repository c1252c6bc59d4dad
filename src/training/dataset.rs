// Directory-per-class image datasets and batching

use crate::error::{EmotionDetectorError, Result};
use crate::training::augment::Augmenter;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array1, Array2, Array4};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::info;

const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff", "webp"];

/// One labeled image on disk
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub path: PathBuf,
    pub class_index: usize,
}

/// Images grouped as `<root>/<class name>/<file>`
#[derive(Debug, Clone)]
pub struct DirectoryDataset {
    classes: Vec<String>,
    samples: Vec<Sample>,
}

impl DirectoryDataset {
    /// Lists class subdirectories in sorted order and the images inside each
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let entries = std::fs::read_dir(root).map_err(|e| {
            EmotionDetectorError::Dataset(format!("Failed to read directory {root:?}: {e}"))
        })?;

        let mut class_dirs: Vec<(String, PathBuf)> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().to_string();
                Some((name, path))
            })
            .collect();
        class_dirs.sort();

        let mut samples = Vec::new();
        for (class_index, (_, dir)) in class_dirs.iter().enumerate() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && has_image_extension(path))
                .collect();
            files.sort();
            samples.extend(files.into_iter().map(|path| Sample { path, class_index }));
        }

        let classes: Vec<String> = class_dirs.into_iter().map(|(name, _)| name).collect();
        info!(
            "Found {} images belonging to {} classes in {}",
            samples.len(),
            classes.len(),
            root.display()
        );

        Ok(Self { classes, samples })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// A stack of images with their labels
#[derive(Debug, Clone)]
pub struct Batch {
    /// (N, H, W, 3) pixels scaled to [0, 1]
    pub images: Array4<f32>,
    /// (N, classes) one-hot targets
    pub labels: Array2<f32>,
    /// (N,) class indices
    pub class_indices: Array1<i64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.class_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_indices.is_empty()
    }
}

/// Endless batch stream over a dataset, one pass after another
pub struct BatchIterator {
    dataset: DirectoryDataset,
    width: u32,
    height: u32,
    batch_size: usize,
    shuffle: bool,
    augmenter: Option<Augmenter>,
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
}

impl BatchIterator {
    pub fn new(
        dataset: DirectoryDataset,
        (width, height): (u32, u32),
        batch_size: usize,
        shuffle: bool,
        augmenter: Option<Augmenter>,
        seed: Option<u64>,
    ) -> Result<Self> {
        if dataset.is_empty() {
            return Err(EmotionDetectorError::Dataset(
                "Dataset contains no images".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(EmotionDetectorError::Dataset(
                "Batch size must be positive".to_string(),
            ));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let order = (0..dataset.len()).collect();

        let mut iter = Self {
            dataset,
            width,
            height,
            batch_size,
            shuffle,
            augmenter,
            rng,
            order,
            cursor: 0,
        };
        iter.start_pass();
        Ok(iter)
    }

    pub fn num_classes(&self) -> usize {
        self.dataset.classes().len()
    }

    /// Batches needed to see every sample once
    pub fn batches_per_pass(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn start_pass(&mut self) {
        self.cursor = 0;
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    /// Loads the next batch; the last batch of a pass may be short
    pub fn next_batch(&mut self) -> Result<Batch> {
        if self.cursor >= self.order.len() {
            self.start_pass();
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let picked: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let n = picked.len();
        let (w, h) = (self.width as usize, self.height as usize);
        let mut images = Array4::<f32>::zeros((n, h, w, 3));
        let mut labels = Array2::<f32>::zeros((n, self.num_classes()));
        let mut class_indices = Array1::<i64>::zeros(n);

        for (row, &sample_index) in picked.iter().enumerate() {
            let sample = &self.dataset.samples[sample_index];
            let mut img = self.load(&sample.path)?;
            if let Some(augmenter) = &self.augmenter {
                img = augmenter.random_transform(&img, &mut self.rng)?;
            }

            for (x, y, pixel) in img.enumerate_pixels() {
                for c in 0..3 {
                    images[[row, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
                }
            }
            labels[[row, sample.class_index]] = 1.0;
            class_indices[row] = sample.class_index as i64;
        }

        Ok(Batch {
            images,
            labels,
            class_indices,
        })
    }

    fn load(&self, path: &Path) -> Result<RgbImage> {
        let img = image::open(path)
            .map_err(|e| EmotionDetectorError::Dataset(format!("Failed to load {path:?}: {e}")))?
            .to_rgb8();
        if img.dimensions() == (self.width, self.height) {
            return Ok(img);
        }
        Ok(imageops::resize(
            &img,
            self.width,
            self.height,
            FilterType::Nearest,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_image(dir: &Path, name: &str, value: u8) {
        std::fs::create_dir_all(dir).unwrap();
        RgbImage::from_pixel(6, 4, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        write_image(&root.path().join("Sad"), "a.png", 30);
        write_image(&root.path().join("Angry"), "b.png", 10);
        write_image(&root.path().join("Angry"), "a.png", 20);
        write_image(&root.path().join("Happy"), "c.png", 40);
        std::fs::write(root.path().join("Happy").join("notes.txt"), "skip me").unwrap();
        std::fs::write(root.path().join("README"), "not a class").unwrap();
        root
    }

    #[test]
    fn classes_are_sorted_subdirectories() {
        let root = fixture();
        let dataset = DirectoryDataset::scan(root.path()).unwrap();
        assert_eq!(dataset.classes(), ["Angry", "Happy", "Sad"]);
        assert_eq!(dataset.len(), 4);

        let first = &dataset.samples()[0];
        assert!(first.path.ends_with("Angry/a.png"));
        assert_eq!(first.class_index, 0);
        assert_eq!(dataset.samples()[3].class_index, 2);
    }

    #[test]
    fn missing_root_is_a_dataset_error() {
        let err = DirectoryDataset::scan("/definitely/not/here").unwrap_err();
        assert!(matches!(err, EmotionDetectorError::Dataset(_)));
    }

    #[test]
    fn batches_are_resized_rescaled_and_one_hot() {
        let root = fixture();
        let dataset = DirectoryDataset::scan(root.path()).unwrap();
        let mut batches = BatchIterator::new(dataset, (8, 8), 3, false, None, Some(1)).unwrap();
        assert_eq!(batches.batches_per_pass(), 2);

        let batch = batches.next_batch().unwrap();
        assert_eq!(batch.images.shape(), &[3, 8, 8, 3]);
        assert_eq!(batch.labels.shape(), &[3, 3]);
        assert_eq!(batch.class_indices.to_vec(), vec![0, 0, 1]);
        assert_eq!(batch.labels.row(2).to_vec(), vec![0.0, 1.0, 0.0]);
        assert!((batch.images[[0, 7, 7, 2]] - 20.0 / 255.0).abs() < 1e-6);

        let tail = batches.next_batch().unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail.class_indices.to_vec(), vec![2]);

        let wrapped = batches.next_batch().unwrap();
        assert_eq!(wrapped.len(), 3);
    }

    #[test]
    fn shuffled_pass_still_covers_every_sample() {
        let root = fixture();
        let dataset = DirectoryDataset::scan(root.path()).unwrap();
        let mut batches = BatchIterator::new(dataset, (6, 4), 4, true, None, Some(7)).unwrap();
        let batch = batches.next_batch().unwrap();
        let mut seen = batch.class_indices.to_vec();
        seen.sort();
        assert_eq!(seen, vec![0, 0, 1, 2]);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("Angry")).unwrap();
        let dataset = DirectoryDataset::scan(root.path()).unwrap();
        assert!(BatchIterator::new(dataset, (8, 8), 4, false, None, None).is_err());
    }
}
