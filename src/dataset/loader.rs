//! Image folder loader
//!
//! Discovers labeled images in a directory tree laid out as
//! `root/<class>/<image>`. Class directories are sorted by name and the
//! label of an image is the index of its class in that order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dataset::class_weights::class_counts;
use crate::utils::error::{ResNetError, Result};

/// File extensions accepted as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// A single image file with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: u32,
    pub class_name: String,
}

/// Labeled image files found under one split directory
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root_dir: PathBuf,
    /// Class names in label order
    pub class_names: Vec<String>,
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan `root` for class directories and the images directly inside them
    ///
    /// ```text
    /// root/
    /// ├── negative/
    /// │   ├── 0001.jpg
    /// │   └── 0002.jpg
    /// └── positive/
    ///     └── ...
    /// ```
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root_dir = root.as_ref().to_path_buf();
        info!("Scanning image folder: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(ResNetError::PathNotFound(root_dir));
        }

        let mut class_names = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                class_names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        class_names.sort();

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root_dir.join(class_name);

            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            paths.sort();

            debug!(
                "Class '{}' (label {}): {} images",
                class_name,
                label,
                paths.len()
            );

            samples.extend(paths.into_iter().map(|path| ImageSample {
                path,
                label: label as u32,
                class_name: class_name.clone(),
            }));
        }

        if samples.is_empty() {
            return Err(ResNetError::Dataset(format!(
                "no images found under {:?}",
                root_dir
            )));
        }

        info!(
            "Found {} images in {} classes",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            root_dir,
            class_names,
            samples,
        })
    }

    /// Scan a folder that must contain exactly two classes
    pub fn scan_binary<P: AsRef<Path>>(root: P) -> Result<Self> {
        let folder = Self::scan(root)?;
        if folder.num_classes() != 2 {
            return Err(ResNetError::Dataset(format!(
                "binary label mode expects 2 classes, found {}",
                folder.num_classes()
            )));
        }
        Ok(folder)
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

    /// Labels of all samples, in sample order
    pub fn labels(&self) -> Vec<u32> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Number of samples per label
    pub fn class_counts(&self) -> BTreeMap<u32, usize> {
        class_counts(&self.labels())
    }

    /// Shuffle the samples in place with a given seed
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.samples.shuffle(&mut rng);
    }

    /// Fail unless `other` exposes the same classes in the same order
    pub fn ensure_same_classes(&self, other: &ImageFolder) -> Result<()> {
        if self.class_names != other.class_names {
            return Err(ResNetError::Dataset(format!(
                "class directories differ: {:?} has {:?}, {:?} has {:?}",
                self.root_dir, self.class_names, other.root_dir, other.class_names
            )));
        }
        Ok(())
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    /// Write `count` small solid-color PNGs into `root/<class_name>/`
    pub(crate) fn write_class(root: &Path, class_name: &str, count: usize, shade: u8) {
        let dir = root.join(class_name);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let img = RgbImage::from_pixel(12, 10, Rgb([shade, shade / 2, i as u8]));
            img.save(dir.join(format!("img_{i:03}.png"))).unwrap();
        }
    }

    #[test]
    fn test_labels_follow_sorted_class_order() {
        let tmp = TempDir::new().unwrap();
        write_class(tmp.path(), "zebra", 2, 200);
        write_class(tmp.path(), "apple", 3, 20);

        let folder = ImageFolder::scan(tmp.path()).unwrap();
        assert_eq!(folder.class_names, vec!["apple", "zebra"]);
        assert_eq!(folder.len(), 5);
        assert_eq!(folder.labels(), vec![0, 0, 0, 1, 1]);
        assert_eq!(folder.samples[4].class_name, "zebra");
    }

    #[test]
    fn test_ignores_non_image_files_and_nested_dirs() {
        let tmp = TempDir::new().unwrap();
        write_class(tmp.path(), "a", 1, 10);
        write_class(tmp.path(), "b", 1, 10);
        std::fs::write(tmp.path().join("a").join("notes.txt"), "x").unwrap();
        write_class(&tmp.path().join("b"), "nested", 2, 10);
        std::fs::write(tmp.path().join("b").join("UPPER.JPG"), "not decoded here").unwrap();

        let folder = ImageFolder::scan(tmp.path()).unwrap();
        assert_eq!(folder.class_counts().get(&0), Some(&1));
        assert_eq!(folder.class_counts().get(&1), Some(&2));
    }

    #[test]
    fn test_missing_root_is_path_not_found() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            ImageFolder::scan(&missing),
            Err(ResNetError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_empty_folder_is_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a")).unwrap();
        assert!(matches!(
            ImageFolder::scan(tmp.path()),
            Err(ResNetError::Dataset(_))
        ));
    }

    #[test]
    fn test_binary_mode_rejects_three_classes() {
        let tmp = TempDir::new().unwrap();
        write_class(tmp.path(), "a", 1, 10);
        write_class(tmp.path(), "b", 1, 10);
        write_class(tmp.path(), "c", 1, 10);

        let err = ImageFolder::scan_binary(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("found 3"));
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let tmp = TempDir::new().unwrap();
        write_class(tmp.path(), "a", 6, 10);
        write_class(tmp.path(), "b", 6, 90);

        let mut first = ImageFolder::scan(tmp.path()).unwrap();
        let mut second = first.clone();
        first.shuffle(123);
        second.shuffle(123);
        assert_eq!(first.samples, second.samples);
        assert_eq!(first.class_counts(), second.class_counts());
    }

    #[test]
    fn test_class_mismatch_between_splits() {
        let train = TempDir::new().unwrap();
        write_class(train.path(), "cat", 1, 10);
        write_class(train.path(), "dog", 1, 10);
        let valid = TempDir::new().unwrap();
        write_class(valid.path(), "cat", 1, 10);
        write_class(valid.path(), "fox", 1, 10);

        let train = ImageFolder::scan(train.path()).unwrap();
        let valid = ImageFolder::scan(valid.path()).unwrap();
        assert!(train.ensure_same_classes(&valid).is_err());
        assert!(train.ensure_same_classes(&train.clone()).is_ok());
    }
}
