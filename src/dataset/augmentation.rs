//! Data Augmentation Module
//!
//! On-the-fly random transforms applied to training images before batching.
//! The chain runs in a fixed order, every transform drawing its own random
//! parameter per image:
//!
//! 1. flip (horizontal and/or vertical, each with probability 0.5)
//! 2. rotation by `±rotation_factor` of a full turn
//! 3. zoom by a factor in `1 ± zoom_factor` (values above 1 zoom out)
//! 4. translation by `±translation_*` of the image height/width
//! 5. contrast scaling by `1 ± contrast_factor` around the per-channel mean
//! 6. brightness shift by `±brightness_factor × 255`
//!
//! Geometric transforms resample with bilinear interpolation; pixels that
//! land outside the source are filled according to [`FillMode`].
//! Validation images are never augmented.

use image::{Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Which flips may be applied
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipMode {
    None,
    Horizontal,
    Vertical,
    HorizontalAndVertical,
}

impl FlipMode {
    fn horizontal(self) -> bool {
        matches!(self, FlipMode::Horizontal | FlipMode::HorizontalAndVertical)
    }

    fn vertical(self) -> bool {
        matches!(self, FlipMode::Vertical | FlipMode::HorizontalAndVertical)
    }
}

/// How pixels outside the source image are filled by geometric transforms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Mirror about the edge: `d c b a | a b c d | d c b a`
    Reflect,
    /// Repeat the nearest edge pixel
    Nearest,
    /// Fill with black
    Constant,
}

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    pub flip: FlipMode,
    /// Fraction of a full turn; 0.2 rotates by up to ±72 degrees
    pub rotation_factor: f32,
    pub zoom_factor: f32,
    pub translation_height: f32,
    pub translation_width: f32,
    pub contrast_factor: f32,
    /// Fraction of the 0..=255 value range
    pub brightness_factor: f32,
    pub fill_mode: FillMode,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            flip: FlipMode::HorizontalAndVertical,
            rotation_factor: 0.2,
            zoom_factor: 0.2,
            translation_height: 0.1,
            translation_width: 0.1,
            contrast_factor: 0.2,
            brightness_factor: 0.2,
            fill_mode: FillMode::Reflect,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            flip: FlipMode::None,
            rotation_factor: 0.0,
            zoom_factor: 0.0,
            translation_height: 0.0,
            translation_width: 0.0,
            contrast_factor: 0.0,
            brightness_factor: 0.0,
            fill_mode: FillMode::Reflect,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.flip == FlipMode::None
            && self.rotation_factor == 0.0
            && self.zoom_factor == 0.0
            && self.translation_height == 0.0
            && self.translation_width == 0.0
            && self.contrast_factor == 0.0
            && self.brightness_factor == 0.0
    }

    /// Check that every factor is a usable range bound
    pub fn validate(&self) -> Result<(), String> {
        let factors = [
            ("rotation_factor", self.rotation_factor),
            ("zoom_factor", self.zoom_factor),
            ("translation_height", self.translation_height),
            ("translation_width", self.translation_width),
            ("contrast_factor", self.contrast_factor),
            ("brightness_factor", self.brightness_factor),
        ];

        for (name, value) in factors {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {value}"));
            }
        }

        if self.zoom_factor >= 1.0 {
            return Err(format!("zoom_factor must be below 1.0, got {}", self.zoom_factor));
        }
        if self.contrast_factor > 1.0 {
            return Err(format!(
                "contrast_factor must be at most 1.0, got {}",
                self.contrast_factor
            ));
        }

        Ok(())
    }
}

/// Image augmenter that applies the configured random chain
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply the full chain to an image; the output keeps the input size
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let mut result = img.clone();

        if self.config.flip.horizontal() && rng.gen_bool(0.5) {
            image::imageops::flip_horizontal_in_place(&mut result);
        }
        if self.config.flip.vertical() && rng.gen_bool(0.5) {
            image::imageops::flip_vertical_in_place(&mut result);
        }

        if self.config.rotation_factor > 0.0 {
            let turn = symmetric(rng, self.config.rotation_factor);
            result = self.rotate(&result, turn * std::f32::consts::TAU);
        }

        if self.config.zoom_factor > 0.0 {
            let zoom = 1.0 + symmetric(rng, self.config.zoom_factor);
            result = self.zoom(&result, zoom);
        }

        if self.config.translation_height > 0.0 || self.config.translation_width > 0.0 {
            let dy = symmetric(rng, self.config.translation_height) * result.height() as f32;
            let dx = symmetric(rng, self.config.translation_width) * result.width() as f32;
            result = self.translate(&result, dx, dy);
        }

        if self.config.contrast_factor > 0.0 {
            let factor = 1.0 + symmetric(rng, self.config.contrast_factor);
            result = adjust_contrast(&result, factor);
        }

        if self.config.brightness_factor > 0.0 {
            let delta = symmetric(rng, self.config.brightness_factor) * 255.0;
            result = adjust_brightness(&result, delta);
        }

        result
    }

    /// Rotate counter-clockwise around the image center
    fn rotate(&self, img: &RgbImage, angle_rad: f32) -> RgbImage {
        if angle_rad.abs() < 1e-4 {
            return img.clone();
        }

        let cx = (img.width() as f32 - 1.0) / 2.0;
        let cy = (img.height() as f32 - 1.0) / 2.0;
        let (sin_a, cos_a) = angle_rad.sin_cos();

        self.warp(img, |x, y| {
            let dx = x - cx;
            let dy = y - cy;
            (cx + dx * cos_a - dy * sin_a, cy + dx * sin_a + dy * cos_a)
        })
    }

    /// Scale around the image center; `zoom > 1` shows more of the scene
    fn zoom(&self, img: &RgbImage, zoom: f32) -> RgbImage {
        if (zoom - 1.0).abs() < 1e-4 {
            return img.clone();
        }

        let cx = (img.width() as f32 - 1.0) / 2.0;
        let cy = (img.height() as f32 - 1.0) / 2.0;

        self.warp(img, |x, y| (cx + (x - cx) * zoom, cy + (y - cy) * zoom))
    }

    fn translate(&self, img: &RgbImage, dx: f32, dy: f32) -> RgbImage {
        if dx.abs() < 1e-4 && dy.abs() < 1e-4 {
            return img.clone();
        }

        self.warp(img, |x, y| (x - dx, y - dy))
    }

    /// Inverse-map every output pixel into the source and sample it
    fn warp<F>(&self, img: &RgbImage, source_of: F) -> RgbImage
    where
        F: Fn(f32, f32) -> (f32, f32),
    {
        let (width, height) = img.dimensions();
        let mut output = RgbImage::new(width, height);

        for (x, y, pixel) in output.enumerate_pixels_mut() {
            let (sx, sy) = source_of(x as f32, y as f32);
            *pixel = self.bilinear_sample(img, sx, sy);
        }

        output
    }

    /// Sample a pixel using bilinear interpolation and the configured fill mode
    fn bilinear_sample(&self, img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
        let (width, height) = img.dimensions();

        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let corners = [
            (x0, y0, (1.0 - fx) * (1.0 - fy)),
            (x0 + 1, y0, fx * (1.0 - fy)),
            (x0, y0 + 1, (1.0 - fx) * fy),
            (x0 + 1, y0 + 1, fx * fy),
        ];

        let mut acc = [0.0f32; 3];
        for (cx, cy, weight) in corners {
            if weight == 0.0 {
                continue;
            }
            let coords = (
                resolve_coordinate(cx, width, self.config.fill_mode),
                resolve_coordinate(cy, height, self.config.fill_mode),
            );
            if let (Some(px), Some(py)) = coords {
                let p = img.get_pixel(px, py);
                for c in 0..3 {
                    acc[c] += p[c] as f32 * weight;
                }
            }
        }

        Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
    }
}

/// Uniform sample in `[-factor, factor]`
fn symmetric(rng: &mut ChaCha8Rng, factor: f32) -> f32 {
    rng.gen_range(-factor..=factor)
}

/// Map an integer coordinate onto `0..size`, or `None` for constant fill
fn resolve_coordinate(coord: i64, size: u32, mode: FillMode) -> Option<u32> {
    let size = size as i64;
    if (0..size).contains(&coord) {
        return Some(coord as u32);
    }

    match mode {
        FillMode::Constant => None,
        FillMode::Nearest => Some(coord.clamp(0, size - 1) as u32),
        FillMode::Reflect => {
            let period = 2 * size;
            let m = coord.rem_euclid(period);
            let reflected = if m < size { m } else { period - 1 - m };
            Some(reflected as u32)
        }
    }
}

/// Scale each channel around its own mean, clipped to 0..=255
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let count = (img.width() as f64 * img.height() as f64).max(1.0);
    let mut sums = [0.0f64; 3];
    for pixel in img.pixels() {
        for c in 0..3 {
            sums[c] += pixel[c] as f64;
        }
    }
    let means = sums.map(|s| (s / count) as f32);

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in 0..3 {
            let v = (pixel[c] as f32 - means[c]) * factor + means[c];
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Add `delta` to every channel, clipped to 0..=255
pub fn adjust_brightness(img: &RgbImage, delta: f32) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in 0..3 {
            pixel[c] = (pixel[c] as f32 + delta).round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Convert an RGB image to CHW `f32` data in the 0..=255 range
pub fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = width as usize * height as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * width as usize + x as usize;
        for c in 0..3 {
            data[c * plane + offset] = pixel[c] as f32;
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image() -> RgbImage {
        let mut img = RgbImage::new(32, 24);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 8) as u8, (y * 10) as u8, 128]);
        }
        img
    }

    #[test]
    fn test_default_matches_training_chain() {
        let config = AugmentationConfig::default();
        assert_eq!(config.flip, FlipMode::HorizontalAndVertical);
        assert_eq!(config.rotation_factor, 0.2);
        assert_eq!(config.zoom_factor, 0.2);
        assert_eq!(config.translation_height, 0.1);
        assert_eq!(config.translation_width, 0.1);
        assert_eq!(config.contrast_factor, 0.2);
        assert_eq!(config.brightness_factor, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_none_is_identity() {
        let aug = Augmenter::new(AugmentationConfig::none());
        assert!(aug.config().is_identity());

        let img = create_test_image();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(aug.augment(&img, &mut rng), img);
    }

    #[test]
    fn test_augment_preserves_dimensions() {
        let aug = Augmenter::new(AugmentationConfig::default());
        let img = create_test_image();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..5 {
            let result = aug.augment(&img, &mut rng);
            assert_eq!(result.dimensions(), img.dimensions());
        }
    }

    #[test]
    fn test_augment_is_reproducible_for_a_seed() {
        let aug = Augmenter::new(AugmentationConfig::default());
        let img = create_test_image();

        let a = aug.augment(&img, &mut ChaCha8Rng::seed_from_u64(3));
        let b = aug.augment(&img, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_rejects_bad_factors() {
        let mut config = AugmentationConfig::default();
        config.zoom_factor = 1.0;
        assert!(config.validate().is_err());

        let mut config = AugmentationConfig::default();
        config.rotation_factor = -0.1;
        assert!(config.validate().is_err());

        let mut config = AugmentationConfig::default();
        config.brightness_factor = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reflect_coordinates() {
        assert_eq!(resolve_coordinate(-1, 4, FillMode::Reflect), Some(0));
        assert_eq!(resolve_coordinate(-2, 4, FillMode::Reflect), Some(1));
        assert_eq!(resolve_coordinate(4, 4, FillMode::Reflect), Some(3));
        assert_eq!(resolve_coordinate(5, 4, FillMode::Reflect), Some(2));
        assert_eq!(resolve_coordinate(9, 4, FillMode::Reflect), Some(1));
    }

    #[test]
    fn test_nearest_and_constant_coordinates() {
        assert_eq!(resolve_coordinate(-3, 4, FillMode::Nearest), Some(0));
        assert_eq!(resolve_coordinate(7, 4, FillMode::Nearest), Some(3));
        assert_eq!(resolve_coordinate(-1, 4, FillMode::Constant), None);
        assert_eq!(resolve_coordinate(2, 4, FillMode::Constant), Some(2));
    }

    #[test]
    fn test_translate_by_whole_pixels_shifts_content() {
        let aug = Augmenter::new(AugmentationConfig {
            fill_mode: FillMode::Constant,
            ..AugmentationConfig::none()
        });
        let img = create_test_image();

        let shifted = aug.translate(&img, 2.0, 0.0);
        assert_eq!(shifted.get_pixel(5, 3), img.get_pixel(3, 3));
        assert_eq!(shifted.get_pixel(0, 3), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_full_turn_rotation_is_identity() {
        let aug = Augmenter::new(AugmentationConfig::none());
        let img = create_test_image();

        let rotated = aug.rotate(&img, std::f32::consts::TAU);
        let diff: i32 = rotated
            .pixels()
            .zip(img.pixels())
            .map(|(a, b)| (a[0] as i32 - b[0] as i32).abs())
            .max()
            .unwrap_or(0);
        assert!(diff <= 1);
    }

    #[test]
    fn test_brightness_clips_to_value_range() {
        let img = create_test_image();

        let brighter = adjust_brightness(&img, 300.0);
        assert!(brighter.pixels().all(|p| p[0] == 255 && p[2] == 255));

        let darker = adjust_brightness(&img, -51.0);
        assert_eq!(darker.get_pixel(0, 0)[0], 0);
        assert_eq!(darker.get_pixel(0, 0)[2], 77);
    }

    #[test]
    fn test_contrast_keeps_channel_mean() {
        let img = create_test_image();
        let flat = adjust_contrast(&img, 0.0);

        // Blue is constant, so collapsing contrast leaves it unchanged
        assert!(flat.pixels().all(|p| p[2] == 128));
        let first = flat.get_pixel(0, 0)[0];
        assert!(flat.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_to_chw_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([1, 2, 3]));
        img.put_pixel(1, 0, Rgb([4, 5, 6]));

        assert_eq!(to_chw(&img), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }
}
