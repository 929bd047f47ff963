//! Image preprocessing for the recipe pipeline.
//!
//! Every uploaded image goes through the same fixed, non-configurable
//! transform before classification and decoding: convert to 3-channel RGB,
//! resize so the shorter side is 256 (aspect-preserving, bilinear), center
//! crop to 224x224, scale pixels to [0,1] and normalize per channel with the
//! ImageNet mean and standard deviation. The transform is deterministic:
//! identical input bytes always produce a bit-identical tensor.

use crate::core::{RecipeError, Tensor4D};
use image::{DynamicImage, RgbImage, imageops::FilterType};
use std::path::Path;

/// Shorter-side target of the aspect-preserving resize.
pub const RESIZE_SHORTER_SIDE: u32 = 256;
/// Side length of the center crop fed to the models.
pub const CROP_SIZE: u32 = 224;
/// Per-channel normalization mean (RGB order).
pub const NORMALIZE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel normalization standard deviation (RGB order).
pub const NORMALIZE_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decodes raw bytes into an image.
///
/// # Errors
///
/// Returns `RecipeError::ImageDecode` if the bytes cannot be interpreted as
/// a supported image format.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, RecipeError> {
    image::load_from_memory(bytes).map_err(RecipeError::ImageDecode)
}

/// Loads an image from a file path.
///
/// # Errors
///
/// Returns `RecipeError::Io` if the file cannot be read and
/// `RecipeError::ImageDecode` if it cannot be decoded.
pub fn load_image(path: &Path) -> Result<DynamicImage, RecipeError> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

/// The fixed resize/crop/normalize transform.
///
/// Normalization is precomputed into per-channel `alpha`/`beta` so each pixel
/// costs one multiply-add: `value * alpha[c] + beta[c]` where
/// `alpha = scale / std` and `beta = -mean / std`.
#[derive(Debug, Clone)]
pub struct ImageTransform {
    alpha: [f32; 3],
    beta: [f32; 3],
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTransform {
    /// Creates the transform with the fixed normalization parameters.
    pub fn new() -> Self {
        let scale = 1.0 / 255.0;
        let mut alpha = [0.0f32; 3];
        let mut beta = [0.0f32; 3];
        for c in 0..3 {
            alpha[c] = scale / NORMALIZE_STD[c];
            beta[c] = -NORMALIZE_MEAN[c] / NORMALIZE_STD[c];
        }
        Self { alpha, beta }
    }

    /// Applies the full transform, producing a [1, 3, 224, 224] tensor.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::InvalidInput` if the image has a zero dimension.
    pub fn apply(&self, img: &DynamicImage) -> Result<Tensor4D, RecipeError> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(RecipeError::invalid_input(format!(
                "image has zero dimension: {width}x{height}"
            )));
        }

        let (new_width, new_height) = resize_dims(width, height, RESIZE_SHORTER_SIDE);
        let resized = image::imageops::resize(&rgb, new_width, new_height, FilterType::Triangle);
        let cropped = center_crop(&resized, CROP_SIZE);

        let size = CROP_SIZE as usize;
        let mut tensor = Tensor4D::zeros((1, 3, size, size));
        for (x, y, pixel) in cropped.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    pixel[c] as f32 * self.alpha[c] + self.beta[c];
            }
        }
        Ok(tensor)
    }
}

/// Computes the aspect-preserving resize target for a given shorter side.
fn resize_dims(width: u32, height: u32, shorter: u32) -> (u32, u32) {
    if width <= height {
        let new_height =
            ((height as f64 * shorter as f64 / width as f64).round() as u32).max(shorter);
        (shorter, new_height)
    } else {
        let new_width =
            ((width as f64 * shorter as f64 / height as f64).round() as u32).max(shorter);
        (new_width, shorter)
    }
}

fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let x0 = (width.saturating_sub(size)) / 2;
    let y0 = (height.saturating_sub(size)) / 2;
    image::imageops::crop_imm(img, x0, y0, size, size).to_image()
}
