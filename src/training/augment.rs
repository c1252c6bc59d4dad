// Random geometric augmentation for training images

use crate::config::AugmentationConfig;
use crate::error::{EmotionDetectorError, Result};
use crate::preprocess::mat_to_image;
use image::RgbImage;
use opencv::core::{Mat, Point2f, Scalar, Size, BORDER_REPLICATE};
use opencv::imgproc;
use opencv::prelude::*;
use rand::Rng;

/// One concrete draw of the random transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    /// Rotation about the image center, in degrees
    pub rotation: f32,
    /// Horizontal shift in pixels
    pub shift_x: f32,
    /// Vertical shift in pixels
    pub shift_y: f32,
    pub flip_horizontal: bool,
}

impl TransformParams {
    pub const IDENTITY: TransformParams = TransformParams {
        rotation: 0.0,
        shift_x: 0.0,
        shift_y: 0.0,
        flip_horizontal: false,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Draws rotation, shifts and flip uniformly within the configured ranges
    pub fn sample_params<R: Rng + ?Sized>(
        &self,
        width: u32,
        height: u32,
        rng: &mut R,
    ) -> TransformParams {
        let c = &self.config;
        TransformParams {
            rotation: symmetric(rng, c.rotation_range),
            shift_x: symmetric(rng, c.width_shift_range) * width as f32,
            shift_y: symmetric(rng, c.height_shift_range) * height as f32,
            flip_horizontal: c.horizontal_flip && rng.gen_bool(0.5),
        }
    }

    pub fn random_transform<R: Rng + ?Sized>(
        &self,
        img: &RgbImage,
        rng: &mut R,
    ) -> Result<RgbImage> {
        let params = self.sample_params(img.width(), img.height(), rng);
        apply_transform(img, params)
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f32) -> f32 {
    if range <= 0.0 {
        0.0
    } else {
        rng.gen_range(-range..=range)
    }
}

/// Applies rotation and shift about the image center, then the optional mirror
///
/// Output pixels are bilinearly sampled; coordinates falling outside the
/// source take the value of the nearest edge pixel.
pub fn apply_transform(img: &RgbImage, params: TransformParams) -> Result<RgbImage> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || params == TransformParams::IDENTITY {
        return Ok(img.clone());
    }

    let flat = Mat::from_slice(img.as_raw().as_slice()).map_err(|e| {
        EmotionDetectorError::Dataset(format!("Failed to create image Mat: {e}"))
    })?;
    let src = flat.reshape(3, height as i32).map_err(|e| {
        EmotionDetectorError::Dataset(format!("Failed to reshape image Mat: {e}"))
    })?;

    // Maps output coordinates back into the source
    let center = Point2f::new((width as f32 - 1.0) / 2.0, (height as f32 - 1.0) / 2.0);
    let mut inverse = imgproc::get_rotation_matrix_2d(center, params.rotation as f64, 1.0)
        .map_err(|e| EmotionDetectorError::Dataset(format!("Failed to build rotation: {e}")))?;
    *inverse.at_2d_mut::<f64>(0, 2)? -= params.shift_x as f64;
    *inverse.at_2d_mut::<f64>(1, 2)? -= params.shift_y as f64;

    let mut warped = Mat::default();
    imgproc::warp_affine(
        &src,
        &mut warped,
        &inverse,
        Size::new(width as i32, height as i32),
        imgproc::INTER_LINEAR | imgproc::WARP_INVERSE_MAP,
        BORDER_REPLICATE,
        Scalar::default(),
    )
    .map_err(|e| EmotionDetectorError::Dataset(format!("Failed to warp image: {e}")))?;

    if params.flip_horizontal {
        let mut flipped = Mat::default();
        opencv::core::flip(&warped, &mut flipped, 1)
            .map_err(|e| EmotionDetectorError::Dataset(format!("Failed to flip image: {e}")))?;
        warped = flipped;
    }

    mat_to_image(&warped)
}
