// Face crop preparation for the emotion classifier

use crate::error::{EmotionDetectorError, Result};
use crate::models::FaceRegion;
use image::{GrayImage, ImageBuffer, Pixel};
use ndarray::Array4;
use opencv::core::{Mat, Rect, Size};
use opencv::imgproc;
use opencv::prelude::*;

/// Clamps `region` to a `width` x `height` image; `None` when nothing is left
pub fn clamp_region(region: FaceRegion, width: u32, height: u32) -> Option<Rect> {
    let (width, height) = (width as i64, height as i64);
    let x0 = (region.x as i64).clamp(0, width);
    let y0 = (region.y as i64).clamp(0, height);
    let x1 = (region.x as i64 + region.width.max(0) as i64).clamp(0, width);
    let y1 = (region.y as i64 + region.height.max(0) as i64).clamp(0, height);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::new(
        x0 as i32,
        y0 as i32,
        (x1 - x0) as i32,
        (y1 - y0) as i32,
    ))
}

/// Crops `region` out of `gray`, clamped to the image bounds
///
/// A region lying entirely outside the image yields an empty image.
pub fn crop(gray: &GrayImage, region: FaceRegion) -> Result<GrayImage> {
    let Some(rect) = clamp_region(region, gray.width(), gray.height()) else {
        return Ok(GrayImage::new(0, 0));
    };

    let mat = Mat::from_slice(gray.as_raw().as_slice()).map_err(|e| {
        EmotionDetectorError::FrameProcessing(format!("Failed to create Mat: {e}"))
    })?;
    let mat = mat
        .reshape(1, gray.height() as i32)
        .and_then(|m| m.try_clone())
        .map_err(|e| {
            EmotionDetectorError::FrameProcessing(format!("Failed to reshape Mat: {e}"))
        })?;

    let face_roi = Mat::roi(&mat, rect).map_err(|e| {
        EmotionDetectorError::FrameProcessing(format!("Failed to crop face region: {e}"))
    })?;
    // ROIs share the parent's stride; cloning makes the bytes contiguous
    let face = face_roi.try_clone().map_err(|e| {
        EmotionDetectorError::FrameProcessing(format!("Failed to clone face ROI: {e}"))
    })?;

    mat_to_image(&face)
}

/// Resizes with OpenCV area interpolation
///
/// The output is always `width` x `height`; an empty source gives an all-zero
/// image.
pub fn resize_area(src: &GrayImage, width: u32, height: u32) -> Result<GrayImage> {
    if src.width() == 0 || src.height() == 0 {
        return Ok(GrayImage::new(width, height));
    }

    let mat = Mat::from_slice(src.as_raw().as_slice()).map_err(|e| {
        EmotionDetectorError::FrameProcessing(format!("Failed to create Mat: {e}"))
    })?;
    let mat = mat.reshape(1, src.height() as i32).map_err(|e| {
        EmotionDetectorError::FrameProcessing(format!("Failed to reshape Mat: {e}"))
    })?;

    let mut resized = Mat::default();
    imgproc::resize(
        &mat,
        &mut resized,
        Size::new(width as i32, height as i32),
        0.0,
        0.0,
        imgproc::INTER_AREA,
    )
    .map_err(|e| EmotionDetectorError::FrameProcessing(format!("Failed to resize face: {e}")))?;

    mat_to_image(&resized)
}

/// Copies a continuous 8-bit Mat into an `image` buffer of matching channel count
pub(crate) fn mat_to_image<P>(mat: &Mat) -> Result<ImageBuffer<P, Vec<u8>>>
where
    P: Pixel<Subpixel = u8>,
{
    let data = mat.data_bytes().map_err(|e| {
        EmotionDetectorError::FrameProcessing(format!("Failed to get Mat data: {e}"))
    })?;

    ImageBuffer::from_raw(mat.cols() as u32, mat.rows() as u32, data.to_vec()).ok_or_else(|| {
        EmotionDetectorError::FrameProcessing(format!(
            "Mat of {}x{} with {} channel(s) does not fit a {}-channel image",
            mat.cols(),
            mat.rows(),
            mat.channels(),
            P::CHANNEL_COUNT
        ))
    })
}

/// True when every pixel of the patch is zero
pub fn is_degenerate(patch: &GrayImage) -> bool {
    patch.as_raw().iter().all(|&p| p == 0)
}

/// Packs a patch into a (1, H, W, 1) tensor scaled to [0, 1]
pub fn to_tensor(patch: &GrayImage) -> Array4<f32> {
    let (width, height) = patch.dimensions();
    Array4::from_shape_fn((1, height as usize, width as usize, 1), |(_, y, x, _)| {
        patch.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
    })
}
