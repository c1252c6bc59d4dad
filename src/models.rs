// Core data models for the Emotion Detector application

use crate::error::{EmotionDetectorError, Result};
use crate::preprocess::mat_to_image;
use image::GrayImage;
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};

/// Represents a single video frame with RGB data
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Creates an all-black frame
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; Self::byte_len(width, height)], width, height)
    }

    fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Converts the frame to single-channel luminance (BT.601 weights)
    pub fn to_gray(&self) -> Result<GrayImage> {
        let expected = Self::byte_len(self.width, self.height);
        if self.data.len() != expected {
            return Err(EmotionDetectorError::FrameProcessing(format!(
                "Frame buffer of {} bytes does not match {}x{}",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        if expected == 0 {
            return Ok(GrayImage::new(self.width, self.height));
        }

        let mat = Mat::from_slice(self.data.as_slice()).map_err(|e| {
            EmotionDetectorError::FrameProcessing(format!("Failed to create Mat: {e}"))
        })?;
        let mat = mat.reshape(3, self.height as i32).map_err(|e| {
            EmotionDetectorError::FrameProcessing(format!("Failed to reshape Mat: {e}"))
        })?;

        let mut gray = Mat::default();
        imgproc::cvt_color_def(&mat, &mut gray, imgproc::COLOR_RGB2GRAY).map_err(|e| {
            EmotionDetectorError::FrameProcessing(format!("Failed to convert to grayscale: {e}"))
        })?;

        mat_to_image(&gray)
    }
}

/// An axis-aligned face bounding box in frame coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRegion {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Text origin sitting `offset` pixels above the top edge
    pub fn caption_origin(&self, offset: i32) -> (i32, i32) {
        (self.x, self.y - offset)
    }
}

/// RGB drawing color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const PURPLE: Color = Color::rgb(128, 0, 128);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
}

/// The closed set of emotions the classifier distinguishes, in model output order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmotionLabel {
    Angry,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl EmotionLabel {
    /// All labels, indexed by classifier output position
    pub const ALL: [EmotionLabel; 5] = [
        EmotionLabel::Angry,
        EmotionLabel::Happy,
        EmotionLabel::Neutral,
        EmotionLabel::Sad,
        EmotionLabel::Surprise,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Angry => "Angry",
            EmotionLabel::Happy => "Happy",
            EmotionLabel::Neutral => "Neutral",
            EmotionLabel::Sad => "Sad",
            EmotionLabel::Surprise => "Surprise",
        }
    }

    /// Display color used for this label's box and caption
    pub fn color(self) -> Color {
        match self {
            EmotionLabel::Angry => Color::RED,
            EmotionLabel::Happy => Color::GREEN,
            EmotionLabel::Neutral => Color::BLUE,
            EmotionLabel::Sad => Color::PURPLE,
            EmotionLabel::Surprise => Color::YELLOW,
        }
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The arg-max of one classifier output
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    /// The winning label
    pub label: EmotionLabel,
    /// Probability assigned to the winning label (0.0 to 1.0)
    pub confidence: f32,
}

impl Prediction {
    /// Picks the most probable label; ties go to the lowest index
    pub fn from_probabilities(probabilities: &[f32]) -> Option<Self> {
        let index = crate::emotion::argmax(probabilities)?;
        let label = EmotionLabel::from_index(index)?;
        Some(Self {
            label,
            confidence: probabilities[index],
        })
    }

    /// Returns the confidence as a percentage (0-100)
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}% confidence)",
            self.label,
            self.confidence_percent()
        )
    }
}

/// A drawing instruction applied to a frame before display
#[derive(Clone, Debug, PartialEq)]
pub enum Annotation {
    /// Rectangle outline around a face
    Box {
        region: FaceRegion,
        color: Color,
        thickness: i32,
    },
    /// Text whose baseline starts at `origin`
    Caption {
        text: String,
        origin: (i32, i32),
        color: Color,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_order_matches_classifier_output() {
        for (i, label) in EmotionLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(EmotionLabel::from_index(i), Some(*label));
        }
        assert_eq!(EmotionLabel::from_index(5), None);
    }

    #[test]
    fn every_label_has_a_distinct_color() {
        let mut colors: Vec<Color> = EmotionLabel::ALL.iter().map(|l| l.color()).collect();
        colors.sort_by_key(|c| (c.r, c.g, c.b));
        colors.dedup();
        assert_eq!(colors.len(), EmotionLabel::COUNT);
        assert_eq!(EmotionLabel::Happy.color(), Color::rgb(0, 255, 0));
        assert_eq!(EmotionLabel::Sad.color(), Color::rgb(128, 0, 128));
    }

    #[test]
    fn prediction_takes_first_maximum() {
        let p = Prediction::from_probabilities(&[0.3, 0.3, 0.2, 0.1, 0.1]).unwrap();
        assert_eq!(p.label, EmotionLabel::Angry);
        assert_eq!(p.confidence_percent(), 30);
        assert_eq!(p.to_string(), "Angry (30% confidence)");
    }

    #[test]
    fn caption_sits_above_box() {
        let region = FaceRegion::new(40, 25, 60, 60);
        assert_eq!(region.caption_origin(10), (40, 15));
    }

    #[test]
    fn gray_conversion_rejects_short_buffer() {
        let frame = Frame::new(vec![0; 5], 2, 2);
        assert!(matches!(
            frame.to_gray(),
            Err(EmotionDetectorError::FrameProcessing(_))
        ));
        let gray = Frame::blank(4, 3).to_gray().unwrap();
        assert_eq!(gray.dimensions(), (4, 3));
    }

    #[test]
    fn gray_uses_bt601_luma() {
        let frame = Frame::new(
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 224, 172, 105, 180, 180, 180],
            5,
            1,
        );
        let gray = frame.to_gray().unwrap();
        let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![76, 150, 29, 180, 180]);
    }

    #[test]
    fn blank_size_is_computed_without_u32_overflow() {
        assert_eq!(Frame::byte_len(70_000, 70_000), 14_700_000_000);
        assert_eq!(Frame::blank(0, 9).to_gray().unwrap().dimensions(), (0, 9));
    }
}
