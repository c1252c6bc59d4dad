// Error types for the Emotion Detector application

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Emotion Detector application
#[derive(Debug, Error)]
pub enum EmotionDetectorError {
    #[error("Required asset not found: {}", .0.display())]
    StartupAssetMissing(PathBuf),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Classifier shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Camera initialization failed: {0}")]
    CameraInit(String),

    #[error("Frame acquisition failed: {0}")]
    FrameAcquisition(String),

    #[error("Frame processing failed: {0}")]
    FrameProcessing(String),

    #[error("Face detection failed: {0}")]
    FaceDetection(String),

    #[error("Emotion classification failed: {0}")]
    Classification(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OpenCV error: {0}")]
    OpenCV(String),

    #[cfg(feature = "native")]
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(String),
}

/// Result type alias for Emotion Detector operations
pub type Result<T> = std::result::Result<T, EmotionDetectorError>;

impl EmotionDetectorError {
    /// Whether the error should end the process rather than skip the current frame
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EmotionDetectorError::FrameAcquisition(_))
    }
}

// Conversion from nokhwa errors
#[cfg(feature = "native")]
impl From<nokhwa::NokhwaError> for EmotionDetectorError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        match err {
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                EmotionDetectorError::CameraInit(format!("Device {device}: {error}"))
            }
            nokhwa::NokhwaError::ReadFrameError(error) => {
                EmotionDetectorError::FrameAcquisition(error)
            }
            _ => EmotionDetectorError::CameraInit(err.to_string()),
        }
    }
}

// Conversion from OpenCV errors
impl From<opencv::Error> for EmotionDetectorError {
    fn from(err: opencv::Error) -> Self {
        EmotionDetectorError::OpenCV(err.to_string())
    }
}

// Conversion from ONNX Runtime errors
#[cfg(feature = "native")]
impl From<ort::Error> for EmotionDetectorError {
    fn from(err: ort::Error) -> Self {
        EmotionDetectorError::OnnxRuntime(err.to_string())
    }
}
