// Library exports for the Emotion Detector

pub mod camera;
pub mod config;
pub mod emotion;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod training;
pub mod ui;

pub use config::{DetectionParams, DetectorConfig, TrainingConfig};
pub use error::{EmotionDetectorError, Result};
pub use models::{Annotation, Color, EmotionLabel, FaceRegion, Frame, Prediction};
pub use pipeline::CaptureLoop;
