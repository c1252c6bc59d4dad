// Face detection and emotion classification collaborators

use crate::config::DetectionParams;
use crate::error::{EmotionDetectorError, Result};
use crate::models::{EmotionLabel, FaceRegion};
use image::GrayImage;
use ndarray::Array4;
use tracing::{error, info};

/// Finds candidate face rectangles in a grayscale frame
pub trait FaceLocator {
    fn locate(&mut self, gray: &GrayImage, params: DetectionParams) -> Result<Vec<FaceRegion>>;
}

/// Maps a (1, H, W, 1) normalized patch to one probability per label
pub trait EmotionClassifier {
    fn predict(&mut self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

impl<T: FaceLocator + ?Sized> FaceLocator for Box<T> {
    fn locate(&mut self, gray: &GrayImage, params: DetectionParams) -> Result<Vec<FaceRegion>> {
        (**self).locate(gray, params)
    }
}

impl<T: EmotionClassifier + ?Sized> EmotionClassifier for Box<T> {
    fn predict(&mut self, input: &Array4<f32>) -> Result<Vec<f32>> {
        (**self).predict(input)
    }
}

/// Index of the largest value; the first one wins ties and NaN never wins
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Checks the classifier's output width against the label set with one probe inference
pub fn validate_classifier<C: EmotionClassifier + ?Sized>(
    classifier: &mut C,
    input_size: u32,
) -> Result<()> {
    let side = input_size as usize;
    let probe = Array4::<f32>::zeros((1, side, side, 1));
    let output = classifier.predict(&probe).map_err(|e| {
        error!("Classifier rejected a {side}x{side} probe: {}", e);
        EmotionDetectorError::ShapeMismatch {
            expected: format!("input (1, {side}, {side}, 1)"),
            actual: e.to_string(),
        }
    })?;

    if output.len() != EmotionLabel::COUNT {
        error!(
            "Classifier produced {} outputs for {} labels",
            output.len(),
            EmotionLabel::COUNT
        );
        return Err(EmotionDetectorError::ShapeMismatch {
            expected: format!("{} probabilities", EmotionLabel::COUNT),
            actual: format!("{} probabilities", output.len()),
        });
    }

    info!("Classifier accepts {side}x{side} input with {} outputs", output.len());
    Ok(())
}

#[cfg(feature = "native")]
pub use native::{CascadeFaceLocator, OnnxEmotionClassifier};

#[cfg(feature = "native")]
mod native {
    use super::*;
    use opencv::core::{Mat, Rect, Size, Vector};
    use opencv::objdetect::CascadeClassifier;
    use opencv::prelude::*;
    use ort::session::Session;
    use ort::value::TensorRef;
    use std::path::Path;

    /// Face locator using OpenCV Haar Cascade
    pub struct CascadeFaceLocator {
        classifier: CascadeClassifier,
    }

    impl CascadeFaceLocator {
        /// Loads the Haar Cascade classifier from disk
        pub fn new(cascade_path: &Path) -> Result<Self> {
            if !cascade_path.exists() {
                error!("Haar Cascade not found at {}", cascade_path.display());
                return Err(EmotionDetectorError::StartupAssetMissing(
                    cascade_path.to_path_buf(),
                ));
            }

            let path = cascade_path.to_string_lossy();
            let classifier = CascadeClassifier::new(&path).map_err(|e| {
                error!("Failed to load Haar Cascade: {}", e);
                EmotionDetectorError::ModelLoad(format!("Haar Cascade load failed: {e}"))
            })?;

            if classifier.empty()? {
                return Err(EmotionDetectorError::ModelLoad(
                    "Haar Cascade classifier is empty".to_string(),
                ));
            }

            Ok(Self { classifier })
        }
    }

    impl FaceLocator for CascadeFaceLocator {
        fn locate(
            &mut self,
            gray: &GrayImage,
            params: DetectionParams,
        ) -> Result<Vec<FaceRegion>> {
            let mat = Mat::from_slice(gray.as_raw().as_slice()).map_err(|e| {
                EmotionDetectorError::FaceDetection(format!("Failed to create Mat: {e}"))
            })?;
            let mat = mat.reshape(1, gray.height() as i32).map_err(|e| {
                EmotionDetectorError::FaceDetection(format!("Failed to reshape Mat: {e}"))
            })?;

            let mut faces = Vector::<Rect>::new();
            self.classifier
                .detect_multi_scale(
                    &mat,
                    &mut faces,
                    params.scale_factor,
                    params.min_neighbors,
                    0,
                    Size::new(0, 0),
                    Size::new(0, 0),
                )
                .map_err(|e| {
                    EmotionDetectorError::FaceDetection(format!("Face detection failed: {e}"))
                })?;

            Ok(faces
                .iter()
                .map(|r| FaceRegion::new(r.x, r.y, r.width, r.height))
                .collect())
        }
    }

    /// Emotion classifier using ONNX Runtime
    pub struct OnnxEmotionClassifier {
        session: Session,
    }

    impl OnnxEmotionClassifier {
        /// Loads the exported classifier graph
        pub fn new(model_path: &Path) -> Result<Self> {
            if !model_path.exists() {
                error!("Emotion model not found at {}", model_path.display());
                return Err(EmotionDetectorError::StartupAssetMissing(
                    model_path.to_path_buf(),
                ));
            }

            let session = Session::builder()
                .map_err(|e| {
                    EmotionDetectorError::ModelLoad(format!(
                        "Failed to create session builder: {e}"
                    ))
                })?
                .commit_from_file(model_path)
                .map_err(|e| {
                    error!("Failed to load ONNX model: {}", e);
                    EmotionDetectorError::ModelLoad(format!("ONNX model load failed: {e}"))
                })?;

            Ok(Self { session })
        }
    }

    impl EmotionClassifier for OnnxEmotionClassifier {
        fn predict(&mut self, input: &Array4<f32>) -> Result<Vec<f32>> {
            let tensor = TensorRef::from_array_view(input.view()).map_err(|e| {
                EmotionDetectorError::Classification(format!("Failed to create input tensor: {e}"))
            })?;

            let outputs = self.session.run(ort::inputs![tensor]).map_err(|e| {
                error!("ONNX inference failed: {}", e);
                EmotionDetectorError::Classification(format!("Inference failed: {e}"))
            })?;

            let (_, probabilities) = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
                EmotionDetectorError::Classification(format!(
                    "Failed to extract output tensor: {e}"
                ))
            })?;

            Ok(probabilities.to_vec())
        }
    }
}
