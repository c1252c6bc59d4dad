// Fixed configuration for the capture loop and the trainer

use crate::models::Color;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cascade detector policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DetectionParams {
    /// Search image shrink factor between pyramid levels
    pub scale_factor: f64,
    /// Overlapping detections needed before a candidate is reported
    pub min_neighbors: i32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 5,
        }
    }
}

/// Everything the capture loop needs, built once in `main`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    pub cascade_path: PathBuf,
    pub classifier_path: PathBuf,
    pub camera_index: u32,
    pub detection: DetectionParams,
    /// Side length of the square classifier input
    pub input_size: u32,
    pub box_thickness: i32,
    /// Distance between the caption baseline and the box top edge
    pub caption_offset: i32,
    pub degenerate_caption: String,
    pub degenerate_origin: (i32, i32),
    pub degenerate_color: Color,
    pub window_title: String,
    pub quit_key: char,
    /// Consecutive failed reads tolerated before the loop gives up
    pub max_consecutive_read_failures: u32,
    pub log_file: PathBuf,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cascade_path: PathBuf::from("assets/models/haarcascade_frontalface_default.xml"),
            classifier_path: PathBuf::from("assets/models/emotion_detection.onnx"),
            camera_index: 0,
            detection: DetectionParams::default(),
            input_size: 48,
            box_thickness: 2,
            caption_offset: 10,
            degenerate_caption: "No Face Found".to_string(),
            degenerate_origin: (20, 60),
            degenerate_color: Color::GREEN,
            window_title: "Emotion Detector".to_string(),
            quit_key: 'q',
            max_consecutive_read_failures: 30,
            log_file: PathBuf::from("emotion_detector.log"),
        }
    }
}

/// Random transforms applied to training images
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AugmentationConfig {
    /// Maximum absolute rotation in degrees
    pub rotation_range: f32,
    /// Maximum horizontal shift as a fraction of width
    pub width_shift_range: f32,
    /// Maximum vertical shift as a fraction of height
    pub height_shift_range: f32,
    pub horizontal_flip: bool,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_range: 30.0,
            width_shift_range: 0.3,
            height_shift_range: 0.3,
            horizontal_flip: true,
        }
    }
}

/// Which epoch metric a callback watches
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredMetric {
    Loss,
    Accuracy,
    ValLoss,
    ValAccuracy,
}

impl MonitoredMetric {
    pub fn name(self) -> &'static str {
        match self {
            MonitoredMetric::Loss => "loss",
            MonitoredMetric::Accuracy => "accuracy",
            MonitoredMetric::ValLoss => "val_loss",
            MonitoredMetric::ValAccuracy => "val_accuracy",
        }
    }

    /// Losses improve downwards, accuracies upwards
    pub fn default_mode(self) -> MonitorMode {
        match self {
            MonitoredMetric::Loss | MonitoredMetric::ValLoss => MonitorMode::Min,
            MonitoredMetric::Accuracy | MonitoredMetric::ValAccuracy => MonitorMode::Max,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    Min,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    pub monitor: MonitoredMetric,
    pub mode: MonitorMode,
    pub save_best_only: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EarlyStoppingConfig {
    pub monitor: MonitoredMetric,
    pub patience: usize,
    pub min_delta: f32,
    pub restore_best_weights: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReduceLrConfig {
    pub monitor: MonitoredMetric,
    pub patience: usize,
    pub factor: f32,
    pub min_lr: f32,
    pub min_delta: f32,
    pub cooldown: usize,
}

/// ONNX Runtime on-device training artifacts for the backbone plus head
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingArtifacts {
    pub checkpoint: PathBuf,
    pub training_model: PathBuf,
    pub eval_model: PathBuf,
    pub optimizer_model: PathBuf,
    /// Graph output holding the softmax probabilities
    pub probabilities_output: String,
}

/// Layer widths of the dense head stacked on the pooled backbone features
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeadLayout {
    pub backbone: String,
    pub dense_units: Vec<usize>,
    pub trainable_backbone: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub num_classes: usize,
    pub train_dir: PathBuf,
    pub validation_dir: PathBuf,
    pub batch_size: usize,
    pub epochs: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub learning_rate: f32,
    pub augmentation: AugmentationConfig,
    pub checkpoint: CheckpointConfig,
    pub early_stopping: EarlyStoppingConfig,
    pub reduce_lr: ReduceLrConfig,
    pub artifacts: TrainingArtifacts,
    pub head: HeadLayout,
    pub history_path: PathBuf,
    pub log_file: PathBuf,
}

impl TrainingConfig {
    pub fn steps_per_epoch(&self) -> usize {
        self.train_samples / self.batch_size
    }

    pub fn validation_steps(&self) -> usize {
        self.validation_samples / self.batch_size
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            image_width: 224,
            image_height: 224,
            num_classes: 5,
            train_dir: PathBuf::from("fer2013/train"),
            validation_dir: PathBuf::from("fer2013/validation"),
            batch_size: 32,
            epochs: 25,
            train_samples: 24176,
            validation_samples: 3006,
            learning_rate: 0.001,
            augmentation: AugmentationConfig::default(),
            checkpoint: CheckpointConfig {
                path: PathBuf::from("emotion_face_mobilenet.onnx"),
                monitor: MonitoredMetric::ValLoss,
                mode: MonitorMode::Min,
                save_best_only: true,
            },
            early_stopping: EarlyStoppingConfig {
                monitor: MonitoredMetric::ValLoss,
                patience: 10,
                min_delta: 0.0,
                restore_best_weights: true,
            },
            reduce_lr: ReduceLrConfig {
                monitor: MonitoredMetric::ValAccuracy,
                patience: 5,
                factor: 0.2,
                min_lr: 0.0001,
                min_delta: 0.0001,
                cooldown: 0,
            },
            artifacts: TrainingArtifacts {
                checkpoint: PathBuf::from("artifacts/checkpoint"),
                training_model: PathBuf::from("artifacts/training_model.onnx"),
                eval_model: PathBuf::from("artifacts/eval_model.onnx"),
                optimizer_model: PathBuf::from("artifacts/optimizer_model.onnx"),
                probabilities_output: "probabilities".to_string(),
            },
            head: HeadLayout {
                backbone: "MobileNet (ImageNet weights, no top)".to_string(),
                dense_units: vec![1024, 1024, 512],
                trainable_backbone: true,
            },
            history_path: PathBuf::from("training_history.json"),
            log_file: PathBuf::from("training.log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_policy_is_fixed() {
        let config = DetectorConfig::default();
        assert_eq!(config.detection.scale_factor, 1.3);
        assert_eq!(config.detection.min_neighbors, 5);
        assert_eq!(config.input_size, 48);
    }

    #[test]
    fn steps_use_integer_division() {
        let config = TrainingConfig::default();
        assert_eq!(config.steps_per_epoch(), 755);
        assert_eq!(config.validation_steps(), 93);
    }

    #[test]
    fn accuracy_is_maximized() {
        assert_eq!(MonitoredMetric::ValAccuracy.default_mode(), MonitorMode::Max);
        assert_eq!(MonitoredMetric::ValLoss.default_mode(), MonitorMode::Min);
        assert_eq!(MonitoredMetric::ValAccuracy.name(), "val_accuracy");
    }

    #[test]
    fn config_serializes_for_the_run_summary() {
        let json = serde_json::to_string(&TrainingConfig::default()).unwrap();
        assert!(json.contains("\"monitor\":\"val_loss\""));
        let back: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TrainingConfig::default());
    }
}
