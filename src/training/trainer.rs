// Epoch loop over an externally defined trainable model

use crate::config::{MonitorMode, MonitoredMetric};
use crate::error::{EmotionDetectorError, Result};
use crate::training::callbacks::Callback;
use crate::training::dataset::{Batch, BatchIterator};
use crate::training::metrics::{categorical_accuracy, categorical_crossentropy, RunningMean};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// The network being fitted; its layers and optimizer live in the backing framework
pub trait TrainableModel {
    /// Opaque copy of the weights
    type Snapshot;

    /// Runs one optimizer step and returns the forward-pass probabilities (N, classes)
    fn train_batch(&mut self, batch: &Batch, learning_rate: f32) -> Result<Array2<f32>>;

    /// Forward pass without updating weights
    fn eval_batch(&mut self, batch: &Batch) -> Result<Array2<f32>>;

    /// Writes an inference-ready model to `path`
    fn save(&mut self, path: &Path) -> Result<()>;

    fn snapshot(&mut self) -> Result<Self::Snapshot>;

    fn restore(&mut self, snapshot: &Self::Snapshot) -> Result<()>;
}

/// Supplies batches to the epoch loop
pub trait BatchSource {
    fn next_batch(&mut self) -> Result<Batch>;
}

impl BatchSource for BatchIterator {
    fn next_batch(&mut self) -> Result<Batch> {
        BatchIterator::next_batch(self)
    }
}

/// Mutable run state shared with callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingState {
    pub learning_rate: f32,
    pub stop_training: bool,
}

/// Metrics recorded at the end of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// Zero-based epoch index
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
    /// Learning rate the epoch was trained with
    pub learning_rate: f32,
}

impl EpochLogs {
    pub fn get(&self, metric: MonitoredMetric) -> Option<f32> {
        match metric {
            MonitoredMetric::Loss => Some(self.loss),
            MonitoredMetric::Accuracy => Some(self.accuracy),
            MonitoredMetric::ValLoss => self.val_loss,
            MonitoredMetric::ValAccuracy => self.val_accuracy,
        }
    }
}

impl std::fmt::Display for EpochLogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loss: {:.4} - accuracy: {:.4}", self.loss, self.accuracy)?;
        if let (Some(val_loss), Some(val_accuracy)) = (self.val_loss, self.val_accuracy) {
            write!(f, " - val_loss: {val_loss:.4} - val_accuracy: {val_accuracy:.4}")?;
        }
        write!(f, " - lr: {:.6}", self.learning_rate)
    }
}

/// Per-epoch record of a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochLogs>,
    pub stopped_early: bool,
}

impl History {
    pub fn best(&self, metric: MonitoredMetric) -> Option<&EpochLogs> {
        let mode = metric.default_mode();
        self.epochs
            .iter()
            .filter(|e| e.get(metric).is_some())
            .min_by(|a, b| {
                let (a, b) = (a.get(metric).unwrap_or(0.0), b.get(metric).unwrap_or(0.0));
                match mode {
                    MonitorMode::Min => a.total_cmp(&b),
                    MonitorMode::Max => b.total_cmp(&a),
                }
            })
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        info!("Training history written to {}", path.as_ref().display());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub validation_steps: usize,
    pub learning_rate: f32,
}

/// Trains for `options.epochs` epochs, validating after each one
pub fn fit<M: TrainableModel>(
    model: &mut M,
    train: &mut dyn BatchSource,
    validation: &mut dyn BatchSource,
    options: &FitOptions,
    callbacks: &mut [Box<dyn Callback<M>>],
) -> Result<History> {
    if options.steps_per_epoch == 0 {
        return Err(EmotionDetectorError::Training(
            "steps_per_epoch must be positive".to_string(),
        ));
    }

    let mut state = TrainingState {
        learning_rate: options.learning_rate,
        stop_training: false,
    };
    let mut history = History::default();

    for callback in callbacks.iter_mut() {
        callback.on_train_begin(model, &mut state)?;
    }

    for epoch in 0..options.epochs {
        info!("Epoch {}/{}", epoch + 1, options.epochs);
        let learning_rate = state.learning_rate;

        let mut loss = RunningMean::default();
        let mut accuracy = RunningMean::default();
        for step in 0..options.steps_per_epoch {
            let batch = train.next_batch()?;
            let probabilities = model.train_batch(&batch, learning_rate)?;
            check_output(&probabilities, &batch)?;
            loss.update(
                categorical_crossentropy(probabilities.view(), batch.labels.view()),
                batch.len(),
            );
            accuracy.update(
                categorical_accuracy(probabilities.view(), batch.labels.view()),
                batch.len(),
            );
            debug!(
                "step {}/{} - loss: {:.4}",
                step + 1,
                options.steps_per_epoch,
                loss.mean()
            );
        }

        let (val_loss, val_accuracy) = if options.validation_steps > 0 {
            let (l, a) = evaluate(model, validation, options.validation_steps)?;
            (Some(l), Some(a))
        } else {
            (None, None)
        };

        let logs = EpochLogs {
            epoch,
            loss: loss.mean(),
            accuracy: accuracy.mean(),
            val_loss,
            val_accuracy,
            learning_rate,
        };
        info!("Epoch {}/{} - {}", epoch + 1, options.epochs, logs);

        for callback in callbacks.iter_mut() {
            callback.on_epoch_end(&logs, model, &mut state)?;
        }
        history.epochs.push(logs);

        if state.stop_training {
            history.stopped_early = true;
            break;
        }
    }

    for callback in callbacks.iter_mut() {
        callback.on_train_end(model, &mut state)?;
    }

    Ok(history)
}

/// Mean loss and accuracy over `steps` batches without touching the weights
pub fn evaluate<M: TrainableModel>(
    model: &mut M,
    source: &mut dyn BatchSource,
    steps: usize,
) -> Result<(f32, f32)> {
    let mut loss = RunningMean::default();
    let mut accuracy = RunningMean::default();
    for _ in 0..steps {
        let batch = source.next_batch()?;
        let probabilities = model.eval_batch(&batch)?;
        check_output(&probabilities, &batch)?;
        loss.update(
            categorical_crossentropy(probabilities.view(), batch.labels.view()),
            batch.len(),
        );
        accuracy.update(
            categorical_accuracy(probabilities.view(), batch.labels.view()),
            batch.len(),
        );
    }
    Ok((loss.mean(), accuracy.mean()))
}

fn check_output(probabilities: &Array2<f32>, batch: &Batch) -> Result<()> {
    if probabilities.dim() != batch.labels.dim() {
        return Err(EmotionDetectorError::ShapeMismatch {
            expected: format!("{:?}", batch.labels.dim()),
            actual: format!("{:?}", probabilities.dim()),
        });
    }
    Ok(())
}
