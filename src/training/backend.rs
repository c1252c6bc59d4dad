// ONNX Runtime on-device training backend

use crate::config::TrainingArtifacts;
use crate::error::{EmotionDetectorError, Result};
use crate::training::dataset::Batch;
use crate::training::trainer::TrainableModel;
use ndarray::Array2;
use ort::memory::Allocator;
use ort::session::{Session, SessionOutputs};
use ort::training::{Checkpoint, Trainer};
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Backbone + head graphs prepared offline as ONNX Runtime training artifacts
pub struct OrtTrainingModel {
    artifacts: TrainingArtifacts,
    trainer: Trainer,
    snapshot_path: PathBuf,
}

fn training_error(context: &str) -> impl Fn(ort::Error) -> EmotionDetectorError + '_ {
    move |e| EmotionDetectorError::Training(format!("{context}: {e}"))
}

impl OrtTrainingModel {
    pub fn load(artifacts: &TrainingArtifacts) -> Result<Self> {
        for path in [
            &artifacts.checkpoint,
            &artifacts.training_model,
            &artifacts.eval_model,
            &artifacts.optimizer_model,
        ] {
            if !path.exists() {
                error!("Training artifact missing: {}", path.display());
                return Err(EmotionDetectorError::StartupAssetMissing(path.clone()));
            }
        }

        let trainer = Self::build_trainer(artifacts, &artifacts.checkpoint)?;
        info!(
            "Loaded training graphs from {}",
            artifacts.training_model.display()
        );

        Ok(Self {
            artifacts: artifacts.clone(),
            trainer,
            snapshot_path: artifacts.checkpoint.with_extension("best"),
        })
    }

    fn build_trainer(artifacts: &TrainingArtifacts, checkpoint: &Path) -> Result<Trainer> {
        let checkpoint =
            Checkpoint::load(checkpoint).map_err(training_error("Failed to load checkpoint"))?;
        let builder = Session::builder().map_err(|e| {
            EmotionDetectorError::ModelLoad(format!("Failed to create session builder: {e}"))
        })?;

        Trainer::new(
            builder,
            Allocator::default(),
            checkpoint,
            &artifacts.training_model,
            &artifacts.eval_model,
            &artifacts.optimizer_model,
        )
        .map_err(|e| {
            error!("Failed to build trainer: {}", e);
            EmotionDetectorError::ModelLoad(format!("Trainer creation failed: {e}"))
        })
    }

    fn probabilities(
        outputs: &SessionOutputs<'_>,
        name: &str,
        batch: &Batch,
    ) -> Result<Array2<f32>> {
        let (_, data) = outputs[name]
            .try_extract_tensor::<f32>()
            .map_err(training_error("Failed to extract probabilities"))?;
        let rows = batch.len();
        let cols = if rows == 0 { 0 } else { data.len() / rows };
        Array2::from_shape_vec((rows, cols), data.to_vec()).map_err(|e| {
            EmotionDetectorError::Training(format!("Unexpected probabilities layout: {e}"))
        })
    }
}

impl TrainableModel for OrtTrainingModel {
    type Snapshot = PathBuf;

    fn train_batch(&mut self, batch: &Batch, learning_rate: f32) -> Result<Array2<f32>> {
        let optimizer = self.trainer.optimizer();
        optimizer
            .set_lr(learning_rate)
            .map_err(training_error("Failed to set learning rate"))?;

        let images = TensorRef::from_array_view(batch.images.view())
            .map_err(training_error("Failed to create image tensor"))?;
        let labels = TensorRef::from_array_view(batch.class_indices.view())
            .map_err(training_error("Failed to create label tensor"))?;

        let probabilities = {
            let outputs = self
                .trainer
                .step(ort::inputs![images], ort::inputs![labels])
                .map_err(training_error("Training step failed"))?;
            Self::probabilities(&outputs, &self.artifacts.probabilities_output, batch)?
        };

        let optimizer = self.trainer.optimizer();
        optimizer
            .step()
            .map_err(training_error("Optimizer step failed"))?;
        optimizer
            .reset_grad()
            .map_err(training_error("Failed to reset gradients"))?;

        Ok(probabilities)
    }

    fn eval_batch(&mut self, batch: &Batch) -> Result<Array2<f32>> {
        let images = TensorRef::from_array_view(batch.images.view())
            .map_err(training_error("Failed to create image tensor"))?;
        let labels = TensorRef::from_array_view(batch.class_indices.view())
            .map_err(training_error("Failed to create label tensor"))?;

        let outputs = self
            .trainer
            .eval_step(ort::inputs![images], ort::inputs![labels])
            .map_err(training_error("Evaluation step failed"))?;
        Self::probabilities(&outputs, &self.artifacts.probabilities_output, batch)
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        self.trainer
            .export(path, [self.artifacts.probabilities_output.as_str()])
            .map_err(training_error("Failed to export model"))
    }

    fn snapshot(&mut self) -> Result<PathBuf> {
        self.trainer
            .checkpoint()
            .save(&self.snapshot_path, false)
            .map_err(training_error("Failed to save weights"))?;
        Ok(self.snapshot_path.clone())
    }

    fn restore(&mut self, snapshot: &PathBuf) -> Result<()> {
        self.trainer = Self::build_trainer(&self.artifacts, snapshot)?;
        Ok(())
    }
}
