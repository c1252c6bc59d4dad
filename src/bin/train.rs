//! Fine-tunes the emotion classifier on a directory-per-class image dataset.
//!
//! Expects ONNX Runtime training artifacts for the MobileNet backbone and
//! dense head under `artifacts/`, and the dataset under `fer2013/`.

use emotion_detector::config::TrainingConfig;
use emotion_detector::error::{EmotionDetectorError, Result};
use emotion_detector::training::backend::OrtTrainingModel;
use emotion_detector::training::{
    fit, Augmenter, BatchIterator, Callback, DirectoryDataset, EarlyStopping, FitOptions,
    ModelCheckpoint, ReduceLrOnPlateau,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logs to stdout and to the training log file
fn init_logging(config: &TrainingConfig) -> Result<()> {
    let log_file = std::fs::File::create(&config.log_file).map_err(EmotionDetectorError::Io)?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false),
        )
        .init();

    Ok(())
}

fn open_split(
    config: &TrainingConfig,
    dir: &std::path::Path,
    augmenter: Option<Augmenter>,
) -> Result<BatchIterator> {
    let dataset = DirectoryDataset::scan(dir)?;
    if dataset.classes().len() != config.num_classes {
        return Err(EmotionDetectorError::Dataset(format!(
            "{} has {} classes, expected {}",
            dir.display(),
            dataset.classes().len(),
            config.num_classes
        )));
    }
    let shuffle = augmenter.is_some();
    BatchIterator::new(
        dataset,
        (config.image_width, config.image_height),
        config.batch_size,
        shuffle,
        augmenter,
        None,
    )
}

fn train(config: &TrainingConfig) -> Result<()> {
    info!(
        "Model: {} + global average pooling + dense {:?} + softmax({}), backbone trainable: {}",
        config.head.backbone,
        config.head.dense_units,
        config.num_classes,
        config.head.trainable_backbone
    );
    info!("Configuration: {}", serde_json::to_string_pretty(config)?);

    let mut train_batches = open_split(
        config,
        &config.train_dir,
        Some(Augmenter::new(config.augmentation)),
    )?;
    let mut validation_batches = open_split(config, &config.validation_dir, None)?;

    let mut model = OrtTrainingModel::load(&config.artifacts)?;
    let mut callbacks: Vec<Box<dyn Callback<OrtTrainingModel>>> = vec![
        Box::new(EarlyStopping::<OrtTrainingModel>::new(
            &config.early_stopping,
        )),
        Box::new(ModelCheckpoint::new(&config.checkpoint)),
        Box::new(ReduceLrOnPlateau::new(&config.reduce_lr)),
    ];

    let options = FitOptions {
        epochs: config.epochs,
        steps_per_epoch: config.steps_per_epoch(),
        validation_steps: config.validation_steps(),
        learning_rate: config.learning_rate,
    };

    let history = fit(
        &mut model,
        &mut train_batches,
        &mut validation_batches,
        &options,
        &mut callbacks,
    )?;
    history.save_json(&config.history_path)?;

    if let Some(best) = history.best(config.checkpoint.monitor) {
        info!("Best epoch {}: {}", best.epoch + 1, best);
    }
    Ok(())
}

fn main() -> Result<()> {
    let config = TrainingConfig::default();
    init_logging(&config)?;

    if let Err(e) = train(&config) {
        error!("Training failed: {}", e);
        return Err(e);
    }
    Ok(())
}
