//! Transfer-learning orchestration for the emotion classifier.
//!
//! The network itself (pre-trained backbone, pooled dense head, optimizer and
//! loss graph) is built by the training framework ahead of time. This module
//! feeds it augmented batches from a directory-per-class dataset, tracks loss
//! and accuracy, and applies checkpointing, early stopping and learning-rate
//! decay between epochs.

pub mod augment;
pub mod callbacks;
pub mod dataset;
pub mod metrics;
pub mod trainer;

#[cfg(feature = "training")]
pub mod backend;

pub use augment::{Augmenter, TransformParams};
pub use callbacks::{Callback, EarlyStopping, ModelCheckpoint, ReduceLrOnPlateau};
pub use dataset::{Batch, BatchIterator, DirectoryDataset, Sample};
pub use trainer::{
    evaluate, fit, BatchSource, EpochLogs, FitOptions, History, TrainableModel, TrainingState,
};
