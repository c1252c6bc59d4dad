// Checkpointing, early stopping and learning-rate decay hooks

use crate::config::{
    CheckpointConfig, EarlyStoppingConfig, MonitorMode, MonitoredMetric, ReduceLrConfig,
};
use crate::error::Result;
use crate::training::trainer::{EpochLogs, TrainableModel, TrainingState};
use std::path::PathBuf;
use tracing::{info, warn};

/// Hooks invoked by the epoch loop, in registration order
pub trait Callback<M: TrainableModel> {
    fn on_train_begin(&mut self, _model: &mut M, _state: &mut TrainingState) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        logs: &EpochLogs,
        model: &mut M,
        state: &mut TrainingState,
    ) -> Result<()>;

    fn on_train_end(&mut self, _model: &mut M, _state: &mut TrainingState) -> Result<()> {
        Ok(())
    }
}

/// Tracks the best value of one metric
#[derive(Debug, Clone, Copy)]
struct Monitor {
    metric: MonitoredMetric,
    mode: MonitorMode,
    min_delta: f32,
}

impl Monitor {
    fn initial(&self) -> f32 {
        match self.mode {
            MonitorMode::Min => f32::INFINITY,
            MonitorMode::Max => f32::NEG_INFINITY,
        }
    }

    fn improved(&self, current: f32, best: f32) -> bool {
        match self.mode {
            MonitorMode::Min => current < best - self.min_delta,
            MonitorMode::Max => current > best + self.min_delta,
        }
    }

    fn read(&self, logs: &EpochLogs) -> Option<f32> {
        let value = logs.get(self.metric);
        if value.is_none() {
            warn!(
                "Metric {} unavailable at epoch {}, skipping",
                self.metric.name(),
                logs.epoch + 1
            );
        }
        value
    }
}

/// Saves the model whenever the monitored metric improves
pub struct ModelCheckpoint {
    path: PathBuf,
    monitor: Monitor,
    save_best_only: bool,
    best: f32,
}

impl ModelCheckpoint {
    pub fn new(config: &CheckpointConfig) -> Self {
        let monitor = Monitor {
            metric: config.monitor,
            mode: config.mode,
            min_delta: 0.0,
        };
        Self {
            path: config.path.clone(),
            best: monitor.initial(),
            monitor,
            save_best_only: config.save_best_only,
        }
    }

    pub fn best(&self) -> f32 {
        self.best
    }
}

impl<M: TrainableModel> Callback<M> for ModelCheckpoint {
    fn on_epoch_end(
        &mut self,
        logs: &EpochLogs,
        model: &mut M,
        _state: &mut TrainingState,
    ) -> Result<()> {
        let epoch = logs.epoch + 1;
        if !self.save_best_only {
            info!("Epoch {:05}: saving model to {}", epoch, self.path.display());
            return model.save(&self.path);
        }

        let Some(current) = self.monitor.read(logs) else {
            return Ok(());
        };

        if self.monitor.improved(current, self.best) {
            info!(
                "Epoch {:05}: {} improved from {:.5} to {:.5}, saving model to {}",
                epoch,
                self.monitor.metric.name(),
                self.best,
                current,
                self.path.display()
            );
            self.best = current;
            model.save(&self.path)?;
        } else {
            info!(
                "Epoch {:05}: {} did not improve from {:.5}",
                epoch,
                self.monitor.metric.name(),
                self.best
            );
        }
        Ok(())
    }
}

/// Stops training once the monitored metric stops improving
pub struct EarlyStopping<M: TrainableModel> {
    monitor: Monitor,
    patience: usize,
    restore_best_weights: bool,
    wait: usize,
    best: f32,
    best_epoch: Option<usize>,
    stopped_epoch: Option<usize>,
    best_weights: Option<M::Snapshot>,
}

impl<M: TrainableModel> EarlyStopping<M> {
    pub fn new(config: &EarlyStoppingConfig) -> Self {
        let monitor = Monitor {
            metric: config.monitor,
            mode: config.monitor.default_mode(),
            min_delta: config.min_delta.abs(),
        };
        Self {
            best: monitor.initial(),
            monitor,
            patience: config.patience,
            restore_best_weights: config.restore_best_weights,
            wait: 0,
            best_epoch: None,
            stopped_epoch: None,
            best_weights: None,
        }
    }

    /// Zero-based epoch at which training was halted
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

impl<M: TrainableModel> Callback<M> for EarlyStopping<M> {
    fn on_train_begin(&mut self, _model: &mut M, _state: &mut TrainingState) -> Result<()> {
        self.wait = 0;
        self.best = self.monitor.initial();
        self.best_epoch = None;
        self.stopped_epoch = None;
        self.best_weights = None;
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        logs: &EpochLogs,
        model: &mut M,
        state: &mut TrainingState,
    ) -> Result<()> {
        let Some(current) = self.monitor.read(logs) else {
            return Ok(());
        };

        if self.restore_best_weights && self.best_weights.is_none() {
            self.best_weights = Some(model.snapshot()?);
        }

        self.wait += 1;
        if self.monitor.improved(current, self.best) {
            self.best = current;
            self.best_epoch = Some(logs.epoch);
            if self.restore_best_weights {
                self.best_weights = Some(model.snapshot()?);
            }
            self.wait = 0;
            return Ok(());
        }

        if self.wait >= self.patience && logs.epoch > 0 {
            self.stopped_epoch = Some(logs.epoch);
            state.stop_training = true;
            if let Some(weights) = &self.best_weights {
                if let Some(best_epoch) = self.best_epoch {
                    info!(
                        "Restoring model weights from the end of epoch {}",
                        best_epoch + 1
                    );
                }
                model.restore(weights)?;
            }
        }
        Ok(())
    }

    fn on_train_end(&mut self, _model: &mut M, _state: &mut TrainingState) -> Result<()> {
        if let Some(epoch) = self.stopped_epoch {
            info!("Epoch {:05}: early stopping", epoch + 1);
        }
        Ok(())
    }
}

/// Shrinks the learning rate when the monitored metric plateaus
pub struct ReduceLrOnPlateau {
    monitor: Monitor,
    patience: usize,
    factor: f32,
    min_lr: f32,
    cooldown: usize,
    cooldown_counter: usize,
    wait: usize,
    best: f32,
}

impl ReduceLrOnPlateau {
    pub fn new(config: &ReduceLrConfig) -> Self {
        let monitor = Monitor {
            metric: config.monitor,
            mode: config.monitor.default_mode(),
            min_delta: config.min_delta.abs(),
        };
        Self {
            best: monitor.initial(),
            monitor,
            patience: config.patience,
            factor: config.factor,
            min_lr: config.min_lr,
            cooldown: config.cooldown,
            cooldown_counter: 0,
            wait: 0,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.cooldown_counter > 0
    }
}

impl<M: TrainableModel> Callback<M> for ReduceLrOnPlateau {
    fn on_train_begin(&mut self, _model: &mut M, _state: &mut TrainingState) -> Result<()> {
        self.best = self.monitor.initial();
        self.cooldown_counter = 0;
        self.wait = 0;
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        logs: &EpochLogs,
        _model: &mut M,
        state: &mut TrainingState,
    ) -> Result<()> {
        let Some(current) = self.monitor.read(logs) else {
            return Ok(());
        };

        if self.in_cooldown() {
            self.cooldown_counter -= 1;
            self.wait = 0;
        }

        if self.monitor.improved(current, self.best) {
            self.best = current;
            self.wait = 0;
        } else if !self.in_cooldown() {
            self.wait += 1;
            if self.wait >= self.patience && state.learning_rate > self.min_lr {
                let new_lr = (state.learning_rate * self.factor).max(self.min_lr);
                info!(
                    "Epoch {:05}: reducing learning rate from {} to {}",
                    logs.epoch + 1,
                    state.learning_rate,
                    new_lr
                );
                state.learning_rate = new_lr;
                self.cooldown_counter = self.cooldown;
                self.wait = 0;
            }
        }
        Ok(())
    }
}
