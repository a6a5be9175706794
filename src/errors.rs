use thiserror::Error;

use crate::trainer::TrainingPhase;

/// Invalid configuration, detected before any computation starts
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("learning rate must be a finite value > 0, got {0}")]
    InvalidLearningRate(f64),

    #[error("epochs must be in [1, {max}], got {0}", max = crate::trainer::MAX_EPOCHS)]
    InvalidEpochs(usize),

    #[error("batch size must be >= 1, got {0}")]
    InvalidBatchSize(usize),

    #[error("train/test split must be in (0, 1), got {0}")]
    InvalidSplit(f64),

    #[error("number of samples must be >= 1, got {0}")]
    InvalidNumSamples(usize),

    #[error("regularization must be a finite value >= 0, got {0}")]
    InvalidRegularization(f64),

    #[error("split {split} of {num_samples} samples leaves the validation set empty")]
    EmptyValidationSet { num_samples: usize, split: f64 },

    #[error("split {split} of {num_samples} samples leaves the training set empty")]
    EmptyTrainingSet { num_samples: usize, split: f64 },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Impression context field outside of its documented range
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContextError {
    #[error("{field} out of range: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("unknown {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },
}

/// Failures of a training invocation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("numeric instability in {phase} at epoch {epoch}: {reason} (train loss {train_loss}, validation loss {val_loss}); lower the learning rate or regularization")]
    NumericInstability {
        phase: TrainingPhase,
        epoch: usize,
        train_loss: f64,
        val_loss: f64,
        reason: String,
    },

    #[error("training worker terminated unexpectedly")]
    WorkerPanicked,
}
