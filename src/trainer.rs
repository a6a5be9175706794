//! Mini-batch gradient descent over two logistic models (CTR, then CVR).
//!
//! A run moves through Idle -> TrainingCTR -> TrainingCVR -> Complete. After every epoch the
//! train/validation loss and accuracy are computed and handed to the epoch callback in order.
//! The run can be cancelled between epochs; it then returns what it has, tagged incomplete.
//!
//! An epoch whose weights or loss run away (non-finite, weights beyond `MAX_ABS_WEIGHT`, or an
//! unclamped train loss above `DIVERGENCE_LOSS_FACTOR` x ln 2) aborts the run with
//! `TrainingError::NumericInstability` instead of returning the weights.
//!
//! `spawn_training` runs the same loop on a worker thread and delivers progress over a bounded
//! channel. Epoch events that do not fit are dropped, never waited on; the final result still
//! carries the full epoch history.

use crossbeam_channel::{bounded, Receiver};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::dataset::{self, LabeledSplit, TrainingSample};
use crate::errors::{ConfigError, TrainingError};
use crate::evaluation::{loss_and_accuracy, EvaluationMetrics};
use crate::linear_model::LinearModel;
use crate::sigmoid::logistic_loss;
use crate::utils::{elapsed_ms, get_seed};

pub const MAX_EPOCHS: usize = 10_000;

/// Largest |weight| (bias included) a healthy model reaches on these features
pub const MAX_ABS_WEIGHT: f64 = 1.0e4;

/// A zero model starts at a loss of ln 2; this many times that means the steps overshoot
pub const DIVERGENCE_LOSS_FACTOR: f64 = 10.0;

/// Upper bound on buffered events of a background run
pub const MAX_EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrainingPhase {
    Idle,
    #[serde(rename = "TrainingCTR")]
    TrainingCtr,
    #[serde(rename = "TrainingCVR")]
    TrainingCvr,
    Complete,
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainingPhase::Idle => "Idle",
            TrainingPhase::TrainingCtr => "TrainingCTR",
            TrainingPhase::TrainingCvr => "TrainingCVR",
            TrainingPhase::Complete => "Complete",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub train_test_split: f64,
    pub num_samples: usize,
    pub regularization: f64,
    /// Base seed for data generation, split and batch order (offset by RAND_SEED)
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            epochs: 20,
            batch_size: 32,
            train_test_split: 0.8,
            num_samples: 5000,
            regularization: 0.001,
            seed: 7331,
        }
    }
}

impl TrainingConfig {
    /// Reject configurations that cannot produce a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        if self.epochs < 1 || self.epochs > MAX_EPOCHS {
            return Err(ConfigError::InvalidEpochs(self.epochs));
        }
        if self.batch_size < 1 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        if self.train_test_split <= 0.0 || self.train_test_split >= 1.0 || self.train_test_split.is_nan() {
            return Err(ConfigError::InvalidSplit(self.train_test_split));
        }
        if self.num_samples < 1 {
            return Err(ConfigError::InvalidNumSamples(self.num_samples));
        }
        if self.regularization < 0.0 || !self.regularization.is_finite() {
            return Err(ConfigError::InvalidRegularization(self.regularization));
        }
        dataset::split_sizes(self.num_samples, self.train_test_split)?;
        Ok(())
    }
}

/// Metrics after one completed epoch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochMetric {
    /// 1-based
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingResult {
    pub ctr_model: LinearModel,
    pub cvr_model: LinearModel,
    pub ctr_epochs: Vec<EpochMetric>,
    pub cvr_epochs: Vec<EpochMetric>,
    pub ctr_metrics: EvaluationMetrics,
    pub cvr_metrics: EvaluationMetrics,
    pub training_time_ms: f64,
    /// False when the run was cancelled before both phases finished
    pub complete: bool,
}

/// Shared flag checked by the trainer between epochs
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of training one model
struct PhaseOutcome {
    model: LinearModel,
    epochs: Vec<EpochMetric>,
    finished: bool,
}

pub struct Trainer {
    config: TrainingConfig,
    phase: TrainingPhase,
    cancel: CancelToken,
}

impl Trainer {
    /// Validates the configuration; nothing is computed before this succeeds
    pub fn new(config: TrainingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            phase: TrainingPhase::Idle,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    /// Train the CTR model, then the CVR model, on freshly generated synthetic data
    ///
    /// # Arguments
    /// * `on_epoch` - called synchronously after every epoch with the phase it belongs to
    ///
    /// # Returns
    /// Both models, their epoch history and validation metrics
    pub fn train<F>(&mut self, mut on_epoch: F) -> Result<TrainingResult, TrainingError>
    where
        F: FnMut(TrainingPhase, &EpochMetric),
    {
        let start = Instant::now();
        self.phase = TrainingPhase::Idle;
        let data = dataset::generate(self.config.num_samples, self.config.train_test_split, self.config.seed)?;

        self.phase = TrainingPhase::TrainingCtr;
        let ctr = self.train_model(TrainingPhase::TrainingCtr, &data.feature_names, &data.ctr, 101, &mut on_epoch)?;

        let cvr = if ctr.finished {
            self.phase = TrainingPhase::TrainingCvr;
            self.train_model(TrainingPhase::TrainingCvr, &data.feature_names, &data.cvr, 202, &mut on_epoch)?
        } else {
            PhaseOutcome {
                model: LinearModel::zeros(data.feature_names.clone()),
                epochs: Vec::new(),
                finished: false,
            }
        };

        let complete = ctr.finished && cvr.finished;
        if complete {
            self.phase = TrainingPhase::Complete;
        }

        Ok(TrainingResult {
            ctr_metrics: evaluate(&ctr.model, &data.ctr.validation),
            cvr_metrics: evaluate(&cvr.model, &data.cvr.validation),
            ctr_model: ctr.model,
            cvr_model: cvr.model,
            ctr_epochs: ctr.epochs,
            cvr_epochs: cvr.epochs,
            training_time_ms: elapsed_ms(start),
            complete,
        })
    }

    fn train_model<F>(
        &self,
        phase: TrainingPhase,
        feature_names: &[String],
        split: &LabeledSplit,
        seed_offset: u64,
        on_epoch: &mut F,
    ) -> Result<PhaseOutcome, TrainingError>
    where
        F: FnMut(TrainingPhase, &EpochMetric),
    {
        let mut model = LinearModel::zeros(feature_names.to_vec());
        let mut epochs = Vec::with_capacity(self.config.epochs);
        let mut rng_batches = StdRng::seed_from_u64(get_seed(self.config.seed.wrapping_add(seed_offset)));
        let mut order: Vec<usize> = (0..split.train.len()).collect();

        for epoch in 1..=self.config.epochs {
            if self.cancel.is_cancelled() {
                return Ok(PhaseOutcome { model, epochs, finished: false });
            }

            order.shuffle(&mut rng_batches);
            for batch in order.chunks(self.config.batch_size) {
                gradient_step(&mut model, &split.train, batch, self.config.learning_rate, self.config.regularization);
            }

            let (train_loss, train_accuracy) = score(&model, &split.train);
            let (val_loss, val_accuracy) = score(&model, &split.validation);
            if let Some(reason) = divergence(&model, &split.train, train_loss, val_loss) {
                return Err(TrainingError::NumericInstability { phase, epoch, train_loss, val_loss, reason });
            }

            let metric = EpochMetric { epoch, train_loss, val_loss, train_accuracy, val_accuracy };
            on_epoch(phase, &metric);
            epochs.push(metric);
        }

        Ok(PhaseOutcome { model, epochs, finished: true })
    }
}

/// One step of gradient descent on the mean logistic loss of a batch plus an L2 penalty
/// The bias is not regularized
fn gradient_step(model: &mut LinearModel, samples: &[TrainingSample], batch: &[usize], learning_rate: f64, regularization: f64) {
    let mut grad_weights = vec![0.0; model.weights.len()];
    let mut grad_bias = 0.0;
    for &index in batch {
        let sample = &samples[index];
        let error = model.predict_proba(&sample.features) - sample.label;
        for (g, x) in grad_weights.iter_mut().zip(sample.features.iter()) {
            *g += error * x;
        }
        grad_bias += error;
    }

    let m = batch.len() as f64;
    for (w, g) in model.weights.iter_mut().zip(grad_weights.iter()) {
        *w -= learning_rate * (g / m + regularization * *w);
    }
    model.bias -= learning_rate * grad_bias / m;
}

/// Why the model can no longer be trusted after an epoch, if it cannot
fn divergence(model: &LinearModel, train: &[TrainingSample], train_loss: f64, val_loss: f64) -> Option<String> {
    if !model.is_finite() || !train_loss.is_finite() || !val_loss.is_finite() {
        return Some("non-finite weights or loss".to_string());
    }
    let max_weight = model
        .weights
        .iter()
        .chain(std::iter::once(&model.bias))
        .fold(0.0_f64, |max, w| max.max(w.abs()));
    if max_weight > MAX_ABS_WEIGHT {
        return Some(format!("weight magnitude {:.3e} above {:.0e}", max_weight, MAX_ABS_WEIGHT));
    }
    // The reported loss is clamped and saturates near 16; this one keeps growing with the logits
    let raw_loss = unclamped_loss(model, train);
    if !raw_loss.is_finite() || raw_loss > DIVERGENCE_LOSS_FACTOR * LN_2 {
        return Some(format!(
            "unclamped train loss {:.3} above {:.3}",
            raw_loss,
            DIVERGENCE_LOSS_FACTOR * LN_2
        ));
    }
    None
}

fn unclamped_loss(model: &LinearModel, samples: &[TrainingSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples
        .iter()
        .map(|sample| logistic_loss(model.linear(&sample.features), sample.label))
        .sum();
    total / samples.len() as f64
}

fn score(model: &LinearModel, samples: &[TrainingSample]) -> (f64, f64) {
    let (probabilities, labels) = predictions(model, samples);
    loss_and_accuracy(&probabilities, &labels)
}

fn evaluate(model: &LinearModel, samples: &[TrainingSample]) -> EvaluationMetrics {
    let (probabilities, labels) = predictions(model, samples);
    EvaluationMetrics::compute(&probabilities, &labels)
}

fn predictions(model: &LinearModel, samples: &[TrainingSample]) -> (Vec<f64>, Vec<f64>) {
    samples
        .iter()
        .map(|sample| (model.predict_proba(&sample.features), sample.label))
        .unzip()
}

/// Progress of a background training run, in the order it happened
#[derive(Debug, Clone)]
pub enum TrainingEvent {
    Epoch { phase: TrainingPhase, metric: EpochMetric },
    Finished(Result<TrainingResult, TrainingError>),
}

pub struct TrainingHandle {
    pub events: Receiver<TrainingEvent>,
    cancel: CancelToken,
    worker: JoinHandle<()>,
}

impl TrainingHandle {
    /// Ask the worker to stop after the current epoch
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain events until the run finishes, calling `on_epoch` for each epoch event received
    /// Epochs dropped while the buffer was full are only in the result's history
    pub fn wait_with<F>(self, mut on_epoch: F) -> Result<TrainingResult, TrainingError>
    where
        F: FnMut(TrainingPhase, &EpochMetric),
    {
        let mut outcome = None;
        for event in self.events.iter() {
            match event {
                TrainingEvent::Epoch { phase, metric } => on_epoch(phase, &metric),
                TrainingEvent::Finished(result) => {
                    outcome = Some(result);
                    break;
                }
            }
        }
        if self.worker.join().is_err() {
            return Err(TrainingError::WorkerPanicked);
        }
        outcome.unwrap_or(Err(TrainingError::WorkerPanicked))
    }

    pub fn wait(self) -> Result<TrainingResult, TrainingError> {
        self.wait_with(|_, _| {})
    }
}

/// Buffer for a run of `epochs` per phase: every epoch of both phases plus the result,
/// up to MAX_EVENT_BUFFER
fn event_capacity(epochs: usize) -> usize {
    epochs.saturating_mul(2).saturating_add(4).min(MAX_EVENT_BUFFER)
}

/// Run training on a worker thread
/// The configuration is validated before the thread starts
pub fn spawn_training(config: TrainingConfig) -> Result<TrainingHandle, ConfigError> {
    let trainer = Trainer::new(config)?;
    let (sender, events) = bounded(event_capacity(trainer.config().epochs));
    let cancel = CancelToken::new();
    let mut trainer = trainer.with_cancel_token(cancel.clone());

    let worker = std::thread::spawn(move || {
        let result = trainer.train(|phase, metric| {
            // A full buffer drops the event rather than stalling the run
            let _ = sender.try_send(TrainingEvent::Epoch { phase, metric: metric.clone() });
        });
        let _ = sender.send(TrainingEvent::Finished(result));
    });

    Ok(TrainingHandle { events, cancel, worker })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            learning_rate: 0.01,
            epochs: 10,
            batch_size: 16,
            train_test_split: 0.5,
            num_samples: 500,
            regularization: 0.0,
            seed: 42,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(small_config().validate().is_ok());
        let bad = |f: fn(&mut TrainingConfig)| {
            let mut config = small_config();
            f(&mut config);
            config.validate().unwrap_err()
        };
        assert_eq!(bad(|c| c.learning_rate = 0.0), ConfigError::InvalidLearningRate(0.0));
        assert_eq!(bad(|c| c.epochs = 0), ConfigError::InvalidEpochs(0));
        assert_eq!(bad(|c| c.epochs = MAX_EPOCHS + 1), ConfigError::InvalidEpochs(MAX_EPOCHS + 1));
        assert_eq!(bad(|c| c.batch_size = 0), ConfigError::InvalidBatchSize(0));
        assert_eq!(bad(|c| c.train_test_split = 1.0), ConfigError::InvalidSplit(1.0));
        assert_eq!(bad(|c| c.num_samples = 0), ConfigError::InvalidNumSamples(0));
        assert_eq!(bad(|c| c.regularization = -0.1), ConfigError::InvalidRegularization(-0.1));
        assert!(matches!(
            bad(|c| {
                c.num_samples = 2;
                c.train_test_split = 0.8;
            }),
            ConfigError::EmptyValidationSet { .. }
        ));
    }

    #[test]
    fn test_epoch_count_and_order_per_phase() {
        let mut trainer = Trainer::new(small_config()).unwrap();
        assert_eq!(trainer.phase(), TrainingPhase::Idle);
        let mut seen: Vec<(TrainingPhase, usize)> = Vec::new();
        let result = trainer.train(|phase, metric| seen.push((phase, metric.epoch))).unwrap();

        assert_eq!(trainer.phase(), TrainingPhase::Complete);
        assert!(result.complete);
        assert_eq!(result.ctr_epochs.len(), 10);
        assert_eq!(result.cvr_epochs.len(), 10);
        let expected: Vec<(TrainingPhase, usize)> = (1..=10)
            .map(|e| (TrainingPhase::TrainingCtr, e))
            .chain((1..=10).map(|e| (TrainingPhase::TrainingCvr, e)))
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_confusion_matrix_covers_validation_set() {
        let result = Trainer::new(small_config()).unwrap().train(|_, _| {}).unwrap();
        assert_eq!(result.ctr_metrics.total(), 250);
        assert_eq!(result.cvr_metrics.total(), 250);
        for metric in result.ctr_epochs.iter().chain(result.cvr_epochs.iter()) {
            assert!(metric.train_loss >= 0.0 && metric.val_loss >= 0.0);
            assert!((0.0..=100.0).contains(&metric.train_accuracy));
            assert!((0.0..=100.0).contains(&metric.val_accuracy));
        }
    }

    #[test]
    fn test_train_loss_decreases_for_small_learning_rate() {
        let config = TrainingConfig {
            learning_rate: 0.05,
            epochs: 15,
            num_samples: 2000,
            ..small_config()
        };
        let result = Trainer::new(config).unwrap().train(|_, _| {}).unwrap();
        for epochs in [&result.ctr_epochs, &result.cvr_epochs] {
            let first = epochs[0].train_loss;
            let last = epochs[epochs.len() - 1].train_loss;
            assert!(last < first, "loss went from {} to {}", first, last);
            // Starting from all-zero weights the loss is at most ln(2)
            assert!(first <= std::f64::consts::LN_2 + 1e-9);
        }
    }

    #[test]
    fn test_trained_model_ranks_better_than_chance() {
        let config = TrainingConfig {
            learning_rate: 0.5,
            epochs: 30,
            num_samples: 4000,
            train_test_split: 0.75,
            ..small_config()
        };
        let result = Trainer::new(config).unwrap().train(|_, _| {}).unwrap();
        assert!(result.ctr_metrics.auc > 60.0, "ctr auc {}", result.ctr_metrics.auc);
        assert!(result.cvr_metrics.auc > 60.0, "cvr auc {}", result.cvr_metrics.auc);
    }

    #[test]
    fn test_training_is_deterministic() {
        let a = Trainer::new(small_config()).unwrap().train(|_, _| {}).unwrap();
        let b = Trainer::new(small_config()).unwrap().train(|_, _| {}).unwrap();
        assert_eq!(a.ctr_model, b.ctr_model);
        assert_eq!(a.cvr_epochs, b.cvr_epochs);
    }

    #[test]
    fn test_numeric_instability_aborts() {
        let config = TrainingConfig {
            learning_rate: 1.0,
            regularization: 1e308,
            ..small_config()
        };
        let mut epochs_seen = 0;
        let err = Trainer::new(config).unwrap().train(|_, _| epochs_seen += 1).unwrap_err();
        assert!(matches!(
            err,
            TrainingError::NumericInstability { phase: TrainingPhase::TrainingCtr, epoch: 1, .. }
        ));
        assert_eq!(epochs_seen, 0);
    }

    #[test]
    fn test_high_learning_rate_is_reported_as_divergence() {
        let config = TrainingConfig {
            learning_rate: 1.0e6,
            ..small_config()
        };
        let mut epochs_seen = 0;
        let err = Trainer::new(config).unwrap().train(|_, _| epochs_seen += 1).unwrap_err();
        match err {
            TrainingError::NumericInstability { phase, epoch, reason, .. } => {
                assert_eq!(phase, TrainingPhase::TrainingCtr);
                assert_eq!(epoch, 1);
                assert!(!reason.is_empty());
            }
            other => panic!("expected numeric instability, got {:?}", other),
        }
        assert_eq!(epochs_seen, 0);
    }

    #[test]
    fn test_oscillating_weights_are_reported_as_divergence() {
        // Each step multiplies the weights by (1 - lr * reg) = -1.5
        let config = TrainingConfig {
            learning_rate: 1.0,
            regularization: 2.5,
            ..small_config()
        };
        let err = Trainer::new(config).unwrap().train(|_, _| {}).unwrap_err();
        assert!(matches!(
            err,
            TrainingError::NumericInstability { phase: TrainingPhase::TrainingCtr, .. }
        ));
    }

    #[test]
    fn test_healthy_model_passes_divergence_check() {
        let model = LinearModel::zeros(vec!["x".to_string()]);
        let samples = vec![
            TrainingSample { features: vec![1.0], label: 1.0 },
            TrainingSample { features: vec![0.0], label: 0.0 },
        ];
        assert!(divergence(&model, &samples, LN_2, LN_2).is_none());

        let mut runaway = model.clone();
        runaway.weights[0] = -50.0;
        assert!(divergence(&runaway, &samples, 8.0, 8.0).unwrap().contains("unclamped"));
        runaway.weights[0] = 2.0 * MAX_ABS_WEIGHT;
        assert!(divergence(&runaway, &samples, 8.0, 8.0).unwrap().contains("magnitude"));
    }

    #[test]
    fn test_gradient_step_blows_up_on_huge_penalty() {
        let mut model = LinearModel::zeros(vec!["x".to_string()]);
        model.weights[0] = 1.0;
        let samples = vec![TrainingSample { features: vec![1.0], label: 1.0 }];
        gradient_step(&mut model, &samples, &[0], 1.0, 1e308);
        gradient_step(&mut model, &samples, &[0], 1.0, 1e308);
        assert!(!model.is_finite());
    }

    #[test]
    fn test_cancelled_run_is_incomplete() {
        let cancel = CancelToken::new();
        let mut trainer = Trainer::new(small_config()).unwrap().with_cancel_token(cancel.clone());
        let result = trainer
            .train(|_, metric| {
                if metric.epoch == 3 {
                    cancel.cancel();
                }
            })
            .unwrap();
        assert!(!result.complete);
        assert_eq!(result.ctr_epochs.len(), 3);
        assert!(result.cvr_epochs.is_empty());
        assert_eq!(trainer.phase(), TrainingPhase::TrainingCtr);
    }

    #[test]
    fn test_spawned_training_streams_events_in_order() {
        let handle = spawn_training(small_config()).unwrap();
        let mut seen = Vec::new();
        let result = handle.wait_with(|phase, metric| seen.push((phase, metric.epoch))).unwrap();
        assert!(result.complete);
        assert_eq!(seen.len(), 20);
        assert_eq!(seen[0], (TrainingPhase::TrainingCtr, 1));
        assert_eq!(seen[19], (TrainingPhase::TrainingCvr, 10));
    }

    #[test]
    fn test_spawn_rejects_invalid_config_before_starting() {
        let config = TrainingConfig { epochs: 0, ..small_config() };
        assert!(matches!(spawn_training(config), Err(ConfigError::InvalidEpochs(0))));
        let huge = usize::MAX / 2 + 1;
        let config = TrainingConfig { epochs: huge, ..small_config() };
        assert_eq!(spawn_training(config).err(), Some(ConfigError::InvalidEpochs(huge)));
    }

    #[test]
    fn test_event_capacity_is_bounded() {
        assert_eq!(event_capacity(10), 24);
        assert_eq!(event_capacity(MAX_EPOCHS), MAX_EVENT_BUFFER);
        assert_eq!(event_capacity(usize::MAX), MAX_EVENT_BUFFER);
    }

    #[test]
    fn test_long_run_overflowing_buffer_still_finishes() {
        let config = TrainingConfig {
            epochs: 600,
            num_samples: 40,
            ..small_config()
        };
        let handle = spawn_training(config).unwrap();
        // Let the worker run ahead of the reader
        std::thread::sleep(std::time::Duration::from_millis(200));
        let mut seen = 0;
        let result = handle.wait_with(|_, _| seen += 1).unwrap();
        assert!(result.complete);
        assert_eq!(result.ctr_epochs.len(), 600);
        assert_eq!(result.cvr_epochs.len(), 600);
        assert!(seen > 0 && seen <= 1200);
    }

    #[test]
    fn test_retraining_starts_from_idle_again() {
        let mut trainer = Trainer::new(small_config()).unwrap();
        let first = trainer.train(|_, _| {}).unwrap();
        assert_eq!(trainer.phase(), TrainingPhase::Complete);
        let mut phases = Vec::new();
        let second = trainer.train(|phase, _| phases.push(phase)).unwrap();
        assert_eq!(phases[0], TrainingPhase::TrainingCtr);
        assert_eq!(trainer.phase(), TrainingPhase::Complete);
        assert_eq!(first.ctr_model, second.ctr_model);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let config = TrainingConfig { epochs: 1, ..small_config() };
        let result = Trainer::new(config).unwrap().train(|_, _| {}).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        for key in ["ctrModel", "cvrModel", "ctrEpochs", "cvrEpochs", "ctrMetrics", "cvrMetrics", "trainingTimeMs", "complete"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["ctrEpochs"][0]["epoch"], 1);
    }
}
