//! This scenario trains the CTR and CVR models twice on a background worker.
//!
//! - Variant A: a short run (500 samples, 50/50 split, 10 epochs, lr 0.01, batch 16, no penalty).
//!   It must report exactly ten epochs per phase in order, and confusion matrices that cover the
//!   whole validation split.
//!
//! - Variant B: a longer run on more data. Both models must rank validation samples better than
//!   chance and lower their training loss.

use rtb_dsp::logger::{LogEvent, Logger};
use rtb_dsp::trainer::{spawn_training, EpochMetric, TrainingConfig, TrainingPhase, TrainingResult};
use rtb_dsp::logln;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "model_training",
    run,
});

/// Train on a worker thread, logging every epoch as it arrives
fn train_variant(
    variant_description: &str,
    config: TrainingConfig,
    logger: &mut Logger,
) -> Result<(TrainingResult, Vec<(TrainingPhase, usize)>), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "\n=== {} ===", variant_description);
    let mut seen = Vec::new();
    let handle = spawn_training(config)?;
    let result = handle.wait_with(|phase, metric: &EpochMetric| {
        seen.push((phase, metric.epoch));
        logln!(
            logger,
            LogEvent::Epoch,
            "[{}] epoch {}: train loss {:.4}, val loss {:.4}, val accuracy {:.2}%",
            phase,
            metric.epoch,
            metric.train_loss,
            metric.val_loss,
            metric.val_accuracy
        );
    })?;
    for (label, metrics) in [("CTR", &result.ctr_metrics), ("CVR", &result.cvr_metrics)] {
        logln!(
            logger,
            LogEvent::Scenario,
            "{} model: accuracy {:.2}%, AUC {:.2}%, F1 {:.2}%, log loss {:.4}",
            label,
            metrics.accuracy,
            metrics.auc,
            metrics.f1_score,
            metrics.log_loss
        );
    }
    Ok((result, seen))
}

fn loss_decreased(epochs: &[EpochMetric]) -> bool {
    match (epochs.first(), epochs.last()) {
        (Some(first), Some(last)) => last.train_loss < first.train_loss,
        _ => false,
    }
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let short_config = TrainingConfig {
        learning_rate: 0.01,
        epochs: 10,
        batch_size: 16,
        train_test_split: 0.5,
        num_samples: 500,
        regularization: 0.0,
        ..TrainingConfig::default()
    };
    let (short_result, seen) = train_variant("Short training run", short_config, logger)?;

    let long_config = TrainingConfig {
        learning_rate: 0.5,
        epochs: 30,
        batch_size: 16,
        train_test_split: 0.75,
        num_samples: 4000,
        regularization: 0.0,
        ..TrainingConfig::default()
    };
    let (long_result, _) = train_variant("Long training run", long_config, logger)?;

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    let expected: Vec<(TrainingPhase, usize)> = [TrainingPhase::TrainingCtr, TrainingPhase::TrainingCvr]
        .iter()
        .flat_map(|phase| (1..=10).map(move |epoch| (*phase, epoch)))
        .collect();
    check(
        logger,
        &mut errors,
        seen == expected,
        format!("Short run reports epochs 1..10 for each phase in order ({} callbacks)", seen.len()),
    );
    check(
        logger,
        &mut errors,
        short_result.complete && short_result.ctr_epochs.len() == 10 && short_result.cvr_epochs.len() == 10,
        format!(
            "Short run completes with 10 + 10 epoch metrics: {} + {}",
            short_result.ctr_epochs.len(),
            short_result.cvr_epochs.len()
        ),
    );
    check(
        logger,
        &mut errors,
        short_result.ctr_metrics.total() == 250 && short_result.cvr_metrics.total() == 250,
        format!(
            "Confusion matrices cover the validation split: {} / {} of 250",
            short_result.ctr_metrics.total(),
            short_result.cvr_metrics.total()
        ),
    );

    for (label, metrics, epochs) in [
        ("CTR", &long_result.ctr_metrics, &long_result.ctr_epochs),
        ("CVR", &long_result.cvr_metrics, &long_result.cvr_epochs),
    ] {
        check(
            logger,
            &mut errors,
            metrics.auc > 60.0,
            format!("Long run {} model ranks better than chance: AUC {:.2}% > 60%", label, metrics.auc),
        );
        check(
            logger,
            &mut errors,
            loss_decreased(epochs),
            format!("Long run {} training loss decreases over the run", label),
        );
    }

    finish(scenario_name, errors)
}
