//! This scenario trains logistic models and puts them behind the engine in place of the
//! rule-based estimator.
//!
//! - Variant A: statistical estimator (factor tables)
//!
//! - Variant B: learned estimator (trained CTR and CVR models)
//!
//! Both estimators must stay within [0, 1] on every context, and the learned CTR must order
//! impressions like the factor tables it was trained from.

use rtb_dsp::auction::AuctionType;
use rtb_dsp::campaign::{BiddingStrategy, CampaignBudget};
use rtb_dsp::config::EngineConfig;
use rtb_dsp::engine::BidOptimizationEngine;
use rtb_dsp::estimators::{estimate_batch, EstimatorKind, LearnedEstimator, StatisticalEstimator};
use rtb_dsp::impressions::{FloorGeneratorUniform, Impressions, ImpressionsParam};
use rtb_dsp::logger::{LogEvent, Logger};
use rtb_dsp::sigmoid::logit;
use rtb_dsp::simulationrun::Simulation;
use rtb_dsp::trainer::{Trainer, TrainingConfig};
use rtb_dsp::logln;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "estimator_comparison",
    run,
});

const NUM_IMPRESSIONS: usize = 3000;

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len()) as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

fn prepare_simulation(engine: BidOptimizationEngine) -> Result<Simulation, Box<dyn std::error::Error>> {
    let impressions = Impressions::new(
        NUM_IMPRESSIONS,
        &ImpressionsParam::default(),
        FloorGeneratorUniform::new(0.5, 3.0)?.as_ref(),
    )?;
    Ok(Simulation::new(
        engine,
        impressions,
        AuctionType::SecondPrice,
        CampaignBudget::fresh(1000.0, BiddingStrategy::Balanced),
    ))
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let config = TrainingConfig {
        learning_rate: 0.5,
        epochs: 30,
        batch_size: 16,
        train_test_split: 0.75,
        num_samples: 4000,
        regularization: 0.0,
        ..TrainingConfig::default()
    };
    let result = Trainer::new(config)?.train(|_, _| {})?;
    logln!(
        logger,
        LogEvent::Scenario,
        "Trained models: CTR AUC {:.2}%, CVR AUC {:.2}%",
        result.ctr_metrics.auc,
        result.cvr_metrics.auc
    );

    let statistical_engine = BidOptimizationEngine::new(EngineConfig::default())?;
    let learned_config = EngineConfig {
        estimator: EstimatorKind::Learned,
        ..EngineConfig::default()
    };
    let learned_engine =
        BidOptimizationEngine::with_models(learned_config, Some((result.ctr_model.clone(), result.cvr_model.clone())))?;

    let mut simulation_a = prepare_simulation(statistical_engine)?;
    let stats_a = simulation_a.run_variant("Running statistical estimator", scenario_name, "statistical", logger)?;

    let mut simulation_b = prepare_simulation(learned_engine)?;
    let stats_b = simulation_b.run_variant("Running learned estimator", scenario_name, "learned", logger)?;

    // Compare both estimators on the same contexts
    let contexts: Vec<_> = simulation_a.impressions.impressions.iter().map(|imp| imp.context.clone()).collect();
    let statistical = estimate_batch(StatisticalEstimator::new().as_ref(), &contexts);
    let learned = estimate_batch(LearnedEstimator::new(result.ctr_model, result.cvr_model)?.as_ref(), &contexts);

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    let in_range = |rows: &[rtb_dsp::estimators::BatchEstimate]| {
        rows.iter().all(|row| (0.0..=1.0).contains(&row.ctr) && (0.0..=1.0).contains(&row.cvr))
    };
    check(
        logger,
        &mut errors,
        in_range(&statistical) && in_range(&learned),
        format!("Both estimators stay within [0, 1] on {} contexts", contexts.len()),
    );

    let statistical_log_ctr: Vec<f64> = statistical.iter().map(|row| row.ctr.max(1e-9).ln()).collect();
    let learned_log_odds: Vec<f64> = learned.iter().map(|row| logit(row.ctr)).collect();
    let correlation = pearson(&statistical_log_ctr, &learned_log_odds);
    check(
        logger,
        &mut errors,
        correlation > 0.3,
        format!("Learned CTR follows the factor tables: correlation {:.3} > 0.3", correlation),
    );

    check(
        logger,
        &mut errors,
        stats_a.campaign_stat.bids_placed > 0 && stats_b.campaign_stat.bids_placed > 0,
        format!(
            "Both engines place bids: {} / {}",
            stats_a.campaign_stat.bids_placed, stats_b.campaign_stat.bids_placed
        ),
    );

    finish(scenario_name, errors)
}
