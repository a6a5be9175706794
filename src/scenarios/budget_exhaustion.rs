//! This scenario runs a small budget against a long stream of impressions.
//!
//! - Variant A: Balanced strategy. Bids shrink with the budget factor but are raised to the floor,
//!   so the campaign keeps winning until the budget is fully spent.
//!
//! - Variant B: Conservative strategy. Once the shrinking bid falls below the floor the request is
//!   declined, so the campaign stops spending well before the budget is gone.

use rtb_dsp::auction::AuctionType;
use rtb_dsp::campaign::{BiddingStrategy, CampaignBudget};
use rtb_dsp::config::EngineConfig;
use rtb_dsp::engine::BidOptimizationEngine;
use rtb_dsp::impressions::{FloorGeneratorUniform, Impressions, ImpressionsParam};
use rtb_dsp::logger::{LogEvent, Logger};
use rtb_dsp::logln;
use rtb_dsp::simulationrun::Simulation;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "budget_exhaustion",
    run,
});

const TOTAL_BUDGET: f64 = 0.03;
const NUM_IMPRESSIONS: usize = 10_000;

fn prepare_simulation(strategy: BiddingStrategy) -> Result<Simulation, Box<dyn std::error::Error>> {
    let impressions = Impressions::new(
        NUM_IMPRESSIONS,
        &ImpressionsParam::default(),
        FloorGeneratorUniform::new(0.5, 3.0)?.as_ref(),
    )?;
    let engine = BidOptimizationEngine::new(EngineConfig::default())?;
    Ok(Simulation::new(
        engine,
        impressions,
        AuctionType::SecondPrice,
        CampaignBudget::fresh(TOTAL_BUDGET, strategy),
    ))
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut simulation_a = prepare_simulation(BiddingStrategy::Balanced)?;
    let stats_a = simulation_a.run_variant("Running balanced strategy on a small budget", scenario_name, "balanced", logger)?;

    let mut simulation_b = prepare_simulation(BiddingStrategy::Conservative)?;
    let stats_b = simulation_b.run_variant("Running conservative strategy on a small budget", scenario_name, "conservative", logger)?;

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    for (label, stats) in [("A (balanced)", &stats_a), ("B (conservative)", &stats_b)] {
        check(
            logger,
            &mut errors,
            stats.campaign_stat.total_spend <= TOTAL_BUDGET + 1e-9 && stats.budget.remaining_budget >= 0.0,
            format!(
                "Variant {} never overspends: spent {:.6} of {:.2}, remaining {:.6}",
                label, stats.campaign_stat.total_spend, TOTAL_BUDGET, stats.budget.remaining_budget
            ),
        );
    }

    check(
        logger,
        &mut errors,
        stats_a.budget.remaining_budget == 0.0 && stats_a.campaign_stat.declines.budget_exhausted > 0,
        format!(
            "Variant A (balanced) exhausts its budget and then declines: remaining {:.6}, {} exhausted declines",
            stats_a.budget.remaining_budget, stats_a.campaign_stat.declines.budget_exhausted
        ),
    );

    check(
        logger,
        &mut errors,
        stats_b.campaign_stat.declines.below_floor > 0,
        format!(
            "Variant B (conservative) declines bids below the floor: {}",
            stats_b.campaign_stat.declines.below_floor
        ),
    );

    check(
        logger,
        &mut errors,
        stats_b.campaign_stat.total_spend < stats_a.campaign_stat.total_spend,
        format!(
            "Variant B (conservative) spends less than Variant A (balanced): {:.6} < {:.6}",
            stats_b.campaign_stat.total_spend, stats_a.campaign_stat.total_spend
        ),
    );

    finish(scenario_name, errors)
}
