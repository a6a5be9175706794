//! This scenario compares the three built-in bidding strategies on the same impressions with a
//! budget large enough never to bind.
//!
//! - Variant A: Conservative (0.8 multiplier, declines below the floor)
//!
//! - Variant B: Balanced (1.0 multiplier, raises to the floor)
//!
//! - Variant C: Aggressive (1.25 multiplier, raises to the floor, lowest score threshold)
//!
//! A more aggressive strategy places more bids, wins more auctions and spends more.

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
    short_name: "bidding_strategies",
    run,
});

fn prepare_simulation(strategy: BiddingStrategy) -> Result<Simulation, Box<dyn std::error::Error>> {
    let impressions = Impressions::new(5000, &ImpressionsParam::default(), FloorGeneratorUniform::new(0.5, 3.0)?.as_ref())?;
    let engine = BidOptimizationEngine::new(EngineConfig::default())?;
    Ok(Simulation::new(
        engine,
        impressions,
        AuctionType::SecondPrice,
        CampaignBudget::fresh(1000.0, strategy),
    ))
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut simulation_a = prepare_simulation(BiddingStrategy::Conservative)?;
    let stats_a = simulation_a.run_variant("Running conservative strategy", scenario_name, "conservative", logger)?;

    let mut simulation_b = prepare_simulation(BiddingStrategy::Balanced)?;
    let stats_b = simulation_b.run_variant("Running balanced strategy", scenario_name, "balanced", logger)?;

    let mut simulation_c = prepare_simulation(BiddingStrategy::Aggressive)?;
    let stats_c = simulation_c.run_variant("Running aggressive strategy", scenario_name, "aggressive", logger)?;

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    check(
        logger,
        &mut errors,
        stats_a.campaign_stat.bids_placed < stats_b.campaign_stat.bids_placed
            && stats_b.campaign_stat.bids_placed <= stats_c.campaign_stat.bids_placed,
        format!(
            "Bids placed grow with aggressiveness: {} < {} <= {}",
            stats_a.campaign_stat.bids_placed, stats_b.campaign_stat.bids_placed, stats_c.campaign_stat.bids_placed
        ),
    );

    check(
        logger,
        &mut errors,
        stats_a.campaign_stat.auctions_won < stats_b.campaign_stat.auctions_won
            && stats_b.campaign_stat.auctions_won < stats_c.campaign_stat.auctions_won,
        format!(
            "Auctions won grow with aggressiveness: {} < {} < {}",
            stats_a.campaign_stat.auctions_won, stats_b.campaign_stat.auctions_won, stats_c.campaign_stat.auctions_won
        ),
    );

    check(
        logger,
        &mut errors,
        stats_b.campaign_stat.total_spend < stats_c.campaign_stat.total_spend,
        format!(
            "Variant C (aggressive) spends more than Variant B (balanced): {:.4} > {:.4}",
            stats_c.campaign_stat.total_spend, stats_b.campaign_stat.total_spend
        ),
    );

    check(
        logger,
        &mut errors,
        stats_a.campaign_stat.declines.budget_exhausted == 0
            && stats_b.campaign_stat.declines.budget_exhausted == 0
            && stats_c.campaign_stat.declines.budget_exhausted == 0,
        "Budget never binds in any variant".to_string(),
    );

    finish(scenario_name, errors)
}
