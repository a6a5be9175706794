//! This scenario runs the same campaign through first-price and second-price auctions.
//!
//! - Variant A: First price. Every won auction is charged the own bid.
//!
//! - Variant B: Second price. Every won auction is charged the runner-up (or the floor), which is
//!   never above the own bid and never below the floor.
//!
//! With identical bids, second-price wins are on average cheaper than first-price wins.

use rtb_dsp::auction::AuctionType;
use rtb_dsp::campaign::{BiddingStrategy, CampaignBudget};
use rtb_dsp::config::EngineConfig;
use rtb_dsp::engine::{BidOptimizationEngine, BidResponse};
use rtb_dsp::impressions::{FloorGeneratorUniform, Impressions, ImpressionsParam};
use rtb_dsp::logger::{LogEvent, Logger};
use rtb_dsp::logln;
use rtb_dsp::simulationrun::{Simulation, SimulationRun, SimulationStat};

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "auction_mechanics",
    run,
});

fn prepare_simulation(auction_type: AuctionType) -> Result<Simulation, Box<dyn std::error::Error>> {
    let impressions = Impressions::new(4000, &ImpressionsParam::default(), FloorGeneratorUniform::new(0.5, 3.0)?.as_ref())?;
    let engine = BidOptimizationEngine::new(EngineConfig::default())?;
    Ok(Simulation::new(
        engine,
        impressions,
        auction_type,
        CampaignBudget::fresh(1000.0, BiddingStrategy::Aggressive),
    ))
}

/// Count won auctions whose price breaks the auction type's clearing rule
fn count_rule_violations(run: &SimulationRun, floors: &[f64]) -> usize {
    run.results
        .iter()
        .zip(floors)
        .filter_map(|(response, floor)| match response {
            BidResponse::Placed(placed) if placed.bid_response.won => Some((placed, *floor)),
            _ => None,
        })
        .filter(|(placed, floor)| {
            let own_bid = placed.bid_response.decision.bid_price;
            match (placed.auction_result.auction_type, placed.bid_response.win_price) {
                (AuctionType::FirstPrice, Some(price)) => price != own_bid,
                (AuctionType::SecondPrice, Some(price)) => price > own_bid || price < *floor,
                (_, None) => true,
            }
        })
        .count()
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut errors: Vec<String> = Vec::new();
    let mut stats: Vec<SimulationStat> = Vec::new();

    for (auction_type, variant_name) in [(AuctionType::FirstPrice, "first-price"), (AuctionType::SecondPrice, "second-price")] {
        let mut simulation = prepare_simulation(auction_type)?;
        let stat = simulation.run_variant(&format!("Running {} auctions", auction_type), scenario_name, variant_name, logger)?;

        // Replay on a fresh engine to inspect individual auctions
        let mut replay = prepare_simulation(auction_type)?;
        let floors: Vec<f64> = replay.impressions.impressions.iter().map(|imp| imp.floor_cpm).collect();
        let mut quiet = Logger::new();
        let replay_run = SimulationRun::new(&mut replay.engine, &replay.impressions, auction_type, &replay.budget, &mut quiet)?;
        let violations = count_rule_violations(&replay_run, &floors);
        check(
            logger,
            &mut errors,
            violations == 0,
            format!("Every {} win is charged by the clearing rule ({} violations)", auction_type, violations),
        );
        stats.push(stat);
    }

    logln!(logger, LogEvent::Scenario, "");
    let (first, second) = (&stats[0].campaign_stat, &stats[1].campaign_stat);
    check(
        logger,
        &mut errors,
        first.auctions_won > 0 && second.auctions_won > 0,
        format!("Both variants win auctions: {} / {}", first.auctions_won, second.auctions_won),
    );
    check(
        logger,
        &mut errors,
        second.avg_win_price_cpm() < first.avg_win_price_cpm(),
        format!(
            "Second-price average win price is below first-price: {:.4} < {:.4}",
            second.avg_win_price_cpm(),
            first.avg_win_price_cpm()
        ),
    );

    finish(scenario_name, errors)
}
