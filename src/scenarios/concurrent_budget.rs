//! This scenario runs several engines on separate threads against one shared campaign budget.
//!
//! Each thread owns its engine and random streams; only the budget is shared. The budget is small
//! enough to run out, and the spend recorded by all threads together must match the budget
//! exactly: no request may spend money another request already took.

use std::thread;

use rtb_dsp::auction::AuctionType;
use rtb_dsp::campaign::{BiddingStrategy, CampaignBudget, SharedBudget};
use rtb_dsp::config::EngineConfig;
use rtb_dsp::engine::BidOptimizationEngine;
use rtb_dsp::errors::ContextError;
use rtb_dsp::impressions::{FloorGeneratorUniform, Impressions, ImpressionsParam};
use rtb_dsp::logger::{LogEvent, Logger};
use rtb_dsp::logln;
use rtb_dsp::simulationrun::{SimulationRun, SimulationStat};

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "concurrent_budget",
    run,
});

const NUM_WORKERS: u64 = 4;
const IMPRESSIONS_PER_WORKER: usize = 2000;
const TOTAL_BUDGET: f64 = 0.02;

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let impressions = Impressions::new(
        IMPRESSIONS_PER_WORKER,
        &ImpressionsParam::default(),
        FloorGeneratorUniform::new(0.5, 3.0)?.as_ref(),
    )?;
    let budget = SharedBudget::new(CampaignBudget::fresh(TOTAL_BUDGET, BiddingStrategy::Aggressive));

    let mut engines = Vec::new();
    for worker in 0..NUM_WORKERS {
        let config = EngineConfig {
            seed: EngineConfig::default().seed + worker * 1000,
            ..EngineConfig::default()
        };
        engines.push(BidOptimizationEngine::new(config)?);
    }

    logln!(
        logger,
        LogEvent::Scenario,
        "\n=== Running {} workers x {} impressions against a budget of {:.2} ===",
        NUM_WORKERS,
        IMPRESSIONS_PER_WORKER,
        TOTAL_BUDGET
    );

    let runs: Vec<thread::Result<Result<SimulationRun, ContextError>>> = thread::scope(|scope| {
        let workers: Vec<_> = engines
            .iter_mut()
            .map(|engine| {
                let impressions = &impressions;
                let budget = &budget;
                scope.spawn(move || {
                    let mut worker_logger = Logger::new();
                    SimulationRun::new(engine, impressions, AuctionType::SecondPrice, budget, &mut worker_logger)
                })
            })
            .collect();
        workers.into_iter().map(|worker| worker.join()).collect()
    });

    let mut stats = Vec::new();
    for (worker, run) in runs.into_iter().enumerate() {
        let run = run.map_err(|_| format!("Worker {} panicked", worker))??;
        let stat = SimulationStat::new(&run, &budget);
        logln!(
            logger,
            LogEvent::Scenario,
            "Worker {}: {} bids, {} won, spent {:.6}, {} exhausted declines",
            worker,
            stat.campaign_stat.bids_placed,
            stat.campaign_stat.auctions_won,
            stat.campaign_stat.total_spend,
            stat.campaign_stat.declines.budget_exhausted
        );
        stats.push(stat);
    }

    let total_spend: f64 = stats.iter().map(|stat| stat.campaign_stat.total_spend).sum();
    let exhausted_declines: usize = stats.iter().map(|stat| stat.campaign_stat.declines.budget_exhausted).sum();
    let snapshot = budget.snapshot();

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    check(
        logger,
        &mut errors,
        snapshot.remaining_budget >= 0.0 && total_spend <= TOTAL_BUDGET + 1e-9,
        format!("Workers together never overspend: {:.6} <= {:.2}", total_spend, TOTAL_BUDGET),
    );
    check(
        logger,
        &mut errors,
        (total_spend - snapshot.spent()).abs() < 1e-9,
        format!(
            "Recorded spend matches the budget debit: {:.6} == {:.6}",
            total_spend,
            snapshot.spent()
        ),
    );
    check(
        logger,
        &mut errors,
        snapshot.remaining_budget == 0.0 && exhausted_declines > 0,
        format!(
            "Budget is exhausted and later requests are declined: remaining {:.6}, {} exhausted declines",
            snapshot.remaining_budget, exhausted_declines
        ),
    );

    finish(scenario_name, errors)
}
