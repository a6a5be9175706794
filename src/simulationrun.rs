//! This file contains the SimulationRun struct, which drives a stream of generated impressions through one
//! bid optimization engine against one campaign budget, and the statistics collected over such a run.
//!
//! A Simulation groups the engine, the impressions, the auction type and the budget, so that a scenario
//! can run several variants side by side and compare their statistics.

use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use crate::auction::{AuctionType, AUCTION_CSV_HEADER};
use crate::bid_calculator::NoBidReason;
use crate::campaign::{CampaignBudget, SharedBudget};
use crate::engine::{BidOptimizationEngine, BidRequest, BidResponse};
use crate::errors::ContextError;
use crate::impressions::Impressions;
use crate::logger::{sanitize_filename, FileReceiver, LogEvent, Logger};
use crate::logln;
use crate::utils::{TOTAL_SIMULATION_RUNS, VERBOSE_AUCTION};

/// Container for bid responses
/// Note: results are matched to Impressions by index in the vectors
pub struct SimulationRun {
    pub results: Vec<BidResponse>,
}

impl SimulationRun {
    /// Process every impression as one bid request, in order
    pub fn new(
        engine: &mut BidOptimizationEngine,
        impressions: &Impressions,
        auction_type: AuctionType,
        budget: &SharedBudget,
        logger: &mut Logger,
    ) -> Result<Self, ContextError> {
        let mut results = Vec::with_capacity(impressions.impressions.len());
        for impression in &impressions.impressions {
            let request = BidRequest::new(impression.context.clone(), impression.floor_cpm, auction_type);
            results.push(engine.process(&request, budget, logger)?);
        }
        TOTAL_SIMULATION_RUNS.fetch_add(1, Ordering::Relaxed);
        Ok(Self { results })
    }
}

/// Declined requests by reason
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclineStat {
    pub no_budget: usize,
    pub budget_exhausted: usize,
    pub below_performance_threshold: usize,
    pub below_floor: usize,
}

impl DeclineStat {
    pub fn record(&mut self, reason: &NoBidReason) {
        match reason {
            NoBidReason::NoBudget => self.no_budget += 1,
            NoBidReason::BudgetExhausted => self.budget_exhausted += 1,
            NoBidReason::BelowPerformanceThreshold { .. } => self.below_performance_threshold += 1,
            NoBidReason::BelowFloor { .. } => self.below_floor += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.no_budget + self.budget_exhausted + self.below_performance_threshold + self.below_floor
    }
}

/// Statistics for the campaign over one simulation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignStat {
    pub requests: usize,
    pub bids_placed: usize,
    pub auctions_won: usize,
    pub auctions_lost: usize,
    /// Auctions where no bid reached the floor
    pub no_eligible_bids: usize,
    pub declines: DeclineStat,
    /// Debited from the budget, in currency units
    pub total_spend: f64,
    /// Won auctions charged less than their price because the budget ran out
    pub capped_charges: usize,
    /// Sum of win prices (CPM) of won auctions
    pub total_win_price_cpm: f64,
    /// Sum of estimated CTR over won impressions
    pub expected_clicks: f64,
    /// Sum of estimated CTR × CVR over won impressions
    pub expected_conversions: f64,
}

impl CampaignStat {
    pub fn win_rate(&self) -> f64 {
        if self.bids_placed == 0 {
            return 0.0;
        }
        self.auctions_won as f64 / self.bids_placed as f64
    }

    pub fn avg_win_price_cpm(&self) -> f64 {
        if self.auctions_won == 0 {
            return 0.0;
        }
        self.total_win_price_cpm / self.auctions_won as f64
    }

    /// Spend per expected click; zero without clicks
    pub fn cost_per_click(&self) -> f64 {
        if self.expected_clicks <= 0.0 {
            return 0.0;
        }
        self.total_spend / self.expected_clicks
    }
}

/// Request timing against the SLA
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingStat {
    pub total_processing_ms: f64,
    pub max_processing_ms: f64,
    pub sla_violations: usize,
}

/// Complete simulation statistics
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStat {
    pub campaign_stat: CampaignStat,
    pub timing_stat: TimingStat,
    pub budget: CampaignBudget,
}

impl SimulationStat {
    /// Generate statistics from a simulation run and the budget it ran against
    pub fn new(simulation_run: &SimulationRun, budget: &SharedBudget) -> Self {
        let mut campaign_stat = CampaignStat {
            requests: simulation_run.results.len(),
            ..CampaignStat::default()
        };
        let mut timing_stat = TimingStat::default();

        for response in &simulation_run.results {
            match response {
                BidResponse::Declined(declined) => campaign_stat.declines.record(&declined.reason),
                BidResponse::Placed(placed) => {
                    campaign_stat.bids_placed += 1;
                    campaign_stat.total_spend += placed.spend;
                    if placed.budget_capped {
                        campaign_stat.capped_charges += 1;
                    }
                    match (placed.bid_response.won, placed.bid_response.win_price) {
                        (true, Some(win_price)) => {
                            let decision = &placed.bid_response.decision;
                            campaign_stat.auctions_won += 1;
                            campaign_stat.total_win_price_cpm += win_price;
                            campaign_stat.expected_clicks += decision.estimated_ctr;
                            campaign_stat.expected_conversions += decision.estimated_ctr * decision.estimated_cvr;
                        }
                        (_, None) => campaign_stat.no_eligible_bids += 1,
                        (false, Some(_)) => campaign_stat.auctions_lost += 1,
                    }
                    timing_stat.total_processing_ms += placed.processing_time_ms;
                    timing_stat.max_processing_ms = timing_stat.max_processing_ms.max(placed.processing_time_ms);
                    if !placed.within_sla {
                        timing_stat.sla_violations += 1;
                    }
                }
            }
        }

        Self {
            campaign_stat,
            timing_stat,
            budget: budget.snapshot(),
        }
    }

    /// Output campaign statistics
    pub fn printout_campaign(&self, logger: &mut Logger, event: LogEvent) {
        let stat = &self.campaign_stat;
        logln!(logger, event, "\nCampaign ({} strategy)", self.budget.strategy.name());
        logln!(logger, event, "  Requests (bids/declined): {} ({} / {})", stat.requests, stat.bids_placed, stat.declines.total());
        logln!(
            logger,
            event,
            "  Declines (no budget/exhausted/score/floor): {} / {} / {} / {}",
            stat.declines.no_budget,
            stat.declines.budget_exhausted,
            stat.declines.below_performance_threshold,
            stat.declines.below_floor
        );
        logln!(
            logger,
            event,
            "  Auctions (won/lost/no eligible): {} / {} / {} (win rate {:.2}%)",
            stat.auctions_won,
            stat.auctions_lost,
            stat.no_eligible_bids,
            stat.win_rate() * 100.0
        );
        logln!(logger, event, "  Average Win Price: {:.4} CPM", stat.avg_win_price_cpm());
        logln!(
            logger,
            event,
            "  Budget (spent/remaining/total): {:.4} / {:.4} / {:.2} ({} capped charges)",
            stat.total_spend,
            self.budget.remaining_budget,
            self.budget.total_budget,
            stat.capped_charges
        );
        logln!(
            logger,
            event,
            "  Expected Clicks / Conversions: {:.2} / {:.3} (cost per click {:.4})",
            stat.expected_clicks,
            stat.expected_conversions,
            stat.cost_per_click()
        );
    }

    /// Output timing statistics
    pub fn printout_timing(&self, logger: &mut Logger, event: LogEvent) {
        let placed = self.campaign_stat.bids_placed.max(1) as f64;
        logln!(
            logger,
            event,
            "  Processing (avg/max): {:.4}ms / {:.4}ms, SLA violations: {}",
            self.timing_stat.total_processing_ms / placed,
            self.timing_stat.max_processing_ms,
            self.timing_stat.sla_violations
        );
    }

    /// Output complete statistics
    pub fn printout(&self, logger: &mut Logger, event: LogEvent) {
        logln!(logger, event, "\n=== Campaign Statistics ===");
        self.printout_campaign(logger, event);
        self.printout_timing(logger, event);
    }
}

/// One simulation variant: an engine, the impressions it bids on and the budget it spends
pub struct Simulation {
    pub engine: BidOptimizationEngine,
    pub impressions: Impressions,
    pub auction_type: AuctionType,
    pub budget: SharedBudget,
}

impl Simulation {
    pub fn new(engine: BidOptimizationEngine, impressions: Impressions, auction_type: AuctionType, budget: CampaignBudget) -> Self {
        Self {
            engine,
            impressions,
            auction_type,
            budget: SharedBudget::new(budget),
        }
    }

    /// Print initialization information about the simulation
    pub fn printout(&self, logger: &mut Logger) {
        let budget = self.budget.snapshot();
        logln!(logger, LogEvent::Scenario, "Estimator: {}", self.engine.estimator().estimator_name());
        logln!(logger, LogEvent::Scenario, "Auction type: {}", self.auction_type);
        logln!(logger, LogEvent::Scenario, "Initialized {} impressions", self.impressions.impressions.len());
        logln!(
            logger,
            LogEvent::Scenario,
            "Budget: {:.2} of {:.2} remaining, {} strategy",
            budget.remaining_budget,
            budget.total_budget,
            budget.strategy.name()
        );
    }

    /// Run the variant, writing its bids and statistics to log/<scenario>/ files
    ///
    /// # Arguments
    /// * `variant_description` - Description of the variant being run
    /// * `scenario_name` - Name of the scenario (for log file paths)
    /// * `variant_name` - Name of the variant (for log file paths)
    /// * `logger` - Logger for event-based logging
    ///
    /// # Returns
    /// Returns the SimulationStat of the run
    pub fn run_variant(
        &mut self,
        variant_description: &str,
        scenario_name: &str,
        variant_name: &str,
        logger: &mut Logger,
    ) -> Result<SimulationStat, Box<dyn Error>> {
        let scenario_dir = sanitize_filename(scenario_name);
        let variant_file = sanitize_filename(variant_name);

        // Per-request bid lines
        let bids_receiver_id = logger.add_receiver(FileReceiver::new(
            &PathBuf::from(format!("log/{}/bids-{}.log", scenario_dir, variant_file)),
            vec![LogEvent::Bid],
        )?);

        // Variant summary
        let variant_receiver_id = logger.add_receiver(FileReceiver::new(
            &PathBuf::from(format!("log/{}/variant-{}.log", scenario_dir, variant_file)),
            vec![LogEvent::Scenario],
        )?);

        let auction_receiver_id = if VERBOSE_AUCTION.load(Ordering::Relaxed) {
            let id = logger.add_receiver(FileReceiver::new(
                &PathBuf::from(format!("log/{}/auctions-{}.csv", scenario_dir, variant_file)),
                vec![LogEvent::Auction],
            )?);
            logln!(logger, LogEvent::Auction, "{}", AUCTION_CSV_HEADER);
            Some(id)
        } else {
            None
        };

        logln!(logger, LogEvent::Scenario, "\n=== {} ===", variant_description);
        self.printout(logger);

        let run = SimulationRun::new(&mut self.engine, &self.impressions, self.auction_type, &self.budget, logger);
        let result = run.map(|run| SimulationStat::new(&run, &self.budget));
        if let Ok(stat) = &result {
            stat.printout(logger, LogEvent::Scenario);
        }

        let _ = logger.flush();
        if let Some(id) = auction_receiver_id {
            logger.remove_receiver(id);
        }
        logger.remove_receiver(variant_receiver_id);
        logger.remove_receiver(bids_receiver_id);

        Ok(result?)
    }
}
