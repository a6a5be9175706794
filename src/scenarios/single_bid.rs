//! This scenario sends one well-known bid request through the engine twice.
//!
//! - Variant A: a fresh 1000/1000 budget. The request must produce a positive bid, a resolved
//!   second-price auction with a defined win price, and a response within the SLA.
//!
//! - Variant B: the same request against an exhausted budget. It must be declined with a message
//!   naming budget exhaustion, and nothing may be debited.

use rtb_dsp::auction::AuctionType;
use rtb_dsp::campaign::{BiddingStrategy, CampaignBudget, SharedBudget};
use rtb_dsp::config::EngineConfig;
use rtb_dsp::context::{AdCategory, DeviceType, ImpressionContext};
use rtb_dsp::engine::{BidOptimizationEngine, BidRequest, BidResponse};
use rtb_dsp::logger::{LogEvent, Logger};
use rtb_dsp::logln;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "single_bid",
    run,
});

fn sample_request() -> Result<BidRequest, Box<dyn std::error::Error>> {
    let context = ImpressionContext::new(30, DeviceType::Mobile, 3, 14, AdCategory::Electronics, 0.08, 2)?;
    Ok(BidRequest::new(context, 0.5, AuctionType::SecondPrice))
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = BidOptimizationEngine::new(EngineConfig::default())?;
    let request = sample_request()?;

    logln!(logger, LogEvent::Scenario, "\n=== Fresh budget ===");
    let budget = SharedBudget::new(CampaignBudget::fresh(1000.0, BiddingStrategy::Balanced));
    let placed_response = engine.process(&request, &budget, logger)?;
    logln!(logger, LogEvent::Scenario, "{}", serde_json::to_string_pretty(&placed_response)?);

    logln!(logger, LogEvent::Scenario, "\n=== Exhausted budget ===");
    let exhausted = SharedBudget::new(CampaignBudget::new(1000.0, 0.0, BiddingStrategy::Balanced));
    let declined_response = engine.process(&request, &exhausted, logger)?;
    logln!(logger, LogEvent::Scenario, "{}", serde_json::to_string_pretty(&declined_response)?);

    logln!(logger, LogEvent::Scenario, "");
    let mut errors: Vec<String> = Vec::new();

    match &placed_response {
        BidResponse::Placed(placed) => {
            let bid_price = placed.bid_response.decision.bid_price;
            check(logger, &mut errors, bid_price > 0.0, format!("Bid price is positive: {:.4}", bid_price));
            check(
                logger,
                &mut errors,
                placed.auction_result.win_price.is_some(),
                format!(
                    "Second-price auction against {} competitors has a win price: {:?}",
                    placed.auction_result.num_competitors, placed.auction_result.win_price
                ),
            );
            check(
                logger,
                &mut errors,
                placed.within_sla,
                format!("Request processed within SLA: {:.4}ms", placed.processing_time_ms),
            );
            check(
                logger,
                &mut errors,
                (budget.snapshot().spent() - placed.spend).abs() < 1e-12,
                format!("Budget debited by the auction cost: {:.6}", placed.spend),
            );
        }
        BidResponse::Declined(declined) => {
            check(logger, &mut errors, false, format!("Fresh budget bid was placed (declined: {})", declined.message));
        }
    }

    match &declined_response {
        BidResponse::Declined(declined) => check(
            logger,
            &mut errors,
            declined.message.contains("budget exhausted"),
            format!("Exhausted budget is declined with reason: {}", declined.message),
        ),
        BidResponse::Placed(_) => check(logger, &mut errors, false, "Exhausted budget request was declined".to_string()),
    }
    check(
        logger,
        &mut errors,
        exhausted.remaining() == 0.0,
        format!("Exhausted budget stays at zero: {:.4}", exhausted.remaining()),
    );

    finish(scenario_name, errors)
}
