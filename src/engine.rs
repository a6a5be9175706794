//! Bid optimization engine: context -> estimator -> bid calculator -> auction resolver.
//!
//! One engine owns its random streams (adaptive adjustment, competitors, tie-breaks), so it is
//! used by one thread at a time. The campaign budget is passed in per request and may be shared
//! by many engines.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::auction::{AuctionOutcome, AuctionResolver, AuctionType};
use crate::bid_calculator::{BidCalculator, BidDecision, NoBidReason};
use crate::campaign::{Campaign, SharedBudget};
use crate::competition::{CompetitionGeneratorLogNormal, CompetitionGeneratorTrait, CompetitionParams};
use crate::config::EngineConfig;
use crate::context::ImpressionContext;
use crate::errors::{ConfigError, ContextError};
use crate::estimators::{build_estimator, EstimatorTrait};
use crate::linear_model::LinearModel;
use crate::logger::{LogEvent, Logger};
use crate::utils::elapsed_ms;
use crate::{logln, warnln};

/// Seed offset of the auction streams relative to the engine seed
const RESOLVER_SEED_OFFSET: u64 = 100;

/// Incoming bid request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    /// Assigned by the engine when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub context: ImpressionContext,
    pub floor_price: f64,
    pub auction_type: AuctionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitor_count: Option<usize>,
}

impl BidRequest {
    pub fn new(context: ImpressionContext, floor_price: f64, auction_type: AuctionType) -> Self {
        Self {
            id: None,
            context,
            floor_price,
            auction_type,
            competitor_count: None,
        }
    }

    /// Context ranges, a finite non-negative floor, and a competitor count within the pool cap
    pub fn validate(&self, competition: &CompetitionParams) -> Result<(), ContextError> {
        self.context.validate()?;
        if self.floor_price < 0.0 || !self.floor_price.is_finite() {
            return Err(ContextError::OutOfRange {
                field: "floorPrice",
                value: self.floor_price.to_string(),
                expected: ">= 0",
            });
        }
        if let Some(count) = self.competitor_count {
            if count > competition.max_request_competitors {
                return Err(ContextError::OutOfRange {
                    field: "competitorCount",
                    value: count.to_string(),
                    expected: "<= max_request_competitors",
                });
            }
        }
        Ok(())
    }
}

/// Bid decision plus the auction outcome as seen by the bidder
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidOutcome {
    #[serde(flatten)]
    pub decision: BidDecision,
    pub won: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedBid {
    pub success: bool,
    pub bid_request: BidRequest,
    pub bid_response: BidOutcome,
    pub auction_result: AuctionOutcome,
    pub campaign: Campaign,
    pub processing_time_ms: f64,
    #[serde(rename = "withinSLA")]
    pub within_sla: bool,
    /// The remaining budget could not cover the clearing price, so less than winPrice / 1000
    /// was charged
    pub budget_capped: bool,
    /// Amount debited from the campaign budget
    #[serde(skip)]
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclinedBid {
    pub success: bool,
    pub message: String,
    #[serde(skip)]
    pub reason: NoBidReason,
}

/// Result of processing one request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BidResponse {
    Placed(Box<PlacedBid>),
    Declined(DeclinedBid),
}

impl BidResponse {
    pub fn is_placed(&self) -> bool {
        matches!(self, BidResponse::Placed(_))
    }

    pub fn placed(&self) -> Option<&PlacedBid> {
        match self {
            BidResponse::Placed(placed) => Some(placed),
            BidResponse::Declined(_) => None,
        }
    }

    pub fn declined(&self) -> Option<&DeclinedBid> {
        match self {
            BidResponse::Placed(_) => None,
            BidResponse::Declined(declined) => Some(declined),
        }
    }
}

pub struct BidOptimizationEngine {
    config: EngineConfig,
    estimator: Box<dyn EstimatorTrait>,
    calculator: BidCalculator,
    resolver: AuctionResolver,
    requests_processed: u64,
}

impl BidOptimizationEngine {
    /// Engine with the configured estimator
    /// A learned estimator needs `with_models` instead
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_models(config, None)
    }

    /// Engine whose learned estimator (if configured) uses the given (ctr, cvr) models
    pub fn with_models(config: EngineConfig, models: Option<(LinearModel, LinearModel)>) -> Result<Self, ConfigError> {
        let estimator = build_estimator(config.estimator, models)?;
        Self::with_estimator(config, estimator)
    }

    pub fn with_estimator(config: EngineConfig, estimator: Box<dyn EstimatorTrait>) -> Result<Self, ConfigError> {
        config.validate()?;
        let competition = CompetitionGeneratorLogNormal::new(&config.competition)?;
        Ok(Self {
            calculator: BidCalculator::new(config.bid, config.seed),
            resolver: AuctionResolver::new(
                competition,
                &config.competition,
                config.tie_break,
                config.seed.wrapping_add(RESOLVER_SEED_OFFSET),
            ),
            estimator,
            config,
            requests_processed: 0,
        })
    }

    /// Replace the competitor generator, keeping the configured tie-break and seeds
    pub fn with_competition(mut self, competition: Box<dyn CompetitionGeneratorTrait>) -> Self {
        self.resolver = AuctionResolver::new(
            competition,
            &self.config.competition,
            self.config.tie_break,
            self.config.seed.wrapping_add(RESOLVER_SEED_OFFSET),
        );
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &dyn EstimatorTrait {
        self.estimator.as_ref()
    }

    pub fn requests_processed(&self) -> u64 {
        self.requests_processed
    }

    /// Process one bid request against a campaign budget
    ///
    /// The budget is checked and the cost of winning is reserved under one lock; after the
    /// auction the reservation is settled with the actual spend.
    ///
    /// # Returns
    /// A placed bid with its auction outcome, a structured decline, or the validation error of
    /// a malformed request
    pub fn process(
        &mut self,
        request: &BidRequest,
        budget: &SharedBudget,
        logger: &mut Logger,
    ) -> Result<BidResponse, ContextError> {
        let start = Instant::now();
        request.validate(&self.config.competition)?;
        self.requests_processed += 1;

        let mut bid_request = request.clone();
        if bid_request.id.is_none() {
            bid_request.id = Some(format!("req_{:06}", self.requests_processed));
        }

        let estimate = self.estimator.estimate(&request.context);
        let (decision, reservation) = match budget.reserve_bid(&mut self.calculator, &estimate, request.floor_price) {
            Ok(reserved) => reserved,
            Err(reason) => {
                logln!(
                    logger,
                    LogEvent::Bid,
                    "{} declined: {}",
                    bid_request.id.as_deref().unwrap_or_default(),
                    reason.message()
                );
                return Ok(BidResponse::Declined(DeclinedBid {
                    success: false,
                    message: reason.message(),
                    reason,
                }));
            }
        };

        let auction_result = self.resolver.resolve(
            decision.bid_price,
            request.floor_price,
            request.auction_type,
            request.competitor_count,
            logger,
        );
        let own_cost = auction_result.own_cost();
        let spend = reservation.settle(own_cost);
        let budget_capped = spend < own_cost;
        if budget_capped {
            warnln!(
                logger,
                LogEvent::Bid,
                "{} charge capped by the remaining budget: {:.6} of {:.6}",
                bid_request.id.as_deref().unwrap_or_default(),
                spend,
                own_cost
            );
        }

        let processing_time_ms = elapsed_ms(start);
        let within_sla = processing_time_ms <= self.config.sla_ms;
        if !within_sla {
            warnln!(
                logger,
                LogEvent::Bid,
                "{} took {:.3}ms, over the {:.0}ms SLA",
                bid_request.id.as_deref().unwrap_or_default(),
                processing_time_ms,
                self.config.sla_ms
            );
        }
        logln!(
            logger,
            LogEvent::Bid,
            "{} bid {:.4} (ctr {:.4}, cvr {:.4}, score {:.4}, budget factor {:.3}) floor {:.4} {} -> {}",
            bid_request.id.as_deref().unwrap_or_default(),
            decision.bid_price,
            decision.estimated_ctr,
            decision.estimated_cvr,
            decision.performance_score,
            decision.budget_factor,
            request.floor_price,
            request.auction_type,
            match (auction_result.won, auction_result.win_price) {
                (true, Some(price)) => format!("won at {:.4}", price),
                (false, Some(price)) => format!("lost, cleared at {:.4}", price),
                _ => "no eligible bids".to_string(),
            }
        );

        Ok(BidResponse::Placed(Box::new(PlacedBid {
            success: true,
            bid_request,
            bid_response: BidOutcome {
                decision,
                won: auction_result.won,
                win_price: auction_result.win_price,
            },
            auction_result,
            campaign: self.config.campaign.clone(),
            processing_time_ms,
            within_sla,
            budget_capped,
            spend,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::TieBreakPolicy;
    use crate::campaign::{BiddingStrategy, CampaignBudget};
    use crate::competition::CompetitionGeneratorFixed;
    use crate::context::{AdCategory, DeviceType};
    use crate::estimators::EstimatorKind;
    use crate::logger::MemoryReceiver;

    fn sample_request(auction_type: AuctionType) -> BidRequest {
        let context = ImpressionContext::new(30, DeviceType::Mobile, 3, 14, AdCategory::Electronics, 0.08, 2).unwrap();
        BidRequest::new(context, 0.5, auction_type)
    }

    #[test]
    fn test_sample_request_is_placed() {
        let mut engine = BidOptimizationEngine::new(EngineConfig::default()).unwrap();
        let budget = SharedBudget::new(CampaignBudget::fresh(1000.0, BiddingStrategy::Balanced));
        let mut logger = Logger::new();
        let response = engine.process(&sample_request(AuctionType::SecondPrice), &budget, &mut logger).unwrap();
        let placed = response.placed().unwrap();
        assert!(placed.bid_response.decision.bid_price > 0.0);
        assert_eq!(placed.auction_result.auction_type, AuctionType::SecondPrice);
        assert!(placed.auction_result.win_price.is_some());
        assert_eq!(placed.bid_request.id.as_deref(), Some("req_000001"));
        assert!((budget.snapshot().spent() - placed.spend).abs() < 1e-12);
    }

    #[test]
    fn test_exhausted_budget_declines_with_message() {
        let mut engine = BidOptimizationEngine::new(EngineConfig::default()).unwrap();
        let budget = SharedBudget::new(CampaignBudget::new(1000.0, 0.0, BiddingStrategy::Balanced));
        let (receiver, buffer) = MemoryReceiver::new(vec![LogEvent::Bid]);
        let mut logger = Logger::new();
        logger.add_receiver(receiver);

        let response = engine.process(&sample_request(AuctionType::FirstPrice), &budget, &mut logger).unwrap();
        let declined = response.declined().unwrap();
        assert!(!declined.success);
        assert!(declined.message.contains("budget exhausted"));
        assert!(buffer.lock().unwrap().contains("declined"));
    }

    #[test]
    fn test_first_price_win_debits_own_bid() {
        let mut engine = BidOptimizationEngine::new(EngineConfig::default())
            .unwrap()
            .with_competition(CompetitionGeneratorFixed::new(vec![0.1, 0.2]));
        let budget = SharedBudget::new(CampaignBudget::fresh(1000.0, BiddingStrategy::Balanced));
        let mut logger = Logger::new();
        let response = engine.process(&sample_request(AuctionType::FirstPrice), &budget, &mut logger).unwrap();
        let placed = response.placed().unwrap();
        assert!(placed.bid_response.won);
        assert_eq!(placed.bid_response.win_price, Some(placed.bid_response.decision.bid_price));
        assert!((placed.spend - placed.bid_response.decision.bid_price / 1000.0).abs() < 1e-12);
        assert!((budget.remaining() - (1000.0 - placed.spend)).abs() < 1e-9);
        assert!(!placed.budget_capped);
    }

    #[test]
    fn test_win_beyond_remaining_budget_reports_capped_charge() {
        let mut engine = BidOptimizationEngine::new(EngineConfig::default())
            .unwrap()
            .with_competition(CompetitionGeneratorFixed::new(vec![0.1, 0.2]));
        // Budget factor is tiny, so the bid is raised to the 0.5 floor: a cost of 0.0005
        let budget = SharedBudget::new(CampaignBudget::new(1000.0, 0.0003, BiddingStrategy::Balanced));
        let mut logger = Logger::new();
        let response = engine.process(&sample_request(AuctionType::FirstPrice), &budget, &mut logger).unwrap();
        let placed = response.placed().unwrap();
        assert!(placed.bid_response.won);
        assert_eq!(placed.bid_response.win_price, Some(0.5));
        assert!(placed.budget_capped);
        assert!((placed.spend - 0.0003).abs() < 1e-12);
        assert_eq!(budget.remaining(), 0.0);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["budgetCapped"], true);
    }

    #[test]
    fn test_lost_auction_refunds_reservation() {
        let mut engine = BidOptimizationEngine::new(EngineConfig::default())
            .unwrap()
            .with_competition(CompetitionGeneratorFixed::new(vec![50.0]));
        let budget = SharedBudget::new(CampaignBudget::fresh(1000.0, BiddingStrategy::Balanced));
        let mut logger = Logger::new();
        let response = engine.process(&sample_request(AuctionType::FirstPrice), &budget, &mut logger).unwrap();
        let placed = response.placed().unwrap();
        assert!(!placed.bid_response.won);
        assert_eq!(placed.bid_response.win_price, Some(50.0));
        assert_eq!(placed.spend, 0.0);
        assert_eq!(budget.remaining(), 1000.0);
    }

    #[test]
    fn test_invalid_request_is_rejected() {
        let mut engine = BidOptimizationEngine::new(EngineConfig::default()).unwrap();
        let budget = SharedBudget::new(CampaignBudget::fresh(1000.0, BiddingStrategy::Balanced));
        let mut logger = Logger::new();
        let mut request = sample_request(AuctionType::FirstPrice);
        request.floor_price = -1.0;
        assert!(matches!(
            engine.process(&request, &budget, &mut logger),
            Err(ContextError::OutOfRange { field: "floorPrice", .. })
        ));
        assert_eq!(engine.requests_processed(), 0);
    }

    #[test]
    fn test_oversized_competitor_count_is_rejected() {
        let mut engine = BidOptimizationEngine::new(EngineConfig::default()).unwrap();
        let budget = SharedBudget::new(CampaignBudget::fresh(1000.0, BiddingStrategy::Balanced));
        let mut logger = Logger::new();
        let mut request = sample_request(AuctionType::SecondPrice);

        request.competitor_count = Some(usize::MAX);
        assert!(matches!(
            engine.process(&request, &budget, &mut logger),
            Err(ContextError::OutOfRange { field: "competitorCount", .. })
        ));
        assert_eq!(budget.remaining(), 1000.0);

        let cap = engine.config().competition.max_request_competitors;
        request.competitor_count = Some(cap);
        let response = engine.process(&request, &budget, &mut logger).unwrap();
        assert_eq!(response.placed().unwrap().auction_result.num_competitors, cap);
    }

    #[test]
    fn test_learned_estimator_needs_models() {
        let config = EngineConfig {
            estimator: EstimatorKind::Learned,
            ..EngineConfig::default()
        };
        assert!(BidOptimizationEngine::new(config).is_err());
    }

    #[test]
    fn test_request_json_round_trip_shape() {
        let json = r#"{"userAge":30,"deviceType":1,"location":3,"timeOfDay":14,"adCategory":0,"historicalCTR":0.08,"frequencyCount":2,"floorPrice":0.5,"auctionType":"second-price","competitorCount":4}"#;
        let request: BidRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.context.device_type, DeviceType::Mobile);
        assert_eq!(request.competitor_count, Some(4));

        let config = EngineConfig {
            tie_break: TieBreakPolicy::OwnBidWins,
            ..EngineConfig::default()
        };
        let mut engine = BidOptimizationEngine::new(config).unwrap();
        let budget = SharedBudget::new(CampaignBudget::fresh(1000.0, BiddingStrategy::Balanced));
        let mut logger = Logger::new();
        let response = engine.process(&request, &budget, &mut logger).unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["bidRequest"]["userAge"], 30);
        assert_eq!(value["bidRequest"]["auctionType"], "second-price");
        assert!(value["bidResponse"]["bidPrice"].is_number());
        assert!(value["bidResponse"]["won"].is_boolean());
        assert_eq!(value["auctionResult"]["numCompetitors"], 4);
        assert_eq!(value["auctionResult"]["competitorBids"].as_array().unwrap().len(), 5);
        assert_eq!(value["campaign"]["id"], "camp_001");
        assert!(value["withinSLA"].is_boolean());
        assert!(value.get("spend").is_none());

        let declined = BidResponse::Declined(DeclinedBid {
            success: false,
            message: NoBidReason::BudgetExhausted.message(),
            reason: NoBidReason::BudgetExhausted,
        });
        let value = serde_json::to_value(&declined).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("reason").is_none());
    }
}
