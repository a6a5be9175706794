pub mod utils;
pub mod errors;
pub mod logger;
pub mod context;
pub mod factor_tables;
pub mod sigmoid;
pub mod features;
pub mod linear_model;
pub mod estimators;
pub mod impressions;
pub mod dataset;
pub mod evaluation;
pub mod trainer;
pub mod campaign;
pub mod bid_calculator;
pub mod competition;
pub mod auction_chargers;
pub mod auction;
pub mod config;
pub mod engine;
pub mod simulationrun;

pub use auction::{AuctionOutcome, AuctionResolver, AuctionType, CompetitorBid, TieBreakPolicy};
pub use bid_calculator::{BidCalculator, BidCalculatorParams, BidDecision, NoBidReason};
pub use campaign::{BiddingStrategy, Campaign, CampaignBudget, SharedBudget};
pub use config::{AppConfig, EngineConfig};
pub use context::{AdCategory, DeviceType, ImpressionContext};
pub use engine::{BidOptimizationEngine, BidRequest, BidResponse};
pub use errors::{ConfigError, ContextError, TrainingError};
pub use estimators::{EstimateResult, EstimatorKind, EstimatorTrait, LearnedEstimator, StatisticalEstimator};
pub use evaluation::EvaluationMetrics;
pub use linear_model::LinearModel;
pub use logger::{LogEvent, Logger};
pub use trainer::{spawn_training, EpochMetric, Trainer, TrainingConfig, TrainingPhase, TrainingResult};
