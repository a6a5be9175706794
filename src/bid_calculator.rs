use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::campaign::{BelowFloorPolicy, CampaignBudget};
use crate::errors::ConfigError;
use crate::estimators::EstimateResult;
use crate::utils::get_seed;

/// Parameters of the bid formula
/// bid = base_bid * performance_score * budget_factor * strategy_multiplier * adaptive * bid_shading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BidCalculatorParams {
    /// CPM bid for an impression with performance score 1.0
    pub base_bid: f64,
    /// Strategy-independent shading factor in [0, 1)
    pub bid_shading: f64,
    /// Adaptive adjustment is drawn uniformly from [adaptive_min, adaptive_max]
    pub adaptive_min: f64,
    pub adaptive_max: f64,
}

impl Default for BidCalculatorParams {
    fn default() -> Self {
        Self {
            base_bid: 20.0,
            bid_shading: 0.85,
            adaptive_min: 0.95,
            adaptive_max: 1.05,
        }
    }
}

impl BidCalculatorParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_bid <= 0.0 || !self.base_bid.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "base_bid",
                reason: format!("must be a finite value > 0, got {}", self.base_bid),
            });
        }
        if !(0.0..1.0).contains(&self.bid_shading) {
            return Err(ConfigError::InvalidParameter {
                name: "bid_shading",
                reason: format!("must be in [0, 1), got {}", self.bid_shading),
            });
        }
        if self.adaptive_min <= 0.0 || self.adaptive_max < self.adaptive_min || !self.adaptive_max.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "adaptive_band",
                reason: format!("need 0 < min <= max, got [{}, {}]", self.adaptive_min, self.adaptive_max),
            });
        }
        Ok(())
    }
}

/// A bid the engine is willing to submit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidDecision {
    pub bid_price: f64,
    #[serde(rename = "estimatedCTR")]
    pub estimated_ctr: f64,
    #[serde(rename = "estimatedCVR")]
    pub estimated_cvr: f64,
    pub performance_score: f64,
    pub budget_factor: f64,
    pub bid_shading: f64,
    pub adaptive_adjustment: f64,
    pub strategy: String,
}

/// Why no bid was placed
/// Not an error: declining is a normal outcome of a bid request
#[derive(Debug, Clone, PartialEq)]
pub enum NoBidReason {
    /// Total budget is zero or negative
    NoBudget,
    BudgetExhausted,
    BelowPerformanceThreshold { score: f64, min_score: f64 },
    BelowFloor { bid_price: f64, floor_price: f64 },
}

impl NoBidReason {
    pub fn message(&self) -> String {
        let detail = match self {
            NoBidReason::NoBudget => "campaign has no budget".to_string(),
            NoBidReason::BudgetExhausted => "campaign budget exhausted".to_string(),
            NoBidReason::BelowPerformanceThreshold { score, min_score } => {
                format!("performance score {:.4} below strategy minimum {:.4}", score, min_score)
            }
            NoBidReason::BelowFloor { bid_price, floor_price } => {
                format!("bid {:.4} below floor price {:.4}", bid_price, floor_price)
            }
        };
        format!("No eligible campaigns for this bid request: {}", detail)
    }
}

impl fmt::Display for NoBidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Turns an estimate and the campaign budget into a bid price
pub struct BidCalculator {
    params: BidCalculatorParams,
    rng: StdRng,
}

impl BidCalculator {
    /// `seed_base` is offset by the global RAND_SEED
    pub fn new(params: BidCalculatorParams, seed_base: u64) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(get_seed(seed_base)),
        }
    }

    pub fn params(&self) -> &BidCalculatorParams {
        &self.params
    }

    fn adaptive_adjustment(&mut self) -> f64 {
        if self.params.adaptive_max > self.params.adaptive_min {
            self.rng.gen_range(self.params.adaptive_min..=self.params.adaptive_max)
        } else {
            self.params.adaptive_min
        }
    }

    /// Compute the bid for one impression under the budget's strategy
    ///
    /// # Arguments
    /// * `estimate` - CTR/CVR estimate of the impression
    /// * `budget` - campaign budget; only read
    /// * `floor_price` - CPM floor of the impression
    ///
    /// # Returns
    /// The decision, or the reason for not bidding
    pub fn compute_bid(
        &mut self,
        estimate: &EstimateResult,
        budget: &CampaignBudget,
        floor_price: f64,
    ) -> Result<BidDecision, NoBidReason> {
        if budget.total_budget <= 0.0 {
            return Err(NoBidReason::NoBudget);
        }
        if budget.remaining_budget <= 0.0 {
            return Err(NoBidReason::BudgetExhausted);
        }

        let strategy = budget.strategy.params();
        let performance_score = estimate.performance_score();
        if performance_score < strategy.min_performance_score {
            return Err(NoBidReason::BelowPerformanceThreshold {
                score: performance_score,
                min_score: strategy.min_performance_score,
            });
        }

        let budget_factor = budget.budget_factor();
        let adaptive_adjustment = self.adaptive_adjustment();
        let mut bid_price = self.params.base_bid
            * performance_score
            * budget_factor
            * strategy.multiplier
            * adaptive_adjustment
            * self.params.bid_shading;

        if bid_price < floor_price {
            match strategy.below_floor {
                BelowFloorPolicy::SubmitAtFloor => bid_price = floor_price,
                BelowFloorPolicy::Decline => {
                    return Err(NoBidReason::BelowFloor { bid_price, floor_price });
                }
            }
        }

        Ok(BidDecision {
            bid_price,
            estimated_ctr: estimate.ctr,
            estimated_cvr: estimate.cvr,
            performance_score,
            budget_factor,
            bid_shading: self.params.bid_shading,
            adaptive_adjustment,
            strategy: budget.strategy.name().to_string(),
        })
    }
}
