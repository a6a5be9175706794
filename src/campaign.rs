use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

use crate::bid_calculator::{BidCalculator, BidDecision, NoBidReason};
use crate::estimators::EstimateResult;

/// Cost of one won impression at the given CPM
pub fn cpm_to_cost(cpm: f64) -> f64 {
    cpm / 1000.0
}

/// What to do when the shaded bid lands below the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BelowFloorPolicy {
    /// Raise the bid to exactly the floor
    SubmitAtFloor,
    /// Do not bid
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParams {
    pub multiplier: f64,
    /// Impressions scoring below this are not bid on
    pub min_performance_score: f64,
    pub below_floor: BelowFloorPolicy,
}

/// Bidding strategy of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BiddingStrategy {
    Conservative,
    Balanced,
    Aggressive,
    Custom(StrategyParams),
}

impl BiddingStrategy {
    pub fn params(&self) -> StrategyParams {
        match self {
            BiddingStrategy::Conservative => StrategyParams {
                multiplier: 0.8,
                min_performance_score: 0.03,
                below_floor: BelowFloorPolicy::Decline,
            },
            BiddingStrategy::Balanced => StrategyParams {
                multiplier: 1.0,
                min_performance_score: 0.02,
                below_floor: BelowFloorPolicy::SubmitAtFloor,
            },
            BiddingStrategy::Aggressive => StrategyParams {
                multiplier: 1.25,
                min_performance_score: 0.01,
                below_floor: BelowFloorPolicy::SubmitAtFloor,
            },
            BiddingStrategy::Custom(params) => *params,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BiddingStrategy::Conservative => "conservative",
            BiddingStrategy::Balanced => "balanced",
            BiddingStrategy::Aggressive => "aggressive",
            BiddingStrategy::Custom(_) => "custom",
        }
    }
}

/// Budget of a campaign; remaining budget never drops below zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignBudget {
    pub total_budget: f64,
    pub remaining_budget: f64,
    pub strategy: BiddingStrategy,
}

impl CampaignBudget {
    pub fn new(total_budget: f64, remaining_budget: f64, strategy: BiddingStrategy) -> Self {
        Self {
            total_budget,
            remaining_budget: remaining_budget.max(0.0),
            strategy,
        }
    }

    /// Full budget still available
    pub fn fresh(total_budget: f64, strategy: BiddingStrategy) -> Self {
        Self::new(total_budget, total_budget, strategy)
    }

    /// remaining / total clamped to [0, 1]; zero for a non-positive total
    pub fn budget_factor(&self) -> f64 {
        if self.total_budget <= 0.0 {
            return 0.0;
        }
        (self.remaining_budget / self.total_budget).clamp(0.0, 1.0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.total_budget <= 0.0 || self.remaining_budget <= 0.0
    }

    pub fn spent(&self) -> f64 {
        (self.total_budget - self.remaining_budget).max(0.0)
    }

    /// Take up to `amount` from the remaining budget
    /// Returns the amount actually taken
    pub fn debit(&mut self, amount: f64) -> f64 {
        let taken = amount.max(0.0).min(self.remaining_budget);
        self.remaining_budget -= taken;
        taken
    }

    pub fn refund(&mut self, amount: f64) {
        self.remaining_budget += amount.max(0.0);
    }
}

/// A campaign budget shared between concurrent bid requests
///
/// The eligibility check, the bid computation and the hold on funds happen under one lock in
/// `reserve_bid`, so two requests can never both spend the last of the budget.
pub struct SharedBudget {
    inner: Mutex<CampaignBudget>,
}

impl SharedBudget {
    pub fn new(budget: CampaignBudget) -> Self {
        Self { inner: Mutex::new(budget) }
    }

    // A panic elsewhere cannot leave the budget half-updated, so poisoning is ignored
    fn lock(&self) -> MutexGuard<'_, CampaignBudget> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> CampaignBudget {
        self.lock().clone()
    }

    pub fn remaining(&self) -> f64 {
        self.lock().remaining_budget
    }

    pub fn budget_factor(&self) -> f64 {
        self.lock().budget_factor()
    }

    /// Compute a bid against the current budget and hold the cost of winning at that bid
    ///
    /// # Returns
    /// The decision and a reservation to settle once the auction is resolved
    pub fn reserve_bid(
        &self,
        calculator: &mut BidCalculator,
        estimate: &EstimateResult,
        floor_price: f64,
    ) -> Result<(BidDecision, Reservation<'_>), NoBidReason> {
        let mut budget = self.lock();
        let decision = calculator.compute_bid(estimate, &budget, floor_price)?;
        let reserved = budget.debit(cpm_to_cost(decision.bid_price));
        Ok((decision, Reservation { budget: self, reserved, settled: false }))
    }
}

/// Funds held for one in-flight auction
/// Whatever is not settled as spend goes back to the budget, also when dropped
pub struct Reservation<'a> {
    budget: &'a SharedBudget,
    reserved: f64,
    settled: bool,
}

impl Reservation<'_> {
    pub fn reserved(&self) -> f64 {
        self.reserved
    }

    /// Charge `spend` (capped at the reserved amount) and refund the rest
    /// Returns the amount charged
    pub fn settle(mut self, spend: f64) -> f64 {
        let charged = spend.max(0.0).min(self.reserved);
        self.budget.lock().refund(self.reserved - charged);
        self.settled = true;
        charged
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.budget.lock().refund(self.reserved);
        }
    }
}

/// Campaign identity reported with every placed bid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
}

impl Default for Campaign {
    fn default() -> Self {
        Self {
            id: "camp_001".to_string(),
            name: "Default Campaign".to_string(),
        }
    }
}
