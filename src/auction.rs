use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::Ordering;

use crate::auction_chargers::{AuctionChargerFirstPrice, AuctionChargerSecondPrice, AuctionChargerTrait};
use crate::competition::{CompetitionGeneratorTrait, CompetitionParams};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::utils::{get_seed, VERBOSE_AUCTION};

pub const OWN_BIDDER_ID: &str = "own";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionType {
    #[serde(rename = "first-price")]
    FirstPrice,
    #[serde(rename = "second-price")]
    SecondPrice,
}

impl AuctionType {
    /// Clearing-price rule for this auction type
    pub fn charger(self) -> Box<dyn AuctionChargerTrait> {
        match self {
            AuctionType::FirstPrice => Box::new(AuctionChargerFirstPrice),
            AuctionType::SecondPrice => Box::new(AuctionChargerSecondPrice),
        }
    }
}

impl fmt::Display for AuctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuctionType::FirstPrice => write!(f, "first-price"),
            AuctionType::SecondPrice => write!(f, "second-price"),
        }
    }
}

/// Who wins when the own bid exactly ties the best competitor bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// The own bid always wins ties
    OwnBidWins,
    /// Uniform pick among all tied bidders, from a seeded stream
    #[default]
    SeededRandom,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorBid {
    pub bidder_id: String,
    pub bid_price: f64,
    pub is_own_bid: bool,
}

/// Result of one auction
/// `competitor_bids` holds every bid (own included), highest first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionOutcome {
    pub auction_type: AuctionType,
    pub won: bool,
    /// What the winner pays; None only when no bid reached the floor
    pub win_price: Option<f64>,
    pub num_competitors: usize,
    pub competitor_bids: Vec<CompetitorBid>,
}

impl AuctionOutcome {
    /// Cost of this auction to the own campaign in currency units (CPM / 1000)
    pub fn own_cost(&self) -> f64 {
        match (self.won, self.win_price) {
            (true, Some(price)) => price / 1000.0,
            _ => 0.0,
        }
    }
}

/// Resolves the own bid against a generated competitor pool
pub struct AuctionResolver {
    competition: Box<dyn CompetitionGeneratorTrait>,
    tie_break: TieBreakPolicy,
    min_competitors: usize,
    max_competitors: usize,
    max_request_competitors: usize,
    rng_competition: StdRng,
    rng_tie_break: StdRng,
}

impl AuctionResolver {
    pub fn new(
        competition: Box<dyn CompetitionGeneratorTrait>,
        params: &CompetitionParams,
        tie_break: TieBreakPolicy,
        seed_base: u64,
    ) -> Self {
        Self {
            competition,
            tie_break,
            min_competitors: params.min_competitors,
            max_competitors: params.max_competitors.max(params.min_competitors),
            max_request_competitors: params.max_request_competitors.max(params.max_competitors),
            rng_competition: StdRng::seed_from_u64(get_seed(seed_base)),
            rng_tie_break: StdRng::seed_from_u64(get_seed(seed_base.wrapping_add(1))),
        }
    }

    /// Number of competitors when the request does not specify one
    pub fn draw_competitor_count(&mut self) -> usize {
        self.rng_competition.gen_range(self.min_competitors..=self.max_competitors)
    }

    /// Run one auction
    ///
    /// # Arguments
    /// * `own_bid` - our CPM bid
    /// * `floor_price` - bids below this are ineligible
    /// * `auction_type` - clearing-price rule
    /// * `competitor_count` - pool size, capped at `max_request_competitors`; drawn from the
    ///   configured bounds when None
    pub fn resolve(
        &mut self,
        own_bid: f64,
        floor_price: f64,
        auction_type: AuctionType,
        competitor_count: Option<usize>,
        logger: &mut Logger,
    ) -> AuctionOutcome {
        let count = match competitor_count {
            Some(count) => count.min(self.max_request_competitors),
            None => self.draw_competitor_count(),
        };
        let competitor_prices = self.competition.generate_bids(floor_price, count, &mut self.rng_competition);
        self.resolve_against(own_bid, floor_price, auction_type, &competitor_prices, logger)
    }

    /// Run one auction against explicit competitor bids
    pub fn resolve_against(
        &mut self,
        own_bid: f64,
        floor_price: f64,
        auction_type: AuctionType,
        competitor_prices: &[f64],
        logger: &mut Logger,
    ) -> AuctionOutcome {
        let own_eligible = own_bid >= floor_price;
        let best_competitor = competitor_prices
            .iter()
            .copied()
            .filter(|bid| *bid >= floor_price)
            .fold(None, |best: Option<f64>, bid| Some(best.map_or(bid, |b| b.max(bid))));

        let won = own_eligible
            && match best_competitor {
                None => true,
                Some(best) if own_bid > best => true,
                Some(best) if own_bid == best => self.own_wins_tie(competitor_prices, best),
                Some(_) => false,
            };

        let charger = auction_type.charger();
        let win_price = if won {
            Some(charger.clearing_price(own_bid, best_competitor, floor_price))
        } else {
            best_competitor.map(|winning| {
                // Runner-up for the winning competitor: everyone else who is eligible, own bid included
                let mut others: Vec<f64> = competitor_prices.iter().copied().filter(|bid| *bid >= floor_price).collect();
                if let Some(position) = others.iter().position(|bid| *bid == winning) {
                    others.remove(position);
                }
                if own_eligible {
                    others.push(own_bid);
                }
                let runner_up = others.into_iter().fold(None, |best: Option<f64>, bid| Some(best.map_or(bid, |b| b.max(bid))));
                charger.clearing_price(winning, runner_up, floor_price)
            })
        };

        let mut competitor_bids = Vec::with_capacity(competitor_prices.len() + 1);
        competitor_bids.push(CompetitorBid {
            bidder_id: OWN_BIDDER_ID.to_string(),
            bid_price: own_bid,
            is_own_bid: true,
        });
        competitor_bids.extend(competitor_prices.iter().enumerate().map(|(index, price)| CompetitorBid {
            bidder_id: format!("dsp_{}", index + 1),
            bid_price: *price,
            is_own_bid: false,
        }));
        // Stable sort keeps the own bid ahead of equal competitor bids
        competitor_bids.sort_by(|a, b| b.bid_price.total_cmp(&a.bid_price));

        let outcome = AuctionOutcome {
            auction_type,
            won,
            win_price,
            num_competitors: competitor_prices.len(),
            competitor_bids,
        };

        if VERBOSE_AUCTION.load(Ordering::Relaxed) {
            log_auction_csv(&outcome, own_bid, floor_price, logger);
        }

        outcome
    }

    /// Tie-break between the own bid and every competitor bidding exactly `best`
    fn own_wins_tie(&mut self, competitor_prices: &[f64], best: f64) -> bool {
        match self.tie_break {
            TieBreakPolicy::OwnBidWins => true,
            TieBreakPolicy::SeededRandom => {
                let tied = competitor_prices.iter().filter(|bid| **bid == best).count();
                self.rng_tie_break.gen_range(0..=tied) == 0
            }
        }
    }
}

/// Header of the CSV rows written to LogEvent::Auction
pub const AUCTION_CSV_HEADER: &str = "auction_type,floor_cpm,own_bid,won,win_price,num_competitors,competitor_bids";

fn log_auction_csv(outcome: &AuctionOutcome, own_bid: f64, floor_price: f64, logger: &mut Logger) {
    let win_price = outcome.win_price.map(|p| format!("{:.4}", p)).unwrap_or_default();
    let competitor_bids: Vec<String> = outcome
        .competitor_bids
        .iter()
        .filter(|bid| !bid.is_own_bid)
        .map(|bid| format!("{:.4}", bid.bid_price))
        .collect();
    logln!(
        logger,
        LogEvent::Auction,
        "{},{:.4},{:.4},{},{},{},{}",
        outcome.auction_type,
        floor_price,
        own_bid,
        outcome.won,
        win_price,
        outcome.num_competitors,
        competitor_bids.join(";")
    );
}
