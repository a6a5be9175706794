// Clearing-price rules for the auction resolver. Each auction type maps to one charger,
// so adding a new mechanism means adding a charger and an AuctionType variant.

/// Trait for auction clearing-price rules
pub trait AuctionChargerTrait {
    /// Price the winner pays in CPM
    ///
    /// # Arguments
    /// * `winning_bid` - bid of the winner
    /// * `runner_up` - highest eligible bid among everyone else, if any
    /// * `floor_price` - floor of the auction
    fn clearing_price(&self, winning_bid: f64, runner_up: Option<f64>, floor_price: f64) -> f64;
}

/// Winner pays its own bid
pub struct AuctionChargerFirstPrice;

impl AuctionChargerTrait for AuctionChargerFirstPrice {
    fn clearing_price(&self, winning_bid: f64, _runner_up: Option<f64>, _floor_price: f64) -> f64 {
        winning_bid
    }
}

/// Winner pays the runner-up bid, or the floor when nobody else was eligible
pub struct AuctionChargerSecondPrice;

impl AuctionChargerTrait for AuctionChargerSecondPrice {
    fn clearing_price(&self, winning_bid: f64, runner_up: Option<f64>, floor_price: f64) -> f64 {
        // Runner-up is eligible, so it is never below the floor; never charge above the bid
        runner_up.unwrap_or(floor_price).max(floor_price).min(winning_bid)
    }
}
