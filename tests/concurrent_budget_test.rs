use rtb_dsp::auction::AuctionType;
use rtb_dsp::campaign::{BiddingStrategy, CampaignBudget, SharedBudget};
use rtb_dsp::competition::CompetitionGeneratorFixed;
use rtb_dsp::config::EngineConfig;
use rtb_dsp::context::{AdCategory, DeviceType, ImpressionContext};
use rtb_dsp::engine::{BidOptimizationEngine, BidRequest, BidResponse};
use rtb_dsp::logger::Logger;

use std::sync::Arc;
use std::thread;

/// Test: Concurrent requests against one budget never spend more than it holds
///
/// Competitors always bid below the floor, so every placed first-price bid wins and is charged
/// its full bid. With a budget worth only a few wins, most requests must be declined and the
/// total charged must equal exactly what left the budget.
#[test]
fn test_concurrent_requests_respect_budget() {
    let budget = Arc::new(SharedBudget::new(CampaignBudget::fresh(0.01, BiddingStrategy::Balanced)));
    let context = ImpressionContext::new(30, DeviceType::Mobile, 3, 14, AdCategory::Electronics, 0.08, 2).unwrap();

    let workers: Vec<_> = (0..8u64)
        .map(|worker| {
            let budget = Arc::clone(&budget);
            let context = context.clone();
            thread::spawn(move || {
                let config = EngineConfig {
                    seed: 100 + worker,
                    ..EngineConfig::default()
                };
                let mut engine = BidOptimizationEngine::new(config)
                    .unwrap()
                    .with_competition(CompetitionGeneratorFixed::new(vec![0.01, 0.02]));
                let mut logger = Logger::new();
                let request = BidRequest::new(context, 0.5, AuctionType::FirstPrice);
                let mut spent = 0.0;
                let mut won = 0;
                for _ in 0..200 {
                    if let BidResponse::Placed(placed) = engine.process(&request, &budget, &mut logger).unwrap() {
                        assert!(placed.bid_response.won);
                        spent += placed.spend;
                        won += 1;
                    }
                }
                (spent, won)
            })
        })
        .collect();

    let mut total_spent = 0.0;
    let mut total_won = 0;
    for worker in workers {
        let (spent, won) = worker.join().unwrap();
        total_spent += spent;
        total_won += won;
    }

    let snapshot = budget.snapshot();
    assert!(total_won > 0);
    assert!(total_spent <= 0.01 + 1e-12, "spent {}", total_spent);
    assert!(snapshot.remaining_budget >= 0.0);
    assert!((snapshot.spent() - total_spent).abs() < 1e-12);
    assert_eq!(snapshot.remaining_budget, 0.0);
}

/// Test: Dropping a reservation without settling gives the funds back
#[test]
fn test_unsettled_reservations_are_refunded_across_threads() {
    let budget = Arc::new(SharedBudget::new(CampaignBudget::fresh(10.0, BiddingStrategy::Balanced)));
    let estimate = rtb_dsp::estimators::EstimateResult { ctr: 0.07, cvr: 0.02 };

    let workers: Vec<_> = (0..4u64)
        .map(|worker| {
            let budget = Arc::clone(&budget);
            thread::spawn(move || {
                let mut calculator = rtb_dsp::bid_calculator::BidCalculator::new(Default::default(), worker);
                for _ in 0..500 {
                    let (_decision, reservation) = budget.reserve_bid(&mut calculator, &estimate, 0.5).unwrap();
                    assert!(reservation.reserved() > 0.0);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert!((budget.remaining() - 10.0).abs() < 1e-9);
}
