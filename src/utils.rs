use rand_distr::LogNormal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use crate::errors::ConfigError;

/// Global seed offset, set by the scenario runner for each iteration
pub static RAND_SEED: AtomicU64 = AtomicU64::new(0);

/// When set, every resolved auction is written as a CSV row to LogEvent::Auction
pub static VERBOSE_AUCTION: AtomicBool = AtomicBool::new(false);

/// Counts completed simulation runs across all scenarios
pub static TOTAL_SIMULATION_RUNS: AtomicU64 = AtomicU64::new(0);

/// Get a seed for a component, offset by the current global RAND_SEED
/// Every component uses its own base so that streams stay independent
pub fn get_seed(base: u64) -> u64 {
    base.wrapping_add(RAND_SEED.load(Ordering::Relaxed))
}

/// Convert mean and standard deviation to log-normal distribution parameters
/// Returns (μ, σ) for LogNormal(μ, σ) that approximates the given mean and stddev
///
/// To convert from mean (m) and stddev (s):
/// - σ = sqrt(ln(1 + s²/m²))
/// - μ = ln(m) - σ²/2
fn lognormal_from_mean_stddev(mean: f64, stddev: f64) -> (f64, f64) {
    let variance = stddev * stddev;
    let sigma_squared = (1.0 + variance / (mean * mean)).ln();
    let sigma = sigma_squared.sqrt();
    let mu = mean.ln() - sigma_squared / 2.0;
    (mu, sigma)
}

/// Create a log-normal distribution from mean and standard deviation
pub fn lognormal_dist(mean: f64, stddev: f64) -> Result<LogNormal<f64>, ConfigError> {
    if mean <= 0.0 || !mean.is_finite() || stddev < 0.0 || !stddev.is_finite() {
        return Err(ConfigError::InvalidParameter {
            name: "lognormal",
            reason: format!("mean must be > 0 and stddev >= 0, got mean={} stddev={}", mean, stddev),
        });
    }
    let (mu, sigma) = lognormal_from_mean_stddev(mean, stddev);
    LogNormal::new(mu, sigma).map_err(|e| ConfigError::InvalidParameter {
        name: "lognormal",
        reason: e.to_string(),
    })
}

/// Milliseconds with sub-millisecond precision
pub fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
