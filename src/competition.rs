use rand::rngs::StdRng;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::utils::lognormal_dist;

/// Parameters of the synthetic competitor pool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionParams {
    /// Mean competitor bid as a multiple of the floor
    pub mean_to_floor: f64,
    /// Standard deviation relative to the mean
    pub relative_stddev: f64,
    /// Floors below this anchor the distribution here instead
    pub min_anchor_cpm: f64,
    pub min_competitors: usize,
    pub max_competitors: usize,
    /// Largest pool a request may ask for through `competitorCount`
    pub max_request_competitors: usize,
}

impl Default for CompetitionParams {
    fn default() -> Self {
        Self {
            mean_to_floor: 1.3,
            relative_stddev: 0.5,
            min_anchor_cpm: 0.1,
            min_competitors: 3,
            max_competitors: 8,
            max_request_competitors: 64,
        }
    }
}

impl CompetitionParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mean_to_floor <= 0.0 || !self.mean_to_floor.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "mean_to_floor",
                reason: format!("must be a finite value > 0, got {}", self.mean_to_floor),
            });
        }
        if self.relative_stddev < 0.0 || !self.relative_stddev.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "relative_stddev",
                reason: format!("must be a finite value >= 0, got {}", self.relative_stddev),
            });
        }
        if self.min_anchor_cpm <= 0.0 || !self.min_anchor_cpm.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "min_anchor_cpm",
                reason: format!("must be a finite value > 0, got {}", self.min_anchor_cpm),
            });
        }
        if self.min_competitors > self.max_competitors {
            return Err(ConfigError::InvalidParameter {
                name: "competitors",
                reason: format!("min {} exceeds max {}", self.min_competitors, self.max_competitors),
            });
        }
        if self.max_request_competitors < self.max_competitors {
            return Err(ConfigError::InvalidParameter {
                name: "max_request_competitors",
                reason: format!(
                    "must be >= max_competitors {}, got {}",
                    self.max_competitors, self.max_request_competitors
                ),
            });
        }
        Ok(())
    }
}

/// Trait for generating competing bids for one auction
pub trait CompetitionGeneratorTrait: Send {
    /// Generate competitor CPM bids
    ///
    /// # Arguments
    /// * `floor_price` - floor of the auction; bids below it may be generated and are then ineligible
    /// * `count` - number of competitors requested
    /// * `rng` - Random number generator
    fn generate_bids(&self, floor_price: f64, count: usize, rng: &mut StdRng) -> Vec<f64>;
}

/// Competitor bids drawn from a log-normal distribution anchored on the floor
pub struct CompetitionGeneratorLogNormal {
    mean_to_floor: f64,
    relative_stddev: f64,
    min_anchor_cpm: f64,
}

impl CompetitionGeneratorLogNormal {
    pub fn new(params: &CompetitionParams) -> Result<Box<Self>, ConfigError> {
        params.validate()?;
        Ok(Box::new(Self {
            mean_to_floor: params.mean_to_floor,
            relative_stddev: params.relative_stddev,
            min_anchor_cpm: params.min_anchor_cpm,
        }))
    }
}

impl CompetitionGeneratorTrait for CompetitionGeneratorLogNormal {
    fn generate_bids(&self, floor_price: f64, count: usize, rng: &mut StdRng) -> Vec<f64> {
        let mean = floor_price.max(self.min_anchor_cpm) * self.mean_to_floor;
        match lognormal_dist(mean, mean * self.relative_stddev) {
            Ok(dist) => (0..count).map(|_| dist.sample(rng)).collect(),
            // Parameters are validated on construction, so only a non-finite floor lands here
            Err(_) => vec![mean; count],
        }
    }
}

/// Always the same competitor bids, whatever the floor or requested count
pub struct CompetitionGeneratorFixed {
    pub bids: Vec<f64>,
}

impl CompetitionGeneratorFixed {
    pub fn new(bids: Vec<f64>) -> Box<Self> {
        Box::new(Self { bids })
    }
}

impl CompetitionGeneratorTrait for CompetitionGeneratorFixed {
    fn generate_bids(&self, _floor_price: f64, _count: usize, _rng: &mut StdRng) -> Vec<f64> {
        self.bids.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_lognormal_bids_center_on_anchor() {
        let generator = CompetitionGeneratorLogNormal::new(&CompetitionParams::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let bids = generator.generate_bids(1.0, 20000, &mut rng);
        assert_eq!(bids.len(), 20000);
        assert!(bids.iter().all(|b| *b > 0.0));
        let mean = bids.iter().sum::<f64>() / bids.len() as f64;
        assert!((mean - 1.3).abs() < 0.05, "mean {}", mean);
    }

    #[test]
    fn test_zero_floor_uses_min_anchor() {
        let generator = CompetitionGeneratorLogNormal::new(&CompetitionParams::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let bids = generator.generate_bids(0.0, 5000, &mut rng);
        let mean = bids.iter().sum::<f64>() / bids.len() as f64;
        assert!((mean - 0.13).abs() < 0.01, "mean {}", mean);
    }

    #[test]
    fn test_fixed_generator_ignores_count() {
        let generator = CompetitionGeneratorFixed::new(vec![1.0, 0.4]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(generator.generate_bids(0.5, 7, &mut rng), vec![1.0, 0.4]);
    }

    #[test]
    fn test_params_validation() {
        let params = CompetitionParams { min_competitors: 9, ..CompetitionParams::default() };
        assert!(params.validate().is_err());
        let params = CompetitionParams { mean_to_floor: 0.0, ..CompetitionParams::default() };
        assert!(CompetitionGeneratorLogNormal::new(&params).is_err());
        let params = CompetitionParams { max_request_competitors: 7, ..CompetitionParams::default() };
        assert!(params.validate().is_err());
    }
}
