//! Synthetic impression opportunities.
//!
//! Contexts are drawn with the distributions of the historical dataset: skewed device mix,
//! heavily skewed frequency counts, everything else uniform. Floors come from a pluggable
//! floor generator. All randomness is seeded through `get_seed`, so a run is reproducible
//! for a given RAND_SEED.

use rand::distributions::WeightedIndex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::Distribution;

use crate::context::{AdCategory, DeviceType, ImpressionContext, HOURS_PER_DAY, MAX_USER_AGE, MIN_USER_AGE, NUM_LOCATIONS};
use crate::errors::ConfigError;
use crate::utils::{get_seed, lognormal_dist};

/// Device mix: Desktop, Mobile, Tablet
pub const DEVICE_WEIGHTS: [f64; 3] = [0.3, 0.5, 0.2];

/// Probability of frequency counts 0..15
pub const FREQUENCY_WEIGHTS: [f64; 15] = [
    0.3, 0.25, 0.15, 0.1, 0.08, 0.05, 0.03, 0.02, 0.01, 0.005, 0.003, 0.002, 0.001, 0.0005, 0.0005,
];

/// Parameters for context generation
#[derive(Debug, Clone, PartialEq)]
pub struct ImpressionsParam {
    pub device_weights: Vec<f64>,
    pub frequency_weights: Vec<f64>,
    /// Historical CTR is drawn uniformly from [0, max_historical_ctr)
    pub max_historical_ctr: f64,
}

impl Default for ImpressionsParam {
    fn default() -> Self {
        Self {
            device_weights: DEVICE_WEIGHTS.to_vec(),
            frequency_weights: FREQUENCY_WEIGHTS.to_vec(),
            max_historical_ctr: 0.15,
        }
    }
}

/// Seeded generator of valid impression contexts
pub struct ContextGenerator {
    rng: StdRng,
    device_dist: WeightedIndex<f64>,
    frequency_dist: WeightedIndex<f64>,
    max_historical_ctr: f64,
}

impl ContextGenerator {
    /// `seed_base` is passed through `get_seed`, so the stream follows the global RAND_SEED
    pub fn new(params: &ImpressionsParam, seed_base: u64) -> Result<Self, ConfigError> {
        if params.device_weights.len() != DeviceType::ALL.len() {
            return Err(ConfigError::InvalidParameter {
                name: "device_weights",
                reason: format!("expected {} weights, got {}", DeviceType::ALL.len(), params.device_weights.len()),
            });
        }
        if !(0.0..=1.0).contains(&params.max_historical_ctr) {
            return Err(ConfigError::InvalidParameter {
                name: "max_historical_ctr",
                reason: format!("must be in [0, 1], got {}", params.max_historical_ctr),
            });
        }
        let device_dist = WeightedIndex::new(&params.device_weights).map_err(|e| ConfigError::InvalidParameter {
            name: "device_weights",
            reason: e.to_string(),
        })?;
        let frequency_dist = WeightedIndex::new(&params.frequency_weights).map_err(|e| ConfigError::InvalidParameter {
            name: "frequency_weights",
            reason: e.to_string(),
        })?;
        Ok(Self {
            rng: StdRng::seed_from_u64(get_seed(seed_base)),
            device_dist,
            frequency_dist,
            max_historical_ctr: params.max_historical_ctr,
        })
    }

    pub fn next_context(&mut self) -> ImpressionContext {
        let device_type = DeviceType::ALL[self.device_dist.sample(&mut self.rng)];
        let ad_category = AdCategory::ALL[self.rng.gen_range(0..AdCategory::ALL.len())];
        let historical_ctr = if self.max_historical_ctr > 0.0 {
            self.rng.gen_range(0.0..self.max_historical_ctr)
        } else {
            0.0
        };
        // Every field is drawn inside its documented range
        ImpressionContext {
            user_age: self.rng.gen_range(MIN_USER_AGE..MAX_USER_AGE),
            device_type,
            location: self.rng.gen_range(0..NUM_LOCATIONS),
            time_of_day: self.rng.gen_range(0..HOURS_PER_DAY),
            ad_category,
            historical_ctr,
            frequency_count: self.frequency_dist.sample(&mut self.rng) as u32,
        }
    }

    pub fn generate(&mut self, count: usize) -> Vec<ImpressionContext> {
        (0..count).map(|_| self.next_context()).collect()
    }
}

/// Trait for generating floor CPM values
pub trait FloorGeneratorTrait {
    /// Generate a floor CPM for the next impression
    fn generate_floor(&self, rng: &mut StdRng) -> f64;
}

/// Floor generator that always returns a fixed value
pub struct FloorGeneratorFixed {
    pub value: f64,
}

impl FloorGeneratorFixed {
    pub fn new(value: f64) -> Box<Self> {
        Box::new(Self { value })
    }
}

impl FloorGeneratorTrait for FloorGeneratorFixed {
    fn generate_floor(&self, _rng: &mut StdRng) -> f64 {
        self.value
    }
}

/// Floors drawn uniformly from [min, max), rounded to cents like exchange floors
pub struct FloorGeneratorUniform {
    min: f64,
    max: f64,
}

impl FloorGeneratorUniform {
    pub fn new(min: f64, max: f64) -> Result<Box<Self>, ConfigError> {
        if min < 0.0 || max <= min || !max.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "floor_range",
                reason: format!("need 0 <= min < max, got [{}, {})", min, max),
            });
        }
        Ok(Box::new(Self { min, max }))
    }
}

impl FloorGeneratorTrait for FloorGeneratorUniform {
    fn generate_floor(&self, rng: &mut StdRng) -> f64 {
        (rng.gen_range(self.min..self.max) * 100.0).round() / 100.0
    }
}

/// Floor generator that uses a lognormal distribution around a mean floor
pub struct FloorGeneratorLogNormal {
    dist: rand_distr::LogNormal<f64>,
}

impl FloorGeneratorLogNormal {
    pub fn new(mean: f64, stddev: f64) -> Result<Box<Self>, ConfigError> {
        Ok(Box::new(Self { dist: lognormal_dist(mean, stddev)? }))
    }
}

impl FloorGeneratorTrait for FloorGeneratorLogNormal {
    fn generate_floor(&self, rng: &mut StdRng) -> f64 {
        self.dist.sample(rng).max(0.0)
    }
}

/// Represents an impression on offer
#[derive(Debug, Clone, PartialEq)]
pub struct Impression {
    pub context: ImpressionContext,
    pub floor_cpm: f64,
}

/// Container for a pre-generated stream of impressions
pub struct Impressions {
    pub impressions: Vec<Impression>,
}

impl Impressions {
    /// Generate `count` impressions with seeded contexts and floors
    pub fn new(count: usize, params: &ImpressionsParam, floor_generator: &dyn FloorGeneratorTrait) -> Result<Self, ConfigError> {
        let mut contexts = ContextGenerator::new(params, 1991)?;
        let mut rng_floor = StdRng::seed_from_u64(get_seed(3993));
        let impressions = (0..count)
            .map(|_| Impression {
                context: contexts.next_context(),
                floor_cpm: floor_generator.generate_floor(&mut rng_floor),
            })
            .collect();
        Ok(Self { impressions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_contexts_are_valid() {
        let mut generator = ContextGenerator::new(&ImpressionsParam::default(), 11).unwrap();
        for context in generator.generate(2000) {
            assert!(context.validate().is_ok(), "{:?}", context);
            assert!(context.frequency_count < 15);
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let params = ImpressionsParam::default();
        let a = ContextGenerator::new(&params, 5).unwrap().generate(50);
        let b = ContextGenerator::new(&params, 5).unwrap().generate(50);
        let c = ContextGenerator::new(&params, 6).unwrap().generate(50);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_device_mix_follows_weights() {
        let mut generator = ContextGenerator::new(&ImpressionsParam::default(), 3).unwrap();
        let contexts = generator.generate(10000);
        let mobile = contexts.iter().filter(|c| c.device_type == DeviceType::Mobile).count() as f64 / 10000.0;
        assert!((mobile - 0.5).abs() < 0.03, "mobile share {}", mobile);
    }

    #[test]
    fn test_rejects_bad_weights() {
        let params = ImpressionsParam {
            device_weights: vec![1.0, 1.0],
            ..ImpressionsParam::default()
        };
        assert!(ContextGenerator::new(&params, 1).is_err());
        let params = ImpressionsParam {
            frequency_weights: vec![0.0, 0.0],
            ..ImpressionsParam::default()
        };
        assert!(ContextGenerator::new(&params, 1).is_err());
    }

    #[test]
    fn test_uniform_floors_in_range() {
        let floors = FloorGeneratorUniform::new(0.5, 3.0).unwrap();
        let impressions = Impressions::new(500, &ImpressionsParam::default(), floors.as_ref()).unwrap();
        assert_eq!(impressions.impressions.len(), 500);
        for impression in &impressions.impressions {
            assert!((0.5..=3.0).contains(&impression.floor_cpm));
        }
        assert!(FloorGeneratorUniform::new(2.0, 1.0).is_err());
    }

    #[test]
    fn test_fixed_floor() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(FloorGeneratorFixed::new(0.5).generate_floor(&mut rng), 0.5);
        let lognormal = FloorGeneratorLogNormal::new(1.0, 0.3).unwrap();
        assert!(lognormal.generate_floor(&mut rng) > 0.0);
    }
}
