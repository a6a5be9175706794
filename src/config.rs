//! Engine and application configuration.
//!
//! Every section has documented defaults, so an empty TOML file is a valid configuration:
//!
//! ```toml
//! [engine]
//! estimator = "statistical"
//! tie_break = "seeded_random"
//! sla_ms = 100.0
//!
//! [engine.bid]
//! base_bid = 20.0
//! bid_shading = 0.85
//!
//! [engine.competition]
//! min_competitors = 3
//! max_competitors = 8
//! max_request_competitors = 64
//!
//! [training]
//! learningRate = 0.05
//! epochs = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auction::TieBreakPolicy;
use crate::bid_calculator::BidCalculatorParams;
use crate::campaign::Campaign;
use crate::competition::CompetitionParams;
use crate::errors::ConfigError;
use crate::estimators::EstimatorKind;
use crate::trainer::TrainingConfig;

pub const DEFAULT_SLA_MS: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub estimator: EstimatorKind,
    pub bid: BidCalculatorParams,
    pub competition: CompetitionParams,
    pub tie_break: TieBreakPolicy,
    /// Processing time budget of one request; observed, not enforced
    pub sla_ms: f64,
    /// Base seed of the adaptive adjustment, competitor and tie-break streams
    pub seed: u64,
    pub campaign: Campaign,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorKind::Statistical,
            bid: BidCalculatorParams::default(),
            competition: CompetitionParams::default(),
            tie_break: TieBreakPolicy::SeededRandom,
            sla_ms: DEFAULT_SLA_MS,
            seed: 4242,
            campaign: Campaign::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bid.validate()?;
        self.competition.validate()?;
        if self.sla_ms <= 0.0 || !self.sla_ms.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "sla_ms",
                reason: format!("must be a finite value > 0, got {}", self.sla_ms),
            });
        }
        Ok(())
    }
}

/// Contents of a configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub training: TrainingConfig,
}

impl AppConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.engine.validate()?;
        config.training.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }
}
