use serde::{Deserialize, Serialize};

use crate::context::ImpressionContext;
use crate::errors::ConfigError;
use crate::factor_tables;
use crate::features;
use crate::linear_model::LinearModel;

/// Share of the calculated CTR when the context carries a historical CTR
pub const CALCULATED_CTR_WEIGHT: f64 = 0.7;

/// Weights of CTR and CVR in the performance score
pub const CTR_SCORE_WEIGHT: f64 = 0.6;
pub const CVR_SCORE_WEIGHT: f64 = 0.4;

/// Predicted engagement for one impression
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EstimateResult {
    pub ctr: f64,
    pub cvr: f64,
}

impl EstimateResult {
    /// ctr * 0.6 + cvr * 0.4
    pub fn performance_score(&self) -> f64 {
        self.ctr * CTR_SCORE_WEIGHT + self.cvr * CVR_SCORE_WEIGHT
    }
}

/// Row of a batch estimation response
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEstimate {
    pub ctr: f64,
    pub cvr: f64,
    pub performance_score: f64,
}

/// Trait for CTR/CVR estimators
/// Implementations must be pure: the same context always yields the same estimate
pub trait EstimatorTrait: Send + Sync {
    /// Probability of a click, in [0, 1]
    fn estimate_ctr(&self, context: &ImpressionContext) -> f64;

    /// Probability of a conversion, in [0, 1]
    fn estimate_cvr(&self, context: &ImpressionContext) -> f64;

    /// Get a string representation of the estimator
    fn estimator_name(&self) -> String;

    fn estimate(&self, context: &ImpressionContext) -> EstimateResult {
        EstimateResult {
            ctr: self.estimate_ctr(context),
            cvr: self.estimate_cvr(context),
        }
    }
}

/// Estimate every context with the same estimator, preserving order
pub fn estimate_batch(estimator: &dyn EstimatorTrait, contexts: &[ImpressionContext]) -> Vec<BatchEstimate> {
    contexts
        .iter()
        .map(|context| {
            let estimate = estimator.estimate(context);
            BatchEstimate {
                ctr: estimate.ctr,
                cvr: estimate.cvr,
                performance_score: estimate.performance_score(),
            }
        })
        .collect()
}

/// Rule-based estimator built from multiplicative lookup factors
pub struct StatisticalEstimator;

impl StatisticalEstimator {
    pub fn new() -> Box<Self> {
        Box::new(Self)
    }

    /// CTR from the factor tables alone, before blending and clamping
    pub fn calculated_ctr(context: &ImpressionContext) -> f64 {
        factor_tables::base_ctr(context.device_type)
            * factor_tables::category_ctr_factor(context.ad_category)
            * factor_tables::time_factor(context.time_of_day)
            * factor_tables::frequency_decay(context.frequency_count)
            * factor_tables::age_factor(context.user_age).ctr
            * factor_tables::geo_factor(context.location)
    }

    /// CVR from the factor tables; conversions do not depend on hour of day
    pub fn calculated_cvr(context: &ImpressionContext) -> f64 {
        factor_tables::base_cvr(context.device_type)
            * factor_tables::category_cvr_factor(context.ad_category)
            * factor_tables::frequency_decay(context.frequency_count)
            * factor_tables::age_factor(context.user_age).cvr
            * factor_tables::geo_factor(context.location)
    }
}

impl EstimatorTrait for StatisticalEstimator {
    fn estimate_ctr(&self, context: &ImpressionContext) -> f64 {
        let calculated = Self::calculated_ctr(context);
        let blended = if context.historical_ctr > 0.0 {
            CALCULATED_CTR_WEIGHT * calculated + (1.0 - CALCULATED_CTR_WEIGHT) * context.historical_ctr
        } else {
            calculated
        };
        blended.clamp(0.0, 1.0)
    }

    fn estimate_cvr(&self, context: &ImpressionContext) -> f64 {
        Self::calculated_cvr(context).clamp(0.0, 1.0)
    }

    fn estimator_name(&self) -> String {
        "Statistical".to_string()
    }
}

/// Estimator backed by a pair of trained logistic models
pub struct LearnedEstimator {
    pub ctr_model: LinearModel,
    pub cvr_model: LinearModel,
}

impl LearnedEstimator {
    /// Both models must be defined over the feature pipeline's layout
    pub fn new(ctr_model: LinearModel, cvr_model: LinearModel) -> Result<Box<Self>, ConfigError> {
        for (name, model) in [("ctr_model", &ctr_model), ("cvr_model", &cvr_model)] {
            if model.num_features() != features::NUM_FEATURES {
                return Err(ConfigError::InvalidParameter {
                    name: "learned_estimator",
                    reason: format!(
                        "{} has {} weights, feature pipeline produces {}",
                        name,
                        model.num_features(),
                        features::NUM_FEATURES
                    ),
                });
            }
        }
        Ok(Box::new(Self { ctr_model, cvr_model }))
    }
}

impl EstimatorTrait for LearnedEstimator {
    fn estimate_ctr(&self, context: &ImpressionContext) -> f64 {
        self.ctr_model.predict_proba(&features::encode(context)).clamp(0.0, 1.0)
    }

    fn estimate_cvr(&self, context: &ImpressionContext) -> f64 {
        self.cvr_model.predict_proba(&features::encode(context)).clamp(0.0, 1.0)
    }

    fn estimator_name(&self) -> String {
        "Learned".to_string()
    }

    fn estimate(&self, context: &ImpressionContext) -> EstimateResult {
        let encoded = features::encode(context);
        EstimateResult {
            ctr: self.ctr_model.predict_proba(&encoded).clamp(0.0, 1.0),
            cvr: self.cvr_model.predict_proba(&encoded).clamp(0.0, 1.0),
        }
    }
}

/// Which estimator the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Statistical,
    Learned,
}

/// Build the configured estimator
/// The learned estimator needs trained (ctr, cvr) models
pub fn build_estimator(
    kind: EstimatorKind,
    models: Option<(LinearModel, LinearModel)>,
) -> Result<Box<dyn EstimatorTrait>, ConfigError> {
    match kind {
        EstimatorKind::Statistical => Ok(StatisticalEstimator::new()),
        EstimatorKind::Learned => match models {
            Some((ctr_model, cvr_model)) => Ok(LearnedEstimator::new(ctr_model, cvr_model)?),
            None => Err(ConfigError::InvalidParameter {
                name: "estimator",
                reason: "learned estimator selected but no trained models were provided".to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AdCategory, DeviceType};

    fn sample() -> ImpressionContext {
        ImpressionContext::new(30, DeviceType::Mobile, 3, 14, AdCategory::Electronics, 0.08, 2).unwrap()
    }

    #[test]
    fn test_statistical_sample_values() {
        let estimator = StatisticalEstimator::new();
        let context = sample();
        // 0.038 * 1.375 * 1.15 * 0.9 * 1.10 * 1.15
        let calculated = StatisticalEstimator::calculated_ctr(&context);
        assert!((calculated - 0.06842).abs() < 1e-4, "calculated {}", calculated);
        let ctr = estimator.estimate_ctr(&context);
        assert!((ctr - (0.7 * calculated + 0.3 * 0.08)).abs() < 1e-12);
        // 0.015 * 1.25 * 0.9 * 1.20 * 1.15
        assert!((estimator.estimate_cvr(&context) - 0.02329).abs() < 1e-4);
    }

    #[test]
    fn test_no_history_uses_calculated_ctr() {
        let mut context = sample();
        context.historical_ctr = 0.0;
        let estimator = StatisticalEstimator::new();
        assert_eq!(estimator.estimate_ctr(&context), StatisticalEstimator::calculated_ctr(&context));
    }

    #[test]
    fn test_estimates_within_unit_interval_for_all_contexts() {
        let estimator = StatisticalEstimator::new();
        for device in DeviceType::ALL {
            for category in AdCategory::ALL {
                for hour in [0, 7, 12, 19, 23] {
                    for age in [18, 30, 50, 64] {
                        for frequency in [0, 3, 20] {
                            let context = ImpressionContext::new(age, device, 5, hour, category, 1.0, frequency).unwrap();
                            let estimate = estimator.estimate(&context);
                            assert!((0.0..=1.0).contains(&estimate.ctr));
                            assert!((0.0..=1.0).contains(&estimate.cvr));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_frequency_lowers_ctr() {
        let estimator = StatisticalEstimator::new();
        let mut fresh = sample();
        fresh.frequency_count = 0;
        let mut fatigued = sample();
        fatigued.frequency_count = 12;
        assert!(estimator.estimate_ctr(&fresh) > estimator.estimate_ctr(&fatigued));
    }

    #[test]
    fn test_performance_score() {
        let estimate = EstimateResult { ctr: 0.1, cvr: 0.05 };
        assert!((estimate.performance_score() - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_batch_preserves_order() {
        let estimator = StatisticalEstimator::new();
        let mut other = sample();
        other.device_type = DeviceType::Desktop;
        let rows = estimate_batch(estimator.as_ref(), &[sample(), other.clone()]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].ctr, estimator.estimate_ctr(&other));
        assert!((rows[0].performance_score - estimator.estimate(&sample()).performance_score()).abs() < 1e-15);
    }

    #[test]
    fn test_learned_estimator_with_zero_models_predicts_half() {
        let names = features::feature_names();
        let estimator = LearnedEstimator::new(LinearModel::zeros(names.clone()), LinearModel::zeros(names)).unwrap();
        let estimate = estimator.estimate(&sample());
        assert_eq!(estimate.ctr, 0.5);
        assert_eq!(estimate.cvr, 0.5);
    }

    #[test]
    fn test_learned_estimator_rejects_wrong_width() {
        let short = LinearModel::zeros(vec!["a".to_string()]);
        assert!(LearnedEstimator::new(short.clone(), short).is_err());
    }

    #[test]
    fn test_build_estimator_requires_models_for_learned() {
        assert!(build_estimator(EstimatorKind::Learned, None).is_err());
        let estimator = build_estimator(EstimatorKind::Statistical, None).unwrap();
        assert_eq!(estimator.estimator_name(), "Statistical");
    }
}
