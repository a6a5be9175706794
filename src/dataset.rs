use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::errors::ConfigError;
use crate::estimators::{EstimatorTrait, StatisticalEstimator};
use crate::features;
use crate::impressions::{ContextGenerator, ImpressionsParam};
use crate::sigmoid::logistic;
use crate::utils::get_seed;

/// Estimated CTR at which a click is a coin flip
pub const CLICK_PIVOT: f64 = 0.05;
/// Estimated CVR at which a conversion is a coin flip
pub const CONVERSION_PIVOT: f64 = 0.022;
/// Slope of the label log-odds in ln(estimate / pivot)
pub const LABEL_SHARPNESS: f64 = 4.0;
/// Standard deviation of the log-odds noise
pub const LABEL_NOISE_STDDEV: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub features: Vec<f64>,
    /// 0.0 or 1.0
    pub label: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LabeledSplit {
    pub train: Vec<TrainingSample>,
    pub validation: Vec<TrainingSample>,
}

impl LabeledSplit {
    pub fn positive_rate(samples: &[TrainingSample]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|s| s.label).sum::<f64>() / samples.len() as f64
    }
}

/// Click and conversion labels over the same contexts and the same split
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub feature_names: Vec<String>,
    pub ctr: LabeledSplit,
    pub cvr: LabeledSplit,
}

/// (train, validation) sizes; train gets round(num_samples * split)
pub fn split_sizes(num_samples: usize, split: f64) -> Result<(usize, usize), ConfigError> {
    let train = ((num_samples as f64 * split).round() as usize).min(num_samples);
    let validation = num_samples.saturating_sub(train);
    if train == 0 {
        return Err(ConfigError::EmptyTrainingSet { num_samples, split });
    }
    if validation == 0 {
        return Err(ConfigError::EmptyValidationSet { num_samples, split });
    }
    Ok((train, validation))
}

/// Draw a binary label whose log-odds grow with ln(estimate / pivot)
fn draw_label(estimate: f64, pivot: f64, noise: &Normal<f64>, rng: &mut StdRng) -> f64 {
    let log_odds = LABEL_SHARPNESS * (estimate.max(1e-6) / pivot).ln() + noise.sample(rng);
    if rng.gen::<f64>() < logistic(log_odds) {
        1.0
    } else {
        0.0
    }
}

/// Generate `num_samples` labeled samples and split them with a seeded shuffle
pub fn generate(num_samples: usize, split: f64, seed: u64) -> Result<SyntheticDataset, ConfigError> {
    let (train_size, _) = split_sizes(num_samples, split)?;

    let mut contexts = ContextGenerator::new(&ImpressionsParam::default(), seed)?;
    let mut rng_labels = StdRng::seed_from_u64(get_seed(seed.wrapping_add(1)));
    let mut rng_split = StdRng::seed_from_u64(get_seed(seed.wrapping_add(2)));
    let noise = Normal::new(0.0, LABEL_NOISE_STDDEV).map_err(|e| ConfigError::InvalidParameter {
        name: "label_noise",
        reason: e.to_string(),
    })?;
    let estimator = StatisticalEstimator;

    let mut ctr_samples = Vec::with_capacity(num_samples);
    let mut cvr_samples = Vec::with_capacity(num_samples);
    for _ in 0..num_samples {
        let context = contexts.next_context();
        let estimate = estimator.estimate(&context);
        let encoded = features::encode(&context);
        let click = draw_label(estimate.ctr, CLICK_PIVOT, &noise, &mut rng_labels);
        let conversion = draw_label(estimate.cvr, CONVERSION_PIVOT, &noise, &mut rng_labels);
        ctr_samples.push(TrainingSample { features: encoded.clone(), label: click });
        cvr_samples.push(TrainingSample { features: encoded, label: conversion });
    }

    let mut order: Vec<usize> = (0..num_samples).collect();
    order.shuffle(&mut rng_split);

    let split_by_order = |samples: Vec<TrainingSample>| -> LabeledSplit {
        let mut slots: Vec<Option<TrainingSample>> = samples.into_iter().map(Some).collect();
        let mut ordered = order.iter().filter_map(|&i| slots[i].take());
        let train: Vec<TrainingSample> = ordered.by_ref().take(train_size).collect();
        let validation: Vec<TrainingSample> = ordered.collect();
        LabeledSplit { train, validation }
    };

    Ok(SyntheticDataset {
        feature_names: features::feature_names(),
        ctr: split_by_order(ctr_samples),
        cvr: split_by_order(cvr_samples),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes() {
        assert_eq!(split_sizes(500, 0.5).unwrap(), (250, 250));
        assert_eq!(split_sizes(10, 0.75).unwrap(), (8, 2));
        assert_eq!(
            split_sizes(1, 0.3).unwrap_err(),
            ConfigError::EmptyTrainingSet { num_samples: 1, split: 0.3 }
        );
        assert_eq!(
            split_sizes(2, 0.8).unwrap_err(),
            ConfigError::EmptyValidationSet { num_samples: 2, split: 0.8 }
        );
        assert_eq!(
            split_sizes(1000, 0.9999).unwrap_err(),
            ConfigError::EmptyValidationSet { num_samples: 1000, split: 0.9999 }
        );
    }

    #[test]
    fn test_generate_respects_split_and_width() {
        let dataset = generate(200, 0.8, 42).unwrap();
        assert_eq!(dataset.ctr.train.len(), 160);
        assert_eq!(dataset.ctr.validation.len(), 40);
        assert_eq!(dataset.cvr.train.len(), 160);
        assert_eq!(dataset.feature_names.len(), features::NUM_FEATURES);
        assert!(dataset.ctr.train.iter().all(|s| s.features.len() == features::NUM_FEATURES));
        assert!(dataset.ctr.train.iter().all(|s| s.label == 0.0 || s.label == 1.0));
    }

    #[test]
    fn test_ctr_and_cvr_share_contexts() {
        let dataset = generate(50, 0.5, 1).unwrap();
        for (a, b) in dataset.ctr.validation.iter().zip(dataset.cvr.validation.iter()) {
            assert_eq!(a.features, b.features);
        }
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate(100, 0.5, 9).unwrap();
        let b = generate(100, 0.5, 9).unwrap();
        assert_eq!(a.ctr.train, b.ctr.train);
        assert_eq!(a.cvr.validation, b.cvr.validation);
    }

    #[test]
    fn test_labels_are_not_degenerate() {
        let dataset = generate(4000, 0.5, 3).unwrap();
        let click_rate = LabeledSplit::positive_rate(&dataset.ctr.train);
        let conversion_rate = LabeledSplit::positive_rate(&dataset.cvr.train);
        assert!(click_rate > 0.1 && click_rate < 0.9, "click rate {}", click_rate);
        assert!(conversion_rate > 0.1 && conversion_rate < 0.9, "conversion rate {}", conversion_rate);
    }
}
