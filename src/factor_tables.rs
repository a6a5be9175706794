//! Static lookup curves used by the statistical estimator.
//! Baselines are per-impression rates; everything else is a multiplier around 1.0.

use crate::context::{AdCategory, DeviceType};

/// Category baselines are divided by these to turn them into multipliers
pub const CATEGORY_CTR_NORMALIZER: f64 = 0.04;
pub const CATEGORY_CVR_NORMALIZER: f64 = 0.02;

/// Base CTR per device: Desktop, Mobile, Tablet
const DEVICE_CTR: [f64; 3] = [0.052, 0.038, 0.045];
/// Base CVR per device: Desktop, Mobile, Tablet
const DEVICE_CVR: [f64; 3] = [0.028, 0.015, 0.022];

/// Category CTR baselines in AdCategory order
const CATEGORY_CTR: [f64; 10] = [0.055, 0.048, 0.032, 0.072, 0.041, 0.062, 0.058, 0.068, 0.029, 0.044];
/// Category CVR baselines in AdCategory order
const CATEGORY_CVR: [f64; 10] = [0.025, 0.032, 0.018, 0.042, 0.035, 0.028, 0.022, 0.038, 0.015, 0.020];

/// Engagement by hour of day: late night 22-05, morning peak 09-11, lunch 12-14, evening 18-21
const TIME_OF_DAY: [f64; 24] = [
    0.65, 0.65, 0.65, 0.65, 0.65, 0.65, // 00-05
    1.00, 1.00, 1.00, 1.25, 1.25, 1.25, // 06-11
    1.15, 1.15, 1.15, 1.00, 1.00, 1.00, // 12-17
    1.30, 1.30, 1.30, 1.30, 0.65, 0.65, // 18-23
];

/// Ad fatigue indexed by how often the user has already seen the ad
const FREQUENCY_DECAY: [f64; 11] = [1.00, 0.90, 0.90, 0.70, 0.70, 0.70, 0.45, 0.45, 0.45, 0.45, 0.45];
/// Applies beyond the end of FREQUENCY_DECAY
const FREQUENCY_DECAY_TAIL: f64 = 0.20;

/// Geo cluster multipliers indexed by location
const GEO: [f64; 10] = [1.10, 1.05, 0.95, 1.15, 0.90, 1.20, 0.85, 1.00, 1.08, 0.92];

/// Multipliers for one age bracket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeFactor {
    pub ctr: f64,
    pub cvr: f64,
}

/// (inclusive upper age, factor); the last entry covers everyone older
const AGE_BRACKETS: [(u32, AgeFactor); 5] = [
    (24, AgeFactor { ctr: 1.15, cvr: 0.85 }),
    (34, AgeFactor { ctr: 1.10, cvr: 1.20 }),
    (44, AgeFactor { ctr: 1.00, cvr: 1.15 }),
    (54, AgeFactor { ctr: 0.90, cvr: 1.05 }),
    (u32::MAX, AgeFactor { ctr: 0.80, cvr: 0.95 }),
];

pub fn base_ctr(device: DeviceType) -> f64 {
    DEVICE_CTR[device.index()]
}

pub fn base_cvr(device: DeviceType) -> f64 {
    DEVICE_CVR[device.index()]
}

pub fn category_ctr_factor(category: AdCategory) -> f64 {
    CATEGORY_CTR[category.index()] / CATEGORY_CTR_NORMALIZER
}

pub fn category_cvr_factor(category: AdCategory) -> f64 {
    CATEGORY_CVR[category.index()] / CATEGORY_CVR_NORMALIZER
}

/// Hours outside 0..24 wrap around
pub fn time_factor(hour: u32) -> f64 {
    TIME_OF_DAY[(hour % 24) as usize]
}

pub fn frequency_decay(frequency_count: u32) -> f64 {
    FREQUENCY_DECAY
        .get(frequency_count as usize)
        .copied()
        .unwrap_or(FREQUENCY_DECAY_TAIL)
}

pub fn age_factor(age: u32) -> AgeFactor {
    AGE_BRACKETS
        .iter()
        .find(|(upper, _)| age <= *upper)
        .map(|(_, factor)| *factor)
        .unwrap_or(AGE_BRACKETS[AGE_BRACKETS.len() - 1].1)
}

/// Unknown locations are neutral
pub fn geo_factor(location: u32) -> f64 {
    GEO.get(location as usize).copied().unwrap_or(1.0)
}

/// Named curve for reporting: (label, value) pairs
pub fn time_of_day_curve() -> Vec<(u32, f64)> {
    TIME_OF_DAY.iter().enumerate().map(|(hour, factor)| (hour as u32, *factor)).collect()
}

/// Frequency curve for reporting, including the first tail point
pub fn frequency_decay_curve() -> Vec<(u32, f64)> {
    (0..=FREQUENCY_DECAY.len() as u32)
        .map(|count| (count, frequency_decay(count)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_decay_is_monotone() {
        let curve = frequency_decay_curve();
        for pair in curve.windows(2) {
            assert!(pair[1].1 <= pair[0].1, "decay increased at {}", pair[1].0);
        }
        assert_eq!(frequency_decay(0), 1.0);
        assert_eq!(frequency_decay(1000), FREQUENCY_DECAY_TAIL);
    }

    #[test]
    fn test_time_of_day_peaks_during_day() {
        let night = time_factor(3);
        let evening = time_factor(19);
        assert!(evening > 1.0 && night < 1.0);
        let (peak_hour, _) = time_of_day_curve()
            .into_iter()
            .fold((0, f64::MIN), |best, point| if point.1 > best.1 { point } else { best });
        assert!((8..=21).contains(&peak_hour));
    }

    #[test]
    fn test_time_of_day_bands() {
        for (hours, expected) in [(0..=5, 0.65), (9..=11, 1.25), (12..=14, 1.15), (18..=21, 1.30), (22..=23, 0.65)] {
            for hour in hours {
                assert_eq!(time_factor(hour), expected, "hour {}", hour);
            }
        }
        for hour in [6, 7, 8, 15, 16, 17] {
            assert_eq!(time_factor(hour), 1.0, "hour {}", hour);
        }
    }

    #[test]
    fn test_age_brackets() {
        assert_eq!(age_factor(18).ctr, 1.15);
        assert_eq!(age_factor(24).ctr, 1.15);
        assert_eq!(age_factor(25).cvr, 1.20);
        assert_eq!(age_factor(54).ctr, 0.90);
        assert_eq!(age_factor(64).ctr, 0.80);
    }

    #[test]
    fn test_category_factors_are_normalized() {
        assert!((category_ctr_factor(AdCategory::Electronics) - 1.375).abs() < 1e-12);
        assert!((category_cvr_factor(AdCategory::Electronics) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_geo_factor_unknown_location_is_neutral() {
        assert_eq!(geo_factor(3), 1.15);
        assert_eq!(geo_factor(42), 1.0);
    }
}
