//! Feature pipeline: turns an ImpressionContext into the fixed-length numeric vector
//! consumed by the logistic models.
//!
//! Layout (names come from `feature_names()` and stay parallel to model weights):
//! - device one-hot (3)
//! - category one-hot (10)
//! - hour scaled to [0,1] and a peak-hour flag
//! - frequency scaled to [0,1] (capped)
//! - age scaled to [0,1]
//! - location one-hot (10)
//! - historical CTR

use crate::context::{AdCategory, DeviceType, ImpressionContext, MAX_USER_AGE, MIN_USER_AGE, NUM_LOCATIONS};

/// Frequency counts above this are treated as saturated
pub const FREQUENCY_CAP: u32 = 15;

/// Hours counted as peak engagement
const PEAK_HOURS: [u32; 10] = [9, 10, 11, 12, 13, 14, 18, 19, 20, 21];

pub const NUM_FEATURES: usize = DeviceType::ALL.len() + AdCategory::ALL.len() + 2 + 1 + 1 + NUM_LOCATIONS as usize + 1;

/// Names of every feature in encoding order
pub fn feature_names() -> Vec<String> {
    let mut names = Vec::with_capacity(NUM_FEATURES);
    for device in DeviceType::ALL {
        names.push(format!("device_{}", device.name().to_lowercase()));
    }
    for category in AdCategory::ALL {
        names.push(format!("category_{}", category.name().to_lowercase()));
    }
    names.push("hour_scaled".to_string());
    names.push("is_peak_hour".to_string());
    names.push("frequency_scaled".to_string());
    names.push("age_scaled".to_string());
    for location in 0..NUM_LOCATIONS {
        names.push(format!("geo_{}", location));
    }
    names.push("historical_ctr".to_string());
    names
}

pub fn is_peak_hour(hour: u32) -> bool {
    PEAK_HOURS.contains(&hour)
}

/// Encode a context into a feature vector of length NUM_FEATURES
pub fn encode(context: &ImpressionContext) -> Vec<f64> {
    let mut features = vec![0.0; NUM_FEATURES];
    let mut offset = 0;

    features[offset + context.device_type.index()] = 1.0;
    offset += DeviceType::ALL.len();

    features[offset + context.ad_category.index()] = 1.0;
    offset += AdCategory::ALL.len();

    features[offset] = context.time_of_day.min(23) as f64 / 23.0;
    features[offset + 1] = if is_peak_hour(context.time_of_day) { 1.0 } else { 0.0 };
    offset += 2;

    features[offset] = context.frequency_count.min(FREQUENCY_CAP) as f64 / FREQUENCY_CAP as f64;
    offset += 1;

    let age_span = (MAX_USER_AGE - 1 - MIN_USER_AGE) as f64;
    features[offset] = (context.user_age.clamp(MIN_USER_AGE, MAX_USER_AGE - 1) - MIN_USER_AGE) as f64 / age_span;
    offset += 1;

    if context.location < NUM_LOCATIONS {
        features[offset + context.location as usize] = 1.0;
    }
    offset += NUM_LOCATIONS as usize;

    features[offset] = context.historical_ctr.clamp(0.0, 1.0);

    features
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ImpressionContext {
        ImpressionContext::new(30, DeviceType::Mobile, 3, 14, AdCategory::Electronics, 0.08, 2).unwrap()
    }

    #[test]
    fn test_names_parallel_to_features() {
        assert_eq!(feature_names().len(), NUM_FEATURES);
        assert_eq!(encode(&context()).len(), NUM_FEATURES);
        assert_eq!(NUM_FEATURES, 28);
    }

    #[test]
    fn test_one_hot_groups_have_single_hot() {
        let features = encode(&context());
        let names = feature_names();
        let hot: Vec<&str> = names
            .iter()
            .zip(features.iter())
            .filter(|(name, value)| **value == 1.0 && !name.starts_with("is_"))
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(hot, vec!["device_mobile", "category_electronics", "geo_3"]);
    }

    #[test]
    fn test_scaled_features_in_unit_interval() {
        let old_heavy_user = ImpressionContext::new(64, DeviceType::Desktop, 9, 23, AdCategory::Health, 1.0, 500).unwrap();
        for value in encode(&old_heavy_user) {
            assert!((0.0..=1.0).contains(&value));
        }
        let features = encode(&old_heavy_user);
        let names = feature_names();
        let frequency_index = names.iter().position(|n| n == "frequency_scaled").unwrap();
        assert_eq!(features[frequency_index], 1.0);
    }

    #[test]
    fn test_peak_hour_flag() {
        assert!(is_peak_hour(14));
        assert!(!is_peak_hour(3));
    }
}
