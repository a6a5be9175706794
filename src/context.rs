//! Impression context: the normalized description of one impression opportunity.
//! This is what every estimator and the feature pipeline consume.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ContextError;

pub const MIN_USER_AGE: u32 = 18;
/// Exclusive upper bound
pub const MAX_USER_AGE: u32 = 65;
pub const NUM_LOCATIONS: u32 = 10;
pub const HOURS_PER_DAY: u32 = 24;

/// Numeric index or name as it may arrive in a request payload
#[doc(hidden)]
#[derive(Deserialize)]
#[serde(untagged)]
pub enum IndexOrName {
    Index(u32),
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IndexOrName", into = "u32")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Desktop, DeviceType::Mobile, DeviceType::Tablet];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: u32) -> Result<Self, ContextError> {
        Self::ALL.get(index as usize).copied().ok_or(ContextError::OutOfRange {
            field: "deviceType",
            value: index.to_string(),
            expected: "0..3",
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceType::Desktop => "Desktop",
            DeviceType::Mobile => "Mobile",
            DeviceType::Tablet => "Tablet",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<DeviceType> for u32 {
    fn from(device: DeviceType) -> u32 {
        device as u32
    }
}

impl TryFrom<IndexOrName> for DeviceType {
    type Error = ContextError;

    fn try_from(value: IndexOrName) -> Result<Self, Self::Error> {
        match value {
            IndexOrName::Index(index) => Self::from_index(index),
            IndexOrName::Name(name) => Self::ALL
                .iter()
                .copied()
                .find(|device| device.name().eq_ignore_ascii_case(&name))
                .ok_or(ContextError::UnknownVariant { field: "deviceType", value: name }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IndexOrName", into = "u32")]
pub enum AdCategory {
    Electronics,
    Fashion,
    Auto,
    Gaming,
    SaaS,
    Fitness,
    Travel,
    Food,
    Finance,
    Health,
}

impl AdCategory {
    pub const ALL: [AdCategory; 10] = [
        AdCategory::Electronics,
        AdCategory::Fashion,
        AdCategory::Auto,
        AdCategory::Gaming,
        AdCategory::SaaS,
        AdCategory::Fitness,
        AdCategory::Travel,
        AdCategory::Food,
        AdCategory::Finance,
        AdCategory::Health,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: u32) -> Result<Self, ContextError> {
        Self::ALL.get(index as usize).copied().ok_or(ContextError::OutOfRange {
            field: "adCategory",
            value: index.to_string(),
            expected: "0..10",
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AdCategory::Electronics => "Electronics",
            AdCategory::Fashion => "Fashion",
            AdCategory::Auto => "Auto",
            AdCategory::Gaming => "Gaming",
            AdCategory::SaaS => "SaaS",
            AdCategory::Fitness => "Fitness",
            AdCategory::Travel => "Travel",
            AdCategory::Food => "Food",
            AdCategory::Finance => "Finance",
            AdCategory::Health => "Health",
        }
    }
}

impl fmt::Display for AdCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<AdCategory> for u32 {
    fn from(category: AdCategory) -> u32 {
        category as u32
    }
}

impl TryFrom<IndexOrName> for AdCategory {
    type Error = ContextError;

    fn try_from(value: IndexOrName) -> Result<Self, Self::Error> {
        match value {
            IndexOrName::Index(index) => Self::from_index(index),
            IndexOrName::Name(name) => Self::ALL
                .iter()
                .copied()
                .find(|category| category.name().eq_ignore_ascii_case(&name))
                .ok_or(ContextError::UnknownVariant { field: "adCategory", value: name }),
        }
    }
}

/// Represents one impression opportunity
/// Immutable once constructed; serde input must go through `validate()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionContext {
    pub user_age: u32,
    pub device_type: DeviceType,
    pub location: u32,
    pub time_of_day: u32,
    pub ad_category: AdCategory,
    #[serde(rename = "historicalCTR")]
    pub historical_ctr: f64,
    pub frequency_count: u32,
}

impl ImpressionContext {
    /// Create a validated context
    pub fn new(
        user_age: u32,
        device_type: DeviceType,
        location: u32,
        time_of_day: u32,
        ad_category: AdCategory,
        historical_ctr: f64,
        frequency_count: u32,
    ) -> Result<Self, ContextError> {
        let context = Self {
            user_age,
            device_type,
            location,
            time_of_day,
            ad_category,
            historical_ctr,
            frequency_count,
        };
        context.validate()?;
        Ok(context)
    }

    /// Check every range documented on the data model
    pub fn validate(&self) -> Result<(), ContextError> {
        if !(MIN_USER_AGE..MAX_USER_AGE).contains(&self.user_age) {
            return Err(ContextError::OutOfRange {
                field: "userAge",
                value: self.user_age.to_string(),
                expected: "18..65",
            });
        }
        if self.location >= NUM_LOCATIONS {
            return Err(ContextError::OutOfRange {
                field: "location",
                value: self.location.to_string(),
                expected: "0..10",
            });
        }
        if self.time_of_day >= HOURS_PER_DAY {
            return Err(ContextError::OutOfRange {
                field: "timeOfDay",
                value: self.time_of_day.to_string(),
                expected: "0..24",
            });
        }
        if !(0.0..=1.0).contains(&self.historical_ctr) {
            return Err(ContextError::OutOfRange {
                field: "historicalCTR",
                value: self.historical_ctr.to_string(),
                expected: "0.0..=1.0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ImpressionContext {
        ImpressionContext::new(30, DeviceType::Mobile, 3, 14, AdCategory::Electronics, 0.08, 2).unwrap()
    }

    #[test]
    fn test_valid_context() {
        let context = sample();
        assert_eq!(context.device_type.index(), 1);
        assert_eq!(context.ad_category.index(), 0);
    }

    #[test]
    fn test_out_of_range_fields_are_named() {
        let err = ImpressionContext::new(65, DeviceType::Mobile, 3, 14, AdCategory::Food, 0.0, 0).unwrap_err();
        assert!(matches!(err, ContextError::OutOfRange { field: "userAge", .. }));

        let err = ImpressionContext::new(30, DeviceType::Mobile, 10, 14, AdCategory::Food, 0.0, 0).unwrap_err();
        assert!(matches!(err, ContextError::OutOfRange { field: "location", .. }));

        let err = ImpressionContext::new(30, DeviceType::Mobile, 3, 24, AdCategory::Food, 0.0, 0).unwrap_err();
        assert!(matches!(err, ContextError::OutOfRange { field: "timeOfDay", .. }));

        let err = ImpressionContext::new(30, DeviceType::Mobile, 3, 1, AdCategory::Food, 1.5, 0).unwrap_err();
        assert!(matches!(err, ContextError::OutOfRange { field: "historicalCTR", .. }));
    }

    #[test]
    fn test_deserialize_from_indices_and_names() {
        let json = r#"{"userAge":30,"deviceType":1,"location":3,"timeOfDay":14,"adCategory":"Electronics","historicalCTR":0.08,"frequencyCount":2}"#;
        let context: ImpressionContext = serde_json::from_str(json).unwrap();
        assert_eq!(context, sample());

        let json = r#"{"userAge":30,"deviceType":"tablet","location":3,"timeOfDay":14,"adCategory":9,"historicalCTR":0.0,"frequencyCount":0}"#;
        let context: ImpressionContext = serde_json::from_str(json).unwrap();
        assert_eq!(context.device_type, DeviceType::Tablet);
        assert_eq!(context.ad_category, AdCategory::Health);
    }

    #[test]
    fn test_deserialize_rejects_unknown_device() {
        let json = r#"{"userAge":30,"deviceType":7,"location":3,"timeOfDay":14,"adCategory":0,"historicalCTR":0.0,"frequencyCount":0}"#;
        assert!(serde_json::from_str::<ImpressionContext>(json).is_err());
    }

    #[test]
    fn test_serializes_indices() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["deviceType"], 1);
        assert_eq!(value["adCategory"], 0);
        assert_eq!(value["historicalCTR"], 0.08);
    }
}
