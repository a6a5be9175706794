use serde::{Deserialize, Serialize};

use crate::sigmoid::logistic;

/// Logistic model: P(y=1 | x) = logistic(w·x + b)
/// `feature_names` is parallel to `weights`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub feature_names: Vec<String>,
}

impl LinearModel {
    /// Zero-initialized model over the given features
    pub fn zeros(feature_names: Vec<String>) -> Self {
        Self {
            weights: vec![0.0; feature_names.len()],
            bias: 0.0,
            feature_names,
        }
    }

    pub fn num_features(&self) -> usize {
        self.weights.len()
    }

    /// w·x + b
    /// Features beyond the weight vector are ignored
    pub fn linear(&self, features: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(features.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias
    }

    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        logistic(self.linear(features))
    }

    /// True when every weight and the bias are finite
    pub fn is_finite(&self) -> bool {
        self.bias.is_finite() && self.weights.iter().all(|w| w.is_finite())
    }

    /// Features ranked by absolute weight, strongest first
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked
    }
}
