use std::error::Error;
use rtb_dsp::logger::Logger;

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

// Create an inventory collection for scenario entries
inventory::collect!(ScenarioEntry);

/// Get all registered scenarios from the catalog, sorted by name
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut catalog: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>
        .into_iter()
        .cloned()
        .collect();
    catalog.sort_by_key(|entry| entry.short_name);
    catalog
}

/// Record one validation check: logs ✓ or ✗ and keeps the message of failed checks
pub fn check(logger: &mut Logger, errors: &mut Vec<String>, passed: bool, msg: String) {
    if passed {
        rtb_dsp::logln!(logger, rtb_dsp::logger::LogEvent::Scenario, "✓ {}", msg);
    } else {
        rtb_dsp::errln!(logger, rtb_dsp::logger::LogEvent::Scenario, "✗ {}", msg);
        errors.push(msg);
    }
}

/// Turn collected validation failures into the scenario result
pub fn finish(scenario_name: &str, errors: Vec<String>) -> Result<(), Box<dyn Error>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, errors.join("\n")).into())
    }
}

// Scenario modules
pub mod single_bid;
pub mod budget_exhaustion;
pub mod bidding_strategies;
pub mod auction_mechanics;
pub mod model_training;
pub mod estimator_comparison;
pub mod concurrent_budget;
