use std::error::Error;

use crate::logger::Logger;
use crate::pipeline::ScenarioInput;

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, input: &ScenarioInput, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub description: &'static str,
    pub run: ScenarioFn,
}

inventory::collect!(ScenarioEntry);

/// All registered scenarios, sorted by name so runs are reproducible
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut catalog: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>.into_iter().cloned().collect();
    catalog.sort_by_key(|entry| entry.short_name);
    catalog
}

pub fn find_scenario(short_name: &str) -> Option<ScenarioEntry> {
    get_scenario_catalog().into_iter().find(|entry| entry.short_name == short_name)
}

pub mod cost_differential;
pub mod likelihood_family;
pub mod order_size;
pub mod segmented;
pub mod single_price;
