//! Test Database Module
//!
//! Deterministic in-memory devices for exercising discovery and enumeration
//! without a real device attached.
//!
//! # Features
//!
//! - **Mock Devices**: A [`DeviceProvider`](crate::device::DeviceProvider)
//!   over in-memory object trees, with injectable failures and call counters
//! - **Generators**: Regular trees of known size for completeness checks
//! - **Test Scenarios**: Named scenarios with expected device reports
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use wpd_content_enum::core::enumerator::PropertyDumper;
//! use wpd_content_enum::testdb::ScenarioLibrary;
//!
//! let scenario = ScenarioLibrary::find("one_of_three_locked").unwrap();
//! let mut dumper = PropertyDumper::new();
//! let run = scenario.run(10, Arc::new(AtomicBool::new(false)), &mut dumper);
//! assert!(scenario.verify(&run).is_ok());
//! ```

pub mod generator;
pub mod mock_device;
pub mod scenarios;

pub use mock_device::{
    MockDeviceConfig, MockDeviceManager, MockFileSystem, MockObject, MockProviderStats,
};
pub use scenarios::{ExpectedReport, ScenarioLibrary, ScenarioRun, TestScenario};

/// Get a list of all available scenario names
pub fn list_scenario_names() -> Vec<String> {
    ScenarioLibrary::all_scenarios()
        .into_iter()
        .map(|s| s.name)
        .collect()
}

/// Print available scenarios to console, grouped by their first tag
pub fn print_available_scenarios() {
    println!("\nAvailable scenarios\n===================\n");

    let scenarios = ScenarioLibrary::all_scenarios();

    let mut by_category: std::collections::BTreeMap<String, Vec<&TestScenario>> =
        std::collections::BTreeMap::new();

    for scenario in &scenarios {
        let category = scenario
            .tags
            .first()
            .cloned()
            .unwrap_or_else(|| "other".to_string());
        by_category.entry(category).or_default().push(scenario);
    }

    for (category, scenarios) in &by_category {
        println!("{}", category.to_uppercase());
        for scenario in scenarios {
            println!("   - {} - {}", scenario.name, scenario.description);
        }
        println!();
    }

    println!("Total: {} scenarios available\n", scenarios.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_scenario_names() {
        let names = list_scenario_names();
        assert!(names.contains(&"example_tree".to_string()));
        assert!(names.contains(&"no_devices".to_string()));
    }
}
