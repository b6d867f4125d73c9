//! Command handler implementations
//!
//! Every handler returns whether the run succeeded; `main` turns `false` into
//! a non-zero exit status.

use crate::cli::progress::{
    format_duration, print_error, print_header, print_success, print_warning, ScanSpinner,
    SpinnerVisitor,
};
use crate::cli::{Args, Commands};
use crate::core::config::{get_config_path, Config};
use crate::core::discovery::{DeviceOutcome, DeviceReport};
use crate::core::enumerator::PropertyDumper;
use crate::testdb::{self, ScenarioLibrary};
use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// Run the appropriate command based on CLI arguments
pub fn run_command(args: &Args, config: &Config, shutdown_flag: Arc<AtomicBool>) -> Result<bool> {
    let hide_spinner = args.json || log::log_enabled!(log::Level::Debug);

    match &args.command {
        None => enumerate_devices(config, args.json, hide_spinner, shutdown_flag),
        Some(Commands::Simulate { scenario }) => {
            simulate(scenario, config, args.json, hide_spinner, shutdown_flag)
        }
        Some(Commands::Scenarios) => {
            testdb::print_available_scenarios();
            Ok(true)
        }
        Some(Commands::ShowConfig) => {
            show_config(config);
            Ok(true)
        }
        Some(Commands::GenerateConfig { output }) => {
            generate_config_file(output.clone())?;
            Ok(true)
        }
    }
}

/// Enumerate every connected device through WPD
#[cfg(windows)]
pub fn enumerate_devices(
    config: &Config,
    json: bool,
    hide_spinner: bool,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<bool> {
    use crate::core::discovery::DeviceDiscovery;
    use crate::core::enumerator::ContentEnumerator;
    use crate::device::{initialize_com, WpdProvider};

    // Initialize COM library (required for WPD)
    let _com_guard = initialize_com()?;
    let provider = WpdProvider::new(config.discovery.binding())?;

    let discovery = DeviceDiscovery::new(
        &provider,
        ContentEnumerator::new(config.enumeration.fetch_count),
        config.access(),
    )
    .with_retries(config.discovery.max_retries, config.discovery.retry_delay())
    .with_shutdown_flag(shutdown_flag.clone());

    info!("Scanning for connected devices...");
    let start = Instant::now();
    let spinner = ScanSpinner::new(hide_spinner);
    let dumper = PropertyDumper::new().with_shutdown_flag(shutdown_flag);
    let mut visitor = SpinnerVisitor::new(&spinner, dumper);

    let reports = discovery.run(
        config.discovery.passes,
        config.discovery.pass_interval(),
        &mut visitor,
    );
    spinner.finish();
    let dumper = visitor.into_inner();

    print_reports(&reports, json, start)?;
    report_property_failures(dumper.property_failures(), json);
    Ok(reports.iter().all(DeviceReport::is_success))
}

/// Enumerate every connected device through WPD
#[cfg(not(windows))]
pub fn enumerate_devices(
    _config: &Config,
    _json: bool,
    _hide_spinner: bool,
    _shutdown_flag: Arc<AtomicBool>,
) -> Result<bool> {
    bail!(
        "Enumerating real devices requires Windows Portable Devices. \
         Use 'wpd-enum simulate <scenario>' to run against a simulated device."
    )
}

/// Run discovery against a built-in scenario and check its expectations
pub fn simulate(
    name: &str,
    config: &Config,
    json: bool,
    hide_spinner: bool,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<bool> {
    let Some(scenario) = ScenarioLibrary::find(name) else {
        bail!(
            "Unknown scenario '{}'. Available: {}",
            name,
            testdb::list_scenario_names().join(", ")
        );
    };

    info!("Simulating scenario '{}': {}", scenario.name, scenario.description);
    let start = Instant::now();
    let spinner = ScanSpinner::new(hide_spinner);
    // Simulated devices always have their properties read
    let dumper = PropertyDumper::new()
        .always_read_properties()
        .with_shutdown_flag(shutdown_flag.clone());
    let mut visitor = SpinnerVisitor::new(&spinner, dumper);

    let run = scenario.run(config.enumeration.fetch_count, shutdown_flag, &mut visitor);
    spinner.finish();
    let dumper = visitor.into_inner();

    print_reports(&run.reports, json, start)?;
    report_property_failures(dumper.property_failures(), json);

    match scenario.verify(&run) {
        Ok(()) => {
            if !json {
                print_success(&format!("Scenario '{}' behaved as expected", scenario.name));
            }
            Ok(true)
        }
        Err(reason) => {
            if !json {
                print_error(&format!("Scenario '{}' deviated: {}", scenario.name, reason));
            }
            Ok(false)
        }
    }
}

/// Print device reports as JSON or as a summary
fn print_reports(reports: &[DeviceReport], json: bool, start: Instant) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(reports).context("Failed to serialize reports")?
        );
        return Ok(());
    }

    print_header("ENUMERATION SUMMARY");
    if reports.is_empty() {
        print_warning("No portable devices found.");
    }
    for report in reports {
        println!("{}", summary_line(report));
    }
    println!();
    println!("  Time elapsed: {}", format_duration(start.elapsed()));
    Ok(())
}

/// Objects whose properties could not be read; the walk itself is unaffected
fn report_property_failures(failures: usize, json: bool) {
    if failures == 0 {
        return;
    }
    let msg = format!("Properties of {} object(s) could not be read", failures);
    if json {
        warn!("{}", msg);
    } else {
        print_warning(&msg);
    }
}

fn summary_line(report: &DeviceReport) -> String {
    let device = &report.device;
    match &report.outcome {
        DeviceOutcome::Enumerated(result) if result.completed => format!(
            "  ✓ [pass {}] {} ({}, {}): {} objects, depth {}",
            report.pass,
            device.friendly_name,
            device.manufacturer,
            device.description,
            result.visited_count,
            result.max_depth
        ),
        DeviceOutcome::Enumerated(result) => format!(
            "  ✗ [pass {}] {}: incomplete after {} objects: {}",
            report.pass,
            device.friendly_name,
            result.visited_count,
            result.error.as_deref().unwrap_or("unknown error")
        ),
        DeviceOutcome::OpenFailed { message } => format!(
            "  ✗ [pass {}] {}: could not open device: {}",
            report.pass, device.friendly_name, message
        ),
    }
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<PathBuf> {
    let path = match output {
        Some(path) => {
            write_config_template(&path)?;
            path
        }
        None => {
            let path = get_config_path().context("Could not determine configuration directory")?;
            if path.exists() {
                info!("Configuration file already exists: {}", path.display());
                return Ok(path);
            }
            write_config_template(&path)?;
            path
        }
    };

    info!("Configuration file: {}", path.display());
    info!("Edit this file to customize discovery and enumeration settings.");
    Ok(path)
}

fn write_config_template(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    fs::write(path, Config::generate_default_config())
        .with_context(|| format!("Failed to write config file {}", path.display()))
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    match Config::find_config_file() {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("(Using default settings - no config file found)"),
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[enumeration]");
    info!("  fetch_count = {}", config.enumeration.fetch_count);
    info!("");
    info!("[discovery]");
    info!("  max_retries = {}", config.discovery.max_retries);
    info!("  retry_delay_secs = {}", config.discovery.retry_delay_secs);
    info!("  passes = {}", config.discovery.passes);
    info!("  pass_interval_secs = {}", config.discovery.pass_interval_secs);
    info!(
        "  use_alternate_binding = {}",
        config.discovery.use_alternate_binding
    );
    info!("");
    info!("[client]");
    info!("  name = \"{}\"", config.client.name);
    info!(
        "  version = {}.{} (revision {})",
        config.client.major_version, config.client.minor_version, config.client.revision
    );
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
    info!("  log_file = \"{}\"", config.logging.log_file.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enumerator::EnumResult;
    use crate::device::traits::DeviceInfo;
    use tempfile::TempDir;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.enumeration.fetch_count = 3;
        config
    }

    #[test]
    fn test_simulate_known_scenario_succeeds() {
        let ok = simulate(
            "one_of_three_locked",
            &quiet_config(),
            true,
            true,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_simulate_tolerates_property_failures() {
        let ok = simulate(
            "property_errors",
            &quiet_config(),
            true,
            true,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_simulate_unknown_scenario_fails() {
        let err = simulate(
            "no_such_scenario",
            &quiet_config(),
            true,
            true,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown scenario"));
    }

    #[test]
    fn test_generate_config_to_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("wpd_enum.toml");

        let written = generate_config_file(Some(path.clone())).unwrap();

        assert_eq!(written, path);
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_summary_lines() {
        let device = DeviceInfo::new("dev", "Phone", "Maker", "Model");
        let complete = DeviceReport {
            pass: 1,
            device: device.clone(),
            outcome: DeviceOutcome::Enumerated(EnumResult {
                visited_count: 5,
                completed: true,
                max_depth: 2,
                error: None,
            }),
        };
        let failed = DeviceReport {
            pass: 2,
            device,
            outcome: DeviceOutcome::OpenFailed {
                message: "Access denied".to_string(),
            },
        };

        assert!(summary_line(&complete).contains("5 objects, depth 2"));
        assert!(summary_line(&failed).contains("could not open device: Access denied"));
    }
}
