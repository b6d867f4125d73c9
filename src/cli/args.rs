//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use crate::core::config::Config;
use clap::{Parser, Subcommand};
use log::warn;
use std::path::PathBuf;

/// Walks and counts the content of portable devices connected to this PC
#[derive(Parser, Debug)]
#[command(name = "wpd-enum")]
#[command(version)]
#[command(about = "Walk and count the content tree of every connected portable device", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print diagnostic traces (object ids, properties, page sizes)
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Activate devices through the free-threaded PortableDeviceFTM class
    #[arg(long)]
    pub use_alternate_device_binding: bool,

    /// Object ids requested per page; values that are not a number are ignored
    #[arg(long, value_name = "N", global = true, allow_hyphen_values = true)]
    pub fetch_count: Option<String>,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Number of discovery-and-enumeration cycles
    #[arg(long)]
    pub passes: Option<usize>,

    /// Seconds between cycles
    #[arg(long, value_name = "SECS")]
    pub pass_interval: Option<u64>,

    /// Device list refreshes while no device is visible
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seconds to wait before each refresh
    #[arg(long, value_name = "SECS")]
    pub retry_delay: Option<u64>,

    /// Print device reports as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run discovery against a built-in simulated device scenario
    ///
    /// Works on every platform; no device needs to be connected.
    Simulate {
        /// Scenario name (see the `scenarios` command)
        scenario: String,
    },

    /// List the built-in simulated device scenarios
    Scenarios,

    /// Show current configuration
    ShowConfig,

    /// Generate a configuration file
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Parse a `--fetch-count` value
pub fn parse_fetch_count(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok()
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(raw) = &self.fetch_count {
            match parse_fetch_count(raw) {
                Some(count) => config.enumeration.fetch_count = count,
                None => warn!(
                    "Ignoring --fetch-count={:?}, keeping {}",
                    raw, config.enumeration.fetch_count
                ),
            }
        }
        if self.use_alternate_device_binding {
            config.discovery.use_alternate_binding = true;
        }
        if let Some(passes) = self.passes {
            config.discovery.passes = passes;
        }
        if let Some(secs) = self.pass_interval {
            config.discovery.pass_interval_secs = secs;
        }
        if let Some(retries) = self.retries {
            config.discovery.max_retries = retries;
        }
        if let Some(secs) = self.retry_delay {
            config.discovery.retry_delay_secs = secs;
        }
        config.logging.level = self.log_level_for(&config.logging.level);
    }

    /// Effective log level given the configured one
    ///
    /// `--log-level` replaces it; `--verbose` raises anything below trace to
    /// debug.
    pub fn log_level_for(&self, configured: &str) -> String {
        let level = self.log_level.as_deref().unwrap_or(configured);
        if self.verbose && !level.eq_ignore_ascii_case("trace") {
            "debug".to_string()
        } else {
            level.to_string()
        }
    }
}
