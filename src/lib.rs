//! Portable Device Content Enumerator Library
//!
//! Discovers portable devices exposed through Windows Portable Devices (WPD),
//! opens each one read-only and walks its whole object tree, counting every
//! object exactly once.
//!
//! # Architecture
//!
//! - [`core`] - Paged child listing, the depth-first walk, the discovery
//!   loop, configuration and error handling
//! - [`device`] - Provider abstraction and the WPD implementation
//! - [`cli`] - Command-line interface (only used by the binary)
//! - [`testdb`] - Mock devices and scenarios for testing without hardware
//!
//! # Example Usage
//!
//! ```rust,no_run
//! # #[cfg(windows)]
//! # fn main() -> anyhow::Result<()> {
//! use wpd_content_enum::core::config::Config;
//! use wpd_content_enum::core::discovery::DeviceDiscovery;
//! use wpd_content_enum::core::enumerator::{ContentEnumerator, PropertyDumper};
//! use wpd_content_enum::device::{initialize_com, WpdProvider};
//! use std::time::Duration;
//!
//! let _com_guard = initialize_com()?;
//! let config = Config::load_default()?;
//!
//! let provider = WpdProvider::new(config.discovery.binding())?;
//! let discovery = DeviceDiscovery::new(
//!     &provider,
//!     ContentEnumerator::new(config.enumeration.fetch_count),
//!     config.access(),
//! );
//!
//! let mut dumper = PropertyDumper::new();
//! for report in discovery.run(1, Duration::ZERO, &mut dumper) {
//!     println!("{}: {:?}", report.device.friendly_name, report.visited_count());
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! # Platform Support
//!
//! The real provider needs Windows. Everything else, including the simulated
//! scenarios in [`testdb`], builds and runs on any platform.

pub mod cli;
pub mod core;
pub mod device;
pub mod testdb;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
