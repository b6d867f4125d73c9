//! Core functionality module
//!
//! This module contains the enumeration logic: paged child listing, the
//! depth-first tree walk and the device discovery loop, plus configuration
//! and error handling.
//!
//! # Submodules
//!
//! - `config` - Configuration loading, saving, and management
//! - `discovery` - Device polling and enumeration passes
//! - `enumerator` - Depth-first walk of a device's object tree
//! - `error` - Error types and result aliases
//! - `fetcher` - Paged child listing cursors

pub mod config;
pub mod discovery;
pub mod enumerator;
pub mod error;
pub mod fetcher;
