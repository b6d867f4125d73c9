//! Device interaction module
//!
//! # Submodules
//!
//! - `traits` - Provider, session and cursor abstractions
//! - `wpd` - Windows Portable Devices implementation (Windows only)
//!
//! # Architecture
//!
//! The enumeration core only sees the traits:
//!
//! - `DeviceProvider` - Lists, refreshes and opens devices
//! - `ContentSession` - An open device: child listings and properties
//! - `ChildCursor` - One child listing, read in pages
//!
//! Both the real WPD implementation and the mock devices in `testdb`
//! implement these traits.

pub mod traits;
#[cfg(windows)]
pub mod wpd;

pub use traits::{
    AccessConfig, ChildCursor, ClientInfo, ContentSession, DeviceBinding, DeviceInfo,
    DeviceProvider, ObjectId, ObjectProperties, Page,
};

#[cfg(windows)]
pub use wpd::{initialize_com, ComGuard, WpdProvider};
