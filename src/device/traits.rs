//! Device abstraction traits for testability
//!
//! This module defines the capability set of a device content provider, so the
//! real Windows Portable Devices adapter and the in-memory mock devices in
//! [`crate::testdb`] can be driven by the same enumeration code.
//!
//! # Architecture
//!
//! The trait hierarchy is:
//! - `DeviceProvider` - Discovers devices, reads display metadata, opens sessions
//! - `ContentSession` - An open device: content root, child listing, properties
//! - `ChildCursor` - One child listing, read in bounded pages
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use wpd_content_enum::device::traits::{AccessConfig, ContentSession, DeviceProvider};
//!
//! fn count_root_children<P: DeviceProvider>(provider: &P) -> Result<usize, String> {
//!     let ids = provider.device_ids().map_err(|e| e.to_string())?;
//!     let Some(device_id) = ids.first() else { return Ok(0) };
//!     let session = provider
//!         .open(device_id, &AccessConfig::default())
//!         .map_err(|e| e.to_string())?;
//!     let root = session.content_root();
//!     let _cursor = session.list_children(&root).map_err(|e| e.to_string())?;
//!     Ok(0)
//! }
//! ```

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// Object id of the synthetic device object at the top of every content tree
pub const DEVICE_OBJECT_ID: &str = "DEVICE";

/// Opaque identifier of one object (folder, file or the device root) within a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The well-known content root
    pub fn device_root() -> Self {
        Self(DEVICE_OBJECT_ID.to_string())
    }

    /// Ids must be non-empty to name an object
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One batch of child ids returned by a cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Ids in provider order (not guaranteed stable across listings)
    pub ids: Vec<ObjectId>,
    /// No further pages follow this one
    pub is_exhausted: bool,
}

impl Page {
    pub fn more(ids: Vec<ObjectId>) -> Self {
        Self {
            ids,
            is_exhausted: false,
        }
    }

    pub fn last(ids: Vec<ObjectId>) -> Self {
        Self {
            ids,
            is_exhausted: true,
        }
    }
}

/// Property key: format GUID plus property id, as used by WPD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey {
    pub fmtid: u128,
    pub pid: u32,
}

/// Format id shared by the generic object properties
const WPD_OBJECT_PROPERTIES_V1: u128 = 0xef6b490d_5cd8_437a_affc_da8b60ee4a3c;

impl PropertyKey {
    pub const fn new(fmtid: u128, pid: u32) -> Self {
        Self { fmtid, pid }
    }

    pub const OBJECT_NAME: PropertyKey = PropertyKey::new(WPD_OBJECT_PROPERTIES_V1, 4);
    pub const OBJECT_CONTENT_TYPE: PropertyKey = PropertyKey::new(WPD_OBJECT_PROPERTIES_V1, 7);
    pub const OBJECT_SIZE: PropertyKey = PropertyKey::new(WPD_OBJECT_PROPERTIES_V1, 11);
    pub const OBJECT_ORIGINAL_FILE_NAME: PropertyKey =
        PropertyKey::new(WPD_OBJECT_PROPERTIES_V1, 12);
}

impl Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.fmtid;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x} {:08x}",
            (g >> 96) as u32,
            (g >> 80) as u16,
            (g >> 64) as u16,
            (g >> 48) as u16,
            g & 0xffff_ffff_ffff,
            self.pid
        )
    }
}

/// Typed property value, reduced to what the diagnostics read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Guid(u128),
    UnsignedInteger(u64),
    /// Present on the object but not decoded
    Other,
}

/// Content type of an object, decoded from `OBJECT_CONTENT_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Folder,
    Image,
    FunctionalObject,
    Other(u128),
}

impl ContentType {
    pub const FOLDER_GUID: u128 = 0x27e2e392_a111_48e0_ab0c_e17705a05f85;
    pub const IMAGE_GUID: u128 = 0xef2107d5_a52a_4243_a26b_62d4176d7603;
    pub const FUNCTIONAL_OBJECT_GUID: u128 = 0x99ed0160_17ff_4c44_9d98_1d7a6f941921;

    pub fn from_guid(guid: u128) -> Self {
        match guid {
            Self::FOLDER_GUID => ContentType::Folder,
            Self::IMAGE_GUID => ContentType::Image,
            Self::FUNCTIONAL_OBJECT_GUID => ContentType::FunctionalObject,
            other => ContentType::Other(other),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContentType::Folder => "Folder",
            ContentType::Image => "Image",
            ContentType::FunctionalObject => "Functional object",
            ContentType::Other(_) => "Other",
        }
    }
}

/// Properties of one object as returned by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectProperties {
    values: BTreeMap<PropertyKey, PropertyValue>,
}

impl ObjectProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PropertyKey, value: PropertyValue) {
        self.values.insert(key, value);
    }

    /// Record `key` without replacing a value that was already decoded
    pub fn insert_if_absent(&mut self, key: PropertyKey, value: PropertyValue) {
        self.values.entry(key).or_insert(value);
    }

    pub fn with(mut self, key: PropertyKey, value: PropertyValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn text(&self, key: &PropertyKey) -> Option<&str> {
        match self.values.get(key) {
            Some(PropertyValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn original_file_name(&self) -> Option<&str> {
        self.text(&PropertyKey::OBJECT_ORIGINAL_FILE_NAME)
    }

    pub fn name(&self) -> Option<&str> {
        self.text(&PropertyKey::OBJECT_NAME)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        match self.values.get(&PropertyKey::OBJECT_CONTENT_TYPE) {
            Some(PropertyValue::Guid(g)) => Some(ContentType::from_guid(*g)),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self.values.get(&PropertyKey::OBJECT_SIZE) {
            Some(PropertyValue::UnsignedInteger(n)) => Some(*n),
            _ => None,
        }
    }
}

/// Display information about a device, used only for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device id used by the provider
    pub device_id: String,
    /// User-friendly name of the device
    pub friendly_name: String,
    /// Device manufacturer
    pub manufacturer: String,
    /// Device description/model
    pub description: String,
}

impl DeviceInfo {
    pub fn new(device_id: &str, friendly_name: &str, manufacturer: &str, description: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            friendly_name: friendly_name.to_string(),
            manufacturer: manufacturer.to_string(),
            description: description.to_string(),
        }
    }
}

/// Identity the client presents when opening a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    pub name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub revision: u32,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "WPD client".to_string(),
            major_version: 1,
            minor_version: 0,
            revision: 1,
        }
    }
}

/// `GENERIC_READ`
pub const DESIRED_ACCESS_READ: u32 = 0x8000_0000;
/// `FILE_SHARE_READ | FILE_SHARE_WRITE`
pub const SHARE_MODE_READ_WRITE: u32 = 0x0000_0001 | 0x0000_0002;
/// `SECURITY_IMPERSONATION`
pub const SECURITY_QOS_IMPERSONATION: u32 = 0x0002_0000;

/// Access configuration for opening a session
///
/// Enumeration only reads, and shares the device for reading and writing so
/// other clients are not locked out while a walk is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    pub client: ClientInfo,
    pub desired_access: u32,
    pub share_mode: u32,
    pub security_qos: u32,
}

impl AccessConfig {
    pub fn read_only(client: ClientInfo) -> Self {
        Self {
            client,
            desired_access: DESIRED_ACCESS_READ,
            share_mode: SHARE_MODE_READ_WRITE,
            security_qos: SECURITY_QOS_IMPERSONATION,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self::read_only(ClientInfo::default())
    }
}

/// How the device object is activated by the real provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceBinding {
    /// `PortableDevice` class
    #[default]
    Standard,
    /// Free-threaded `PortableDeviceFTM` class
    FreeThreaded,
}

/// One child listing, read in pages
pub trait ChildCursor {
    /// Fetch up to `max` ids
    ///
    /// `is_exhausted` on the returned page means no further call may be made.
    fn next_page(&mut self, max: u32) -> Result<Page>;

    /// Release the provider-side listing
    fn close(&mut self);
}

/// An open device
pub trait ContentSession {
    type Cursor: ChildCursor;

    /// Id of the top of this device's tree
    fn content_root(&self) -> ObjectId {
        ObjectId::device_root()
    }

    /// Start listing all children of `parent` (no filter)
    fn list_children(&self, parent: &ObjectId) -> Result<Self::Cursor>;

    /// Read all properties of `object`
    fn properties(&self, object: &ObjectId) -> Result<ObjectProperties>;

    /// Release the session
    fn close(&mut self) -> Result<()>;
}

/// Device discovery and session management
pub trait DeviceProvider {
    type Session: ContentSession;

    /// Ids of all devices currently visible
    fn device_ids(&self) -> Result<Vec<String>>;

    /// Number of devices currently visible
    fn device_count(&self) -> Result<usize> {
        Ok(self.device_ids()?.len())
    }

    /// Ask the provider to rescan for devices
    fn refresh(&self) -> Result<()>;

    fn friendly_name(&self, device_id: &str) -> Result<String>;

    fn manufacturer(&self, device_id: &str) -> Result<String>;

    fn description(&self, device_id: &str) -> Result<String>;

    /// Collect display information, falling back to "Unknown" per field
    fn device_info(&self, device_id: &str) -> DeviceInfo {
        DeviceInfo {
            device_id: device_id.to_string(),
            friendly_name: self
                .friendly_name(device_id)
                .unwrap_or_else(|_| "Unknown Device".to_string()),
            manufacturer: self
                .manufacturer(device_id)
                .unwrap_or_else(|_| "Unknown".to_string()),
            description: self
                .description(device_id)
                .unwrap_or_else(|_| "Unknown".to_string()),
        }
    }

    /// Open a session on `device_id`
    fn open(&self, device_id: &str, access: &AccessConfig) -> Result<Self::Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_validity() {
        assert!(ObjectId::device_root().is_valid());
        assert_eq!(ObjectId::device_root().as_str(), "DEVICE");
        assert!(!ObjectId::new("").is_valid());
        assert_eq!(ObjectId::from("o12").to_string(), "o12");
    }

    #[test]
    fn test_property_key_display() {
        let key = PropertyKey::OBJECT_ORIGINAL_FILE_NAME;
        assert_eq!(
            key.to_string(),
            "ef6b490d-5cd8-437a-affc-da8b60ee4a3c 0000000c"
        );
    }

    #[test]
    fn test_content_type_from_guid() {
        assert_eq!(
            ContentType::from_guid(ContentType::FOLDER_GUID),
            ContentType::Folder
        );
        assert_eq!(
            ContentType::from_guid(ContentType::IMAGE_GUID),
            ContentType::Image
        );
        assert_eq!(
            ContentType::from_guid(ContentType::FUNCTIONAL_OBJECT_GUID).display_name(),
            "Functional object"
        );
        assert_eq!(ContentType::from_guid(7), ContentType::Other(7));
        assert_eq!(ContentType::Folder.display_name(), "Folder");
    }

    #[test]
    fn test_object_properties_accessors() {
        let props = ObjectProperties::new()
            .with(
                PropertyKey::OBJECT_ORIGINAL_FILE_NAME,
                PropertyValue::Text("IMG_0001.JPG".to_string()),
            )
            .with(
                PropertyKey::OBJECT_CONTENT_TYPE,
                PropertyValue::Guid(ContentType::IMAGE_GUID),
            )
            .with(PropertyKey::OBJECT_SIZE, PropertyValue::UnsignedInteger(2048));

        assert_eq!(props.len(), 3);
        assert_eq!(props.original_file_name(), Some("IMG_0001.JPG"));
        assert_eq!(props.name(), None);
        assert_eq!(props.content_type(), Some(ContentType::Image));
        assert_eq!(props.size(), Some(2048));
    }

    #[test]
    fn test_undecoded_keys_keep_decoded_values() {
        let extra = PropertyKey::new(0x1234, 2);
        let mut props = ObjectProperties::new().with(
            PropertyKey::OBJECT_NAME,
            PropertyValue::Text("DCIM".to_string()),
        );

        props.insert_if_absent(PropertyKey::OBJECT_NAME, PropertyValue::Other);
        props.insert_if_absent(extra, PropertyValue::Other);

        assert_eq!(props.len(), 2);
        assert_eq!(props.name(), Some("DCIM"));
        assert_eq!(props.get(&extra), Some(&PropertyValue::Other));
    }

    #[test]
    fn test_access_config_is_read_only_shared() {
        let access = AccessConfig::default();
        assert_eq!(access.desired_access, 0x8000_0000);
        assert_eq!(access.share_mode, 0x3);
        assert_eq!(access.security_qos, 0x0002_0000);
        assert_eq!(access.client.name, "WPD client");
        assert_eq!(access.client.revision, 1);
    }

    #[test]
    fn test_page_constructors() {
        let page = Page::more(vec![ObjectId::from("a")]);
        assert!(!page.is_exhausted);
        assert!(Page::last(Vec::new()).is_exhausted);
    }
}
