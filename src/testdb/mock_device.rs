//! Mock device implementation for testing without a real device
//!
//! [`MockDeviceManager`] implements [`DeviceProvider`] over in-memory object
//! trees. Listings behave like WPD: a page shorter than requested is the last
//! one. Every provider call is counted in [`MockProviderStats`], including
//! protocol violations (fetching from an exhausted cursor, closing twice), so
//! tests can check that handles are released and the paging contract holds.

use crate::core::error::{EnumError, Result};
use crate::device::traits::{
    AccessConfig, ChildCursor, ContentSession, ContentType, DeviceInfo, DeviceProvider, ObjectId,
    ObjectProperties, Page, PropertyKey, PropertyValue, DEVICE_OBJECT_ID,
};
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Represents a file or folder in the mock file system
#[derive(Debug, Clone)]
pub struct MockObject {
    /// Unique object ID (like WPD object ID)
    pub object_id: String,
    /// Parent object ID ("DEVICE" for root)
    pub parent_id: String,
    /// Object name (file/folder name)
    pub name: String,
    /// Content type GUID
    pub content_type: u128,
    /// File size in bytes (0 for folders)
    pub size: u64,
}

impl MockObject {
    /// Create a new folder
    pub fn folder(object_id: &str, parent_id: &str, name: &str) -> Self {
        Self {
            object_id: object_id.to_string(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            content_type: ContentType::FOLDER_GUID,
            size: 0,
        }
    }

    /// Create a storage object ("Internal Storage")
    pub fn storage(object_id: &str, name: &str) -> Self {
        Self {
            content_type: ContentType::FUNCTIONAL_OBJECT_GUID,
            ..Self::folder(object_id, DEVICE_OBJECT_ID, name)
        }
    }

    /// Create a new image file
    pub fn file(object_id: &str, parent_id: &str, name: &str, size: u64) -> Self {
        Self {
            object_id: object_id.to_string(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            content_type: ContentType::IMAGE_GUID,
            size,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.content_type != ContentType::IMAGE_GUID
    }

    fn properties(&self) -> ObjectProperties {
        let mut props = ObjectProperties::new()
            .with(PropertyKey::OBJECT_NAME, PropertyValue::Text(self.name.clone()))
            .with(
                PropertyKey::OBJECT_CONTENT_TYPE,
                PropertyValue::Guid(self.content_type),
            );
        if !self.is_folder() {
            props.insert(
                PropertyKey::OBJECT_ORIGINAL_FILE_NAME,
                PropertyValue::Text(self.name.clone()),
            );
            props.insert(PropertyKey::OBJECT_SIZE, PropertyValue::UnsignedInteger(self.size));
        }
        props
    }
}

/// Mock device file system state
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    /// All objects indexed by object ID
    objects: HashMap<String, MockObject>,
    /// Children index: parent_id -> Vec<object_id>, in insertion order
    children_index: HashMap<String, Vec<String>>,
}

impl MockFileSystem {
    /// Create a new empty file system
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object to the file system
    pub fn add_object(&mut self, object: MockObject) {
        let object_id = object.object_id.clone();
        let parent_id = object.parent_id.clone();

        self.objects.insert(object_id.clone(), object);
        self.children_index
            .entry(parent_id)
            .or_default()
            .push(object_id);
    }

    /// Add multiple objects
    pub fn add_objects(&mut self, objects: Vec<MockObject>) {
        for obj in objects {
            self.add_object(obj);
        }
    }

    /// Get an object by ID
    pub fn get_object(&self, object_id: &str) -> Option<&MockObject> {
        self.objects.get(object_id)
    }

    /// Ids of the direct children of an object
    pub fn child_ids(&self, parent_id: &str) -> Vec<String> {
        self.children_index
            .get(parent_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Ids of every object, not including the device root
    pub fn all_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.objects.keys().cloned()
    }

    /// Whether `object_id` names an object (the device root always exists)
    pub fn contains(&self, object_id: &str) -> bool {
        object_id == DEVICE_OBJECT_ID || self.objects.contains_key(object_id)
    }

    /// Count total objects, not including the device root
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Count files only
    pub fn file_count(&self) -> usize {
        self.objects.values().filter(|o| !o.is_folder()).count()
    }

    /// Count folders only
    pub fn folder_count(&self) -> usize {
        self.objects.values().filter(|o| o.is_folder()).count()
    }
}

/// Configuration for mock device behavior
#[derive(Debug, Clone, Default)]
pub struct MockDeviceConfig {
    /// Simulate device being locked (open fails with access denied)
    pub simulate_locked: bool,
    /// Objects whose child listing cannot be opened
    pub fail_listing: Vec<String>,
    /// Objects whose child listing fails on the first page fetch
    pub fail_fetch: Vec<String>,
    /// Objects whose properties cannot be read
    pub fail_properties: Vec<String>,
    /// The tree looks empty for this many opens (device still populating)
    pub empty_for_opens: usize,
    /// Rotate each child listing by the number of listings opened so far
    pub rotate_listings: bool,
}

impl MockDeviceConfig {
    /// Create a config that simulates a locked device
    pub fn locked() -> Self {
        Self {
            simulate_locked: true,
            ..Default::default()
        }
    }

    /// Create a config whose tree only shows up after `opens` sessions
    pub fn slow_to_populate(opens: usize) -> Self {
        Self {
            empty_for_opens: opens,
            ..Default::default()
        }
    }

    /// Make the child listing of these objects fail on fetch
    pub fn with_fetch_errors(mut self, object_ids: &[&str]) -> Self {
        self.fail_fetch = object_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Make the child listing of these objects fail on open
    pub fn with_listing_errors(mut self, object_ids: &[&str]) -> Self {
        self.fail_listing = object_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Make property reads of these objects fail
    pub fn with_property_errors(mut self, object_ids: &[&str]) -> Self {
        self.fail_properties = object_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Return children in a different order on every listing
    pub fn with_rotating_order(mut self) -> Self {
        self.rotate_listings = true;
        self
    }
}

/// Counters for every provider call made against the mock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockProviderStats {
    pub device_queries: usize,
    pub refresh_calls: usize,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub cursors_opened: usize,
    pub cursors_closed: usize,
    pub pages_fetched: usize,
    pub property_reads: usize,
    /// `next_page` on a cursor that already reported exhaustion
    pub fetch_after_exhaustion: usize,
    /// `close` on a cursor or session that was already closed
    pub double_closes: usize,
    /// Parents in the order their listings were opened
    pub listed_parents: Vec<ObjectId>,
}

impl MockProviderStats {
    /// Handles still held by callers
    pub fn open_handles(&self) -> usize {
        (self.sessions_opened - self.sessions_closed) + (self.cursors_opened - self.cursors_closed)
    }
}

type SharedStats = Arc<Mutex<MockProviderStats>>;

fn record(stats: &SharedStats, f: impl FnOnce(&mut MockProviderStats)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}

/// Mock device manager that simulates the WPD device manager
#[derive(Default)]
pub struct MockDeviceManager {
    /// List of available mock devices
    devices: Vec<DeviceInfo>,
    /// File systems for each device (by device_id)
    file_systems: HashMap<String, Arc<MockFileSystem>>,
    /// Configuration for device behavior
    configs: HashMap<String, MockDeviceConfig>,
    /// Opens seen per device
    opens: Mutex<HashMap<String, usize>>,
    /// Devices only become visible after this many refreshes
    visible_after_refreshes: usize,
    stats: SharedStats,
}

impl MockDeviceManager {
    /// Create a new mock device manager with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device with its file system
    pub fn add_device(&mut self, info: DeviceInfo, fs: MockFileSystem) {
        self.add_device_with_config(info, fs, MockDeviceConfig::default());
    }

    /// Add a device with file system and config
    pub fn add_device_with_config(
        &mut self,
        info: DeviceInfo,
        fs: MockFileSystem,
        config: MockDeviceConfig,
    ) {
        let device_id = info.device_id.clone();
        self.devices.push(info);
        self.file_systems.insert(device_id.clone(), Arc::new(fs));
        self.configs.insert(device_id, config);
    }

    /// Hide all devices until `refreshes` refresh calls have been made
    pub fn visible_after_refreshes(mut self, refreshes: usize) -> Self {
        self.visible_after_refreshes = refreshes;
        self
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> MockProviderStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn visible(&self) -> bool {
        self.stats
            .lock()
            .map(|s| s.refresh_calls >= self.visible_after_refreshes)
            .unwrap_or(false)
    }

    fn info(&self, device_id: &str) -> Result<&DeviceInfo> {
        self.devices
            .iter()
            .find(|d| d.device_id == device_id)
            .ok_or_else(|| EnumError::DeviceNotFound(device_id.to_string()))
    }
}

impl DeviceProvider for MockDeviceManager {
    type Session = MockSession;

    fn device_ids(&self) -> Result<Vec<String>> {
        record(&self.stats, |s| s.device_queries += 1);
        if !self.visible() {
            return Ok(Vec::new());
        }
        Ok(self.devices.iter().map(|d| d.device_id.clone()).collect())
    }

    fn refresh(&self) -> Result<()> {
        record(&self.stats, |s| s.refresh_calls += 1);
        Ok(())
    }

    fn friendly_name(&self, device_id: &str) -> Result<String> {
        Ok(self.info(device_id)?.friendly_name.clone())
    }

    fn manufacturer(&self, device_id: &str) -> Result<String> {
        Ok(self.info(device_id)?.manufacturer.clone())
    }

    fn description(&self, device_id: &str) -> Result<String> {
        Ok(self.info(device_id)?.description.clone())
    }

    fn open(&self, device_id: &str, _access: &AccessConfig) -> Result<MockSession> {
        let fs = self
            .file_systems
            .get(device_id)
            .cloned()
            .ok_or_else(|| EnumError::DeviceNotFound(device_id.to_string()))?;
        let config = self.configs.get(device_id).cloned().unwrap_or_default();

        if config.simulate_locked {
            return Err(EnumError::AccessDenied);
        }

        let opens = match self.opens.lock() {
            Ok(mut opens) => {
                let n = opens.entry(device_id.to_string()).or_default();
                *n += 1;
                *n
            }
            Err(_) => 1,
        };
        record(&self.stats, |s| s.sessions_opened += 1);

        Ok(MockSession {
            fs,
            hidden: opens <= config.empty_for_opens,
            config,
            stats: Arc::clone(&self.stats),
            closed: false,
        })
    }
}

/// An open mock device
pub struct MockSession {
    fs: Arc<MockFileSystem>,
    config: MockDeviceConfig,
    /// Tree not populated yet
    hidden: bool,
    stats: SharedStats,
    closed: bool,
}

impl ContentSession for MockSession {
    type Cursor = MockCursor;

    fn list_children(&self, parent: &ObjectId) -> Result<MockCursor> {
        let listing = self
            .stats
            .lock()
            .map(|mut s| {
                s.listed_parents.push(parent.clone());
                s.listed_parents.len()
            })
            .unwrap_or_default();

        if !self.fs.contains(parent.as_str()) {
            return Err(EnumError::provider(
                "EnumObjects",
                format!("no object '{}'", parent),
            ));
        }
        if self.config.fail_listing.iter().any(|id| id == parent.as_str()) {
            return Err(EnumError::provider("EnumObjects", "simulated listing failure"));
        }

        record(&self.stats, |s| s.cursors_opened += 1);
        let mut ids: Vec<ObjectId> = if self.hidden {
            Vec::new()
        } else {
            self.fs
                .child_ids(parent.as_str())
                .into_iter()
                .map(ObjectId::from)
                .collect()
        };
        if self.config.rotate_listings && !ids.is_empty() {
            let shift = listing % ids.len();
            ids.rotate_left(shift);
        }

        Ok(MockCursor {
            ids,
            position: 0,
            exhausted: false,
            fail_fetch: self.config.fail_fetch.iter().any(|id| id == parent.as_str()),
            stats: Arc::clone(&self.stats),
            closed: false,
        })
    }

    fn properties(&self, object: &ObjectId) -> Result<ObjectProperties> {
        record(&self.stats, |s| s.property_reads += 1);

        if self.config.fail_properties.iter().any(|id| id == object.as_str()) {
            return Err(EnumError::provider("GetValues", "simulated property failure"));
        }
        if object.as_str() == DEVICE_OBJECT_ID {
            return Ok(ObjectProperties::new().with(
                PropertyKey::OBJECT_NAME,
                PropertyValue::Text(DEVICE_OBJECT_ID.to_string()),
            ));
        }
        self.fs
            .get_object(object.as_str())
            .map(MockObject::properties)
            .ok_or_else(|| EnumError::provider("GetValues", format!("no object '{}'", object)))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            record(&self.stats, |s| s.double_closes += 1);
        } else {
            self.closed = true;
            record(&self.stats, |s| s.sessions_closed += 1);
        }
        Ok(())
    }
}

/// One mock child listing
pub struct MockCursor {
    ids: Vec<ObjectId>,
    position: usize,
    exhausted: bool,
    fail_fetch: bool,
    stats: SharedStats,
    closed: bool,
}

impl ChildCursor for MockCursor {
    fn next_page(&mut self, max: u32) -> Result<Page> {
        if self.exhausted {
            record(&self.stats, |s| s.fetch_after_exhaustion += 1);
            return Ok(Page::last(Vec::new()));
        }
        if self.fail_fetch {
            return Err(EnumError::provider("Next", "simulated fetch failure"));
        }

        record(&self.stats, |s| s.pages_fetched += 1);
        let end = (self.position + max as usize).min(self.ids.len());
        let ids = self.ids[self.position..end].to_vec();
        self.position = end;

        // Short page means no more, as with S_FALSE from the real enumerator
        self.exhausted = ids.len() < max as usize;
        trace!("Mock page of {} id(s), exhausted: {}", ids.len(), self.exhausted);

        Ok(Page {
            ids,
            is_exhausted: self.exhausted,
        })
    }

    fn close(&mut self) {
        if self.closed {
            record(&self.stats, |s| s.double_closes += 1);
        } else {
            self.closed = true;
            record(&self.stats, |s| s.cursors_closed += 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fs() -> MockFileSystem {
        let mut fs = MockFileSystem::new();
        fs.add_object(MockObject::storage("internal", "Internal Storage"));
        fs.add_object(MockObject::folder("dcim", "internal", "DCIM"));
        fs.add_object(MockObject::folder("100apple", "dcim", "100APPLE"));
        fs.add_object(MockObject::file("img001", "100apple", "IMG_0001.JPG", 4));
        fs
    }

    #[test]
    fn test_mock_file_system_basic() {
        let fs = sample_fs();

        assert_eq!(fs.object_count(), 4);
        assert_eq!(fs.file_count(), 1);
        assert_eq!(fs.folder_count(), 3);
        assert_eq!(fs.child_ids("DEVICE"), vec!["internal".to_string()]);
        assert!(fs.contains("DEVICE"));
        assert!(!fs.contains("missing"));
    }

    #[test]
    fn test_devices_hidden_until_refreshed() {
        let mut manager = MockDeviceManager::new();
        manager.add_device(DeviceInfo::new("dev", "Phone", "Maker", "Model"), sample_fs());
        let manager = manager.visible_after_refreshes(2);

        assert_eq!(manager.device_count().unwrap(), 0);
        manager.refresh().unwrap();
        assert_eq!(manager.device_count().unwrap(), 0);
        manager.refresh().unwrap();
        assert_eq!(manager.device_count().unwrap(), 1);
        assert_eq!(manager.stats().refresh_calls, 2);
    }

    #[test]
    fn test_access_denied_simulation() {
        let mut manager = MockDeviceManager::new();
        manager.add_device_with_config(
            DeviceInfo::new("locked", "Phone", "Maker", "Model"),
            sample_fs(),
            MockDeviceConfig::locked(),
        );

        let result = manager.open("locked", &AccessConfig::default());
        assert!(matches!(result, Err(EnumError::AccessDenied)));
        assert!(matches!(
            manager.open("nope", &AccessConfig::default()),
            Err(EnumError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_properties_of_file() {
        let mut manager = MockDeviceManager::new();
        manager.add_device(DeviceInfo::new("dev", "Phone", "Maker", "Model"), sample_fs());
        let session = manager.open("dev", &AccessConfig::default()).unwrap();

        let props = session.properties(&ObjectId::from("img001")).unwrap();
        assert_eq!(props.original_file_name(), Some("IMG_0001.JPG"));
        assert_eq!(props.content_type(), Some(ContentType::Image));
        assert_eq!(props.size(), Some(4));

        let storage = session.properties(&ObjectId::from("internal")).unwrap();
        assert_eq!(storage.content_type(), Some(ContentType::FunctionalObject));
    }

    #[test]
    fn test_full_page_needs_one_more_fetch() {
        let mut fs = MockFileSystem::new();
        fs.add_object(MockObject::file("a", "DEVICE", "a.jpg", 1));
        fs.add_object(MockObject::file("b", "DEVICE", "b.jpg", 1));
        let mut manager = MockDeviceManager::new();
        manager.add_device(DeviceInfo::new("dev", "Phone", "Maker", "Model"), fs);
        let session = manager.open("dev", &AccessConfig::default()).unwrap();

        let mut cursor = session.list_children(&ObjectId::device_root()).unwrap();
        let first = cursor.next_page(2).unwrap();
        assert_eq!(first.ids.len(), 2);
        assert!(!first.is_exhausted);
        let second = cursor.next_page(2).unwrap();
        assert!(second.ids.is_empty());
        assert!(second.is_exhausted);

        cursor.next_page(2).unwrap();
        assert_eq!(manager.stats().fetch_after_exhaustion, 1);
    }

    #[test]
    fn test_slow_device_is_empty_on_first_open() {
        let mut manager = MockDeviceManager::new();
        manager.add_device_with_config(
            DeviceInfo::new("dev", "Phone", "Maker", "Model"),
            sample_fs(),
            MockDeviceConfig::slow_to_populate(1),
        );

        let first = manager.open("dev", &AccessConfig::default()).unwrap();
        let mut cursor = first.list_children(&ObjectId::device_root()).unwrap();
        assert!(cursor.next_page(10).unwrap().ids.is_empty());

        let second = manager.open("dev", &AccessConfig::default()).unwrap();
        let mut cursor = second.list_children(&ObjectId::device_root()).unwrap();
        assert_eq!(cursor.next_page(10).unwrap().ids.len(), 1);
    }

    #[test]
    fn test_rotating_order_changes_between_listings() {
        let mut fs = MockFileSystem::new();
        for name in ["a", "b", "c"] {
            fs.add_object(MockObject::file(name, "DEVICE", name, 1));
        }
        let mut manager = MockDeviceManager::new();
        manager.add_device_with_config(
            DeviceInfo::new("dev", "Phone", "Maker", "Model"),
            fs,
            MockDeviceConfig::default().with_rotating_order(),
        );
        let session = manager.open("dev", &AccessConfig::default()).unwrap();

        let mut first = session.list_children(&ObjectId::device_root()).unwrap();
        let mut second = session.list_children(&ObjectId::device_root()).unwrap();
        let first = first.next_page(10).unwrap().ids;
        let second = second.next_page(10).unwrap().ids;

        assert_eq!(first, vec![ObjectId::from("b"), ObjectId::from("c"), ObjectId::from("a")]);
        assert_eq!(second, vec![ObjectId::from("c"), ObjectId::from("a"), ObjectId::from("b")]);
        assert_eq!(manager.stats().listed_parents.len(), 2);
    }

    #[test]
    fn test_session_double_close_is_recorded() {
        let mut manager = MockDeviceManager::new();
        manager.add_device(DeviceInfo::new("dev", "Phone", "Maker", "Model"), sample_fs());
        let mut session = manager.open("dev", &AccessConfig::default()).unwrap();

        session.close().unwrap();
        session.close().unwrap();

        let stats = manager.stats();
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.double_closes, 1);
    }
}
