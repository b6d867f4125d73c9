//! Predefined test scenarios
//!
//! Each scenario describes one or more mock devices, how discovery should be
//! driven against them, and what the device reports must look like afterwards.
//! The same scenarios back the unit tests and the `simulate` command.

use super::generator::{balanced_tree, balanced_tree_size};
use super::mock_device::{
    MockDeviceConfig, MockDeviceManager, MockFileSystem, MockObject, MockProviderStats,
    MockSession,
};
use crate::core::discovery::{DeviceDiscovery, DeviceOutcome, DeviceReport};
use crate::core::enumerator::{ContentEnumerator, ObjectVisitor};
use crate::device::traits::{AccessConfig, DeviceInfo, DEVICE_OBJECT_ID};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// One mock device in a scenario
#[derive(Debug, Clone)]
pub struct ScenarioDevice {
    pub info: DeviceInfo,
    pub file_system: MockFileSystem,
    pub config: MockDeviceConfig,
}

impl ScenarioDevice {
    pub fn new(info: DeviceInfo, file_system: MockFileSystem) -> Self {
        Self {
            info,
            file_system,
            config: MockDeviceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MockDeviceConfig) -> Self {
        self.config = config;
        self
    }
}

/// Expected report for one device in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedReport {
    /// Opened and walked
    Walked { visited: u64, completed: bool },
    /// Open failed
    OpenFailed,
}

impl ExpectedReport {
    /// A complete walk of `visited` objects
    pub fn complete(visited: u64) -> Self {
        ExpectedReport::Walked {
            visited,
            completed: true,
        }
    }

    fn matches(&self, report: &DeviceReport) -> bool {
        match (self, &report.outcome) {
            (ExpectedReport::OpenFailed, DeviceOutcome::OpenFailed { .. }) => true,
            (ExpectedReport::Walked { visited, completed }, DeviceOutcome::Enumerated(result)) => {
                result.visited_count == *visited && result.completed == *completed
            }
            _ => false,
        }
    }
}

/// A complete test scenario
#[derive(Debug, Clone)]
pub struct TestScenario {
    /// Scenario name for identification
    pub name: String,
    /// Description of what this scenario tests
    pub description: String,
    /// Devices, in the order the provider lists them
    pub devices: Vec<ScenarioDevice>,
    /// Devices stay hidden until this many refreshes
    pub visible_after_refreshes: usize,
    /// Refreshes discovery may make while waiting
    pub max_retries: u32,
    /// Discovery-and-enumeration cycles
    pub passes: usize,
    /// Reports in pass order, then device order
    pub expected: Vec<ExpectedReport>,
    /// Tags for filtering scenarios
    pub tags: Vec<String>,
}

/// Reports and provider counters from running a scenario
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub reports: Vec<DeviceReport>,
    pub stats: MockProviderStats,
}

impl TestScenario {
    /// Create a new test scenario
    pub fn new(name: &str, description: &str, devices: Vec<ScenarioDevice>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            devices,
            visible_after_refreshes: 0,
            max_retries: 5,
            passes: 1,
            expected: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn expecting(mut self, expected: Vec<ExpectedReport>) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    pub fn visible_after(mut self, refreshes: usize) -> Self {
        self.visible_after_refreshes = refreshes;
        self
    }

    /// Add tags to the scenario
    pub fn with_tags(mut self, tags: Vec<&str>) -> Self {
        self.tags = tags.into_iter().map(String::from).collect();
        self
    }

    /// Fresh provider holding this scenario's devices
    pub fn build_manager(&self) -> MockDeviceManager {
        let mut manager = MockDeviceManager::new();
        for device in &self.devices {
            manager.add_device_with_config(
                device.info.clone(),
                device.file_system.clone(),
                device.config.clone(),
            );
        }
        manager.visible_after_refreshes(self.visible_after_refreshes)
    }

    /// Run discovery against a fresh provider, without delays
    pub fn run<V>(&self, page_size: u32, shutdown: Arc<AtomicBool>, visitor: &mut V) -> ScenarioRun
    where
        V: ObjectVisitor<MockSession>,
    {
        let manager = self.build_manager();
        let reports = {
            let discovery = DeviceDiscovery::new(
                &manager,
                ContentEnumerator::new(page_size),
                AccessConfig::default(),
            )
            .with_retries(self.max_retries, Duration::ZERO)
            .with_shutdown_flag(shutdown);
            discovery.run(self.passes, Duration::ZERO, visitor)
        };

        ScenarioRun {
            reports,
            stats: manager.stats(),
        }
    }

    /// Compare a run with the expected reports and the paging contract
    pub fn verify(&self, run: &ScenarioRun) -> Result<(), String> {
        if run.reports.len() != self.expected.len() {
            return Err(format!(
                "expected {} report(s), got {}",
                self.expected.len(),
                run.reports.len()
            ));
        }

        for (index, (expected, report)) in self.expected.iter().zip(&run.reports).enumerate() {
            if !expected.matches(report) {
                return Err(format!(
                    "report {} ({}): expected {:?}, got {:?}",
                    index, report.device.friendly_name, expected, report.outcome
                ));
            }
        }

        let stats = &run.stats;
        if stats.open_handles() != 0 {
            return Err(format!("{} handle(s) left open", stats.open_handles()));
        }
        if stats.fetch_after_exhaustion != 0 {
            return Err(format!(
                "{} fetch(es) after exhaustion",
                stats.fetch_after_exhaustion
            ));
        }
        if stats.double_closes != 0 {
            return Err(format!("{} double close(s)", stats.double_closes));
        }

        Ok(())
    }
}

fn phone(id: &str, name: &str) -> DeviceInfo {
    DeviceInfo::new(id, name, "Generic Mobile", "Smartphone")
}

/// Number of objects plus the root
fn walk_size(fs: &MockFileSystem) -> u64 {
    fs.object_count() as u64 + 1
}

/// Collection of all predefined test scenarios
pub struct ScenarioLibrary;

impl ScenarioLibrary {
    // =========================================================================
    // DEVICE DETECTION SCENARIOS
    // =========================================================================

    /// Scenario: No devices connected
    pub fn no_devices() -> TestScenario {
        TestScenario::new(
            "no_devices",
            "No device ever appears; discovery gives up after its retries",
            Vec::new(),
        )
        .with_tags(vec!["device", "no-device"])
    }

    /// Scenario: Single phone with a camera roll
    pub fn single_phone() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 50, 5);
        let visited = walk_size(&fs);

        TestScenario::new(
            "single_phone",
            "Standard single phone with a typical DCIM tree",
            vec![ScenarioDevice::new(
                phone("\\\\?\\usb#vid_04e8&pid_6860#serial123456", "Galaxy S23"),
                fs,
            )],
        )
        .expecting(vec![ExpectedReport::complete(visited)])
        .with_tags(vec!["device", "basic"])
    }

    /// Scenario: Devices only show up after a few refreshes
    pub fn late_arrival() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 10, 1);
        let visited = walk_size(&fs);

        TestScenario::new(
            "late_arrival",
            "Device becomes visible after 3 refreshes of the device list",
            vec![ScenarioDevice::new(phone("usb#late", "Pixel 8"), fs)],
        )
        .visible_after(3)
        .expecting(vec![ExpectedReport::complete(visited)])
        .with_tags(vec!["device", "retry"])
    }

    /// Scenario: Device with unicode names
    pub fn unicode_names() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 0, 1);
        fs.add_objects(vec![
            MockObject::file("u1", "100apple", "Ünïcödé_Phötö.JPG", 10),
            MockObject::file("u2", "100apple", "日本語の写真.JPG", 10),
            MockObject::file("u3", "100apple", "Фото_2024.JPG", 10),
        ]);
        let visited = walk_size(&fs);

        TestScenario::new(
            "unicode_names",
            "Device and object names outside ASCII",
            vec![ScenarioDevice::new(
                DeviceInfo::new("usb#unicode", "Müller's Phone 📱", "Hersteller™", "Téléphone"),
                fs,
            )],
        )
        .expecting(vec![ExpectedReport::complete(visited)])
        .with_tags(vec!["device", "unicode", "edge-case"])
    }

    // =========================================================================
    // TREE SHAPE SCENARIOS
    // =========================================================================

    /// Scenario: Root with children A, B, C where C holds D
    pub fn example_tree() -> TestScenario {
        let mut fs = MockFileSystem::new();
        fs.add_objects(vec![
            MockObject::folder("A", DEVICE_OBJECT_ID, "A"),
            MockObject::folder("B", DEVICE_OBJECT_ID, "B"),
            MockObject::folder("C", DEVICE_OBJECT_ID, "C"),
            MockObject::file("D", "C", "D.JPG", 1),
        ]);

        TestScenario::new(
            "example_tree",
            "Four objects below the root, one of them nested",
            vec![ScenarioDevice::new(phone("usb#example", "Example"), fs)],
        )
        .expecting(vec![ExpectedReport::complete(5)])
        .with_tags(vec!["structure", "basic"])
    }

    /// Scenario: Device with storage but no files
    pub fn empty_device() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 0, 0);

        TestScenario::new(
            "empty_device",
            "Device with a DCIM folder but no photos",
            vec![ScenarioDevice::new(phone("usb#empty", "Empty Phone"), fs)],
        )
        .expecting(vec![ExpectedReport::complete(3)])
        .with_tags(vec!["structure", "empty", "edge-case"])
    }

    /// Scenario: Deeply nested folder structure
    pub fn deeply_nested() -> TestScenario {
        let mut fs = MockFileSystem::new();
        fs.add_object(MockObject::storage("internal", "Internal Storage"));
        fs.add_object(MockObject::folder("dcim", "internal", "DCIM"));

        let mut parent_id = "dcim".to_string();
        for i in 0..15 {
            let folder_id = format!("level_{}", i);
            fs.add_object(MockObject::folder(&folder_id, &parent_id, &format!("Level_{}", i)));
            parent_id = folder_id;
        }
        for i in 0..5 {
            fs.add_object(MockObject::file(
                &format!("deep_file_{}", i),
                &parent_id,
                &format!("IMG_{:04}.JPG", i),
                1024,
            ));
        }

        TestScenario::new(
            "deeply_nested",
            "15 levels of nested folders with files at the deepest level",
            vec![ScenarioDevice::new(phone("usb#nested", "Nested Phone"), fs)],
        )
        .expecting(vec![ExpectedReport::complete(23)])
        .with_tags(vec!["structure", "nested", "edge-case"])
    }

    /// Scenario: Thousands of files in a single folder
    pub fn many_files_single_folder() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 5000, 1);

        TestScenario::new(
            "many_files_single_folder",
            "5000 files in one folder, hundreds of pages",
            vec![ScenarioDevice::new(phone("usb#many", "Busy Phone"), fs)],
        )
        .expecting(vec![ExpectedReport::complete(5004)])
        .with_tags(vec!["structure", "performance", "stress-test"])
    }

    /// Scenario: Regular tree with fan-out 4, three levels deep
    pub fn balanced() -> TestScenario {
        let fs = balanced_tree(3, 4);
        let visited = balanced_tree_size(3, 4) as u64 + 1;

        TestScenario::new(
            "balanced",
            "Every folder holds 4 children, three levels deep",
            vec![ScenarioDevice::new(phone("usb#balanced", "Tablet"), fs)],
        )
        .expecting(vec![ExpectedReport::complete(visited)])
        .with_tags(vec!["structure", "paging"])
    }

    /// Scenario: Provider returns an object with an empty id
    pub fn empty_object_id() -> TestScenario {
        let mut fs = MockFileSystem::new();
        fs.add_objects(vec![
            MockObject::folder("A", DEVICE_OBJECT_ID, "A"),
            MockObject::file("", DEVICE_OBJECT_ID, "ghost", 0),
            MockObject::file("B", "A", "B.JPG", 1),
        ]);

        TestScenario::new(
            "empty_object_id",
            "An empty id is counted but never opened",
            vec![ScenarioDevice::new(phone("usb#ghost", "Ghost Phone"), fs)],
        )
        .expecting(vec![ExpectedReport::complete(4)])
        .with_tags(vec!["structure", "edge-case"])
    }

    // =========================================================================
    // ERROR CONDITION SCENARIOS
    // =========================================================================

    /// Scenario: Device is locked (access denied)
    pub fn device_locked() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 10, 1);

        TestScenario::new(
            "device_locked",
            "Device refuses to open (locked or not trusted)",
            vec![ScenarioDevice::new(phone("usb#locked", "Locked Phone"), fs)
                .with_config(MockDeviceConfig::locked())],
        )
        .expecting(vec![ExpectedReport::OpenFailed])
        .with_tags(vec!["error", "access"])
    }

    /// Scenario: Second of three devices cannot be opened
    pub fn one_of_three_locked() -> TestScenario {
        let mut first = MockFileSystem::new();
        Self::add_dcim_structure(&mut first, 20, 2);
        let mut second = MockFileSystem::new();
        Self::add_dcim_structure(&mut second, 5, 1);
        let mut third = MockFileSystem::new();
        Self::add_dcim_structure(&mut third, 0, 0);

        TestScenario::new(
            "one_of_three_locked",
            "Open failure on one device does not stop the others",
            vec![
                ScenarioDevice::new(phone("usb#one", "Phone One"), first),
                ScenarioDevice::new(phone("usb#two", "Phone Two"), second)
                    .with_config(MockDeviceConfig::locked()),
                ScenarioDevice::new(phone("usb#three", "Phone Three"), third),
            ],
        )
        .expecting(vec![
            ExpectedReport::complete(25),
            ExpectedReport::OpenFailed,
            ExpectedReport::complete(3),
        ])
        .with_tags(vec!["error", "access", "multi-device"])
    }

    /// Scenario: Listing one folder fails part way through the walk
    pub fn listing_failure() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 5, 2);

        TestScenario::new(
            "listing_failure",
            "Fetching the children of the second folder fails and aborts the walk",
            vec![ScenarioDevice::new(phone("usb#flaky", "Flaky Phone"), fs)
                .with_config(MockDeviceConfig::default().with_fetch_errors(&["101apple"]))],
        )
        // Everything up to the failing folder, not its two files
        .expecting(vec![ExpectedReport::Walked {
            visited: 8,
            completed: false,
        }])
        .with_tags(vec!["error", "partial"])
    }

    /// Scenario: Some objects refuse property reads
    pub fn property_errors() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 10, 1);
        let visited = walk_size(&fs);

        TestScenario::new(
            "property_errors",
            "Property reads fail for some files; the walk is unaffected",
            vec![ScenarioDevice::new(phone("usb#props", "Odd Phone"), fs).with_config(
                MockDeviceConfig::default().with_property_errors(&["file_0003", "file_0007"]),
            )],
        )
        .expecting(vec![ExpectedReport::complete(visited)])
        .with_tags(vec!["error", "properties"])
    }

    /// Scenario: Tree is empty until the device has been opened once
    pub fn slow_to_populate() -> TestScenario {
        let mut fs = MockFileSystem::new();
        Self::add_dcim_structure(&mut fs, 10, 1);
        let visited = walk_size(&fs);

        TestScenario::new(
            "slow_to_populate",
            "First pass sees only the root; the second sees the whole tree",
            vec![ScenarioDevice::new(phone("usb#slow", "Slow Phone"), fs)
                .with_config(MockDeviceConfig::slow_to_populate(1))],
        )
        .with_passes(2)
        .expecting(vec![
            ExpectedReport::complete(1),
            ExpectedReport::complete(visited),
        ])
        .with_tags(vec!["device", "retry", "multi-pass"])
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Internal Storage / DCIM / `folders` camera folders, files spread
    /// round robin across them
    pub fn add_dcim_structure(fs: &mut MockFileSystem, files: usize, folders: usize) {
        fs.add_object(MockObject::storage("internal", "Internal Storage"));
        fs.add_object(MockObject::folder("dcim", "internal", "DCIM"));

        let folder_ids: Vec<String> = (0..folders)
            .map(|i| {
                let id = format!("{}apple", 100 + i);
                fs.add_object(MockObject::folder(&id, "dcim", &format!("{}APPLE", 100 + i)));
                id
            })
            .collect();

        if folder_ids.is_empty() {
            return;
        }
        for i in 0..files {
            let parent = &folder_ids[i % folder_ids.len()];
            fs.add_object(MockObject::file(
                &format!("file_{:04}", i),
                parent,
                &format!("IMG_{:04}.JPG", i),
                1024 * 1024,
            ));
        }
    }

    /// Get all available scenarios
    pub fn all_scenarios() -> Vec<TestScenario> {
        vec![
            Self::no_devices(),
            Self::single_phone(),
            Self::late_arrival(),
            Self::unicode_names(),
            Self::example_tree(),
            Self::empty_device(),
            Self::deeply_nested(),
            Self::many_files_single_folder(),
            Self::balanced(),
            Self::empty_object_id(),
            Self::device_locked(),
            Self::one_of_three_locked(),
            Self::listing_failure(),
            Self::property_errors(),
            Self::slow_to_populate(),
        ]
    }

    /// Look up a scenario by name
    pub fn find(name: &str) -> Option<TestScenario> {
        Self::all_scenarios().into_iter().find(|s| s.name == name)
    }

    /// Get scenarios by tag
    pub fn scenarios_by_tag(tag: &str) -> Vec<TestScenario> {
        Self::all_scenarios()
            .into_iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Get quick test scenarios (fast to run)
    pub fn quick_scenarios() -> Vec<TestScenario> {
        vec![
            Self::single_phone(),
            Self::example_tree(),
            Self::empty_device(),
            Self::one_of_three_locked(),
            Self::listing_failure(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enumerator::PropertyDumper;
    use crate::core::error::Result;
    use crate::device::traits::ObjectId;
    use std::collections::HashSet;

    fn noop(_: &MockSession, _: &ObjectId, _: usize) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_scenario_names_are_unique() {
        let scenarios = ScenarioLibrary::all_scenarios();
        let names: HashSet<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), scenarios.len());
    }

    #[test]
    fn test_every_scenario_meets_expectations() {
        for scenario in ScenarioLibrary::all_scenarios() {
            for page_size in [1, 3, 10] {
                let mut visitor = noop;
                let run = scenario.run(page_size, Arc::new(AtomicBool::new(false)), &mut visitor);
                if let Err(e) = scenario.verify(&run) {
                    panic!("{} with page size {}: {}", scenario.name, page_size, e);
                }
            }
        }
    }

    #[test]
    fn test_property_dumper_does_not_change_outcomes() {
        for scenario in ScenarioLibrary::quick_scenarios() {
            let mut dumper = PropertyDumper::new();
            let run = scenario.run(10, Arc::new(AtomicBool::new(false)), &mut dumper);
            assert_eq!(scenario.verify(&run), Ok(()), "{}", scenario.name);
        }
    }

    #[test]
    fn test_property_errors_are_counted_not_fatal() {
        let scenario = ScenarioLibrary::property_errors();
        let mut dumper = PropertyDumper::new().always_read_properties();
        let run = scenario.run(3, Arc::new(AtomicBool::new(false)), &mut dumper);

        assert_eq!(scenario.verify(&run), Ok(()));
        let visited = run.reports[0].visited_count();
        assert_eq!(Some(run.stats.property_reads as u64), visited);
        assert_eq!(dumper.property_failures(), 2);
    }

    #[test]
    fn test_no_devices_refreshes_exactly_max_retries() {
        let scenario = ScenarioLibrary::no_devices();
        let mut visitor = noop;
        let run = scenario.run(10, Arc::new(AtomicBool::new(false)), &mut visitor);

        assert!(run.reports.is_empty());
        assert_eq!(run.stats.refresh_calls, 5);
    }

    #[test]
    fn test_verify_reports_mismatch() {
        let scenario = ScenarioLibrary::example_tree().expecting(vec![ExpectedReport::complete(6)]);
        let mut visitor = noop;
        let run = scenario.run(10, Arc::new(AtomicBool::new(false)), &mut visitor);

        let err = scenario.verify(&run).unwrap_err();
        assert!(err.contains("expected"), "{}", err);
    }

    #[test]
    fn test_find_and_tags() {
        assert!(ScenarioLibrary::find("slow_to_populate").is_some());
        assert!(ScenarioLibrary::find("missing").is_none());

        let errors = ScenarioLibrary::scenarios_by_tag("error");
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|s| s.tags.contains(&"error".to_string())));
    }
}
