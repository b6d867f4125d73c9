//! Device discovery and enumeration passes
//!
//! [`DeviceDiscovery`] waits for the provider to report at least one device,
//! opens each device in turn and walks its content tree. A device that fails
//! to open is reported and skipped; the other devices are still walked. The
//! whole cycle can be repeated, because a freshly connected device may report
//! an empty tree for its first few seconds.

use crate::core::enumerator::{ContentEnumerator, EnumResult, ObjectVisitor};
use crate::core::error::Result;
use crate::device::traits::{AccessConfig, ContentSession, DeviceInfo, DeviceProvider};
use log::{debug, info, warn};
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// What happened to one device in one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceOutcome {
    /// The device was opened and walked (possibly incompletely)
    Enumerated(EnumResult),
    /// The device could not be opened
    OpenFailed { message: String },
}

/// Report for one device in one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    /// Pass number, starting at 1
    pub pass: usize,
    pub device: DeviceInfo,
    pub outcome: DeviceOutcome,
}

impl DeviceReport {
    /// Opened and walked to the end
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, DeviceOutcome::Enumerated(r) if r.completed)
    }

    pub fn visited_count(&self) -> Option<u64> {
        match &self.outcome {
            DeviceOutcome::Enumerated(r) => Some(r.visited_count),
            DeviceOutcome::OpenFailed { .. } => None,
        }
    }
}

/// Closes a session exactly once, on every exit path
pub struct SessionGuard<S: ContentSession> {
    session: S,
    closed: bool,
}

impl<S: ContentSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    /// Close now and report the outcome
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.session.close()
    }
}

impl<S: ContentSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: ContentSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: ContentSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.session.close() {
                debug!("Failed to close session: {}", e);
            }
        }
    }
}

/// Polls for devices and runs enumeration passes over them
pub struct DeviceDiscovery<'p, P: DeviceProvider> {
    provider: &'p P,
    enumerator: ContentEnumerator,
    access: AccessConfig,
    max_retries: u32,
    retry_delay: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<'p, P: DeviceProvider> DeviceDiscovery<'p, P> {
    /// Defaults: 5 discovery retries, 5 seconds apart
    pub fn new(provider: &'p P, enumerator: ContentEnumerator, access: AccessConfig) -> Self {
        Self {
            provider,
            enumerator,
            access,
            max_retries: 5,
            retry_delay: Duration::from_secs(5),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on shutdown; false if interrupted
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    fn query_count(&self) -> usize {
        match self.provider.device_count() {
            Ok(count) => {
                info!("Device count={}", count);
                count
            }
            Err(e) => {
                debug!("! Failed to get device count: {}", e);
                0
            }
        }
    }

    /// Wait until at least one device is visible
    ///
    /// Performs at most `max_retries` refreshes, sleeping `retry_delay` before
    /// each. Zero devices after that is a normal outcome and returns 0.
    pub fn wait_for_devices(&self, max_retries: u32, retry_delay: Duration) -> usize {
        for attempt in 1..=max_retries {
            let count = self.query_count();
            if count > 0 {
                return count;
            }
            if !self.sleep(retry_delay) {
                return 0;
            }
            debug!("Refreshing device list (attempt {}/{})", attempt, max_retries);
            if let Err(e) = self.provider.refresh() {
                debug!("! Failed to refresh device list: {}", e);
            }
        }

        self.query_count()
    }

    /// Open `device_id`, walk its content tree from the root, release it
    pub fn open_and_enumerate<V>(
        &self,
        device_id: &str,
        access: &AccessConfig,
        visitor: &mut V,
    ) -> Result<EnumResult>
    where
        V: ObjectVisitor<P::Session>,
    {
        let session = SessionGuard::new(self.provider.open(device_id, access)?);
        debug!("Opened device: {}", device_id);

        let root = session.content_root();
        let result = self.enumerator.enumerate(&*session, &root, visitor);

        if let Err(e) = session.close() {
            warn!("Failed to close device '{}': {}", device_id, e);
        }
        Ok(result)
    }

    /// One discovery-and-enumeration cycle over all visible devices
    pub fn run_pass<V>(&self, pass: usize, visitor: &mut V) -> Vec<DeviceReport>
    where
        V: ObjectVisitor<P::Session>,
    {
        let mut reports = Vec::new();

        if self.wait_for_devices(self.max_retries, self.retry_delay) == 0 {
            info!("No portable devices found.");
            return reports;
        }

        let device_ids = match self.provider.device_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to list devices: {}", e);
                return reports;
            }
        };

        for (index, device_id) in device_ids.iter().enumerate() {
            if self.shutdown_requested() {
                info!("Shutdown requested, skipping remaining devices");
                break;
            }
            if device_id.is_empty() {
                continue;
            }

            debug!("{:3}: {}", index, device_id);
            let device = self.provider.device_info(device_id);
            info!("    FriendlyName: {}", device.friendly_name);
            info!("    Manufacturer: {}", device.manufacturer);
            info!("    Description : {}", device.description);

            let outcome = match self.open_and_enumerate(device_id, &self.access, visitor) {
                Ok(result) => {
                    info!("    Content count={}", result.visited_count);
                    DeviceOutcome::Enumerated(result)
                }
                Err(e) => {
                    warn!("    Failed to open device '{}': {}", device.friendly_name, e);
                    DeviceOutcome::OpenFailed {
                        message: e.to_string(),
                    }
                }
            };

            reports.push(DeviceReport {
                pass,
                device,
                outcome,
            });
        }

        reports
    }

    /// Run `passes` cycles (at least one), `pass_interval` apart
    pub fn run<V>(&self, passes: usize, pass_interval: Duration, visitor: &mut V) -> Vec<DeviceReport>
    where
        V: ObjectVisitor<P::Session>,
    {
        let passes = passes.max(1);
        let mut reports = Vec::new();

        for pass in 1..=passes {
            if pass > 1 && !self.sleep(pass_interval) {
                break;
            }
            if passes > 1 {
                info!("Pass {}/{}", pass, passes);
            }
            reports.extend(self.run_pass(pass, visitor));
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EnumError;
    use crate::device::traits::ObjectId;
    use crate::testdb::generator::balanced_tree;
    use crate::testdb::mock_device::{
        MockDeviceConfig, MockDeviceManager, MockFileSystem, MockObject, MockSession,
    };

    fn noop(_: &MockSession, _: &ObjectId, _: usize) -> Result<()> {
        Ok(())
    }

    fn discovery(manager: &MockDeviceManager) -> DeviceDiscovery<'_, MockDeviceManager> {
        DeviceDiscovery::new(manager, ContentEnumerator::new(10), AccessConfig::default())
            .with_retries(5, Duration::ZERO)
    }

    fn small_tree() -> MockFileSystem {
        let mut fs = MockFileSystem::new();
        fs.add_objects(vec![
            MockObject::storage("s1", "Internal Storage"),
            MockObject::folder("dcim", "s1", "DCIM"),
            MockObject::file("img1", "dcim", "IMG_0001.JPG", 10),
        ]);
        fs
    }

    #[test]
    fn test_wait_gives_up_after_max_retries() {
        let manager = MockDeviceManager::new();

        let count = discovery(&manager).wait_for_devices(5, Duration::ZERO);

        assert_eq!(count, 0);
        assert_eq!(manager.stats().refresh_calls, 5);
    }

    #[test]
    fn test_wait_returns_once_devices_appear() {
        let mut manager = MockDeviceManager::new();
        manager.add_device(DeviceInfo::new("dev", "Phone", "Maker", "Model"), small_tree());
        let manager = manager.visible_after_refreshes(2);

        let count = discovery(&manager).wait_for_devices(5, Duration::ZERO);

        assert_eq!(count, 1);
        assert_eq!(manager.stats().refresh_calls, 2);
    }

    #[test]
    fn test_wait_without_retries_does_not_refresh() {
        let manager = MockDeviceManager::new();
        assert_eq!(discovery(&manager).wait_for_devices(0, Duration::ZERO), 0);
        assert_eq!(manager.stats().refresh_calls, 0);
    }

    #[test]
    fn test_open_failure_is_isolated() {
        let mut manager = MockDeviceManager::new();
        manager.add_device(DeviceInfo::new("dev-1", "One", "Maker", "Model"), balanced_tree(2, 3));
        manager.add_device_with_config(
            DeviceInfo::new("dev-2", "Two", "Maker", "Model"),
            small_tree(),
            MockDeviceConfig::locked(),
        );
        manager.add_device(DeviceInfo::new("dev-3", "Three", "Maker", "Model"), small_tree());

        let mut visitor = noop;
        let reports = discovery(&manager).run_pass(1, &mut visitor);

        assert_eq!(reports.len(), 3);
        assert!(reports[0].is_success());
        assert_eq!(reports[0].visited_count(), Some(13));
        assert!(matches!(reports[1].outcome, DeviceOutcome::OpenFailed { .. }));
        assert!(!reports[1].is_success());
        assert!(reports[2].is_success());
        assert_eq!(reports[2].visited_count(), Some(4));
        assert_eq!(reports[2].device.friendly_name, "Three");

        let stats = manager.stats();
        assert_eq!(stats.sessions_opened, 2);
        assert_eq!(stats.sessions_closed, 2);
        assert_eq!(stats.open_handles(), 0);
    }

    #[test]
    fn test_no_devices_is_empty_report() {
        let manager = MockDeviceManager::new();
        let mut visitor = noop;

        let reports = discovery(&manager).run_pass(1, &mut visitor);

        assert!(reports.is_empty());
        assert_eq!(manager.stats().sessions_opened, 0);
    }

    #[test]
    fn test_enumeration_failure_still_closes_session() {
        let mut manager = MockDeviceManager::new();
        manager.add_device_with_config(
            DeviceInfo::new("dev", "Phone", "Maker", "Model"),
            small_tree(),
            MockDeviceConfig::default().with_fetch_errors(&["dcim"]),
        );

        let mut visitor = noop;
        let reports = discovery(&manager).run_pass(1, &mut visitor);

        assert_eq!(reports.len(), 1);
        match &reports[0].outcome {
            DeviceOutcome::Enumerated(result) => {
                assert!(!result.completed);
                assert_eq!(result.visited_count, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(manager.stats().open_handles(), 0);
    }

    #[test]
    fn test_repeated_passes_see_slow_device_populate() {
        let mut manager = MockDeviceManager::new();
        manager.add_device_with_config(
            DeviceInfo::new("dev", "Phone", "Maker", "Model"),
            small_tree(),
            MockDeviceConfig::slow_to_populate(1),
        );

        let mut visitor = noop;
        let reports = discovery(&manager).run(3, Duration::ZERO, &mut visitor);

        let counts: Vec<Option<u64>> = reports.iter().map(|r| r.visited_count()).collect();
        assert_eq!(counts, vec![Some(1), Some(4), Some(4)]);
        let passes: Vec<usize> = reports.iter().map(|r| r.pass).collect();
        assert_eq!(passes, vec![1, 2, 3]);
    }

    #[test]
    fn test_shutdown_stops_before_devices() {
        let mut manager = MockDeviceManager::new();
        manager.add_device(DeviceInfo::new("dev", "Phone", "Maker", "Model"), small_tree());

        let flag = Arc::new(AtomicBool::new(true));
        let mut visitor = noop;
        let reports = discovery(&manager)
            .with_shutdown_flag(flag)
            .run(2, Duration::ZERO, &mut visitor);

        assert!(reports.is_empty());
        assert_eq!(manager.stats().sessions_opened, 0);
    }

    #[test]
    fn test_open_and_enumerate_reports_open_error() {
        let mut manager = MockDeviceManager::new();
        manager.add_device_with_config(
            DeviceInfo::new("dev", "Phone", "Maker", "Model"),
            small_tree(),
            MockDeviceConfig::locked(),
        );

        let mut visitor = noop;
        let result =
            discovery(&manager).open_and_enumerate("dev", &AccessConfig::default(), &mut visitor);

        assert!(matches!(result, Err(EnumError::AccessDenied)));
    }

    #[test]
    fn test_report_serializes_with_status_tag() {
        let report = DeviceReport {
            pass: 1,
            device: DeviceInfo::new("dev", "Phone", "Maker", "Model"),
            outcome: DeviceOutcome::OpenFailed {
                message: "Access denied".to_string(),
            },
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "open_failed");
        assert_eq!(json["device"]["friendly_name"], "Phone");
    }
}
