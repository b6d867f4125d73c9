//! Progress and console output utilities for the CLI
//!
//! Key features:
//! - A spinner that counts objects while a device is walked
//! - Console helpers for the end-of-run summary
//! - A log writer that tees to the console and a file

use crate::core::enumerator::ObjectVisitor;
use crate::core::error::Result;
use crate::device::traits::{ContentSession, ObjectId};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// Styles
// ============================================================================

/// Get the spinner style for walk operations
fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

// ============================================================================
// Console output helpers
// ============================================================================

/// Print a header section with a box
pub fn print_header(title: &str) {
    let width = 68;
    let title_padded = format!("{:^width$}", title, width = width - 4);
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{}║", title_padded);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

/// Print a success message with checkmark
pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("  ⚠ {}", msg);
}

/// Print an error message
pub fn print_error(msg: &str) {
    println!("  ✗ {}", msg);
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

// ============================================================================
// Spinner for device walks
// ============================================================================

/// Spinner showing how many objects the current walk has visited
pub struct ScanSpinner {
    spinner: ProgressBar,
    visited: AtomicUsize,
    total: AtomicUsize,
    start_time: Instant,
    last_update: Mutex<Instant>,
    update_interval: Duration,
}

impl ScanSpinner {
    /// Create a spinner; a hidden one draws nothing (used with verbose logs)
    pub fn new(hidden: bool) -> Self {
        let spinner = if hidden {
            ProgressBar::hidden()
        } else {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(spinner_style());
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        };
        spinner.set_message("Waiting for devices...");

        Self {
            spinner,
            visited: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            start_time: Instant::now(),
            last_update: Mutex::new(Instant::now()),
            update_interval: Duration::from_millis(250), // Throttle updates
        }
    }

    /// Count one visited object; depth 0 starts a new device walk
    pub fn record_visit(&self, depth: usize) {
        if depth == 0 {
            self.visited.store(0, Ordering::Relaxed);
        }
        self.visited.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        self.maybe_update_message();
    }

    /// Update the progress message if enough time has passed
    fn maybe_update_message(&self) {
        let now = Instant::now();
        let should_update = match self.last_update.lock() {
            Ok(mut last) if now.duration_since(*last) >= self.update_interval => {
                *last = now;
                true
            }
            _ => false,
        };

        if should_update {
            self.spinner.set_message(format!(
                "Walking device: {} objects ({:.0}s)",
                self.visited.load(Ordering::Relaxed),
                self.start_time.elapsed().as_secs()
            ));
        }
    }

    /// Finish the progress display with a summary
    pub fn finish(&self) {
        self.spinner.finish_with_message(format!(
            "✓ Visited {} objects ({})",
            self.total.load(Ordering::Relaxed),
            format_duration(self.start_time.elapsed())
        ));
    }

    /// Objects visited across all walks so far
    pub fn total_visited(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}

/// Visitor that ticks a [`ScanSpinner`] before handing off to `inner`
pub struct SpinnerVisitor<'a, V> {
    spinner: &'a ScanSpinner,
    inner: V,
}

impl<'a, V> SpinnerVisitor<'a, V> {
    pub fn new(spinner: &'a ScanSpinner, inner: V) -> Self {
        Self { spinner, inner }
    }

    pub fn into_inner(self) -> V {
        self.inner
    }
}

impl<S, V> ObjectVisitor<S> for SpinnerVisitor<'_, V>
where
    S: ContentSession,
    V: ObjectVisitor<S>,
{
    fn visit(&mut self, session: &S, object: &ObjectId, depth: usize) -> Result<()> {
        self.spinner.record_visit(depth);
        self.inner.visit(session, object, depth)
    }
}

// ============================================================================
// Dual writer for file + console logging
// ============================================================================

/// A writer that writes to both console and file
///
/// Used for logging to both stderr and a log file simultaneously.
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enumerator::ContentEnumerator;
    use crate::core::error::EnumError;
    use crate::device::traits::{AccessConfig, DeviceInfo, DeviceProvider};
    use crate::testdb::mock_device::{MockDeviceManager, MockSession};
    use crate::testdb::scenarios::ScenarioLibrary;
    use std::io::Read;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30.0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m");
    }

    #[test]
    fn test_spinner_visitor_counts_and_forwards() {
        let scenario = ScenarioLibrary::example_tree();
        let mut manager = MockDeviceManager::new();
        for device in &scenario.devices {
            manager.add_device(device.info.clone(), device.file_system.clone());
        }
        let session = manager.open("usb#example", &AccessConfig::default()).unwrap();

        let spinner = ScanSpinner::new(true);
        let mut seen = 0;
        let inner = |_: &MockSession, _: &ObjectId, _: usize| -> Result<()> {
            seen += 1;
            Ok(())
        };
        let mut visitor = SpinnerVisitor::new(&spinner, inner);
        let result =
            ContentEnumerator::new(2).enumerate(&session, &ObjectId::device_root(), &mut visitor);
        drop(visitor);

        assert!(result.completed);
        assert_eq!(spinner.total_visited(), 5);
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_spinner_visitor_propagates_inner_error() {
        let mut manager = MockDeviceManager::new();
        manager.add_device(
            DeviceInfo::new("dev", "Phone", "Maker", "Model"),
            ScenarioLibrary::example_tree().devices[0].file_system.clone(),
        );
        let session = manager.open("dev", &AccessConfig::default()).unwrap();

        let spinner = ScanSpinner::new(true);
        let inner = |_: &MockSession, _: &ObjectId, _: usize| -> Result<()> {
            Err(EnumError::Interrupted)
        };
        let mut visitor = SpinnerVisitor::new(&spinner, inner);
        let result =
            ContentEnumerator::new(2).enumerate(&session, &ObjectId::device_root(), &mut visitor);

        assert!(!result.completed);
        assert_eq!(spinner.total_visited(), 1);
    }

    #[test]
    fn test_dual_writer_writes_file() {
        let mut file = tempfile::tempfile().unwrap();
        {
            let mut writer = DualWriter {
                console: std::io::stderr(),
                file: file.try_clone().unwrap(),
            };
            writeln!(writer, "hello log").unwrap();
            writer.flush().unwrap();
        }

        use std::io::Seek;
        file.rewind().unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello log\n");
    }
}
