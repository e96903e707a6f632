//! The capture pipeline: attribute, target, grab, normalize, encode, write.
//!
//! A capture attempt never terminates the process. Everything after monitor
//! resolution is best-effort: a failed monitor grab falls back to one
//! whole-virtual-desktop grab, and hook failures are logged without touching
//! the reported outcome.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use thiserror::Error;

use windows::Win32::Foundation::{POINT, RECT};
use windows::Win32::UI::WindowsAndMessaging::{GetCursorPos, GetForegroundWindow, GetWindowRect};

use crate::monitor::{self, Monitor, NoMonitors};
use crate::process::{self, ProcessInfo};

use super::gdi;
use super::hooks::CaptureHook;

/// What initiated a capture, which also selects how the owning process is
/// attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Window under the cursor; the cursor position targets the monitor.
    Cursor,
    /// Foreground window; its center targets the monitor.
    Foreground,
}

/// One capture trigger, pinned to the origin point observed at trigger time.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest {
    pub origin: (i32, i32),
    pub trigger_kind: TriggerKind,
}

impl CaptureRequest {
    /// Builds a cursor-based request from the current cursor position.
    pub fn at_cursor() -> Self {
        Self {
            origin: cursor_position().unwrap_or((0, 0)),
            trigger_kind: TriggerKind::Cursor,
        }
    }

    /// Builds a foreground-based request targeting the monitor under the
    /// active window's center, falling back to the cursor when no window is
    /// available.
    pub fn for_foreground() -> Self {
        let origin = foreground_center()
            .or_else(cursor_position)
            .unwrap_or((0, 0));
        Self { origin, trigger_kind: TriggerKind::Foreground }
    }
}

/// A completed capture, as reported to the caller and to hooks.
#[derive(Debug)]
pub struct CaptureOutcome {
    /// Path of the written PNG.
    pub path: PathBuf,
    /// Process folder containing it.
    pub directory: PathBuf,
    /// Monitor (or virtual desktop, on fallback) that was grabbed.
    pub monitor: Monitor,
    /// Attribution result.
    pub process: ProcessInfo,
    /// True when the whole-desktop fallback produced the image.
    pub used_fallback: bool,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    MonitorResolution(#[from] NoMonitors),
    /// Both the monitor grab and the whole-desktop fallback failed.
    #[error("screen grab failed: {0}")]
    Backend(#[source] anyhow::Error),
    #[error("could not write capture to {path}: {source}")]
    EncodeOrWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Performs captures and runs the registered post-capture hooks.
pub struct CaptureEngine {
    hooks: Vec<Box<dyn CaptureHook>>,
}

impl CaptureEngine {
    pub fn new(hooks: Vec<Box<dyn CaptureHook>>) -> Self {
        Self { hooks }
    }

    /// Captures per the request and archives the PNG under
    /// `{base_dir}/{process}/{yyyyMMdd_HHmmss}.png`.
    pub fn capture(
        &self,
        request: &CaptureRequest,
        base_dir: &Path,
    ) -> Result<CaptureOutcome, CaptureError> {
        let process = match request.trigger_kind {
            TriggerKind::Cursor => process::resolve_at_point(request.origin.0, request.origin.1),
            TriggerKind::Foreground => process::resolve_foreground(),
        };

        // Re-enumerated every capture; the topology may have changed.
        let monitors = monitor::enumerate();
        let target = monitor::locate(request.origin.0, request.origin.1, &monitors)?;

        let (image, grabbed, used_fallback) = match gdi::grab_rect(&target) {
            Ok(image) => (image, target, false),
            Err(primary) => {
                crate::log(&format!(
                    "Monitor grab failed ({}), falling back to virtual desktop",
                    primary
                ));
                let desktop = monitor::virtual_desktop()
                    .ok_or_else(|| CaptureError::Backend(primary))?;
                let image = gdi::grab_rect(&desktop).map_err(CaptureError::Backend)?;
                (image, desktop, true)
            }
        };

        let timestamp = Local::now();
        let directory = base_dir.join(process.name.dir_name());
        std::fs::create_dir_all(&directory).map_err(|e| CaptureError::EncodeOrWrite {
            path: directory.clone(),
            source: e.into(),
        })?;

        // One-second resolution; a second trigger within the same second
        // overwrites the first (documented limitation).
        let path = directory.join(format!("{}.png", timestamp.format("%Y%m%d_%H%M%S")));
        image.save(&path).map_err(|e| CaptureError::EncodeOrWrite {
            path: path.clone(),
            source: e.into(),
        })?;

        let outcome = CaptureOutcome {
            path,
            directory,
            monitor: grabbed,
            process,
            used_fallback,
            timestamp,
        };
        self.run_hooks(&outcome);
        Ok(outcome)
    }

    fn run_hooks(&self, outcome: &CaptureOutcome) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_capture(outcome) {
                crate::log(&format!("Post-capture hook \"{}\" failed: {}", hook.name(), e));
            }
        }
    }
}

fn cursor_position() -> Option<(i32, i32)> {
    let mut pt = POINT::default();
    unsafe { GetCursorPos(&mut pt) }.ok().map(|_| (pt.x, pt.y))
}

fn foreground_center() -> Option<(i32, i32)> {
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.0.is_null() {
        return None;
    }
    let mut rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut rect) }.ok()?;
    Some(((rect.left + rect.right) / 2, (rect.top + rect.bottom) / 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessName;

    struct FailingHook;

    impl CaptureHook for FailingHook {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn after_capture(&self, _outcome: &CaptureOutcome) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    #[test]
    fn test_hook_failure_does_not_change_outcome() {
        let engine = CaptureEngine::new(vec![Box::new(FailingHook)]);
        let outcome = CaptureOutcome {
            path: PathBuf::from("a.png"),
            directory: PathBuf::from("."),
            monitor: Monitor { x: 0, y: 0, width: 1, height: 1 },
            process: ProcessInfo { name: ProcessName::UnknownProcess, image_path: None },
            used_fallback: false,
            timestamp: Local::now(),
        };
        // Must not panic or propagate.
        engine.run_hooks(&outcome);
    }

    #[test]
    fn test_archive_filename_has_second_resolution() {
        let timestamp = Local::now();
        let name = format!("{}.png", timestamp.format("%Y%m%d_%H%M%S"));
        // yyyyMMdd_HHmmss.png
        assert_eq!(name.len(), "20250101_120000.png".len());
        assert!(name.ends_with(".png"));
        assert_eq!(name.as_bytes()[8], b'_');
    }

    /// Zero monitors must abort with the monitor-resolution error before any
    /// file I/O happens.
    #[test]
    fn test_zero_monitors_reports_resolution_error() {
        let result = monitor::locate(10, 10, &[]);
        let err = CaptureError::from(result.unwrap_err());
        assert!(matches!(err, CaptureError::MonitorResolution(_)));
    }
}
