//! Process attribution: maps a screen point or the foreground window to the
//! owning process name.
//!
//! Resolution never fails: every unavailable or erroring lookup collapses
//! into one of three sentinel names so the capture pipeline always has a
//! directory to archive under.

use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;

use windows::Win32::Foundation::{CloseHandle, HWND, POINT};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, QueryFullProcessImageNameW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GA_ROOT, GetAncestor, GetForegroundWindow, GetWindowThreadProcessId, WindowFromPoint,
};
use windows::core::PWSTR;

/// Sentinel names used when real attribution fails.
pub const NO_ACTIVE_WINDOW: &str = "NoActiveWindow";
pub const UNKNOWN_PROCESS: &str = "UnknownProcess";
pub const ERROR_PROCESS: &str = "ErrorProcess";

/// The owning process of a capture target, or a sentinel when attribution
/// was not possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessName {
    /// Executable file stem with the `.exe` suffix stripped.
    Resolved(String),
    /// No window was found at the point / no foreground window exists.
    NoActiveWindow,
    /// The window's process could not be opened or queried.
    UnknownProcess,
    /// Any other attribution failure.
    ErrorProcess,
}

impl ProcessName {
    /// The archive folder name for this process.
    pub fn dir_name(&self) -> &str {
        match self {
            Self::Resolved(name) => name,
            Self::NoActiveWindow => NO_ACTIVE_WINDOW,
            Self::UnknownProcess => UNKNOWN_PROCESS,
            Self::ErrorProcess => ERROR_PROCESS,
        }
    }
}

impl std::fmt::Display for ProcessName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Attribution result: the (possibly sentinel) name plus the full executable
/// path when it was available, for best-effort icon extraction.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub name: ProcessName,
    pub image_path: Option<PathBuf>,
}

impl ProcessInfo {
    fn sentinel(name: ProcessName) -> Self {
        Self { name, image_path: None }
    }
}

/// Resolves the process owning the topmost window at a screen point.
pub fn resolve_at_point(px: i32, py: i32) -> ProcessInfo {
    let hwnd = unsafe { WindowFromPoint(POINT { x: px, y: py }) };
    if hwnd.0.is_null() {
        return ProcessInfo::sentinel(ProcessName::NoActiveWindow);
    }
    // WindowFromPoint can land on a child control; attribution uses the
    // top-level window that owns it.
    let root = unsafe { GetAncestor(hwnd, GA_ROOT) };
    resolve_window(if root.0.is_null() { hwnd } else { root })
}

/// Resolves the process owning the current foreground window. Used for
/// hotkey-triggered captures.
pub fn resolve_foreground() -> ProcessInfo {
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.0.is_null() {
        return ProcessInfo::sentinel(ProcessName::NoActiveWindow);
    }
    resolve_window(hwnd)
}

/// Shared derivation: window → process id → executable image → name.
fn resolve_window(hwnd: HWND) -> ProcessInfo {
    let mut process_id: u32 = 0;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut process_id)) };
    if process_id == 0 {
        return ProcessInfo::sentinel(ProcessName::ErrorProcess);
    }

    let handle = match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id) }
    {
        Ok(handle) => handle,
        Err(_) => return ProcessInfo::sentinel(ProcessName::UnknownProcess),
    };

    let mut name_buf: Vec<u16> = vec![0; 1024];
    let mut len = name_buf.len() as u32;
    let result = unsafe {
        QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(name_buf.as_mut_ptr()),
            &mut len,
        )
    };
    let _ = unsafe { CloseHandle(handle) };

    if result.is_err() || len == 0 {
        return ProcessInfo::sentinel(ProcessName::UnknownProcess);
    }

    let full_path = OsString::from_wide(&name_buf[..len as usize])
        .to_string_lossy()
        .to_string();
    let file_name = full_path.rsplit('\\').next().unwrap_or(&full_path);
    let stem = strip_executable_suffix(file_name);
    if stem.is_empty() {
        return ProcessInfo::sentinel(ProcessName::ErrorProcess);
    }

    ProcessInfo {
        name: ProcessName::Resolved(stem),
        image_path: Some(PathBuf::from(full_path)),
    }
}

/// Strips a trailing `.exe` (case-insensitive) from an executable file name.
pub(crate) fn strip_executable_suffix(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    match lower.strip_suffix(".exe") {
        Some(_) => file_name[..file_name.len() - 4].to_string(),
        None => file_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_name_for_all_variants() {
        assert_eq!(
            ProcessName::Resolved("notepad".to_string()).dir_name(),
            "notepad"
        );
        assert_eq!(ProcessName::NoActiveWindow.dir_name(), "NoActiveWindow");
        assert_eq!(ProcessName::UnknownProcess.dir_name(), "UnknownProcess");
        assert_eq!(ProcessName::ErrorProcess.dir_name(), "ErrorProcess");
    }

    #[test]
    fn test_strip_executable_suffix() {
        assert_eq!(strip_executable_suffix("notepad.exe"), "notepad");
        assert_eq!(strip_executable_suffix("Code.EXE"), "Code");
        // Only the suffix is stripped, not interior occurrences.
        assert_eq!(strip_executable_suffix("exe.exe"), "exe");
        assert_eq!(strip_executable_suffix("bash"), "bash");
        assert_eq!(strip_executable_suffix(""), "");
    }

    /// The foreground resolver must yield a sentinel rather than fail even
    /// in sessions with no interactive desktop.
    #[test]
    #[cfg(windows)]
    fn test_resolve_foreground_never_fails() {
        let info = resolve_foreground();
        match info.name {
            ProcessName::Resolved(name) => assert!(!name.is_empty()),
            ProcessName::NoActiveWindow
            | ProcessName::UnknownProcess
            | ProcessName::ErrorProcess => {}
        }
    }
}
