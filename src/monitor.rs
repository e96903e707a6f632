//! Display enumeration and point-to-monitor resolution.
//!
//! The monitor set is re-enumerated on every capture because the display
//! topology can change between captures (monitors plugged, unplugged, or
//! rearranged while the tool runs in the background).

use thiserror::Error;

use windows::Win32::Foundation::{BOOL, LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{EnumDisplayMonitors, HDC, HMONITOR};
use windows::Win32::UI::HiDpi::{
    DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2, SetProcessDpiAwarenessContext,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
};
/// A display rectangle in virtual-desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Monitor {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Monitor {
    /// Half-open containment test: `x <= px < x + width` on both axes.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Enumeration yielded an empty monitor set.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no monitors enumerated")]
pub struct NoMonitors;

/// Raises the process DPI awareness so monitor rectangles and the cursor
/// position are physical virtual-desktop coordinates. Call once at startup;
/// the call fails harmlessly if awareness was already set.
pub fn enable_dpi_awareness() {
    unsafe {
        let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
    }
}

/// Enumerates the current display rectangles in enumeration order.
/// Returns an empty vector if enumeration fails outright.
pub fn enumerate() -> Vec<Monitor> {
    unsafe extern "system" fn monitor_enum_proc(
        _hmonitor: HMONITOR,
        _hdc: HDC,
        rect: *mut RECT,
        lparam: LPARAM,
    ) -> BOOL {
        unsafe {
            let monitors = &mut *(lparam.0 as *mut Vec<Monitor>);
            if let Some(r) = rect.as_ref() {
                monitors.push(Monitor {
                    x: r.left,
                    y: r.top,
                    width: r.right - r.left,
                    height: r.bottom - r.top,
                });
            }
            BOOL(1) // continue enumeration
        }
    }

    let mut monitors: Vec<Monitor> = Vec::new();
    unsafe {
        let _ = EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(monitor_enum_proc),
            LPARAM(&mut monitors as *mut _ as isize),
        );
    }
    monitors
}

/// Resolves a point to a monitor: the first enumerated rectangle containing
/// the point, else the first enumerated monitor. Fails only when the set is
/// empty.
pub fn locate(px: i32, py: i32, monitors: &[Monitor]) -> Result<Monitor, NoMonitors> {
    monitors
        .iter()
        .find(|m| m.contains(px, py))
        .or_else(|| monitors.first())
        .copied()
        .ok_or(NoMonitors)
}

/// Returns the bounding rectangle of the whole virtual desktop, used as the
/// fallback grab target. `None` when the metrics report a zero-sized desktop.
pub fn virtual_desktop() -> Option<Monitor> {
    let vd = unsafe {
        Monitor {
            x: GetSystemMetrics(SM_XVIRTUALSCREEN),
            y: GetSystemMetrics(SM_YVIRTUALSCREEN),
            width: GetSystemMetrics(SM_CXVIRTUALSCREEN),
            height: GetSystemMetrics(SM_CYVIRTUALSCREEN),
        }
    };
    (vd.width > 0 && vd.height > 0).then_some(vd)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDE: Monitor = Monitor { x: 0, y: 0, width: 1920, height: 1080 };
    const LEFT: Monitor = Monitor { x: -1280, y: 0, width: 1280, height: 1024 };

    #[test]
    fn test_locate_returns_containing_monitor() {
        let monitors = [WIDE, LEFT];
        assert_eq!(locate(100, 100, &monitors), Ok(WIDE));
        assert_eq!(locate(-640, 512, &monitors), Ok(LEFT));
    }

    #[test]
    fn test_locate_prefers_enumeration_order() {
        // Overlapping rectangles: the first hit wins.
        let shifted = Monitor { x: 1000, y: 0, width: 1920, height: 1080 };
        let monitors = [WIDE, shifted];
        assert_eq!(locate(1500, 500, &monitors), Ok(WIDE));
    }

    #[test]
    fn test_locate_outside_all_falls_back_to_first() {
        let monitors = [WIDE];
        assert_eq!(locate(-50, -50, &monitors), Ok(WIDE));
        assert_eq!(locate(5000, 5000, &monitors), Ok(WIDE));
    }

    #[test]
    fn test_locate_empty_set_fails() {
        assert_eq!(locate(0, 0, &[]), Err(NoMonitors));
    }

    #[test]
    fn test_containment_edges_are_half_open() {
        assert!(WIDE.contains(0, 0));
        assert!(WIDE.contains(1919, 1079));
        assert!(!WIDE.contains(1920, 0));
        assert!(!WIDE.contains(0, 1080));
        assert!(!WIDE.contains(-1, 0));
    }

    /// Enumeration sanity check against the live display set. Windows-only
    /// and skipped gracefully in headless sessions (empty set allowed there
    /// would defeat the assertion, so only the shape of each entry is
    /// verified).
    #[test]
    #[cfg(windows)]
    fn test_enumeration_yields_valid_rectangles() {
        enable_dpi_awareness();
        for m in enumerate() {
            assert!(m.width > 0, "monitor width must be positive");
            assert!(m.height > 0, "monitor height must be positive");
        }
    }
}
