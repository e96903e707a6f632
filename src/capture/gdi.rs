//! GDI screen grabbing with scoped resource guards.
//!
//! Every device context, memory surface, and bitmap handle is wrapped in a
//! guard that releases it on drop, so the grab path cannot leak handles on
//! any exit, including the error paths.

use anyhow::{Context, Result, anyhow};
use image::RgbImage;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BITMAPINFO, BITMAPINFOHEADER, BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DIB_RGB_COLORS,
    DeleteDC, DeleteObject, GetDIBits, GetWindowDC, HBITMAP, HDC, HGDIOBJ, ReleaseDC, SRCCOPY,
    SelectObject,
};
use windows::Win32::UI::WindowsAndMessaging::GetDesktopWindow;

use crate::monitor::Monitor;

use super::pixels;

/// The desktop window's device context.
pub(super) struct DesktopDc {
    hwnd: HWND,
    pub(super) hdc: HDC,
}

impl DesktopDc {
    pub(super) fn acquire() -> Result<Self> {
        let hwnd = unsafe { GetDesktopWindow() };
        let hdc = unsafe { GetWindowDC(hwnd) };
        if hdc.is_invalid() {
            return Err(anyhow!("GetWindowDC failed for the desktop window"));
        }
        Ok(Self { hwnd, hdc })
    }
}

impl Drop for DesktopDc {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(self.hwnd, self.hdc);
        }
    }
}

/// A memory device context compatible with a source surface.
struct MemoryDc {
    hdc: HDC,
}

impl MemoryDc {
    fn compatible(source: HDC) -> Result<Self> {
        let hdc = unsafe { CreateCompatibleDC(source) };
        if hdc.is_invalid() {
            return Err(anyhow!("CreateCompatibleDC failed"));
        }
        Ok(Self { hdc })
    }
}

impl Drop for MemoryDc {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteDC(self.hdc);
        }
    }
}

/// A GDI bitmap compatible with a source surface.
struct Bitmap {
    handle: HBITMAP,
}

impl Bitmap {
    fn compatible(source: HDC, width: i32, height: i32) -> Result<Self> {
        let handle = unsafe { CreateCompatibleBitmap(source, width, height) };
        if handle.is_invalid() {
            return Err(anyhow!("CreateCompatibleBitmap failed ({}x{})", width, height));
        }
        Ok(Self { handle })
    }
}

impl Drop for Bitmap {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteObject(HGDIOBJ(self.handle.0));
        }
    }
}

/// Keeps a bitmap selected into a DC, restoring the previous selection on
/// drop. The bitmap must be deselected before `GetDIBits` reads it.
struct Selection {
    dc: HDC,
    previous: HGDIOBJ,
}

impl Selection {
    fn select(dc: HDC, bitmap: &Bitmap) -> Result<Self> {
        let previous = unsafe { SelectObject(dc, HGDIOBJ(bitmap.handle.0)) };
        if previous.is_invalid() {
            return Err(anyhow!("SelectObject failed"));
        }
        Ok(Self { dc, previous })
    }
}

impl Drop for Selection {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
        }
    }
}

/// Block-copies one screen rectangle into a normalized top-down RGB image.
pub fn grab_rect(rect: &Monitor) -> Result<RgbImage> {
    if rect.width <= 0 || rect.height <= 0 {
        return Err(anyhow!("degenerate grab rectangle {:?}", rect));
    }

    let desktop = DesktopDc::acquire()?;
    let memory = MemoryDc::compatible(desktop.hdc)?;
    let bitmap = Bitmap::compatible(desktop.hdc, rect.width, rect.height)?;

    {
        let _selected = Selection::select(memory.hdc, &bitmap)?;
        unsafe {
            BitBlt(
                memory.hdc,
                0,
                0,
                rect.width,
                rect.height,
                desktop.hdc,
                rect.x,
                rect.y,
                SRCCOPY,
            )
            .context("BitBlt failed")?;
        }
    }

    let raw = read_dib(desktop.hdc, bitmap.handle, rect.width, rect.height)?;
    let stride = rect.width as usize * 4;
    pixels::bgrx_bottom_up_to_rgb(&raw, rect.width as u32, rect.height as u32, stride)
        .ok_or_else(|| anyhow!("DIB buffer did not match the requested layout"))
}

/// Reads a bitmap's pixels as bottom-up 32bpp BGRX rows.
pub(super) fn read_dib(dc: HDC, bitmap: HBITMAP, width: i32, height: i32) -> Result<Vec<u8>> {
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            // Positive height requests the native bottom-up row order; the
            // normalizer flips it.
            biHeight: height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: 0, // BI_RGB
            ..Default::default()
        },
        ..Default::default()
    };

    let mut raw = vec![0u8; width as usize * 4 * height as usize];
    let copied = unsafe {
        GetDIBits(
            dc,
            bitmap,
            0,
            height as u32,
            Some(raw.as_mut_ptr() as *mut _),
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    if copied != height {
        return Err(anyhow!("GetDIBits copied {} of {} scan lines", copied, height));
    }
    Ok(raw)
}
