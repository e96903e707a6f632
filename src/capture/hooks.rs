//! Best-effort post-capture side effects.
//!
//! Hooks run after the archive file has been written. A hook failure is
//! logged and never changes the capture's reported outcome.

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use windows::Win32::Graphics::Gdi::{BITMAP, DeleteObject, GetObjectW, HBITMAP, HGDIOBJ};
use windows::Win32::Storage::FileSystem::FILE_FLAGS_AND_ATTRIBUTES;
use windows::Win32::UI::Shell::{SHFILEINFOW, SHGFI_ICON, SHGetFileInfoW};
use windows::Win32::UI::WindowsAndMessaging::{
    DestroyIcon, GetIconInfo, HICON, ICONINFO, MB_ICONASTERISK, MessageBeep,
};
use windows::core::PCWSTR;

use super::engine::CaptureOutcome;
use super::gdi;

/// A post-capture side effect. Implementations must be cheap; they run on
/// the capture's thread after the file is on disk.
pub trait CaptureHook {
    fn name(&self) -> &'static str;
    fn after_capture(&self, outcome: &CaptureOutcome) -> Result<()>;
}

/// Plays the system asterisk cue once per completed capture.
pub struct AudioCueHook;

impl CaptureHook for AudioCueHook {
    fn name(&self) -> &'static str {
        "audio cue"
    }

    fn after_capture(&self, _outcome: &CaptureOutcome) -> Result<()> {
        unsafe { MessageBeep(MB_ICONASTERISK) }.context("MessageBeep failed")?;
        Ok(())
    }
}

/// Writes the owning process's associated icon as `icon.png` next to the
/// archived captures, once per process folder.
pub struct ProcessIconHook;

impl CaptureHook for ProcessIconHook {
    fn name(&self) -> &'static str {
        "process icon"
    }

    fn after_capture(&self, outcome: &CaptureOutcome) -> Result<()> {
        let Some(exe) = &outcome.process.image_path else {
            return Ok(());
        };
        let icon_path = outcome.directory.join("icon.png");
        if icon_path.exists() {
            return Ok(());
        }
        let icon = extract_icon_rgba(exe)?;
        icon.save(&icon_path)
            .with_context(|| format!("writing {}", icon_path.display()))?;
        Ok(())
    }
}

struct IconGuard(HICON);

impl Drop for IconGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyIcon(self.0);
        }
    }
}

struct BitmapGuard(HBITMAP);

impl Drop for BitmapGuard {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = DeleteObject(HGDIOBJ(self.0.0));
            }
        }
    }
}

/// Extracts the executable's associated icon into an RGBA image.
fn extract_icon_rgba(exe: &Path) -> Result<RgbaImage> {
    let wide: Vec<u16> = exe
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let mut file_info = SHFILEINFOW::default();
    let found = unsafe {
        SHGetFileInfoW(
            PCWSTR(wide.as_ptr()),
            FILE_FLAGS_AND_ATTRIBUTES(0),
            Some(&mut file_info),
            std::mem::size_of::<SHFILEINFOW>() as u32,
            SHGFI_ICON,
        )
    };
    if found == 0 || file_info.hIcon.is_invalid() {
        return Err(anyhow!("no associated icon for {}", exe.display()));
    }
    let icon = IconGuard(file_info.hIcon);

    let mut info = ICONINFO::default();
    unsafe { GetIconInfo(icon.0, &mut info) }.context("GetIconInfo failed")?;
    let color = BitmapGuard(info.hbmColor);
    let _mask = BitmapGuard(info.hbmMask);
    if color.0.is_invalid() {
        return Err(anyhow!("icon has no color bitmap"));
    }

    let mut bm = BITMAP::default();
    let copied = unsafe {
        GetObjectW(
            HGDIOBJ(color.0.0),
            std::mem::size_of::<BITMAP>() as i32,
            Some(&mut bm as *mut _ as *mut _),
        )
    };
    if copied == 0 || bm.bmWidth <= 0 || bm.bmHeight <= 0 {
        return Err(anyhow!("could not describe icon bitmap"));
    }

    let desktop = gdi::DesktopDc::acquire()?;
    let raw = gdi::read_dib(desktop.hdc, color.0, bm.bmWidth, bm.bmHeight)?;
    bgra_bottom_up_to_rgba(&raw, bm.bmWidth as u32, bm.bmHeight as u32)
        .ok_or_else(|| anyhow!("icon bitmap did not match the requested layout"))
}

/// Converts bottom-up BGRA rows into a top-down RGBA image, preserving the
/// icon's alpha channel.
fn bgra_bottom_up_to_rgba(raw: &[u8], width: u32, height: u32) -> Option<RgbaImage> {
    let stride = width as usize * 4;
    if width == 0 || height == 0 || raw.len() < stride * height as usize {
        return None;
    }
    let mut rgba = Vec::with_capacity(stride * height as usize);
    for y in 0..height {
        let src_y = (height - 1 - y) as usize;
        let row = &raw[src_y * stride..(src_y + 1) * stride];
        for px in row.chunks_exact(4) {
            rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }
    RgbaImage::from_raw(width, height, rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_conversion_flips_and_keeps_alpha() {
        // 1x2 bottom-up BGRA: stored first row is the bottom.
        let raw = vec![
            1, 2, 3, 128, // bottom pixel
            4, 5, 6, 255, // top pixel
        ];
        let img = bgra_bottom_up_to_rgba(&raw, 1, 2).expect("valid buffer");
        assert_eq!(img.get_pixel(0, 0).0, [6, 5, 4, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [3, 2, 1, 128]);
    }

    #[test]
    fn test_bgra_conversion_rejects_short_buffer() {
        assert!(bgra_bottom_up_to_rgba(&[0; 7], 1, 2).is_none());
    }
}
