//! Global hotkey backend built on `RegisterHotKey`.

use anyhow::Context;

use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Input::KeyboardAndMouse::{MOD_NOREPEAT, RegisterHotKey, UnregisterHotKey};

use crate::capture::TriggerKind;
use crate::keys::LogicalKey;

use super::{HOTKEY_ID, KeyTrigger, TriggerError, TriggerSignal};

/// Registers a no-repeat system-wide hotkey on the owning window. Activation
/// arrives as `WM_HOTKEY` on the owning thread's pump.
pub struct HotkeyBackend {
    owner: HWND,
    registered: bool,
}

impl HotkeyBackend {
    pub fn new(owner: HWND) -> Self {
        Self { owner, registered: false }
    }
}

impl KeyTrigger for HotkeyBackend {
    fn arm(&mut self, key: LogicalKey) -> Result<(), TriggerError> {
        self.disarm();
        unsafe { RegisterHotKey(self.owner, HOTKEY_ID, MOD_NOREPEAT, key.vk()) }
            .with_context(|| format!("RegisterHotKey({})", key))
            .map_err(TriggerError::Registration)?;
        self.registered = true;
        Ok(())
    }

    fn disarm(&mut self) {
        if self.registered {
            unsafe {
                let _ = UnregisterHotKey(self.owner, HOTKEY_ID);
            }
            self.registered = false;
        }
    }

    fn kind(&self) -> TriggerKind {
        // Hotkey-triggered captures attribute and target the foreground
        // window rather than whatever sits under the cursor.
        TriggerKind::Foreground
    }

    fn on_signal(&mut self, signal: &TriggerSignal) -> bool {
        matches!(signal, TriggerSignal::Hotkey { id } if *id == HOTKEY_ID && self.registered)
    }

    fn describe(&self) -> &'static str {
        "global hotkey"
    }
}

impl Drop for HotkeyBackend {
    fn drop(&mut self) {
        self.disarm();
    }
}
