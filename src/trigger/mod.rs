//! Capture triggers: the global hotkey and the raw keyboard listener,
//! unified behind one `KeyTrigger` contract.
//!
//! Both backends deliver activations through the owning thread's message
//! pump; `TriggerController` turns each delivery into at most one capture
//! kind. The hotkey backend is preferred; when registration is unavailable
//! (for example without sufficient rights) the controller falls back to the
//! raw listener.

mod hotkey;
mod listener;

pub use hotkey::HotkeyBackend;
pub use listener::{RawListenerBackend, WM_RAW_KEY_WAKE};

use thiserror::Error;

use windows::Win32::Foundation::HWND;

use crate::capture::TriggerKind;
use crate::keys::LogicalKey;

/// Hotkey identifier registered on the owning window.
pub const HOTKEY_ID: i32 = 1;

#[derive(Debug, Error)]
pub enum TriggerError {
    /// The requested name maps to no supported logical key.
    #[error("unsupported key \"{0}\"")]
    UnsupportedKey(String),
    /// The platform refused the registration or the listener hook.
    #[error("trigger registration failed: {0}")]
    Registration(#[source] anyhow::Error),
}

/// A pump-delivered event that may activate the armed trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSignal {
    /// `WM_HOTKEY` arrived with this identifier.
    Hotkey { id: i32 },
    /// The raw listener posted its wake message; queued key events are
    /// waiting in the channel.
    RawKey,
    /// Manual command (tray menu or `trigger_capture_now`).
    Manual,
}

/// One interchangeable trigger mechanism.
pub trait KeyTrigger {
    /// Binds the trigger to a key, replacing any current binding.
    fn arm(&mut self, key: LogicalKey) -> Result<(), TriggerError>;
    /// Removes the current binding.
    fn disarm(&mut self);
    /// The capture kind this mechanism produces.
    fn kind(&self) -> TriggerKind;
    /// Whether this pump event activates the armed binding.
    fn on_signal(&mut self, signal: &TriggerSignal) -> bool;
    /// Releases threads or hooks owned by the backend. Called once at
    /// shutdown, after `disarm`.
    fn shutdown(&mut self) {}
    fn describe(&self) -> &'static str;
}

/// Binding lifecycle: `Unregistered → Registered → Registered' (rebind) →
/// Unregistered (shutdown)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unregistered,
    Registered(LogicalKey),
}

/// Owns the active trigger backend and the binding state.
pub struct TriggerController {
    backend: Box<dyn KeyTrigger>,
    state: BindingState,
}

impl TriggerController {
    /// Arms a trigger for `key`, preferring the global hotkey and falling
    /// back to the raw keyboard listener when registration is unavailable.
    /// A fully failed start is surfaced but not fatal: the controller comes
    /// back `Unregistered` and manual captures still work.
    pub fn start(owner: HWND, key: LogicalKey) -> Self {
        let mut hotkey = HotkeyBackend::new(owner);
        match hotkey.arm(key) {
            Ok(()) => {
                crate::log(&format!("Global hotkey registered: {}", key));
                return Self {
                    backend: Box::new(hotkey),
                    state: BindingState::Registered(key),
                };
            }
            Err(e) => {
                crate::log(&format!(
                    "Global hotkey unavailable ({}); falling back to raw keyboard listener",
                    e
                ));
            }
        }

        let mut listener = RawListenerBackend::new(owner);
        let state = match listener.arm(key) {
            Ok(()) => {
                crate::log(&format!("Raw keyboard listener armed: {} (Esc stops it)", key));
                BindingState::Registered(key)
            }
            Err(e) => {
                crate::log(&format!(
                    "Raw keyboard listener unavailable ({}); no trigger is bound",
                    e
                ));
                BindingState::Unregistered
            }
        };
        Self { backend: Box::new(listener), state }
    }

    #[cfg(test)]
    fn with_backend(backend: Box<dyn KeyTrigger>) -> Self {
        Self { backend, state: BindingState::Unregistered }
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    /// Unbinds the current key and binds `new_key`. When binding the new key
    /// fails the controller is left `Unregistered`; the dangling state is
    /// logged and returned, never silently reverted to the old key.
    pub fn rebind(&mut self, new_key: LogicalKey) -> Result<(), TriggerError> {
        self.backend.disarm();
        self.state = BindingState::Unregistered;
        match self.backend.arm(new_key) {
            Ok(()) => {
                self.state = BindingState::Registered(new_key);
                crate::log(&format!(
                    "Trigger rebound to {} via {}",
                    new_key,
                    self.backend.describe()
                ));
                Ok(())
            }
            Err(e) => {
                crate::log(&format!(
                    "Rebind to {} failed: {}. No trigger is currently bound.",
                    new_key, e
                ));
                Err(e)
            }
        }
    }

    /// Name-level rebind for callers holding a raw key name. An unsupported
    /// name also unbinds: the old key never silently survives a rebind
    /// attempt.
    pub fn rebind_by_name(&mut self, name: &str) -> Result<(), TriggerError> {
        match LogicalKey::from_name(name) {
            Some(key) => self.rebind(key),
            None => {
                self.backend.disarm();
                self.state = BindingState::Unregistered;
                let err = TriggerError::UnsupportedKey(name.to_string());
                crate::log(&format!(
                    "Rebind failed: {}. No trigger is currently bound.",
                    err
                ));
                Err(err)
            }
        }
    }

    /// Maps one pump delivery onto at most one capture kind. Manual commands
    /// always fire a cursor-based capture; backend signals fire only when
    /// they activate the armed binding.
    pub fn on_trigger(&mut self, signal: TriggerSignal) -> Option<TriggerKind> {
        match signal {
            TriggerSignal::Manual => Some(TriggerKind::Cursor),
            other => {
                if matches!(self.state, BindingState::Unregistered) {
                    // Still drain backend queues so stale events don't fire
                    // after a later rebind.
                    let _ = self.backend.on_signal(&other);
                    return None;
                }
                self.backend.on_signal(&other).then(|| self.backend.kind())
            }
        }
    }

    /// Shutdown step one and two of the teardown sequence: disarm, then stop
    /// and join whatever the backend owns.
    pub fn shutdown(&mut self) {
        self.backend.disarm();
        self.backend.shutdown();
        self.state = BindingState::Unregistered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Scriptable backend: fails to arm any key in `reject`, reports a fixed
    /// signal match.
    struct MockBackend {
        reject: Option<LogicalKey>,
        armed: Rc<Cell<Option<LogicalKey>>>,
        matches_signal: bool,
        shutdowns: Rc<Cell<u32>>,
    }

    impl KeyTrigger for MockBackend {
        fn arm(&mut self, key: LogicalKey) -> Result<(), TriggerError> {
            if self.reject == Some(key) {
                return Err(TriggerError::Registration(anyhow::anyhow!("rejected")));
            }
            self.armed.set(Some(key));
            Ok(())
        }

        fn disarm(&mut self) {
            self.armed.set(None);
        }

        fn kind(&self) -> TriggerKind {
            TriggerKind::Foreground
        }

        fn on_signal(&mut self, _signal: &TriggerSignal) -> bool {
            self.matches_signal
        }

        fn shutdown(&mut self) {
            self.shutdowns.set(self.shutdowns.get() + 1);
        }

        fn describe(&self) -> &'static str {
            "mock"
        }
    }

    fn controller(reject: Option<LogicalKey>, matches_signal: bool) -> (TriggerController, Rc<Cell<Option<LogicalKey>>>, Rc<Cell<u32>>) {
        let armed = Rc::new(Cell::new(None));
        let shutdowns = Rc::new(Cell::new(0));
        let backend = MockBackend {
            reject,
            armed: armed.clone(),
            matches_signal,
            shutdowns: shutdowns.clone(),
        };
        (TriggerController::with_backend(Box::new(backend)), armed, shutdowns)
    }

    #[test]
    fn test_rebind_moves_registered_state() {
        let (mut ctl, armed, _) = controller(None, true);
        ctl.rebind(LogicalKey::F12).expect("rebind");
        assert_eq!(ctl.state(), BindingState::Registered(LogicalKey::F12));

        ctl.rebind(LogicalKey::F10).expect("rebind");
        assert_eq!(ctl.state(), BindingState::Registered(LogicalKey::F10));
        assert_eq!(armed.get(), Some(LogicalKey::F10));
    }

    #[test]
    fn test_failed_rebind_leaves_unregistered() {
        let (mut ctl, armed, _) = controller(Some(LogicalKey::F10), true);
        ctl.rebind(LogicalKey::F12).expect("initial rebind");

        // The old binding must not silently survive a failed rebind.
        assert!(ctl.rebind(LogicalKey::F10).is_err());
        assert_eq!(ctl.state(), BindingState::Unregistered);
        assert_eq!(armed.get(), None);
    }

    #[test]
    fn test_rebind_by_name_rejects_unsupported_keys() {
        let (mut ctl, _, _) = controller(None, true);
        let err = ctl.rebind_by_name("hyper").unwrap_err();
        assert!(matches!(err, TriggerError::UnsupportedKey(name) if name == "hyper"));
        assert_eq!(ctl.state(), BindingState::Unregistered);
    }

    #[test]
    fn test_manual_signal_always_fires_cursor_capture() {
        let (mut ctl, _, _) = controller(None, false);
        assert_eq!(ctl.on_trigger(TriggerSignal::Manual), Some(TriggerKind::Cursor));
    }

    #[test]
    fn test_backend_signal_fires_backend_kind_when_registered() {
        let (mut ctl, _, _) = controller(None, true);
        ctl.rebind(LogicalKey::F12).expect("rebind");
        assert_eq!(
            ctl.on_trigger(TriggerSignal::Hotkey { id: HOTKEY_ID }),
            Some(TriggerKind::Foreground)
        );
    }

    #[test]
    fn test_backend_signal_ignored_when_unregistered() {
        let (mut ctl, _, _) = controller(None, true);
        assert_eq!(ctl.on_trigger(TriggerSignal::RawKey), None);
    }

    #[test]
    fn test_shutdown_disarms_and_stops_backend() {
        let (mut ctl, armed, shutdowns) = controller(None, true);
        ctl.rebind(LogicalKey::F12).expect("rebind");
        ctl.shutdown();
        assert_eq!(ctl.state(), BindingState::Unregistered);
        assert_eq!(armed.get(), None);
        assert_eq!(shutdowns.get(), 1);
    }
}
