//! Raw low-level keyboard listener backend.
//!
//! A dedicated thread installs a `WH_KEYBOARD_LL` hook and runs a blocking
//! message loop, since the hook only fires while its installing thread pumps
//! messages. Key-down events are forwarded to the owning thread through an
//! mpsc channel plus a posted wake message; matching against the armed
//! binding happens on the owning thread, never here. Pressing Escape
//! terminates the listener.

use anyhow::anyhow;
use std::cell::RefCell;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::VK_ESCAPE;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, MSG,
    PostMessageW, PostQuitMessage, PostThreadMessageW, SetWindowsHookExW, TranslateMessage,
    UnhookWindowsHookEx, WH_KEYBOARD_LL, WM_APP, WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN,
    WM_SYSKEYUP,
};

use crate::capture::TriggerKind;
use crate::keys::LogicalKey;

use super::{KeyTrigger, TriggerError, TriggerSignal};

/// Posted to the owning window after key events were queued on the channel.
pub const WM_RAW_KEY_WAKE: u32 = WM_APP + 2;

/// One forwarded key-down event.
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub vk: u32,
}

// The hook procedure runs on the listener thread; its forwarding state lives
// in that thread's local storage.
thread_local! {
    static FORWARDER: RefCell<Option<Forwarder>> = const { RefCell::new(None) };
}

struct Forwarder {
    tx: Sender<KeyEvent>,
    owner: isize,
}

struct ListenerThread {
    handle: JoinHandle<()>,
    thread_id: u32,
}

/// Watches key presses independent of the hotkey API. Used when hotkey
/// registration is unavailable and for free-form bindings.
pub struct RawListenerBackend {
    owner: HWND,
    armed: Option<LogicalKey>,
    worker: Option<ListenerThread>,
    receiver: Receiver<KeyEvent>,
    sender: Sender<KeyEvent>,
}

impl RawListenerBackend {
    pub fn new(owner: HWND) -> Self {
        let (sender, receiver) = channel();
        Self { owner, armed: None, worker: None, receiver, sender }
    }

    /// Spawns the listener thread and waits for it to report whether the
    /// hook installed. Idempotent once running.
    fn ensure_thread(&mut self) -> Result<(), TriggerError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let tx = self.sender.clone();
        let owner = self.owner.0 as isize;
        let (ack_tx, ack_rx) = channel::<Result<u32, String>>();

        let handle = std::thread::spawn(move || listener_main(tx, owner, ack_tx));

        match ack_rx.recv() {
            Ok(Ok(thread_id)) => {
                self.worker = Some(ListenerThread { handle, thread_id });
                Ok(())
            }
            Ok(Err(message)) => {
                let _ = handle.join();
                Err(TriggerError::Registration(anyhow!(message)))
            }
            Err(_) => {
                let _ = handle.join();
                Err(TriggerError::Registration(anyhow!(
                    "listener thread exited before reporting"
                )))
            }
        }
    }

    fn stop_thread(&mut self) {
        if let Some(worker) = self.worker.take() {
            unsafe {
                let _ = PostThreadMessageW(worker.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            if worker.handle.join().is_err() {
                crate::log("Raw keyboard listener thread panicked during shutdown");
            }
        }
    }

    /// Drains every queued event; true when any matches `vk`. Draining even
    /// on mismatch keeps stale presses from firing after a rebind.
    fn drain_matches(&mut self, vk: Option<u32>) -> bool {
        let mut matched = false;
        for event in self.receiver.try_iter() {
            if Some(event.vk) == vk {
                matched = true;
            }
        }
        matched
    }
}

impl KeyTrigger for RawListenerBackend {
    fn arm(&mut self, key: LogicalKey) -> Result<(), TriggerError> {
        self.ensure_thread()?;
        self.armed = Some(key);
        Ok(())
    }

    fn disarm(&mut self) {
        self.armed = None;
    }

    fn kind(&self) -> TriggerKind {
        TriggerKind::Cursor
    }

    fn on_signal(&mut self, signal: &TriggerSignal) -> bool {
        if !matches!(signal, TriggerSignal::RawKey) {
            return false;
        }
        let vk = self.armed.map(|key| key.vk());
        self.drain_matches(vk)
    }

    fn shutdown(&mut self) {
        self.stop_thread();
    }

    fn describe(&self) -> &'static str {
        "raw keyboard listener"
    }
}

impl Drop for RawListenerBackend {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Listener thread body: install the hook, report back, pump until WM_QUIT.
fn listener_main(tx: Sender<KeyEvent>, owner: isize, ack: Sender<Result<u32, String>>) {
    FORWARDER.with(|cell| {
        *cell.borrow_mut() = Some(Forwarder { tx, owner });
    });

    let hook = unsafe {
        let module = match GetModuleHandleW(None) {
            Ok(module) => module,
            Err(e) => {
                let _ = ack.send(Err(format!("GetModuleHandleW failed: {}", e)));
                return;
            }
        };
        match SetWindowsHookExW(WH_KEYBOARD_LL, Some(raw_keyboard_proc), module, 0) {
            Ok(hook) => hook,
            Err(e) => {
                let _ = ack.send(Err(format!("SetWindowsHookExW failed: {}", e)));
                return;
            }
        }
    };

    let _ = ack.send(Ok(unsafe { GetCurrentThreadId() }));

    unsafe {
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
        let _ = UnhookWindowsHookEx(hook);
    }

    FORWARDER.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

unsafe extern "system" fn raw_keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe {
        if code == HC_ACTION as i32 {
            let data = *(lparam.0 as *const KBDLLHOOKSTRUCT);
            let message = wparam.0 as u32;
            match message {
                WM_KEYUP | WM_SYSKEYUP => {
                    // Escape ends the listener itself, on release like every
                    // other key finishes.
                    if data.vkCode == VK_ESCAPE.0 as u32 {
                        PostQuitMessage(0);
                    }
                }
                WM_KEYDOWN | WM_SYSKEYDOWN => {
                    FORWARDER.with(|cell| {
                        if let Some(forwarder) = cell.borrow().as_ref() {
                            let _ = forwarder.tx.send(KeyEvent { vk: data.vkCode });
                            let _ = PostMessageW(
                                HWND(forwarder.owner as *mut _),
                                WM_RAW_KEY_WAKE,
                                WPARAM(0),
                                LPARAM(0),
                            );
                        }
                    });
                }
                _ => {}
            }
        }
        CallNextHookEx(HHOOK::default(), code, wparam, lparam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The channel contract: events queue without blocking the sender and
    /// drain in order on the receiving side.
    #[test]
    fn test_forwarded_events_drain_in_order() {
        let (tx, rx) = channel::<KeyEvent>();
        for vk in [0x7B, 0x41, 0x7B] {
            tx.send(KeyEvent { vk }).expect("send");
        }
        let drained: Vec<u32> = rx.try_iter().map(|e| e.vk).collect();
        assert_eq!(drained, vec![0x7B, 0x41, 0x7B]);
        assert!(rx.try_iter().next().is_none(), "queue should be empty after drain");
    }

    #[test]
    fn test_drain_consumes_mismatches_without_firing() {
        let mut backend = RawListenerBackend::new(HWND::default());
        backend.armed = Some(LogicalKey::F12);

        backend.sender.send(KeyEvent { vk: 0x41 }).expect("send");
        backend.sender.send(KeyEvent { vk: 0x42 }).expect("send");
        assert!(!backend.on_signal(&TriggerSignal::RawKey));

        // A matching press among noise fires exactly once per wake.
        backend.sender.send(KeyEvent { vk: 0x41 }).expect("send");
        backend.sender.send(KeyEvent { vk: LogicalKey::F12.vk() }).expect("send");
        assert!(backend.on_signal(&TriggerSignal::RawKey));
        assert!(!backend.on_signal(&TriggerSignal::RawKey), "queue fully drained");
    }

    #[test]
    fn test_non_raw_signals_are_ignored() {
        let mut backend = RawListenerBackend::new(HWND::default());
        backend.armed = Some(LogicalKey::F12);
        backend
            .sender
            .send(KeyEvent { vk: LogicalKey::F12.vk() })
            .expect("send");
        assert!(!backend.on_signal(&TriggerSignal::Hotkey { id: super::super::HOTKEY_ID }));
        // The queued event is still there for the raw wake.
        assert!(backend.on_signal(&TriggerSignal::RawKey));
    }
}
