//! Procshot
//!
//! A Windows background utility that captures the monitor under the cursor
//! (or under the active window) on a hotkey and archives the image under a
//! directory named after the owning process.

// Hide console window on Windows for GUI mode
#![windows_subsystem = "windows"]

mod capture;
mod config;
mod instance;
mod keys;
mod monitor;
mod paths;
mod process;
mod trigger;

use anyhow::{Result, anyhow};
use chrono::Local;
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;

use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Shell::{
    NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NOTIFYICONDATAW, Shell_NotifyIconW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CS_HREDRAW, CS_VREDRAW, CW_USEDEFAULT, CreatePopupMenu, CreateWindowExW, DefWindowProcW,
    DestroyMenu, DestroyWindow, DispatchMessageW, GetCursorPos, GetMessageW, IDI_APPLICATION,
    InsertMenuW, LoadIconW, MB_ICONINFORMATION, MB_OK, MF_BYPOSITION, MF_SEPARATOR, MF_STRING, MSG,
    MessageBoxW, PostMessageW, PostQuitMessage, RegisterClassW, SetForegroundWindow,
    TPM_BOTTOMALIGN, TPM_LEFTALIGN, TPM_RIGHTBUTTON, TrackPopupMenu, TranslateMessage, WM_APP,
    WM_COMMAND, WM_DESTROY, WM_HOTKEY, WM_RBUTTONUP, WM_USER, WNDCLASSW, WS_OVERLAPPEDWINDOW,
};
use windows::core::w;

use crate::capture::{AudioCueHook, CaptureEngine, CaptureHook, CaptureRequest, ProcessIconHook, TriggerKind};
use crate::config::{ConfigEvent, ConfigStore};
use crate::instance::{InstanceError, InstanceLock};
use crate::trigger::{BindingState, TriggerController, TriggerSignal, WM_RAW_KEY_WAKE};

const INSTANCE_LOCK_NAME: &str = "Local\\ProcshotSingleInstance";

const WM_TRAYICON: u32 = WM_USER + 1;
/// Posted capture work; wparam carries the trigger kind.
const WM_APP_CAPTURE: u32 = WM_APP + 1;
/// Posted after the persisted keybinding changed; the handler rebinds.
const WM_APP_REBIND: u32 = WM_APP + 3;

const CAPTURE_KIND_CURSOR: usize = 0;
const CAPTURE_KIND_FOREGROUND: usize = 1;

// Menu item IDs
const MENU_CAPTURE: usize = 1001;
const MENU_EXIT: usize = 1002;

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join("procshot.log");
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = file.write_all(line.as_bytes());
    }
}

static mut MAIN_HWND: HWND = HWND(std::ptr::null_mut());

// Owned by the main thread: the pump, window handles, configuration, and
// every graphics-surface handle live here and only here.
thread_local! {
    static APP: RefCell<Option<App>> = const { RefCell::new(None) };
}

struct App {
    config: ConfigStore,
    engine: CaptureEngine,
    triggers: TriggerController,
}

fn main() -> Result<()> {
    // Set up panic hook to log panics
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        let log_path = paths::get_logs_dir().join("procshot.log");
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = file.write_all(log_msg.as_bytes());
        }
    }));

    // Single instance first: a second launch must exit before touching any
    // other subsystem.
    let _instance_lock = match InstanceLock::acquire(INSTANCE_LOCK_NAME) {
        Ok(lock) => lock,
        Err(InstanceError::AlreadyRunning(_)) => {
            log("Procshot is already running; exiting.");
            unsafe {
                let _ = MessageBoxW(
                    HWND::default(),
                    w!("Procshot is already running in the system tray."),
                    w!("Procshot"),
                    MB_OK | MB_ICONINFORMATION,
                );
            }
            return Ok(());
        }
        Err(e) => return Err(anyhow!("could not establish single instance: {}", e)),
    };

    if let Err(e) = paths::ensure_directories() {
        log(&format!("Warning: could not create log directory: {}", e));
    }

    monitor::enable_dpi_awareness();

    // Create hidden window for message handling
    let hwnd = create_message_window()?;
    unsafe { MAIN_HWND = hwnd };

    if let Err(e) = add_tray_icon(hwnd) {
        log(&format!("Warning: could not add tray icon: {}", e));
    }

    let mut config = ConfigStore::load(paths::get_config_path());
    let keybinding = config.keybinding();

    // Configuration changes are applied from the pump, not from inside the
    // notifying call.
    config.subscribe(move |event| match event {
        ConfigEvent::KeybindingChanged(_) => unsafe {
            let _ = PostMessageW(hwnd, WM_APP_REBIND, WPARAM(0), LPARAM(0));
        },
        ConfigEvent::OutputDirChanged(dir) => {
            log(&format!("Archive directory changed to {}", dir.display()));
        }
    });

    let hooks: Vec<Box<dyn CaptureHook>> = vec![Box::new(ProcessIconHook), Box::new(AudioCueHook)];
    let app = App {
        triggers: TriggerController::start(hwnd, keybinding),
        engine: CaptureEngine::new(hooks),
        config,
    };
    APP.with(|cell| *cell.borrow_mut() = Some(app));

    log("Procshot started");
    let state = APP.with(|cell| cell.borrow().as_ref().map(|app| app.triggers.state()));
    match state {
        Some(BindingState::Registered(key)) => log(&format!("Capture key: {}", key)),
        _ => log("No capture key is bound; use the tray menu to capture"),
    }
    log("Right-click tray icon for Capture Now / Exit");

    // Message loop
    let mut msg = MSG::default();
    unsafe {
        while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    // Shutdown: disarm trigger, stop and join the listener, release the
    // instance lock, then destroy the window.
    if let Some(mut app) = APP.with(|cell| cell.borrow_mut().take()) {
        app.triggers.shutdown();
    }
    remove_tray_icon(hwnd);
    drop(_instance_lock);
    unsafe {
        let _ = DestroyWindow(hwnd);
    }
    log("Procshot stopped");

    Ok(())
}

/// Posts a manual cursor-based capture to the owning thread. Safe to call
/// from any thread; part of the contract exposed to the presentation layer.
#[allow(dead_code)]
pub fn trigger_capture_now() {
    unsafe {
        let hwnd = MAIN_HWND;
        if !hwnd.0.is_null() {
            let _ = PostMessageW(hwnd, WM_APP_CAPTURE, WPARAM(CAPTURE_KIND_CURSOR), LPARAM(0));
        }
    }
}

fn create_message_window() -> Result<HWND> {
    unsafe {
        let hinstance = GetModuleHandleW(None)?;
        let class_name = w!("ProcshotMessageClass");

        let wc = WNDCLASSW {
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(window_proc),
            hInstance: hinstance.into(),
            lpszClassName: class_name,
            ..Default::default()
        };

        let atom = RegisterClassW(&wc);
        if atom == 0 {
            return Err(anyhow!("Failed to register window class"));
        }

        let hwnd = CreateWindowExW(
            Default::default(),
            class_name,
            w!("Procshot"),
            WS_OVERLAPPEDWINDOW,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            None,
            None,
            hinstance,
            None,
        )?;

        Ok(hwnd)
    }
}

/// Routes a pump delivery through the trigger controller and posts the
/// resulting capture work back to the queue, so activation handlers return
/// quickly and captures serialize in message order.
fn dispatch_signal(hwnd: HWND, signal: TriggerSignal) {
    let kind = APP.with(|cell| {
        cell.borrow_mut()
            .as_mut()
            .and_then(|app| app.triggers.on_trigger(signal))
    });
    if let Some(kind) = kind {
        let encoded = match kind {
            TriggerKind::Cursor => CAPTURE_KIND_CURSOR,
            TriggerKind::Foreground => CAPTURE_KIND_FOREGROUND,
        };
        unsafe {
            let _ = PostMessageW(hwnd, WM_APP_CAPTURE, WPARAM(encoded), LPARAM(0));
        }
    }
}

/// Runs one capture on the owning thread and logs the outcome.
fn run_capture(kind: TriggerKind) {
    let request = match kind {
        TriggerKind::Cursor => CaptureRequest::at_cursor(),
        TriggerKind::Foreground => CaptureRequest::for_foreground(),
    };
    APP.with(|cell| {
        let borrowed = cell.borrow();
        let Some(app) = borrowed.as_ref() else {
            return;
        };
        match app.engine.capture(&request, &app.config.base_dir()) {
            Ok(outcome) => {
                let note = if outcome.used_fallback {
                    " (virtual desktop fallback)"
                } else {
                    ""
                };
                log(&format!(
                    "Capture saved{}: {} [{}x{} at ({},{}), {}]",
                    note,
                    outcome.path.display(),
                    outcome.monitor.width,
                    outcome.monitor.height,
                    outcome.monitor.x,
                    outcome.monitor.y,
                    outcome.timestamp.format("%Y-%m-%d %H:%M:%S"),
                ));
            }
            Err(e) => log(&format!("Capture failed: {}", e)),
        }
    });
}

/// Re-applies the persisted keybinding to the trigger controller.
fn apply_rebind() {
    APP.with(|cell| {
        let mut borrowed = cell.borrow_mut();
        let Some(app) = borrowed.as_mut() else {
            return;
        };
        let name = app.config.keybinding_name().to_string();
        // Failure leaves the binding unregistered; rebind already logged the
        // dangling state.
        let _ = app.triggers.rebind_by_name(&name);
    });
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    unsafe {
        match msg {
            WM_HOTKEY => {
                dispatch_signal(hwnd, TriggerSignal::Hotkey { id: wparam.0 as i32 });
                LRESULT(0)
            }
            WM_RAW_KEY_WAKE => {
                dispatch_signal(hwnd, TriggerSignal::RawKey);
                LRESULT(0)
            }
            WM_APP_CAPTURE => {
                let kind = if wparam.0 == CAPTURE_KIND_FOREGROUND {
                    TriggerKind::Foreground
                } else {
                    TriggerKind::Cursor
                };
                run_capture(kind);
                LRESULT(0)
            }
            WM_APP_REBIND => {
                apply_rebind();
                LRESULT(0)
            }
            WM_TRAYICON => {
                let event = (lparam.0 & 0xFFFF) as u32;
                if event == WM_RBUTTONUP {
                    show_context_menu(hwnd);
                }
                LRESULT(0)
            }
            WM_COMMAND => {
                let cmd = wparam.0 & 0xFFFF;
                if cmd == MENU_CAPTURE {
                    log("Manual capture requested");
                    dispatch_signal(hwnd, TriggerSignal::Manual);
                } else if cmd == MENU_EXIT {
                    log("Exit requested");
                    PostQuitMessage(0);
                }
                LRESULT(0)
            }
            WM_DESTROY => {
                PostQuitMessage(0);
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}

fn add_tray_icon(hwnd: HWND) -> Result<()> {
    unsafe {
        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: hwnd,
            uID: 1,
            uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP,
            uCallbackMessage: WM_TRAYICON,
            hIcon: LoadIconW(None, IDI_APPLICATION)?,
            ..Default::default()
        };

        // Set tooltip
        let tip = "Procshot (capture under cursor)";
        let tip_wide: Vec<u16> = tip.encode_utf16().chain(std::iter::once(0)).collect();
        let len = tip_wide.len().min(nid.szTip.len());
        nid.szTip[..len].copy_from_slice(&tip_wide[..len]);

        if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
            return Err(anyhow!("Failed to add tray icon"));
        }

        Ok(())
    }
}

fn remove_tray_icon(hwnd: HWND) {
    unsafe {
        let nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: hwnd,
            uID: 1,
            ..Default::default()
        };
        let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
    }
}

fn show_context_menu(hwnd: HWND) {
    unsafe {
        let Ok(menu) = CreatePopupMenu() else {
            return;
        };

        // Add menu items (inserted in reverse order since position 0)
        let exit_text = w!("Exit");
        let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_EXIT, exit_text);

        // Separator
        let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_SEPARATOR, 0, None);

        let capture_text = w!("Capture Now");
        let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_CAPTURE, capture_text);

        let mut pt = POINT::default();
        let _ = GetCursorPos(&mut pt);

        // Required for the menu to work properly
        let _ = SetForegroundWindow(hwnd);

        let _ = TrackPopupMenu(
            menu,
            TPM_BOTTOMALIGN | TPM_LEFTALIGN | TPM_RIGHTBUTTON,
            pt.x,
            pt.y,
            0,
            hwnd,
            None,
        );

        let _ = DestroyMenu(menu);
    }
}
