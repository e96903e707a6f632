//! Single-instance enforcement via a named OS-wide mutex.
//!
//! Acquisition is a non-blocking wait on the mutex: a lock object left over
//! from a crashed instance comes back as `WAIT_ABANDONED`, which is treated
//! exactly like creating the mutex fresh. Only a live owner elsewhere yields
//! `AlreadyRunning`.

use thiserror::Error;

use windows::Win32::Foundation::{
    CloseHandle, HANDLE, WAIT_ABANDONED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows::Win32::System::Threading::{CreateMutexW, ReleaseMutex, WaitForSingleObject};
use windows::core::PCWSTR;

#[derive(Debug, Error)]
pub enum InstanceError {
    /// Another live instance owns the lock. The caller shows one notice and
    /// exits cleanly without starting any other subsystem.
    #[error("another instance already owns \"{0}\"")]
    AlreadyRunning(String),
    /// The lock object itself could not be created; unrecoverable startup
    /// failure.
    #[error("could not create instance lock \"{name}\": {source}")]
    Create {
        name: String,
        source: windows::core::Error,
    },
}

/// Exclusive ownership of the named lock for this process's lifetime.
/// Released on drop; the OS releases it if the process crashes.
pub struct InstanceLock {
    handle: HANDLE,
}

impl InstanceLock {
    /// Non-blocking attempt to own the named OS-wide lock.
    pub fn acquire(name: &str) -> Result<Self, InstanceError> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let handle = unsafe { CreateMutexW(None, false, PCWSTR(wide.as_ptr())) }.map_err(
            |source| InstanceError::Create { name: name.to_string(), source },
        )?;

        // Zero-timeout wait distinguishes "ours now" from "owned elsewhere".
        // WAIT_ABANDONED means the prior owner died without releasing; the
        // mutex is ours regardless.
        match unsafe { WaitForSingleObject(handle, 0) } {
            e if e == WAIT_OBJECT_0 || e == WAIT_ABANDONED => Ok(Self { handle }),
            e if e == WAIT_TIMEOUT => {
                let _ = unsafe { CloseHandle(handle) };
                Err(InstanceError::AlreadyRunning(name.to_string()))
            }
            _ => {
                let _ = unsafe { CloseHandle(handle) };
                Err(InstanceError::Create {
                    name: name.to_string(),
                    source: windows::core::Error::from_win32(),
                })
            }
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        unsafe {
            let _ = ReleaseMutex(self.handle);
            let _ = CloseHandle(self.handle);
        }
    }
}
