//! Screen capture pipeline.
//!
//! This module provides:
//! - The capture engine and its request/outcome types (`engine`)
//! - Scoped GDI surfaces and the block-transfer grab (`gdi`)
//! - Raw pixel normalization (`pixels`)
//! - Best-effort post-capture hooks (`hooks`)

pub mod engine;
mod gdi;
pub mod hooks;
mod pixels;

pub use engine::{CaptureEngine, CaptureError, CaptureOutcome, CaptureRequest, TriggerKind};
pub use hooks::{AudioCueHook, CaptureHook, ProcessIconHook};
