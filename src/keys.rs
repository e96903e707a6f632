//! Logical key names and their Windows virtual-key codes.
//!
//! The set of bindable keys is a closed enumeration: the function keys and
//! common navigation keys by name, plus a single-character fallback for
//! letters and digits. Escape is not bindable; it is reserved
//! for terminating the raw keyboard listener.

/// A platform-independent identifier for a bindable keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalKey {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    PrintScreen,
    ScrollLock,
    Pause,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    /// Fallback for a single ASCII letter or digit (stored lowercase).
    Char(char),
}

impl LogicalKey {
    /// Parses a persisted key name. Names are matched case-insensitively;
    /// a single letter or digit selects the `Char` fallback. Returns `None`
    /// for anything outside the supported set.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "f1" => Self::F1,
            "f2" => Self::F2,
            "f3" => Self::F3,
            "f4" => Self::F4,
            "f5" => Self::F5,
            "f6" => Self::F6,
            "f7" => Self::F7,
            "f8" => Self::F8,
            "f9" => Self::F9,
            "f10" => Self::F10,
            "f11" => Self::F11,
            "f12" => Self::F12,
            "print_screen" => Self::PrintScreen,
            "scroll_lock" => Self::ScrollLock,
            "pause" => Self::Pause,
            "insert" => Self::Insert,
            "delete" => Self::Delete,
            "home" => Self::Home,
            "end" => Self::End,
            "page_up" => Self::PageUp,
            "page_down" => Self::PageDown,
            _ => {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_lowercase() || c.is_ascii_digit() => {
                        Self::Char(c)
                    }
                    _ => return None,
                }
            }
        };
        Some(key)
    }

    /// Returns the persisted name for this key (inverse of `from_name`).
    pub fn name(&self) -> String {
        match self {
            Self::F1 => "f1".to_string(),
            Self::F2 => "f2".to_string(),
            Self::F3 => "f3".to_string(),
            Self::F4 => "f4".to_string(),
            Self::F5 => "f5".to_string(),
            Self::F6 => "f6".to_string(),
            Self::F7 => "f7".to_string(),
            Self::F8 => "f8".to_string(),
            Self::F9 => "f9".to_string(),
            Self::F10 => "f10".to_string(),
            Self::F11 => "f11".to_string(),
            Self::F12 => "f12".to_string(),
            Self::PrintScreen => "print_screen".to_string(),
            Self::ScrollLock => "scroll_lock".to_string(),
            Self::Pause => "pause".to_string(),
            Self::Insert => "insert".to_string(),
            Self::Delete => "delete".to_string(),
            Self::Home => "home".to_string(),
            Self::End => "end".to_string(),
            Self::PageUp => "page_up".to_string(),
            Self::PageDown => "page_down".to_string(),
            Self::Char(c) => c.to_string(),
        }
    }

    /// Returns the Windows virtual-key code for this key.
    pub fn vk(&self) -> u32 {
        match self {
            Self::F1 => 0x70, // VK_F1
            Self::F2 => 0x71,
            Self::F3 => 0x72,
            Self::F4 => 0x73,
            Self::F5 => 0x74,
            Self::F6 => 0x75,
            Self::F7 => 0x76,
            Self::F8 => 0x77,
            Self::F9 => 0x78,
            Self::F10 => 0x79,
            Self::F11 => 0x7A,
            Self::F12 => 0x7B,
            Self::PrintScreen => 0x2C, // VK_SNAPSHOT
            Self::ScrollLock => 0x91,  // VK_SCROLL
            Self::Pause => 0x13,       // VK_PAUSE
            Self::Insert => 0x2D,      // VK_INSERT
            Self::Delete => 0x2E,      // VK_DELETE
            Self::Home => 0x24,        // VK_HOME
            Self::End => 0x23,         // VK_END
            Self::PageUp => 0x21,      // VK_PRIOR
            Self::PageDown => 0x22,    // VK_NEXT
            // Letter and digit virtual-key codes equal their uppercase
            // ASCII values.
            Self::Char(c) => c.to_ascii_uppercase() as u32,
        }
    }
}

impl std::fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
