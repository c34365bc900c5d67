//! Key event metadata as delivered alongside a key code.
//!
//! The host passes the raw keystroke word it received from the window
//! system. None of it influences key decisions; it is decoded only for
//! diagnostics.

use std::fmt;
use uuid::Uuid;

/// Packed keystroke flags word.
///
/// Layout: bits 0-15 repeat count, 16-23 scan code, 24 extended key,
/// 29 alt held, 30 previous key state, 31 transition (set on release).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyMetadata(pub u32);

impl KeyMetadata {
    const EXTENDED: u32 = 1 << 24;
    const ALT: u32 = 1 << 29;
    const PREVIOUS: u32 = 1 << 30;
    const TRANSITION: u32 = 1 << 31;

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Metadata for a single key press with the given scan code.
    pub const fn press(scan_code: u8) -> Self {
        Self(1 | ((scan_code as u32) << 16))
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn repeat_count(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub const fn scan_code(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    pub const fn is_extended(self) -> bool {
        self.0 & Self::EXTENDED != 0
    }

    pub const fn alt_down(self) -> bool {
        self.0 & Self::ALT != 0
    }

    /// Key was already down before this event (auto-repeat).
    pub const fn was_down(self) -> bool {
        self.0 & Self::PREVIOUS != 0
    }

    pub const fn is_release(self) -> bool {
        self.0 & Self::TRANSITION != 0
    }

    pub const fn with_extended(self) -> Self {
        Self(self.0 | Self::EXTENDED)
    }

    pub const fn with_alt(self) -> Self {
        Self(self.0 | Self::ALT)
    }
}

impl fmt::Debug for KeyMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMetadata")
            .field("repeat", &self.repeat_count())
            .field("scan_code", &format_args!("{:#04X}", self.scan_code()))
            .field("extended", &self.is_extended())
            .field("alt", &self.alt_down())
            .field("was_down", &self.was_down())
            .field("release", &self.is_release())
            .finish()
    }
}

/// Identifier of a preserved key (hotkey) registered with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreservedKeyId(pub Uuid);
