//! Key codes and the key mapping seam.
//!
//! A [`KeyMapper`] is a pure, total function from a physical key code to an
//! optional output character. The service only ever talks to the trait, so a
//! layout crate can swap in a complete keyboard layout without touching the
//! activation or insertion code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual key code as delivered by the host's keystroke manager.
///
/// Letter and digit keys use their uppercase ASCII value (`'A'` is `0x41`),
/// independent of shift state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const BACKSPACE: KeyCode = KeyCode(0x08);
    pub const TAB: KeyCode = KeyCode(0x09);
    pub const ENTER: KeyCode = KeyCode(0x0D);
    pub const SHIFT: KeyCode = KeyCode(0x10);
    pub const ESCAPE: KeyCode = KeyCode(0x1B);
    pub const SPACE: KeyCode = KeyCode(0x20);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw numeric code.
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Key code for the key that types `ch` on a US keyboard.
    ///
    /// Only letters, digits and space have a code here; letters map to their
    /// uppercase key regardless of case.
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | ' ' => {
                Some(Self(ch.to_ascii_uppercase() as u16))
            }
            _ => None,
        }
    }

    /// Keycap label for letter and digit keys.
    pub fn as_char(self) -> Option<char> {
        match self.0 {
            0x30..=0x39 | 0x41..=0x5A => char::from_u32(self.0 as u32),
            _ => None,
        }
    }
}

impl fmt::Debug for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_char() {
            Some(ch) => write!(f, "KeyCode({:#04X} '{}')", self.0, ch),
            None => write!(f, "KeyCode({:#04X})", self.0),
        }
    }
}

/// Pure mapping from key codes to output characters.
///
/// Implementations must be deterministic and side-effect free: the same key
/// always yields the same result, and "no mapping" is a normal answer rather
/// than an error.
pub trait KeyMapper: Send + Sync {
    /// Map a key to its output character, if any.
    fn map(&self, key: KeyCode) -> Option<char>;

    /// Human-readable layout name (for logging).
    fn name(&self) -> &str;

    /// All mappings in table order.
    fn entries(&self) -> Vec<(KeyCode, char)>;

    /// Whether this key produces output.
    fn is_mapped(&self, key: KeyCode) -> bool {
        self.map(key).is_some()
    }
}

/// Key mapper over a static table sorted by key code.
///
/// Lookup is a binary search, so the table must be sorted; [`KeyTable::is_sorted`]
/// is available for tests of hand-written tables.
#[derive(Debug, Clone, Copy)]
pub struct KeyTable {
    name: &'static str,
    entries: &'static [(KeyCode, char)],
}

impl KeyTable {
    pub const fn new(name: &'static str, entries: &'static [(KeyCode, char)]) -> Self {
        Self { name, entries }
    }

    /// Check that keys are strictly increasing.
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].0 < w[1].0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyMapper for KeyTable {
    fn map(&self, key: KeyCode) -> Option<char> {
        self.entries
            .binary_search_by_key(&key, |&(code, _)| code)
            .ok()
            .map(|idx| self.entries[idx].1)
    }

    fn name(&self) -> &str {
        self.name
    }

    fn entries(&self) -> Vec<(KeyCode, char)> {
        self.entries.to_vec()
    }
}
