//! Tamil99 key table.
//!
//! Keys are identified by their keycap letter. The table covers the vowel
//! row and the first consonants of the top row; every other key is left to
//! the host.

use phf::phf_ordered_map;
use tip_core::{KeyCode, KeyMapper};

/// Keycap letter to Tamil character, in keyboard order.
pub static TAMIL99: phf::OrderedMap<char, char> = phf_ordered_map! {
    // Home row: vowels
    'A' => '\u{0B85}', // அ
    'S' => '\u{0B86}', // ஆ
    'D' => '\u{0B87}', // இ
    'F' => '\u{0B88}', // ஈ
    'G' => '\u{0B89}', // உ
    'H' => '\u{0B8A}', // ஊ
    // Top row: consonants
    'Q' => '\u{0B95}', // க
    'W' => '\u{0B99}', // ங
    'E' => '\u{0B9A}', // ச
    'R' => '\u{0B9E}', // ஞ
    'T' => '\u{0B9F}', // ட
    'Y' => '\u{0BA3}', // ண
};

/// [`KeyMapper`] over [`TAMIL99`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Tamil99Layout;

impl Tamil99Layout {
    pub const NAME: &'static str = "Tamil99";

    pub fn new() -> Self {
        Self
    }

    pub fn len(&self) -> usize {
        TAMIL99.len()
    }

    pub fn is_empty(&self) -> bool {
        TAMIL99.is_empty()
    }
}

impl KeyMapper for Tamil99Layout {
    fn map(&self, key: KeyCode) -> Option<char> {
        key.as_char().and_then(|cap| TAMIL99.get(&cap).copied())
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn entries(&self) -> Vec<(KeyCode, char)> {
        TAMIL99
            .entries()
            .filter_map(|(&cap, &ch)| KeyCode::from_char(cap).map(|key| (key, ch)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vowel_row() {
        let layout = Tamil99Layout::new();
        assert_eq!(layout.map(KeyCode(0x41)), Some('அ'));
        assert_eq!(layout.map(KeyCode(0x53)), Some('ஆ'));
        assert_eq!(layout.map(KeyCode(0x48)), Some('ஊ'));
    }

    #[test]
    fn test_unmapped_keys() {
        let layout = Tamil99Layout::new();
        for key in [KeyCode(0x5A), KeyCode::SPACE, KeyCode::ENTER, KeyCode(0x31)] {
            assert_eq!(layout.map(key), None, "{key:?}");
        }
    }

    #[test]
    fn test_entries_cover_table_in_order() {
        let layout = Tamil99Layout::new();
        let entries = layout.entries();
        assert_eq!(entries.len(), layout.len());
        assert_eq!(entries.first(), Some(&(KeyCode(0x41), '\u{0B85}')));
        assert_eq!(entries.last(), Some(&(KeyCode(0x59), '\u{0BA3}')));
        for (key, ch) in entries {
            assert_eq!(layout.map(key), Some(ch));
        }
    }

    #[test]
    fn test_all_outputs_are_tamil() {
        for (_, &ch) in TAMIL99.entries() {
            assert!(('\u{0B80}'..='\u{0BFF}').contains(&ch), "{ch:?}");
        }
    }
}
