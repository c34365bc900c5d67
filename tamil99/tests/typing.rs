// tamil99/tests/typing.rs
//
// End-to-end typing with the Tamil99 layout on the in-memory host.
//
// Tests cover:
// - 'A' inserts U+0B85 through exactly one insertion unit
// - Unmapped keys reach the host untouched
// - Every table entry types its character, for any key code outside it nothing happens
// - Configuration toggles (disabled on start, sync edits)

use proptest::prelude::*;
use std::sync::Arc;

use libtamil99::{create_service, Tamil99Config, Tamil99Layout, TAMIL99};
use tip_core::memory::{MemoryDocument, MemoryThreadManager};
use tip_core::{
    ClientId, DocumentContext, EditMode, KeyCode, KeyMapper, KeyMetadata, ModuleLifetime,
    TextInputProcessor, TextService,
};

struct Typist {
    host: Arc<MemoryThreadManager>,
    service: Arc<TextService>,
    doc: Arc<MemoryDocument>,
    context: Arc<dyn DocumentContext>,
}

impl Typist {
    fn new(config: &Tamil99Config) -> Self {
        let host = MemoryThreadManager::new();
        let service = create_service(config, &ModuleLifetime::new());
        service.activate(host.clone(), ClientId(1)).unwrap();
        let doc = host.create_document("", 0);
        let context: Arc<dyn DocumentContext> = doc.clone();
        Self {
            host,
            service,
            doc,
            context,
        }
    }

    fn press(&self, key: KeyCode) -> bool {
        self.host
            .press_key(Some(&self.context), key, KeyMetadata::press(0))
            .unwrap()
    }

    fn finish(&self) -> String {
        self.host.edit_queue().run_pending();
        self.doc.text()
    }
}

impl Drop for Typist {
    fn drop(&mut self) {
        let _ = self.service.deactivate();
    }
}

#[test]
fn test_a_types_tamil_a() {
    let typist = Typist::new(&Tamil99Config::default());
    assert!(typist.press(KeyCode(0x41)));
    assert_eq!(typist.host.edit_queue().pending(), 1);
    assert_eq!(typist.finish(), "\u{0B85}");
    assert_eq!(typist.doc.selection(), (1, 1));
}

#[test]
fn test_z_passes_through() {
    let typist = Typist::new(&Tamil99Config::default());
    assert!(!typist.press(KeyCode(0x5A)));
    assert_eq!(typist.host.edit_queue().accepted(), 0);
    assert_eq!(typist.finish(), "");
}

#[test]
fn test_word_from_table() {
    let typist = Typist::new(&Tamil99Config::default());
    for cap in "QAT".chars() {
        assert!(typist.press(KeyCode::from_char(cap).unwrap()));
    }
    assert_eq!(typist.finish(), "கஅட");
}

#[test]
fn test_every_table_entry_types_its_character() {
    for (&cap, &ch) in TAMIL99.entries() {
        let typist = Typist::new(&Tamil99Config::default());
        assert!(typist.press(KeyCode::from_char(cap).unwrap()), "{cap}");
        assert_eq!(typist.finish(), ch.to_string());
    }
}

#[test]
fn test_disabled_on_start() {
    let mut config = Tamil99Config::default();
    config.base_mut().enabled_on_start = false;
    let typist = Typist::new(&config);
    assert!(!typist.press(KeyCode(0x41)));

    typist.service.set_enabled(true);
    assert!(typist.press(KeyCode(0x41)));
    assert_eq!(typist.finish(), "\u{0B85}");
}

#[test]
fn test_sync_edit_mode() {
    let mut config = Tamil99Config::default();
    config.base_mut().edit_mode = EditMode::Sync;
    let typist = Typist::new(&config);
    assert!(typist.press(KeyCode(0x53)));
    assert_eq!(typist.doc.text(), "\u{0B86}");
}

proptest! {
    #[test]
    fn unmapped_keys_never_touch_the_document(code in any::<u16>()) {
        let key = KeyCode(code);
        prop_assume!(Tamil99Layout::new().map(key).is_none());

        let typist = Typist::new(&Tamil99Config::default());
        prop_assert!(!typist.press(key));
        prop_assert_eq!(typist.host.edit_queue().accepted(), 0);
        prop_assert_eq!(typist.finish(), "");
    }
}
