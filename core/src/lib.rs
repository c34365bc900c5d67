//! tip-core
//!
//! Language-agnostic text input processor shared by keyboard layout crates
//! (libtamil99).
//!
//! The service is activated by a host text-editing framework, subscribes to
//! its keyboard and lifecycle notifications, and turns mapped keystrokes into
//! asynchronous insertions at the document's selection. Everything the host
//! provides is described by the traits in [`host`]; [`memory`] implements
//! them in-process.
//!
//! Public API:
//! - `KeyMapper` / `KeyTable` - physical key to output character
//! - `TextService` - the object behind every capability facet
//! - `ActivationController` - sink registration lifecycle
//! - `KeyInterceptor` - probe/commit key decisions
//! - `InsertionUnit` - one queued insertion with its `Completion`
//! - `ServiceFactory` / `Module` / `ModuleLifetime` - creation and unload accounting
//! - `registration` - installer manifest and `Registrar` bookkeeping
//! - `ServiceConfig` - configuration shared by layout crates
use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Result, ServiceError};

pub mod keymap;
pub use keymap::{KeyCode, KeyMapper, KeyTable};

pub mod key_event;
pub use key_event::{KeyMetadata, PreservedKeyId};

pub mod host;
pub use host::{
    Anchor, ClientId, DocumentContext, DocumentMgrId, EditCookie, EditMode, HostModeFlags,
    KeyEventSink, SinkCookie, ThreadEventSink, ThreadManager,
};

pub mod insertion;
pub use insertion::{Completion, InsertionOutcome, InsertionStep, InsertionUnit, UnitState};

pub mod activation;
pub use activation::{ActivationController, LifecycleState, SessionView};

pub mod interceptor;
pub use interceptor::KeyInterceptor;

pub mod search;
pub use search::SearchCandidateProvider;

pub mod service;
pub use service::{
    Capability, Facet, ServiceFactory, TextInputProcessor, TextInputProcessorEx, TextService,
};

pub mod module;
pub use module::{Module, ModuleLifetime, ModuleLock};

pub mod registration;
pub use registration::{
    Category, MemoryRegistry, RegistrationError, RegistrationManifest, Registrar, ServiceProfile,
    ThreadingModel,
};

pub mod memory;

/// Configuration shared by every layout crate.
///
/// Layout-specific options belong in the layout crate's own config, which
/// flattens this one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Whether the keyboard starts enabled after activation.
    pub enabled_on_start: bool,

    /// Log decoded key metadata (scan code, repeat count, modifier bits)
    /// for every key down at trace level.
    pub log_key_details: bool,

    /// Scheduling mode requested for insertion edit sessions.
    pub edit_mode: EditMode,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled_on_start: true,
            log_key_details: false,
            edit_mode: EditMode::Async,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
