//! Tamil99-specific configuration that extends the base `ServiceConfig` from core.
//!
//! This configuration includes:
//! - All generic options from `tip_core::ServiceConfig` (flattened via serde)
//! - The profile name and icon shown by the host's language bar
//!
//! # Example
//!
//! ```rust
//! use libtamil99::Tamil99Config;
//!
//! let config = Tamil99Config::default();
//! let base = config.into_base();
//! assert!(base.enabled_on_start);
//! ```

use serde::{Deserialize, Serialize};
use tip_core::ServiceConfig;

use crate::DISPLAY_NAME;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Tamil99Config {
    /// Base configuration fields (enablement, edit mode, key diagnostics)
    #[serde(flatten)]
    pub base: ServiceConfig,

    /// Profile name registered with the host.
    pub display_name: String,

    /// Icon file for the profile; the module itself when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
}

impl Default for Tamil99Config {
    fn default() -> Self {
        Self {
            base: ServiceConfig::default(),
            display_name: DISPLAY_NAME.to_string(),
            icon_path: None,
        }
    }
}

impl Tamil99Config {
    /// Convert this config into the base config used by `TextService::new()`
    pub fn into_base(self) -> ServiceConfig {
        self.base
    }

    /// Get a reference to the base config
    pub fn base(&self) -> &ServiceConfig {
        &self.base
    }

    /// Get a mutable reference to the base config
    pub fn base_mut(&mut self) -> &mut ServiceConfig {
        &mut self.base
    }

    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context as _;
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
