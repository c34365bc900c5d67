//! libtamil99 crate root
//!
//! Tamil99 keyboard layout for the `tip-core` text input processor: the key
//! table, its configuration, and the identity the service is registered
//! under.
//!
//! Public API exported here:
//! - `Tamil99Layout` and the `TAMIL99` table from `layout`
//! - `Tamil99Config` from `config`
//! - `create_service`, `factory`, `module` and `manifest`

pub mod config;
pub mod layout;

use std::sync::Arc;
use uuid::Uuid;

pub use config::Tamil99Config;
pub use layout::{Tamil99Layout, TAMIL99};

use tip_core::registration::ThreadingModel;
use tip_core::{
    Category, Module, ModuleLifetime, RegistrationManifest, ServiceFactory, ServiceProfile,
    TextService,
};

/// Identifier the service is registered and created under.
pub const SERVICE_ID: Uuid = Uuid::from_u128(0xf7123523_aa20_43cb_8be3_8aa74e8584f9);

/// Language profile identifier.
pub const PROFILE_ID: Uuid = Uuid::from_u128(0xb243dc17_b1c8_496a_b00b_5eb8c3ee4b6f);

/// Tamil (India).
pub const LANGUAGE_ID: u16 = 0x0449;

/// Profile name and server description shown by the host.
pub const DISPLAY_NAME: &str = "Murasu Anjal Core - Tamil99";

/// Categories published at install time. Only `Keyboard` is required.
pub const CATEGORIES: [Category; 8] = [
    Category::Keyboard,
    Category::ImmersiveSupport,
    Category::DisplayAttributeProvider,
    Category::UiElementEnabled,
    Category::SecureMode,
    Category::ComLess,
    Category::InputModeCompartment,
    Category::SystraySupport,
];

/// A new, inactive Tamil99 service.
pub fn create_service(config: &Tamil99Config, lifetime: &ModuleLifetime) -> Arc<TextService> {
    TextService::new(Arc::new(Tamil99Layout::new()), config.base(), lifetime)
}

pub fn factory(config: &Tamil99Config, lifetime: ModuleLifetime) -> ServiceFactory {
    ServiceFactory::new(
        SERVICE_ID,
        Arc::new(Tamil99Layout::new()),
        config.base().clone(),
        lifetime,
    )
}

/// Module exposing the Tamil99 factory.
pub fn module(config: &Tamil99Config) -> Module {
    let lifetime = ModuleLifetime::new();
    let factory = Arc::new(factory(config, lifetime.clone()));
    Module::new(lifetime).with_factory(factory)
}

/// Registration manifest for a module installed at `module_path`.
pub fn manifest(config: &Tamil99Config, module_path: &str) -> RegistrationManifest {
    RegistrationManifest {
        profile: ServiceProfile {
            service_id: SERVICE_ID,
            profile_id: PROFILE_ID,
            display_name: config.display_name.clone(),
            language_id: LANGUAGE_ID,
            icon_path: config
                .icon_path
                .clone()
                .unwrap_or_else(|| module_path.to_string()),
            icon_index: 0,
            immersive_support: true,
            secure_mode_support: true,
            enabled_by_default: true,
        },
        module_path: module_path.to_string(),
        threading_model: ThreadingModel::Apartment,
        categories: CATEGORIES.to_vec(),
    }
}
