//! Installer bookkeeping: publishing the service to the host's registries.
//!
//! Registration has three parts, published in order: the server entry (where
//! the module lives), the language profile, and the category memberships.
//! Only the keyboard category is required for the host to load the service;
//! the capability categories are advisory and a failure there is logged and
//! skipped. Any required failure withdraws everything published so far.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Categories a service can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Keyboard input processor. Without it the host never loads the service.
    Keyboard,
    ImmersiveSupport,
    SecureMode,
    DisplayAttributeProvider,
    UiElementEnabled,
    ComLess,
    InputModeCompartment,
    SystraySupport,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Keyboard,
        Category::ImmersiveSupport,
        Category::DisplayAttributeProvider,
        Category::UiElementEnabled,
        Category::SecureMode,
        Category::ComLess,
        Category::InputModeCompartment,
        Category::SystraySupport,
    ];

    pub const fn guid(self) -> Uuid {
        match self {
            Category::Keyboard => Uuid::from_u128(0x34745c63_b2f0_4784_8b67_5e12c8701a31),
            Category::ImmersiveSupport => Uuid::from_u128(0x13a016df_560b_46cd_947a_4c3af1e0e35d),
            Category::SecureMode => Uuid::from_u128(0x49d2f9ce_1f5e_11d7_a6d3_00065b84435c),
            Category::DisplayAttributeProvider => {
                Uuid::from_u128(0x046b8c80_1647_40f7_9b21_b93b81aabc1b)
            }
            Category::UiElementEnabled => Uuid::from_u128(0x49d2f9cf_1f5e_11d7_a6d3_00065b84435c),
            Category::ComLess => Uuid::from_u128(0x364215d9_75bc_11d7_a6ef_00065b84435c),
            Category::InputModeCompartment => {
                Uuid::from_u128(0xccf05dd7_4a87_11d7_a6e2_00065b84435c)
            }
            Category::SystraySupport => Uuid::from_u128(0x25504fb4_7bab_4bc1_9c69_cf81890f0ef5),
        }
    }

    /// Whether a registration failure for this category aborts the install.
    pub fn is_required(self) -> bool {
        self == Category::Keyboard
    }
}

/// Threading model declared for the in-process server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadingModel {
    #[default]
    Apartment,
    Free,
    Both,
}

impl fmt::Display for ThreadingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadingModel::Apartment => "Apartment",
            ThreadingModel::Free => "Free",
            ThreadingModel::Both => "Both",
        };
        f.write_str(name)
    }
}

/// Language profile under which the service appears in the host's UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub service_id: Uuid,
    pub profile_id: Uuid,
    pub display_name: String,
    /// Language identifier (for example `0x0449` for Tamil, India).
    pub language_id: u16,
    pub icon_path: String,
    pub icon_index: u32,
    pub immersive_support: bool,
    pub secure_mode_support: bool,
    pub enabled_by_default: bool,
}

/// Everything an installer publishes for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationManifest {
    pub profile: ServiceProfile,
    pub module_path: String,
    pub threading_model: ThreadingModel,
    pub categories: Vec<Category>,
}

impl RegistrationManifest {
    pub fn service_id(&self) -> Uuid {
        self.profile.service_id
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("server registration failed: {0}")]
    Server(String),

    #[error("profile registration failed: {0}")]
    Profile(String),

    #[error("category {category:?} registration failed: {reason}")]
    Category { category: Category, reason: String },

    #[error("{0} is not registered")]
    NotRegistered(String),

    #[error("registry storage error: {0}")]
    Storage(String),
}

/// The host's registration stores.
pub trait Registrar {
    fn register_server(
        &mut self,
        service_id: Uuid,
        description: &str,
        module_path: &str,
        threading_model: ThreadingModel,
    ) -> Result<(), RegistrationError>;

    fn unregister_server(&mut self, service_id: Uuid) -> Result<(), RegistrationError>;

    fn register_profile(&mut self, profile: &ServiceProfile) -> Result<(), RegistrationError>;

    fn unregister_profile(&mut self, profile: &ServiceProfile) -> Result<(), RegistrationError>;

    fn register_category(
        &mut self,
        category: Category,
        service_id: Uuid,
    ) -> Result<(), RegistrationError>;

    fn unregister_category(
        &mut self,
        category: Category,
        service_id: Uuid,
    ) -> Result<(), RegistrationError>;

    fn has_server(&self, service_id: Uuid) -> bool;

    fn has_profile(&self, profile: &ServiceProfile) -> bool;

    fn has_category(&self, category: Category, service_id: Uuid) -> bool;
}

/// Parts a single [`register`] call added that were not there before.
#[derive(Debug, Default)]
struct Published {
    server: bool,
    profile: bool,
    categories: Vec<Category>,
}

/// Publish `manifest`: server, then profile, then categories.
///
/// On failure of a required part, whatever this call added is withdrawn
/// before the error is returned. Parts that were already registered stay.
pub fn register<R: Registrar + ?Sized>(
    registrar: &mut R,
    manifest: &RegistrationManifest,
) -> Result<(), RegistrationError> {
    let service_id = manifest.service_id();
    tracing::debug!(%service_id, module = %manifest.module_path, "registering service");
    let mut published = Published::default();

    let existed = registrar.has_server(service_id);
    if let Err(err) = registrar.register_server(
        service_id,
        &manifest.profile.display_name,
        &manifest.module_path,
        manifest.threading_model,
    ) {
        tracing::warn!(%service_id, error = %err, "server registration failed");
        return Err(err);
    }
    published.server = !existed;

    let existed = registrar.has_profile(&manifest.profile);
    if let Err(err) = registrar.register_profile(&manifest.profile) {
        tracing::warn!(%service_id, error = %err, "profile registration failed, rolling back");
        withdraw(registrar, manifest, &published);
        return Err(err);
    }
    published.profile = !existed;

    for &category in &manifest.categories {
        let existed = registrar.has_category(category, service_id);
        match registrar.register_category(category, service_id) {
            Ok(()) => {
                tracing::debug!(?category, "category registered");
                if !existed {
                    published.categories.push(category);
                }
            }
            Err(err) if category.is_required() => {
                tracing::warn!(?category, error = %err, "required category failed, rolling back");
                withdraw(registrar, manifest, &published);
                return Err(err);
            }
            Err(err) => tracing::warn!(?category, error = %err, "optional category skipped"),
        }
    }

    tracing::info!(%service_id, "service registered");
    Ok(())
}

/// Undo the parts of a failed [`register`] call recorded in `published`.
fn withdraw<R: Registrar + ?Sized>(
    registrar: &mut R,
    manifest: &RegistrationManifest,
    published: &Published,
) {
    let service_id = manifest.service_id();
    for &category in published.categories.iter().rev() {
        if let Err(err) = registrar.unregister_category(category, service_id) {
            tracing::warn!(?category, error = %err, "rollback of category failed");
        }
    }
    if published.profile {
        if let Err(err) = registrar.unregister_profile(&manifest.profile) {
            tracing::warn!(error = %err, "rollback of profile failed");
        }
    }
    if published.server {
        if let Err(err) = registrar.unregister_server(service_id) {
            tracing::warn!(error = %err, "rollback of server failed");
        }
    }
}

/// Withdraw `manifest`: categories, then profile, then server.
///
/// Never stops early. Returns the failures it logged; parts that were never
/// published show up as [`RegistrationError::NotRegistered`].
pub fn unregister<R: Registrar + ?Sized>(
    registrar: &mut R,
    manifest: &RegistrationManifest,
) -> Vec<RegistrationError> {
    let service_id = manifest.service_id();
    let mut failures = Vec::new();

    for &category in manifest.categories.iter().rev() {
        if let Err(err) = registrar.unregister_category(category, service_id) {
            tracing::debug!(?category, error = %err, "category unregistration failed");
            failures.push(err);
        }
    }
    if let Err(err) = registrar.unregister_profile(&manifest.profile) {
        tracing::debug!(error = %err, "profile unregistration failed");
        failures.push(err);
    }
    if let Err(err) = registrar.unregister_server(service_id) {
        tracing::debug!(error = %err, "server unregistration failed");
        failures.push(err);
    }

    tracing::info!(%service_id, failures = failures.len(), "service unregistered");
    failures
}

// ============================================================================
// MemoryRegistry - in-process registrar
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub service_id: Uuid,
    pub description: String,
    pub module_path: String,
    pub threading_model: ThreadingModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category: Category,
    pub service_id: Uuid,
}

/// Registration stores that fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryFault {
    Server,
    Profile,
    Category(Category),
}

/// In-memory registrar. Serializable so a file-backed store can wrap it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegistry {
    #[serde(default)]
    servers: Vec<ServerEntry>,
    #[serde(default)]
    profiles: Vec<ServiceProfile>,
    #[serde(default)]
    categories: Vec<CategoryEntry>,
    #[serde(skip)]
    faults: Vec<RegistryFault>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&mut self, fault: RegistryFault) {
        self.faults.push(fault);
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.profiles.is_empty() && self.categories.is_empty()
    }

    pub fn server(&self, service_id: Uuid) -> Option<&ServerEntry> {
        self.servers.iter().find(|s| s.service_id == service_id)
    }

    pub fn profiles(&self) -> &[ServiceProfile] {
        &self.profiles
    }

    /// Categories registered for `service_id`, in registration order.
    pub fn categories_of(&self, service_id: Uuid) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|c| c.service_id == service_id)
            .map(|c| c.category)
            .collect()
    }

    fn check(&self, fault: RegistryFault) -> Result<(), String> {
        if self.faults.contains(&fault) {
            Err(format!("injected {fault:?} failure"))
        } else {
            Ok(())
        }
    }
}

impl Registrar for MemoryRegistry {
    fn register_server(
        &mut self,
        service_id: Uuid,
        description: &str,
        module_path: &str,
        threading_model: ThreadingModel,
    ) -> Result<(), RegistrationError> {
        self.check(RegistryFault::Server)
            .map_err(RegistrationError::Server)?;
        let entry = ServerEntry {
            service_id,
            description: description.to_string(),
            module_path: module_path.to_string(),
            threading_model,
        };
        match self.servers.iter_mut().find(|s| s.service_id == service_id) {
            Some(existing) => *existing = entry,
            None => self.servers.push(entry),
        }
        Ok(())
    }

    fn unregister_server(&mut self, service_id: Uuid) -> Result<(), RegistrationError> {
        let before = self.servers.len();
        self.servers.retain(|s| s.service_id != service_id);
        if self.servers.len() == before {
            return Err(RegistrationError::NotRegistered(format!("server {service_id}")));
        }
        Ok(())
    }

    fn register_profile(&mut self, profile: &ServiceProfile) -> Result<(), RegistrationError> {
        self.check(RegistryFault::Profile)
            .map_err(RegistrationError::Profile)?;
        match self.profiles.iter_mut().find(|p| same_profile(p, profile)) {
            Some(existing) => *existing = profile.clone(),
            None => self.profiles.push(profile.clone()),
        }
        Ok(())
    }

    fn unregister_profile(&mut self, profile: &ServiceProfile) -> Result<(), RegistrationError> {
        let before = self.profiles.len();
        self.profiles.retain(|p| !same_profile(p, profile));
        if self.profiles.len() == before {
            return Err(RegistrationError::NotRegistered(format!(
                "profile {}",
                profile.profile_id
            )));
        }
        Ok(())
    }

    fn register_category(
        &mut self,
        category: Category,
        service_id: Uuid,
    ) -> Result<(), RegistrationError> {
        self.check(RegistryFault::Category(category))
            .map_err(|reason| RegistrationError::Category { category, reason })?;
        let entry = CategoryEntry {
            category,
            service_id,
        };
        if !self.categories.contains(&entry) {
            self.categories.push(entry);
        }
        Ok(())
    }

    fn unregister_category(
        &mut self,
        category: Category,
        service_id: Uuid,
    ) -> Result<(), RegistrationError> {
        let entry = CategoryEntry {
            category,
            service_id,
        };
        let before = self.categories.len();
        self.categories.retain(|c| *c != entry);
        if self.categories.len() == before {
            return Err(RegistrationError::NotRegistered(format!("category {category:?}")));
        }
        Ok(())
    }

    fn has_server(&self, service_id: Uuid) -> bool {
        self.server(service_id).is_some()
    }

    fn has_profile(&self, profile: &ServiceProfile) -> bool {
        self.profiles.iter().any(|p| same_profile(p, profile))
    }

    fn has_category(&self, category: Category, service_id: Uuid) -> bool {
        self.categories.contains(&CategoryEntry {
            category,
            service_id,
        })
    }
}

/// Profiles are keyed by service, profile id and language.
fn same_profile(a: &ServiceProfile, b: &ServiceProfile) -> bool {
    a.service_id == b.service_id && a.profile_id == b.profile_id && a.language_id == b.language_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> RegistrationManifest {
        RegistrationManifest {
            profile: ServiceProfile {
                service_id: Uuid::from_u128(0xA),
                profile_id: Uuid::from_u128(0xB),
                display_name: "Test Keyboard".to_string(),
                language_id: 0x0449,
                icon_path: "test.dll".to_string(),
                icon_index: 0,
                immersive_support: true,
                secure_mode_support: true,
                enabled_by_default: true,
            },
            module_path: "test.dll".to_string(),
            threading_model: ThreadingModel::Apartment,
            categories: Category::ALL.to_vec(),
        }
    }

    #[test]
    fn test_category_guids_are_distinct() {
        let mut guids: Vec<Uuid> = Category::ALL.iter().map(|c| c.guid()).collect();
        guids.sort();
        guids.dedup();
        assert_eq!(guids.len(), Category::ALL.len());
        assert!(Category::Keyboard.is_required());
        assert!(!Category::SecureMode.is_required());
    }

    #[test]
    fn test_register_publishes_everything() {
        let mut registry = MemoryRegistry::new();
        let manifest = manifest();
        register(&mut registry, &manifest).unwrap();

        let server = registry.server(manifest.service_id()).unwrap();
        assert_eq!(server.module_path, "test.dll");
        assert_eq!(server.threading_model.to_string(), "Apartment");
        assert_eq!(registry.profiles(), &[manifest.profile.clone()]);
        assert_eq!(registry.categories_of(manifest.service_id()), Category::ALL.to_vec());
    }

    #[test]
    fn test_unregister_is_exact_inverse() {
        let mut registry = MemoryRegistry::new();
        let manifest = manifest();
        register(&mut registry, &manifest).unwrap();
        assert!(unregister(&mut registry, &manifest).is_empty());
        assert!(registry.is_empty());
        assert_eq!(registry, MemoryRegistry::new());
    }

    #[test]
    fn test_profile_failure_rolls_back_server() {
        let mut registry = MemoryRegistry::new();
        registry.fail_on(RegistryFault::Profile);
        let err = register(&mut registry, &manifest()).unwrap_err();
        assert!(matches!(err, RegistrationError::Profile(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_keyboard_category_failure_rolls_back() {
        let mut registry = MemoryRegistry::new();
        registry.fail_on(RegistryFault::Category(Category::Keyboard));
        let err = register(&mut registry, &manifest()).unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Category {
                category: Category::Keyboard,
                ..
            }
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_optional_category_failure_is_skipped() {
        let mut registry = MemoryRegistry::new();
        registry.fail_on(RegistryFault::Category(Category::SystraySupport));
        let manifest = manifest();
        register(&mut registry, &manifest).unwrap();
        let categories = registry.categories_of(manifest.service_id());
        assert!(categories.contains(&Category::Keyboard));
        assert!(!categories.contains(&Category::SystraySupport));

        let failures = unregister(&mut registry, &manifest);
        assert_eq!(failures.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_reregister_keeps_existing_install() {
        let mut registry = MemoryRegistry::new();
        let manifest = manifest();
        register(&mut registry, &manifest).unwrap();
        let before = registry.clone();

        registry.fail_on(RegistryFault::Profile);
        assert!(register(&mut registry, &manifest).is_err());
        registry.clear_faults();
        assert_eq!(registry, before);
        assert!(registry.has_server(manifest.service_id()));
        assert!(registry.has_profile(&manifest.profile));
    }

    #[test]
    fn test_failed_reregister_withdraws_only_new_categories() {
        let mut registry = MemoryRegistry::new();
        let mut manifest = manifest();
        manifest.categories = vec![Category::ImmersiveSupport];
        register(&mut registry, &manifest).unwrap();
        let before = registry.clone();

        manifest.categories = vec![
            Category::SecureMode,
            Category::ImmersiveSupport,
            Category::Keyboard,
        ];
        registry.fail_on(RegistryFault::Category(Category::Keyboard));
        assert!(register(&mut registry, &manifest).is_err());
        registry.clear_faults();
        assert_eq!(registry, before);
        assert_eq!(
            registry.categories_of(manifest.service_id()),
            vec![Category::ImmersiveSupport]
        );
    }

    #[test]
    fn test_server_failure_publishes_nothing() {
        let mut registry = MemoryRegistry::new();
        registry.fail_on(RegistryFault::Server);
        assert!(register(&mut registry, &manifest()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_nothing_reports_every_part() {
        let mut registry = MemoryRegistry::new();
        let manifest = manifest();
        let failures = unregister(&mut registry, &manifest);
        assert_eq!(failures.len(), manifest.categories.len() + 2);
    }

    #[test]
    fn test_registry_toml_round_trip() {
        let mut registry = MemoryRegistry::new();
        register(&mut registry, &manifest()).unwrap();
        let text = toml::to_string_pretty(&registry).unwrap();
        let parsed: MemoryRegistry = toml::from_str(&text).unwrap();
        assert_eq!(parsed, registry);
    }
}
