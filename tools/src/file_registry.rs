//! Registrar persisted as a TOML file.
//!
//! Stands in for the host's registration stores on machines without them.
//! Changes are held in memory and written back by [`FileRegistry::commit`].

use std::path::{Path, PathBuf};

use tip_core::registration::{
    Category, MemoryRegistry, RegistrationError, Registrar, ServiceProfile, ThreadingModel,
};
use uuid::Uuid;

#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    inner: MemoryRegistry,
}

impl FileRegistry {
    /// Open the registry at `path`. A missing file is an empty registry.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RegistrationError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| storage(&path, e))?;
            toml::from_str(&content).map_err(|e| storage(&path, e))?
        } else {
            tracing::debug!(path = %path.display(), "registry file missing, starting empty");
            MemoryRegistry::new()
        };
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &MemoryRegistry {
        &self.inner
    }

    pub fn registry_mut(&mut self) -> &mut MemoryRegistry {
        &mut self.inner
    }

    /// Write the registry back to its file.
    pub fn commit(&self) -> Result<(), RegistrationError> {
        let content = toml::to_string_pretty(&self.inner).map_err(|e| storage(&self.path, e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| storage(&self.path, e))?;
        }
        std::fs::write(&self.path, content).map_err(|e| storage(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), "registry committed");
        Ok(())
    }
}

fn storage(path: &Path, err: impl std::fmt::Display) -> RegistrationError {
    RegistrationError::Storage(format!("{}: {}", path.display(), err))
}

impl Registrar for FileRegistry {
    fn register_server(
        &mut self,
        service_id: Uuid,
        description: &str,
        module_path: &str,
        threading_model: ThreadingModel,
    ) -> Result<(), RegistrationError> {
        self.inner
            .register_server(service_id, description, module_path, threading_model)
    }

    fn unregister_server(&mut self, service_id: Uuid) -> Result<(), RegistrationError> {
        self.inner.unregister_server(service_id)
    }

    fn register_profile(&mut self, profile: &ServiceProfile) -> Result<(), RegistrationError> {
        self.inner.register_profile(profile)
    }

    fn unregister_profile(&mut self, profile: &ServiceProfile) -> Result<(), RegistrationError> {
        self.inner.unregister_profile(profile)
    }

    fn register_category(
        &mut self,
        category: Category,
        service_id: Uuid,
    ) -> Result<(), RegistrationError> {
        self.inner.register_category(category, service_id)
    }

    fn unregister_category(
        &mut self,
        category: Category,
        service_id: Uuid,
    ) -> Result<(), RegistrationError> {
        self.inner.unregister_category(category, service_id)
    }

    fn has_server(&self, service_id: Uuid) -> bool {
        self.inner.has_server(service_id)
    }

    fn has_profile(&self, profile: &ServiceProfile) -> bool {
        self.inner.has_profile(profile)
    }

    fn has_category(&self, category: Category, service_id: Uuid) -> bool {
        self.inner.has_category(category, service_id)
    }
}
