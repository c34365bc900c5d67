//! Installer tooling shared by the `tip-register` binary.

pub mod file_registry;

pub use file_registry::FileRegistry;
