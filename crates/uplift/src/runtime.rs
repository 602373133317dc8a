//! Contracts of the external collaborators.
//!
//! The update center never loads plugin code or restarts the host process
//! itself; it hands verified files to the plugin runtime and restart
//! requests to the lifecycle. Both are supplied by the embedder.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use uplift_site::PluginEntry;

/// A plugin currently present in the running controller.
#[derive(Debug, Clone)]
pub struct InstalledPlugin {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    /// Shipped inside the host binary; pinned after a user-initiated
    /// install so the bundled copy cannot overwrite it.
    pub bundled: bool,
}

#[derive(Debug, Error)]
pub enum DynamicLoadError {
    /// Not a failure: the plugin is installed but its activation is gated
    /// on a host-process restart.
    #[error("restart required: {0}")]
    RestartRequired(String),

    #[error("{0}")]
    Failed(String),
}

/// The runtime that owns live plugin code.
#[async_trait]
pub trait PluginRuntime: Send + Sync {
    /// Snapshot of everything currently installed.
    fn installed(&self) -> Vec<InstalledPlugin>;

    /// Load a plugin file into the live process without restart.
    async fn dynamic_load(
        &self,
        path: &Path,
        strict: bool,
        batch: Option<&[PluginEntry]>,
    ) -> Result<(), DynamicLoadError>;

    /// Activate a completed install wave atomically.
    async fn start_batch(&self, batch: &[PluginEntry]) -> Result<(), DynamicLoadError>;

    /// Toggle the installed plugin's enabled flag.
    async fn enable(&self, name: &str) -> Result<(), DynamicLoadError>;

    fn is_bundled(&self, name: &str) -> bool;

    /// Pin a bundled plugin so host upgrades keep the installed version.
    fn pin(&self, name: &str) -> std::io::Result<()>;
}

/// The abstraction that can rewrite and restart the host process.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Whether this installation supports swapping the core binary.
    fn can_rewrite(&self) -> bool;

    /// Replace the host binary with the given verified file.
    async fn rewrite_core(&self, path: &Path) -> std::io::Result<()>;

    /// Orderly restart once in-flight work quiesces.
    async fn safe_restart(&self) -> std::io::Result<()>;
}
