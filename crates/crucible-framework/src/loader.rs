//! Plugin loading against the process factory registry.
//!
//! Loading turns a [`DiscoveredPlugin`] into a live, uninitialized
//! instance:
//!
//! 1. Manifest dependencies are checked against the provided-package
//!    registry; missing ones are warnings (and, with auto-install enabled,
//!    an install attempt through the ambient package manager).
//! 2. The manifest's `entry_point` is resolved to a [`PluginFactory`].
//! 3. The factory constructs the instance (cheap by contract) and the
//!    manifest is bound onto it.
//!
//! Unloading removes the module key from the loader's active set; together
//! with dropping the instance this restores a clean slate for a later load.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crucible_core::dispatch::DynPlugin;
use crucible_core::manifest::{JsonMap, PluginManifest};
use crucible_core::registry::{self, RegistryError};
use crucible_core::status::PluginStatus;

use crate::discovery::DiscoveredPlugin;

/// Ceiling for one dependency-install subprocess.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// A loaded and instantiated plugin.
///
/// The manager owns these records, drives the `status` transitions, and
/// hands the shared `instance` to the router for contract-method calls.
pub struct LoadedPlugin {
    /// Plugin identifier (folder name).
    pub name: String,
    pub manifest: Arc<PluginManifest>,
    pub instance: Arc<AsyncMutex<Box<dyn DynPlugin>>>,
    pub contract: String,
    pub path: PathBuf,
    /// Namespace key in the loader's active set.
    pub module_key: String,
    pub initialized: bool,
    pub status: PluginStatus,
    /// Merged configuration in effect for the current initialization.
    pub active_config: JsonMap,
    /// Non-fatal problems found during loading.
    pub load_warnings: Vec<String>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name)
            .field("manifest", &self.manifest)
            .field("contract", &self.contract)
            .field("path", &self.path)
            .field("module_key", &self.module_key)
            .field("initialized", &self.initialized)
            .field("status", &self.status)
            .field("active_config", &self.active_config)
            .field("load_warnings", &self.load_warnings)
            .finish()
    }
}

impl LoadedPlugin {
    /// Wire form for JSON-RPC responses.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "version": self.manifest.version,
            "contract": self.contract,
            "path": self.path.display().to_string(),
            "initialized": self.initialized,
            "status": self.status,
            "display_name": self.manifest.display_name(),
            "description": self.manifest.description,
            "load_warnings": self.load_warnings,
        })
    }
}

/// Fatal loading failure.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot load invalid plugin '{0}'")]
    Invalid(String),

    #[error("manifest for '{0}' is incomplete")]
    Manifest(String),

    #[error(transparent)]
    Factory(#[from] RegistryError),

    #[error("factory '{entry_point}' serves contract '{actual}' but manifest declares '{declared}'")]
    ContractMismatch {
        entry_point: String,
        actual: String,
        declared: String,
    },

    #[error("plugin factory '{0}' panicked during construction")]
    Construction(String),
}

/// Resolves factories and instantiates plugins.
pub struct PluginLoader {
    auto_install_deps: bool,
    /// Ambient package-manager executable used for installs.
    installer: String,
    /// Module keys of currently-loaded plugins.
    active: Mutex<HashSet<String>>,
}

impl PluginLoader {
    pub fn new(auto_install_deps: bool) -> Self {
        debug!(auto_install_deps, "PluginLoader initialized");
        Self {
            auto_install_deps,
            installer: "pip".to_string(),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Overrides the package-manager executable (tests, exotic setups).
    pub fn with_installer(mut self, installer: impl Into<String>) -> Self {
        self.installer = installer.into();
        self
    }

    /// Splits requirement strings into satisfied and missing, judged against
    /// the provided-package registry.
    pub fn check_dependencies(&self, dependencies: &[String]) -> (Vec<String>, Vec<String>) {
        let mut installed = Vec::new();
        let mut missing = Vec::new();

        for requirement in dependencies {
            let name = requirement_name(requirement);
            if registry::package_provided(&name) {
                installed.push(requirement.clone());
            } else {
                missing.push(requirement.clone());
            }
        }

        (installed, missing)
    }

    /// Installs requirements through the ambient package manager.
    ///
    /// Bounded by [`INSTALL_TIMEOUT`]; failure is reported, not raised —
    /// loading continues and the plugin may still work with optional
    /// dependencies absent.
    pub async fn install_dependencies(&self, dependencies: &[String]) -> bool {
        if dependencies.is_empty() {
            return true;
        }

        info!(deps = ?dependencies, installer = %self.installer, "Installing dependencies");

        let mut command = tokio::process::Command::new(&self.installer);
        command.arg("install").args(dependencies);

        match tokio::time::timeout(INSTALL_TIMEOUT, command.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                info!("Dependencies installed");
                true
            }
            Ok(Ok(output)) => {
                error!(
                    status = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "Dependency install failed"
                );
                false
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to spawn package manager");
                false
            }
            Err(_) => {
                error!("Dependency installation timed out");
                false
            }
        }
    }

    /// Loads a discovered plugin into a live, uninitialized instance.
    pub async fn load(&self, discovered: &DiscoveredPlugin) -> Result<LoadedPlugin, LoadError> {
        if !discovered.valid {
            error!(plugin = %discovered.name, errors = ?discovered.errors, "Refusing to load invalid plugin");
            return Err(LoadError::Invalid(discovered.name.clone()));
        }
        let manifest = discovered
            .manifest
            .clone()
            .ok_or_else(|| LoadError::Manifest(discovered.name.clone()))?;

        let mut load_warnings = Vec::new();

        if !manifest.dependencies.is_empty() {
            let (_, missing) = self.check_dependencies(&manifest.dependencies);
            if !missing.is_empty() {
                if self.auto_install_deps {
                    if !self.install_dependencies(&missing).await {
                        load_warnings.push(format!("Failed to install dependencies: {missing:?}"));
                    }
                } else {
                    load_warnings.push(format!(
                        "Missing dependencies: {missing:?}. Run: {} install {}",
                        self.installer,
                        missing.join(" ")
                    ));
                }
            }
        }

        let factory = registry::find_factory(&discovered.entry_point)?;
        if factory.contract != discovered.contract {
            return Err(LoadError::ContractMismatch {
                entry_point: discovered.entry_point.clone(),
                actual: factory.contract.to_string(),
                declared: discovered.contract.clone(),
            });
        }

        let mut instance =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(factory.construct))
                .map_err(|_| LoadError::Construction(discovered.entry_point.clone()))?;

        let manifest = Arc::new(manifest);
        instance.bind_manifest(Arc::clone(&manifest));

        let module_key = format!("{}.{}", discovered.name, discovered.entry_point);
        {
            let mut active = self.active.lock();
            if !active.insert(module_key.clone()) {
                warn!(module = %module_key, "Module key already active; previous unload was incomplete");
            }
        }

        info!(plugin = %discovered.name, version = %manifest.version, "Plugin loaded");

        Ok(LoadedPlugin {
            name: discovered.name.clone(),
            manifest,
            instance: Arc::new(AsyncMutex::new(instance)),
            contract: discovered.contract.clone(),
            path: discovered.path.clone(),
            module_key,
            initialized: false,
            status: PluginStatus::Unloaded,
            active_config: JsonMap::new(),
            load_warnings,
        })
    }

    /// Clears the module key so a later load starts from a clean slate.
    pub fn unload(&self, loaded: &LoadedPlugin) {
        self.active.lock().remove(&loaded.module_key);
        info!(plugin = %loaded.name, "Plugin unloaded");
    }

    /// Whether a module key is currently active.
    pub fn is_active(&self, module_key: &str) -> bool {
        self.active.lock().contains(module_key)
    }
}

/// Extracts the package name from a requirement string, normalized for
/// comparison: `"Torch>=2.0.0"` → `"torch"`, `"pkg[extra]"` → `"pkg"`.
fn requirement_name(requirement: &str) -> String {
    let name = requirement
        .split(['>', '<', '=', '!', '~', '['])
        .next()
        .unwrap_or(requirement)
        .trim();
    name.to_lowercase().replace('-', "_")
}
