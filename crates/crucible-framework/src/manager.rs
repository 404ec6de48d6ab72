//! Plugin lifecycle management with hot-swap support.
//!
//! [`PluginManager`] is the central owner of loaded plugins. It:
//!
//! - Forwards discovery and validation to their subsystems.
//! - Drives load → initialize → shutdown → unload, keeping the
//!   authoritative lifecycle state on each loaded record.
//! - Performs hot swap with rollback: the replacement is loaded before the
//!   incumbent is drained, and a failed replacement re-initializes the
//!   incumbent with exactly the configuration it was serving with.
//! - Enforces one loaded plugin per contract slot, so routing by contract
//!   tag is unambiguous.
//! - Surfaces health checks and fires on-load / on-unload / on-swap hooks.
//!
//! Every `initialize` and `shutdown` runs through the isolated executor, so
//! a plugin that stalls or panics during lifecycle transitions is contained
//! exactly like one that fails mid-request.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{debug, error, info, warn};

use crucible_core::dispatch::DynPlugin;
use crucible_core::manifest::JsonMap;
use crucible_core::status::{HealthStatus, PluginStatus};

use crate::discovery::{DiscoveredPlugin, Discovery};
use crate::executor::IsolatedExecutor;
use crate::loader::{LoadError, LoadedPlugin, PluginLoader};
use crate::validator::{PluginValidator, ValidationResult};

/// Manager-level failure, mapped onto the wire error table by the router.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugin not loaded: {0}")]
    NotLoaded(String),

    #[error("plugin '{0}' already loaded")]
    AlreadyLoaded(String),

    #[error("contract slot '{contract}' already served by '{occupant}'")]
    SlotOccupied { contract: String, occupant: String },

    #[error("validation failed for '{name}': {reasons}", reasons = .errors.join("; "))]
    ValidationFailed {
        name: String,
        manifest_invalid: bool,
        errors: Vec<String>,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("plugin '{0}' failed to initialize")]
    InitializeFailed(String),

    #[error("plugin '{0}' failed to shut down")]
    ShutdownFailed(String),

    #[error("contract mismatch: {old} vs {new}")]
    ContractMismatch { old: String, new: String },
}

/// Outcome of a hot-swap operation.
#[derive(Debug, Clone)]
pub struct HotSwapResult {
    pub success: bool,
    pub old_plugin: String,
    pub new_plugin: String,
    /// Whether the incumbent had to be re-initialized.
    pub rollback_performed: bool,
    /// Whether that re-initialization itself failed (the slot is then left
    /// with the incumbent in `Error`, serving nothing).
    pub rollback_failed: bool,
    pub errors: Vec<String>,
    pub swap_duration_ms: f64,
}

impl HotSwapResult {
    fn new(old_plugin: &str, new_plugin: &str) -> Self {
        Self {
            success: false,
            old_plugin: old_plugin.to_string(),
            new_plugin: new_plugin.to_string(),
            rollback_performed: false,
            rollback_failed: false,
            errors: Vec::new(),
            swap_duration_ms: 0.0,
        }
    }

    /// Wire form for JSON-RPC responses.
    pub fn to_wire(&self) -> Value {
        json!({
            "success": self.success,
            "old_plugin": self.old_plugin,
            "new_plugin": self.new_plugin,
            "rollback_performed": self.rollback_performed,
            "rollback_failed": self.rollback_failed,
            "errors": self.errors,
            "swap_duration_ms": self.swap_duration_ms,
        })
    }
}

/// Routing handle the router dispatches contract methods through.
pub struct RoutedPlugin {
    pub name: String,
    pub instance: Arc<AsyncMutex<Box<dyn DynPlugin>>>,
    pub status: PluginStatus,
}

type LoadCallback = Box<dyn Fn(&LoadedPlugin) + Send + Sync>;
type UnloadCallback = Box<dyn Fn(&str) + Send + Sync>;
type SwapCallback = Box<dyn Fn(&HotSwapResult) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_load: Vec<LoadCallback>,
    on_unload: Vec<UnloadCallback>,
    on_swap: Vec<SwapCallback>,
}

/// Central plugin lifecycle manager.
pub struct PluginManager {
    discovery: Discovery,
    validator: PluginValidator,
    loader: PluginLoader,
    executor: Arc<IsolatedExecutor>,
    plugins: AsyncRwLock<HashMap<String, LoadedPlugin>>,
    /// Caller-supplied config per plugin name (pre-merge).
    configs: AsyncRwLock<HashMap<String, JsonMap>>,
    callbacks: RwLock<Callbacks>,
    shutting_down: AtomicBool,
}

impl PluginManager {
    pub fn new(
        plugins_dir: impl Into<PathBuf>,
        config_dir: &Path,
        auto_install_deps: bool,
        executor: Arc<IsolatedExecutor>,
    ) -> Self {
        let plugins_dir = plugins_dir.into();
        debug!(plugins_dir = %plugins_dir.display(), "PluginManager initialized");
        Self {
            discovery: Discovery::new(&plugins_dir, config_dir),
            validator: PluginValidator::load(config_dir),
            loader: PluginLoader::new(auto_install_deps),
            executor,
            plugins: AsyncRwLock::new(HashMap::new()),
            configs: AsyncRwLock::new(HashMap::new()),
            callbacks: RwLock::new(Callbacks::default()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn executor(&self) -> &Arc<IsolatedExecutor> {
        &self.executor
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Whether `tag` is a contract the host knows about, loaded or not.
    ///
    /// The router uses this to distinguish an unknown method namespace
    /// (`METHOD_NOT_FOUND`) from a known contract with an empty slot
    /// (`PLUGIN_NOT_FOUND`).
    pub fn knows_contract(&self, tag: &str) -> bool {
        self.validator.contracts().knows(tag) || self.discovery.prefixes().knows_contract(tag)
    }

    // ─── Event hooks ─────────────────────────────────────────────────────────

    pub fn on_load(&self, callback: LoadCallback) {
        self.callbacks.write().on_load.push(callback);
    }

    pub fn on_unload(&self, callback: UnloadCallback) {
        self.callbacks.write().on_unload.push(callback);
    }

    pub fn on_swap(&self, callback: SwapCallback) {
        self.callbacks.write().on_swap.push(callback);
    }

    fn fire<T: ?Sized>(&self, name: &str, hooks: &[Box<dyn Fn(&T) + Send + Sync>], arg: &T) {
        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(|| hook(arg))).is_err() {
                error!(hook = name, "Error in event callback");
            }
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// Forwards to discovery.
    pub fn discover(&self, include_invalid: bool) -> Vec<DiscoveredPlugin> {
        self.discovery.scan(include_invalid)
    }

    /// Validates one plugin by name.
    pub fn validate(&self, name: &str, deep: bool) -> ValidationResult {
        match self.discovery.find(name) {
            Some(discovered) => self.validator.validate_from_discovery(&discovered, deep),
            None => {
                let mut result = ValidationResult::new(name);
                result.add_error(format!("Plugin not found: {name}"));
                result
            }
        }
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    pub async fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn status_of(&self, name: &str) -> Option<PluginStatus> {
        self.plugins.read().await.get(name).map(|p| p.status)
    }

    /// The plugin currently serving `contract`, if any.
    ///
    /// At most one loaded plugin per contract slot is guaranteed by
    /// [`load`](Self::load), so the lookup is unambiguous.
    pub async fn find_by_contract(&self, contract: &str) -> Option<RoutedPlugin> {
        let plugins = self.plugins.read().await;
        plugins
            .values()
            .find(|p| p.contract == contract)
            .map(|p| RoutedPlugin {
                name: p.name.clone(),
                instance: Arc::clone(&p.instance),
                status: p.status,
            })
    }

    /// Routing handle for a plugin by name.
    pub async fn routed(&self, name: &str) -> Option<RoutedPlugin> {
        let plugins = self.plugins.read().await;
        plugins.get(name).map(|p| RoutedPlugin {
            name: p.name.clone(),
            instance: Arc::clone(&p.instance),
            status: p.status,
        })
    }

    // ─── Lifecycle transitions ───────────────────────────────────────────────

    async fn initialize_record(
        &self,
        record: &mut LoadedPlugin,
        config: JsonMap,
    ) -> Result<(), ManagerError> {
        record.status = PluginStatus::Initializing;
        let instance = Arc::clone(&record.instance);
        let params = json!({"config": Value::Object(config.clone())});

        let outcome = {
            let mut guard = instance.lock().await;
            self.executor
                .run(&record.name, "initialize", None, &params, guard.initialize(&config))
                .await
        };

        match outcome {
            Ok((true, elapsed)) => {
                record.status = PluginStatus::Ready;
                record.initialized = true;
                record.active_config = config;
                info!(plugin = %record.name, elapsed_ms = elapsed as u64, "Plugin initialized");
                Ok(())
            }
            Ok((false, _)) => {
                record.status = PluginStatus::Error;
                error!(plugin = %record.name, "Plugin initialization returned false");
                Err(ManagerError::InitializeFailed(record.name.clone()))
            }
            Err(e) => {
                record.status = PluginStatus::Error;
                error!(plugin = %record.name, error = %e, "Plugin initialization failed");
                Err(ManagerError::InitializeFailed(record.name.clone()))
            }
        }
    }

    async fn shutdown_record(&self, record: &mut LoadedPlugin) -> Result<(), ManagerError> {
        if !record.initialized {
            debug!(plugin = %record.name, "Plugin not initialized, nothing to shut down");
            return Ok(());
        }

        record.status = PluginStatus::ShuttingDown;
        let instance = Arc::clone(&record.instance);

        let outcome = {
            let mut guard = instance.lock().await;
            self.executor
                .run(&record.name, "shutdown", None, &Value::Null, guard.shutdown())
                .await
        };

        match outcome {
            Ok((true, _)) => {
                record.status = PluginStatus::Stopped;
                record.initialized = false;
                info!(plugin = %record.name, "Plugin shut down");
                Ok(())
            }
            Ok((false, _)) => {
                record.status = PluginStatus::Error;
                error!(plugin = %record.name, "Plugin shutdown returned false");
                Err(ManagerError::ShutdownFailed(record.name.clone()))
            }
            Err(e) => {
                record.status = PluginStatus::Error;
                error!(plugin = %record.name, error = %e, "Plugin shutdown failed");
                Err(ManagerError::ShutdownFailed(record.name.clone()))
            }
        }
    }

    /// Merges manifest defaults with caller config (caller wins).
    fn merge_config(defaults: &JsonMap, overrides: &JsonMap) -> JsonMap {
        let mut merged = defaults.clone();
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    // ─── Load / unload / reload ──────────────────────────────────────────────

    /// Loads a plugin by name: discover → shallow-validate → load →
    /// (optionally) initialize with the merged configuration.
    ///
    /// Returns the loaded-plugin record in wire form. A failed
    /// initialization undoes the load.
    pub async fn load(
        &self,
        name: &str,
        config: Option<JsonMap>,
        auto_initialize: bool,
    ) -> Result<Value, ManagerError> {
        {
            let plugins = self.plugins.read().await;
            if plugins.contains_key(name) {
                warn!(plugin = %name, "Plugin already loaded");
                return Err(ManagerError::AlreadyLoaded(name.to_string()));
            }
        }

        let discovered = self
            .discovery
            .find(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        // One plugin per contract slot.
        {
            let plugins = self.plugins.read().await;
            if let Some(occupant) = plugins.values().find(|p| p.contract == discovered.contract) {
                return Err(ManagerError::SlotOccupied {
                    contract: discovered.contract.clone(),
                    occupant: occupant.name.clone(),
                });
            }
        }

        let validation = self.validator.validate_from_discovery(&discovered, false);
        if !validation.valid {
            error!(plugin = %name, errors = ?validation.errors, "Plugin validation failed");
            return Err(ManagerError::ValidationFailed {
                name: name.to_string(),
                manifest_invalid: !validation.manifest_valid,
                errors: validation.errors,
            });
        }

        let mut loaded = self.loader.load(&discovered).await?;

        let caller_config = config.unwrap_or_default();
        if auto_initialize {
            let merged = Self::merge_config(&loaded.manifest.default_config, &caller_config);
            if let Err(e) = self.initialize_record(&mut loaded, merged).await {
                self.loader.unload(&loaded);
                return Err(e);
            }
        }

        self.configs
            .write()
            .await
            .insert(name.to_string(), caller_config);

        let wire = loaded.to_wire();
        self.plugins.write().await.insert(name.to_string(), loaded);
        {
            let plugins = self.plugins.read().await;
            if let Some(record) = plugins.get(name) {
                let callbacks = self.callbacks.read();
                self.fire("on_load", &callbacks.on_load, record);
            }
        }

        Ok(wire)
    }

    /// Unloads a plugin: shutdown (if initialized), clear the loader's
    /// namespace entry, drop the record. Shutdown errors are logged but do
    /// not block removal.
    pub async fn unload(&self, name: &str) -> Result<(), ManagerError> {
        let record = {
            let mut plugins = self.plugins.write().await;
            let record = plugins
                .get_mut(name)
                .ok_or_else(|| ManagerError::NotLoaded(name.to_string()))?;
            if let Err(e) = self.shutdown_record(record).await {
                warn!(plugin = %name, error = %e, "Shutdown error during unload");
            }
            plugins
                .remove(name)
                .ok_or_else(|| ManagerError::NotLoaded(name.to_string()))?
        };

        self.loader.unload(&record);
        self.configs.write().await.remove(name);

        let callbacks = self.callbacks.read();
        self.fire("on_unload", &callbacks.on_unload, name);

        Ok(())
    }

    /// Unloads then loads a fresh instance, reusing the stored caller
    /// config when none is given.
    pub async fn reload(
        &self,
        name: &str,
        config: Option<JsonMap>,
    ) -> Result<Value, ManagerError> {
        let config = match config {
            Some(config) => Some(config),
            None => self.configs.read().await.get(name).cloned(),
        };

        if self.is_loaded(name).await {
            self.unload(name).await?;
        }
        self.load(name, config, true).await
    }

    // ─── Hot swap ────────────────────────────────────────────────────────────

    /// Replaces the plugin serving a contract slot, with rollback.
    ///
    /// Precondition failures (incumbent not loaded, replacement not
    /// discoverable, contract mismatch, replacement load failure) return
    /// `Err` with state unchanged. Once the incumbent has been drained the
    /// outcome is always an [`HotSwapResult`]: success, rollback, or —
    /// worst case — a failed rollback that leaves the incumbent in `Error`
    /// serving nothing.
    pub async fn hot_swap(
        &self,
        old_name: &str,
        new_name: &str,
        new_config: Option<JsonMap>,
    ) -> Result<HotSwapResult, ManagerError> {
        let start = Instant::now();
        let mut result = HotSwapResult::new(old_name, new_name);

        let old_contract = {
            let plugins = self.plugins.read().await;
            let record = plugins
                .get(old_name)
                .ok_or_else(|| ManagerError::NotLoaded(old_name.to_string()))?;
            record.contract.clone()
        };

        let new_discovered = self
            .discovery
            .find(new_name)
            .ok_or_else(|| ManagerError::NotFound(new_name.to_string()))?;

        if old_contract != new_discovered.contract {
            return Err(ManagerError::ContractMismatch {
                old: old_contract,
                new: new_discovered.contract.clone(),
            });
        }

        info!(old = %old_name, new = %new_name, "Hot swap started");

        // 1. Load the replacement without initializing. Failure aborts with
        //    the incumbent untouched.
        let mut new_loaded = self.loader.load(&new_discovered).await?;

        // 2. Drain the incumbent. Its shutdown result is retained but not
        //    yet fatal.
        {
            let mut plugins = self.plugins.write().await;
            let record = plugins
                .get_mut(old_name)
                .ok_or_else(|| ManagerError::NotLoaded(old_name.to_string()))?;
            if let Err(e) = self.shutdown_record(record).await {
                result.errors.push(format!("Error shutting down old plugin: {e}"));
            }
        }

        // 3. Initialize the replacement with its merged configuration.
        let caller_config = match new_config {
            Some(config) => config,
            None => self
                .configs
                .read()
                .await
                .get(new_name)
                .cloned()
                .unwrap_or_default(),
        };
        let merged = Self::merge_config(&new_loaded.manifest.default_config, &caller_config);

        match self.initialize_record(&mut new_loaded, merged).await {
            Ok(()) => {
                // 4a. Commit: the incumbent's module leaves the namespace,
                //     the slot and stored config move to the replacement.
                let old_record = {
                    let mut plugins = self.plugins.write().await;
                    let old_record = plugins.remove(old_name);
                    plugins.insert(new_name.to_string(), new_loaded);
                    old_record
                };
                if let Some(old_record) = &old_record {
                    self.loader.unload(old_record);
                }
                {
                    let mut configs = self.configs.write().await;
                    configs.remove(old_name);
                    configs.insert(new_name.to_string(), caller_config);
                }

                result.success = true;
                result.swap_duration_ms = start.elapsed().as_secs_f64() * 1000.0;

                let callbacks = self.callbacks.read();
                self.fire("on_swap", &callbacks.on_swap, &result);

                info!(
                    old = %old_name,
                    new = %new_name,
                    duration_ms = result.swap_duration_ms as u64,
                    "Hot swap complete"
                );
                Ok(result)
            }
            Err(_) => {
                // 4b. Roll back: drop the replacement, re-initialize the
                //     incumbent with exactly the configuration it had.
                warn!(old = %old_name, new = %new_name, "Replacement failed to initialize, rolling back");
                result.errors.push(format!("New plugin initialization failed: {new_name}"));
                result.rollback_performed = true;

                self.loader.unload(&new_loaded);
                drop(new_loaded);

                let rollback = {
                    let mut plugins = self.plugins.write().await;
                    match plugins.get_mut(old_name) {
                        Some(record) => {
                            let config = record.active_config.clone();
                            self.initialize_record(record, config).await
                        }
                        None => Err(ManagerError::NotLoaded(old_name.to_string())),
                    }
                };

                match rollback {
                    Ok(()) => {
                        info!(plugin = %old_name, "Rollback successful, incumbent restored");
                    }
                    Err(e) => {
                        result.rollback_failed = true;
                        result.errors.push(format!("CRITICAL: rollback also failed: {e}"));
                        error!(plugin = %old_name, "Rollback failed, contract slot is down");
                    }
                }

                result.swap_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                Ok(result)
            }
        }
    }

    // ─── Health and summaries ────────────────────────────────────────────────

    /// Health check for one loaded plugin. An exception inside the plugin's
    /// health probe is reported as an `Error` health record.
    pub async fn health_check(&self, name: &str) -> Option<HealthStatus> {
        let instance = {
            let plugins = self.plugins.read().await;
            Arc::clone(&plugins.get(name)?.instance)
        };
        let guard = instance.lock().await;
        let health = catch_unwind(AssertUnwindSafe(|| guard.health_check()));
        Some(match health {
            Ok(health) => health,
            Err(_) => {
                error!(plugin = %name, "Health check panicked");
                HealthStatus::error("Health check panicked")
            }
        })
    }

    /// Health checks for every loaded plugin.
    pub async fn health_check_all(&self) -> BTreeMap<String, HealthStatus> {
        let names = self.loaded_names().await;
        let mut results = BTreeMap::new();
        for name in names {
            if let Some(health) = self.health_check(&name).await {
                results.insert(name, health);
            }
        }
        results
    }

    /// Summary of loaded plugins grouped by contract and by status.
    pub async fn status_summary(&self) -> Value {
        let plugins = self.plugins.read().await;

        let mut entries = serde_json::Map::new();
        let mut by_contract: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut by_status: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (name, record) in plugins.iter() {
            entries.insert(
                name.clone(),
                json!({
                    "version": record.manifest.version,
                    "contract": record.contract,
                    "status": record.status,
                    "initialized": record.initialized,
                }),
            );
            by_contract.entry(record.contract.clone()).or_default().push(name.clone());
            by_status.entry(record.status.to_string()).or_default().push(name.clone());
        }
        for names in by_contract.values_mut().chain(by_status.values_mut()) {
            names.sort();
        }

        json!({
            "total_loaded": plugins.len(),
            "plugins": entries,
            "by_contract": by_contract,
            "by_status": by_status,
        })
    }

    /// Wire records of all loaded plugins.
    pub async fn list_loaded(&self) -> Vec<Value> {
        let plugins = self.plugins.read().await;
        let mut records: Vec<&LoadedPlugin> = plugins.values().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records.iter().map(|p| p.to_wire()).collect()
    }

    /// All discovered plugins (valid or not) with their loaded flag.
    pub async fn list_available(&self) -> Vec<Value> {
        let discovered = self.discovery.scan(true);
        let plugins = self.plugins.read().await;
        discovered
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "version": p.version,
                    "contract": p.contract,
                    "path": p.path.display().to_string(),
                    "valid": p.valid,
                    "loaded": plugins.contains_key(&p.name),
                    "errors": p.errors,
                })
            })
            .collect()
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Shuts down and unloads every plugin. Errors are captured per plugin
    /// and never block the rest of the teardown.
    pub async fn shutdown_all(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            warn!("Manager shutdown already in progress");
            return;
        }

        info!("Shutting down all plugins");
        for name in self.loaded_names().await {
            if let Err(e) = self.unload(&name).await {
                error!(plugin = %name, error = %e, "Error unloading plugin during shutdown");
            }
        }
        self.shutting_down.store(false, Ordering::SeqCst);
        info!("All plugins shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_tts_manifest, write_plugin_dir};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn manager(root: &TempDir) -> PluginManager {
        PluginManager::new(
            root.path().join("plugins"),
            &root.path().join("config"),
            false,
            Arc::new(IsolatedExecutor::default()),
        )
    }

    fn add_plugin(root: &TempDir, name: &str) {
        write_plugin_dir(&root.path().join("plugins"), name, fake_tts_manifest(name));
    }

    fn add_plugin_with(root: &TempDir, name: &str, default_config: Value) {
        let mut manifest = fake_tts_manifest(name);
        manifest["default_config"] = default_config;
        write_plugin_dir(&root.path().join("plugins"), name, manifest);
    }

    #[tokio::test]
    async fn load_initializes_and_reports_ready() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        let manager = manager(&root);

        let wire = manager.load("tts_fake_plugin", None, true).await.unwrap();
        assert_eq!(wire["status"], "ready");
        assert_eq!(wire["initialized"], true);
        assert_eq!(manager.status_of("tts_fake_plugin").await, Some(PluginStatus::Ready));
    }

    #[tokio::test]
    async fn caller_config_overrides_manifest_defaults() {
        let root = TempDir::new().unwrap();
        add_plugin_with(&root, "tts_fake_plugin", json!({"default_voice": "alice"}));
        let manager = manager(&root);

        let mut config = JsonMap::new();
        config.insert("default_voice".into(), json!("bob"));
        manager.load("tts_fake_plugin", Some(config), true).await.unwrap();

        let health = manager.health_check("tts_fake_plugin").await.unwrap();
        assert_eq!(health.details["current_voice"], "bob");
    }

    #[tokio::test]
    async fn duplicate_load_is_rejected() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        let manager = manager(&root);

        manager.load("tts_fake_plugin", None, true).await.unwrap();
        let err = manager.load("tts_fake_plugin", None, true).await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyLoaded(_)));
    }

    #[tokio::test]
    async fn occupied_contract_slot_is_rejected() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        add_plugin(&root, "tts_other_plugin");
        let manager = manager(&root);

        manager.load("tts_fake_plugin", None, true).await.unwrap();
        let err = manager.load("tts_other_plugin", None, true).await.unwrap_err();
        assert!(matches!(err, ManagerError::SlotOccupied { .. }));
        assert_eq!(manager.loaded_names().await, vec!["tts_fake_plugin"]);
    }

    #[tokio::test]
    async fn failed_initialization_undoes_the_load() {
        let root = TempDir::new().unwrap();
        add_plugin_with(&root, "tts_fake_plugin", json!({"fail_init": true}));
        let manager = manager(&root);

        let err = manager.load("tts_fake_plugin", None, true).await.unwrap_err();
        assert!(matches!(err, ManagerError::InitializeFailed(_)));
        assert!(!manager.is_loaded("tts_fake_plugin").await);
    }

    #[tokio::test]
    async fn unload_removes_the_plugin() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        let manager = manager(&root);

        manager.load("tts_fake_plugin", None, true).await.unwrap();
        manager.unload("tts_fake_plugin").await.unwrap();
        assert!(!manager.is_loaded("tts_fake_plugin").await);

        let err = manager.unload("tts_fake_plugin").await.unwrap_err();
        assert!(matches!(err, ManagerError::NotLoaded(_)));
    }

    #[tokio::test]
    async fn reload_reuses_stored_config() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        let manager = manager(&root);

        let mut config = JsonMap::new();
        config.insert("default_voice".into(), json!("bob"));
        manager.load("tts_fake_plugin", Some(config), true).await.unwrap();

        let wire = manager.reload("tts_fake_plugin", None).await.unwrap();
        assert_eq!(wire["status"], "ready");
        let health = manager.health_check("tts_fake_plugin").await.unwrap();
        assert_eq!(health.details["current_voice"], "bob");
    }

    #[tokio::test]
    async fn hot_swap_replaces_the_slot() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        add_plugin_with(&root, "tts_newer_plugin", json!({"default_voice": "bob"}));
        let manager = manager(&root);

        manager.load("tts_fake_plugin", None, true).await.unwrap();
        let result = manager
            .hot_swap("tts_fake_plugin", "tts_newer_plugin", None)
            .await
            .unwrap();

        assert!(result.success, "errors: {:?}", result.errors);
        assert!(!result.rollback_performed);
        assert!(result.swap_duration_ms >= 0.0);
        assert!(!manager.is_loaded("tts_fake_plugin").await);
        assert_eq!(manager.status_of("tts_newer_plugin").await, Some(PluginStatus::Ready));

        let routed = manager.find_by_contract("tts").await.unwrap();
        assert_eq!(routed.name, "tts_newer_plugin");
    }

    #[tokio::test]
    async fn failed_swap_rolls_back_to_the_incumbent() {
        let root = TempDir::new().unwrap();
        add_plugin_with(&root, "tts_fake_plugin", json!({"default_voice": "alice"}));
        add_plugin_with(&root, "tts_broken_plugin", json!({"fail_init": true}));
        let manager = manager(&root);

        manager.load("tts_fake_plugin", None, true).await.unwrap();
        let result = manager
            .hot_swap("tts_fake_plugin", "tts_broken_plugin", None)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.rollback_performed);
        assert!(!result.rollback_failed);

        // The incumbent serves the slot again, with its original config.
        assert_eq!(manager.status_of("tts_fake_plugin").await, Some(PluginStatus::Ready));
        assert!(!manager.is_loaded("tts_broken_plugin").await);
        let health = manager.health_check("tts_fake_plugin").await.unwrap();
        assert_eq!(health.status, PluginStatus::Ready);
        assert_eq!(health.details["current_voice"], "alice");
    }

    #[tokio::test]
    async fn failed_rollback_leaves_slot_in_error() {
        let root = TempDir::new().unwrap();
        add_plugin_with(&root, "tts_fake_plugin", json!({"fail_reinit": true}));
        add_plugin_with(&root, "tts_broken_plugin", json!({"fail_init": true}));
        let manager = manager(&root);

        manager.load("tts_fake_plugin", None, true).await.unwrap();
        let result = manager
            .hot_swap("tts_fake_plugin", "tts_broken_plugin", None)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.rollback_performed);
        assert!(result.rollback_failed);
        assert!(result.errors.iter().any(|e| e.contains("CRITICAL")));

        // The incumbent stays registered but serves nothing.
        assert_eq!(manager.status_of("tts_fake_plugin").await, Some(PluginStatus::Error));
    }

    #[tokio::test]
    async fn swap_across_contracts_is_rejected_before_touching_state() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        // An on-disk manifest claiming stt with the tts factory never gets
        // that far: the contract check fires first.
        write_plugin_dir(
            &root.path().join("plugins"),
            "stt_fake_plugin",
            json!({
                "name": "stt_fake_plugin",
                "version": "1.0.0",
                "contract": "stt",
                "entry_point": "fake_tts",
            }),
        );
        let manager = manager(&root);

        manager.load("tts_fake_plugin", None, true).await.unwrap();
        let err = manager
            .hot_swap("tts_fake_plugin", "stt_fake_plugin", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::ContractMismatch { .. }));
        assert_eq!(manager.status_of("tts_fake_plugin").await, Some(PluginStatus::Ready));
    }

    #[tokio::test]
    async fn callbacks_fire_on_lifecycle_events() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        let manager = manager(&root);

        let loads = Arc::new(AtomicUsize::new(0));
        let unloads = Arc::new(AtomicUsize::new(0));
        let loads_hook = Arc::clone(&loads);
        let unloads_hook = Arc::clone(&unloads);
        manager.on_load(Box::new(move |_| {
            loads_hook.fetch_add(1, Ordering::SeqCst);
        }));
        manager.on_unload(Box::new(move |_| {
            unloads_hook.fetch_add(1, Ordering::SeqCst);
        }));

        manager.load("tts_fake_plugin", None, true).await.unwrap();
        manager.unload("tts_fake_plugin").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(unloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_summary_groups_by_contract_and_status() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        let manager = manager(&root);
        manager.load("tts_fake_plugin", None, true).await.unwrap();

        let summary = manager.status_summary().await;
        assert_eq!(summary["total_loaded"], 1);
        assert_eq!(summary["by_contract"]["tts"], json!(["tts_fake_plugin"]));
        assert_eq!(summary["by_status"]["ready"], json!(["tts_fake_plugin"]));
        assert_eq!(summary["plugins"]["tts_fake_plugin"]["contract"], "tts");
    }

    #[tokio::test]
    async fn shutdown_all_unloads_everything() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        let manager = manager(&root);
        manager.load("tts_fake_plugin", None, true).await.unwrap();

        manager.shutdown_all().await;
        assert!(manager.loaded_names().await.is_empty());
    }

    #[tokio::test]
    async fn list_available_marks_loaded_plugins() {
        let root = TempDir::new().unwrap();
        add_plugin(&root, "tts_fake_plugin");
        let manager = manager(&root);
        manager.load("tts_fake_plugin", None, true).await.unwrap();

        let available = manager.list_available().await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0]["loaded"], true);
        assert_eq!(available[0]["valid"], true);
    }
}
