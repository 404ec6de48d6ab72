//! Base lifecycle capability implemented by every plugin.

use async_trait::async_trait;

use crate::error::PluginResult;
use crate::manifest::JsonMap;
use crate::status::HealthStatus;

/// Core lifecycle every plugin satisfies, whatever its contract.
///
/// Lifecycle:
///
/// 1. The factory constructs the plugin value — no heavy work here; models,
///    connections, and buffers belong in `initialize`.
/// 2. [`initialize`](PluginBase::initialize) is called once with the merged
///    configuration (manifest defaults overlaid by caller config). Returning
///    `Ok(false)` or an error leaves the plugin unusable and undoes the load.
/// 3. Contract methods are invoked through the isolated executor.
/// 4. [`shutdown`](PluginBase::shutdown) is called once to release every
///    resource acquired in `initialize`. Plugins must tolerate `shutdown`
///    with no requests in flight.
///
/// A second `initialize` on an already-ready plugin is treated as an error by
/// the manager; implementations may reject or no-op.
#[async_trait]
pub trait PluginBase: Send + Sync {
    /// Sets up plugin resources from the merged configuration.
    ///
    /// Returns `Ok(true)` when the plugin is ready to serve.
    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool>;

    /// Releases all plugin resources.
    ///
    /// Returns `Ok(true)` on a clean stop.
    async fn shutdown(&mut self) -> PluginResult<bool>;

    /// Reports current operational status. Must be fast and non-blocking.
    fn health_check(&self) -> HealthStatus;
}
