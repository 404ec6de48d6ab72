//! Plugin lifecycle states and health reporting.

use serde::{Deserialize, Serialize};

use crate::manifest::JsonMap;

/// Lifecycle state of a plugin.
///
/// The manager owns the authoritative state on the loaded-plugin record;
/// plugins additionally track their own view and report it from
/// [`health_check`](crate::contract::PluginBase::health_check).
///
/// Transitions (driven by the manager):
///
/// ```text
/// Unloaded ──initialize──► Initializing ──ok──► Ready ◄──► Busy
///                                │
///                                └──err──► Error
/// any ──shutdown──► ShuttingDown ──ok──► Stopped
///                        └──err──► Error
/// ```
///
/// `Error` never returns to `Ready` without a full unload/load cycle.
/// `Busy` is observability-only; the host treats `Ready` and `Busy` the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    Unloaded,
    Initializing,
    Ready,
    Busy,
    Error,
    ShuttingDown,
    Stopped,
}

impl PluginStatus {
    /// Whether the router may dispatch contract methods to the plugin.
    pub fn is_serviceable(&self) -> bool {
        matches!(self, PluginStatus::Ready | PluginStatus::Busy)
    }

    /// Stable wire tag for this state (same string serde emits).
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatus::Unloaded => "unloaded",
            PluginStatus::Initializing => "initializing",
            PluginStatus::Ready => "ready",
            PluginStatus::Busy => "busy",
            PluginStatus::Error => "error",
            PluginStatus::ShuttingDown => "shutting_down",
            PluginStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health check response returned by every plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Current plugin state as the plugin itself sees it.
    pub status: PluginStatus,
    /// Human-readable status message.
    #[serde(default)]
    pub message: String,
    /// Additional diagnostic details (voice counts, model names, …).
    #[serde(default)]
    pub details: JsonMap,
    /// Optional response-time measurement in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Optional resident memory estimate in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
}

impl HealthStatus {
    /// A healthy `Ready` report with the given message.
    pub fn ready(message: impl Into<String>) -> Self {
        Self::new(PluginStatus::Ready, message)
    }

    /// An `Error` report with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(PluginStatus::Error, message)
    }

    pub fn new(status: PluginStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: JsonMap::new(),
            latency_ms: None,
            memory_mb: None,
        }
    }

    /// Attaches a diagnostic detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
