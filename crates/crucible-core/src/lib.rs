//! # Crucible Core
//!
//! Contracts, wire data shapes, and the plugin factory registry for the
//! Crucible plugin host.
//!
//! This crate is the dependency floor of the workspace: it defines what a
//! plugin *is* — the [`PluginBase`](contract::PluginBase) lifecycle, the
//! domain contracts ([`TtsContract`](contract::TtsContract),
//! [`SttContract`](contract::SttContract),
//! [`LlmContract`](contract::LlmContract)), the manifest and health types,
//! and the [`DynPlugin`](dispatch::DynPlugin) dispatch surface the host
//! drives plugins through — without knowing anything about discovery,
//! loading, or the wire protocol.

pub mod contract;
pub mod dispatch;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod status;

pub use contract::{LlmContract, PluginBase, SttContract, TtsContract};
pub use dispatch::{DynPlugin, LlmDispatch, SttDispatch, TtsDispatch};
pub use error::{PluginError, PluginResult};
pub use manifest::{JsonMap, PluginManifest};
pub use registry::{PLUGIN_FACTORIES, PROVIDED_PACKAGES, PluginFactory, RegistryError};
pub use status::{HealthStatus, PluginStatus};
