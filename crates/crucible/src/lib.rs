//! # Crucible
//!
//! A supervised plugin host: discovers manifest-described plugins on disk,
//! validates them against declarative contract registries, drives their
//! lifecycle (including hot swap with rollback), and exposes their
//! capabilities to a controller over line-delimited JSON-RPC 2.0 on
//! stdin/stdout.
//!
//! This crate re-exports the public API of the workspace: the contract and
//! wire types from `crucible-core` at the root, and the framework
//! (discovery, validation, loading, lifecycle, isolation), wire layer
//! (JSON-RPC framing, routing, shutdown, stdio transport), and runtime
//! (logging, CLI, host orchestration) crates by name.
//!
//! Writing a plugin takes a contract impl and one registry entry:
//!
//! ```rust,ignore
//! use crucible::prelude::*;
//! use linkme::distributed_slice;
//!
//! struct MyTts { /* … */ }
//!
//! #[async_trait::async_trait]
//! impl PluginBase for MyTts { /* initialize / shutdown / health_check */ }
//!
//! #[async_trait::async_trait]
//! impl TtsContract for MyTts { /* synthesize / list_voices / set_voice */ }
//!
//! #[distributed_slice(PLUGIN_FACTORIES)]
//! static FACTORY: PluginFactory = PluginFactory {
//!     entry_point: "my_tts",
//!     contract: "tts",
//!     construct: || Box::new(TtsDispatch::new(MyTts::new())),
//! };
//! ```

// Contracts and wire shapes.
pub use crucible_core::*;

// Framework, wire layer, and runtime, by crate.
pub use crucible_framework;
pub use crucible_rpc;
pub use crucible_runtime;

/// The commonly-needed surface for plugin authors and embedders.
pub mod prelude {
    pub use crucible_core::contract::{
        LlmContract, PluginBase, SttContract, TtsContract,
    };
    pub use crucible_core::dispatch::{DynPlugin, LlmDispatch, SttDispatch, TtsDispatch};
    pub use crucible_core::error::{PluginError, PluginResult};
    pub use crucible_core::manifest::{JsonMap, PluginManifest};
    pub use crucible_core::registry::{PLUGIN_FACTORIES, PluginFactory};
    pub use crucible_core::status::{HealthStatus, PluginStatus};
    pub use crucible_framework::manager::PluginManager;
    pub use crucible_rpc::router::Router;
    pub use crucible_runtime::host::PluginHost;
}
