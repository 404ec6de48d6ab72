//! # Crucible Runtime
//!
//! Host orchestration for the Crucible plugin host: logging pinned to
//! stderr ([`logging`]), the command-line surface ([`config`]), and the
//! [`PluginHost`](host::PluginHost) that wires manager, router, shutdown
//! coordinator, and stdio transport into a process ([`host`]).
//!
//! The `crucible-host` binary lives in this crate; `src/main.rs` is a thin
//! shell around [`host::PluginHost`].

pub mod config;
pub mod host;
pub mod logging;

pub use config::HostArgs;
pub use host::PluginHost;
pub use logging::{LoggingBuilder, parse_level};

// Built-in plugin crates are linked so their factory registrations land in
// the process registry.
#[cfg(feature = "llm-echo")]
pub use crucible_llm_echo as llm_echo;
#[cfg(feature = "stt-segmenter")]
pub use crucible_stt_segmenter as stt_segmenter;
#[cfg(feature = "tts-example")]
pub use crucible_tts_example as tts_example;
