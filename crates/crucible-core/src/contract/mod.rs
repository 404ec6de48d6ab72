//! Plugin contracts: the capability sets plugins implement.
//!
//! # Architecture
//!
//! Every plugin satisfies the [`PluginBase`] lifecycle — initialize with a
//! config section, shut down, report health — and exactly one *contract*:
//! a domain capability set with required and optional operations.
//!
//! Three contracts ship with the host:
//!
//! | Tag   | Trait           | Required operations                          |
//! |-------|-----------------|----------------------------------------------|
//! | `tts` | [`TtsContract`] | `synthesize`, `list_voices`, `set_voice`     |
//! | `stt` | [`SttContract`] | `transcribe` (+ optional streaming protocol) |
//! | `llm` | [`LlmContract`] | `complete`, `complete_stream`, `list_models` |
//!
//! Each data shape carries its on-the-wire dictionary form via serde; binary
//! payloads are base64 strings and enum values serialize as their tag string,
//! so every record can be embedded in a JSON-RPC response as-is.
//!
//! The contracts are reference material for the validator and typed access
//! points for the executor — they perform no behavior at runtime beyond
//! serialization.

pub mod base;
pub mod llm;
pub mod stt;
pub mod tts;

pub use base::PluginBase;
pub use llm::{
    CompletionOptions, CompletionResult, FinishReason, LlmContract, Message, MessageRole, Model,
    StreamChunk, TokenUsage,
};
pub use stt::{
    StreamingConfig, SttContract, TranscriptionOptions, TranscriptionResult, TranscriptionSegment,
    TranscriptionStatus,
};
pub use tts::{AudioFormat, SynthesisOptions, SynthesisResult, TtsContract, Voice};

/// Serde adapter for binary payloads carried as base64 strings in JSON.
pub mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(&encoded).map_err(serde::de::Error::custom)
    }
}
