//! String-keyed dispatch over typed contract plugins.
//!
//! The router addresses plugins by `"<contract>/<operation>"` method names
//! with JSON parameters; the contract traits are typed. [`DynPlugin`] is the
//! object-safe bridge between the two: the manager stores every loaded
//! plugin as a `Box<dyn DynPlugin>`, and the per-contract dispatch wrappers
//! ([`TtsDispatch`], [`SttDispatch`], [`LlmDispatch`]) decode the JSON
//! parameters into the typed option structs, call the trait method, and
//! encode the typed result back into a JSON value.
//!
//! Plugin crates construct their factory around a wrapper:
//!
//! ```rust,ignore
//! fn construct() -> Box<dyn DynPlugin> {
//!     Box::new(TtsDispatch::new(ExampleTtsPlugin::new()))
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::contract::llm::{CompletionOptions, LlmContract, Message, StreamChunk};
use crate::contract::stt::{StreamingConfig, SttContract, TranscriptionOptions};
use crate::contract::tts::{SynthesisOptions, TtsContract};
use crate::error::{PluginError, PluginResult};
use crate::manifest::{JsonMap, PluginManifest};
use crate::status::HealthStatus;

/// Operations the TTS dispatch wrapper answers.
pub const TTS_METHODS: &[&str] = &[
    "synthesize",
    "list_voices",
    "set_voice",
    "current_voice",
    "supported_languages",
];

/// Operations the STT dispatch wrapper answers.
pub const STT_METHODS: &[&str] = &[
    "transcribe",
    "start_streaming",
    "feed_audio",
    "stop_streaming",
    "supported_languages",
];

/// Operations the LLM dispatch wrapper answers.
pub const LLM_METHODS: &[&str] = &[
    "complete",
    "complete_stream",
    "list_models",
    "set_model",
    "current_model",
];

/// A loaded plugin as the host sees it: lifecycle plus string-keyed
/// contract-method invocation.
#[async_trait]
pub trait DynPlugin: Send + Sync {
    /// Contract tag this plugin serves (`"tts"`, `"stt"`, `"llm"`, …).
    fn contract(&self) -> &'static str;

    /// Operations resolvable through [`invoke`](DynPlugin::invoke).
    fn methods(&self) -> &'static [&'static str];

    /// Manifest bound by the loader, if any.
    fn manifest(&self) -> Option<&Arc<PluginManifest>>;

    /// Binds the manifest onto the instance (called once by the loader).
    fn bind_manifest(&mut self, manifest: Arc<PluginManifest>);

    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool>;

    async fn shutdown(&mut self) -> PluginResult<bool>;

    fn health_check(&self) -> HealthStatus;

    /// Invokes a contract operation with JSON-RPC parameters.
    async fn invoke(&mut self, op: &str, params: Value) -> PluginResult<Value>;
}

/// Decodes JSON-RPC params into a typed parameter struct.
///
/// Absent params arrive as `Null` and decode as an empty object so that
/// all-optional parameter structs work without an explicit `{}`.
fn decode<T: serde::de::DeserializeOwned>(params: Value) -> PluginResult<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| PluginError::InvalidParams(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> PluginResult<Value> {
    serde_json::to_value(value).map_err(|e| PluginError::Failed(format!("result encoding: {e}")))
}

// ─── TTS ──────────────────────────────────────────────────────────────────────

/// Wraps a [`TtsContract`] implementation as a [`DynPlugin`].
pub struct TtsDispatch<P> {
    inner: P,
    manifest: Option<Arc<PluginManifest>>,
}

impl<P: TtsContract> TtsDispatch<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, manifest: None }
    }
}

#[derive(Deserialize)]
struct SynthesizeParams {
    text: String,
    #[serde(default)]
    voice_id: Option<String>,
    #[serde(default)]
    options: SynthesisOptions,
}

#[derive(Deserialize)]
struct SetVoiceParams {
    voice_id: String,
}

#[async_trait]
impl<P: TtsContract> DynPlugin for TtsDispatch<P> {
    fn contract(&self) -> &'static str {
        "tts"
    }

    fn methods(&self) -> &'static [&'static str] {
        TTS_METHODS
    }

    fn manifest(&self) -> Option<&Arc<PluginManifest>> {
        self.manifest.as_ref()
    }

    fn bind_manifest(&mut self, manifest: Arc<PluginManifest>) {
        self.manifest = Some(manifest);
    }

    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
        self.inner.initialize(config).await
    }

    async fn shutdown(&mut self) -> PluginResult<bool> {
        self.inner.shutdown().await
    }

    fn health_check(&self) -> HealthStatus {
        self.inner.health_check()
    }

    async fn invoke(&mut self, op: &str, params: Value) -> PluginResult<Value> {
        match op {
            "synthesize" => {
                let p: SynthesizeParams = decode(params)?;
                let result = self
                    .inner
                    .synthesize(&p.text, p.voice_id.as_deref(), p.options)
                    .await?;
                encode(&result)
            }
            "list_voices" => encode(&self.inner.list_voices()),
            "set_voice" => {
                let p: SetVoiceParams = decode(params)?;
                encode(&self.inner.set_voice(&p.voice_id)?)
            }
            "current_voice" => Ok(json!(self.inner.current_voice())),
            "supported_languages" => encode(&self.inner.supported_languages()),
            other => Err(PluginError::UnknownOperation(other.to_string())),
        }
    }
}

// ─── STT ──────────────────────────────────────────────────────────────────────

/// Wraps an [`SttContract`] implementation as a [`DynPlugin`].
pub struct SttDispatch<P> {
    inner: P,
    manifest: Option<Arc<PluginManifest>>,
}

impl<P: SttContract> SttDispatch<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, manifest: None }
    }
}

#[derive(Deserialize)]
struct TranscribeParams {
    #[serde(with = "crate::contract::b64")]
    audio_data: Vec<u8>,
    #[serde(default)]
    options: TranscriptionOptions,
}

#[derive(Deserialize)]
struct StartStreamingParams {
    #[serde(default)]
    config: StreamingConfig,
}

#[derive(Deserialize)]
struct FeedAudioParams {
    #[serde(with = "crate::contract::b64")]
    chunk: Vec<u8>,
}

#[async_trait]
impl<P: SttContract> DynPlugin for SttDispatch<P> {
    fn contract(&self) -> &'static str {
        "stt"
    }

    fn methods(&self) -> &'static [&'static str] {
        STT_METHODS
    }

    fn manifest(&self) -> Option<&Arc<PluginManifest>> {
        self.manifest.as_ref()
    }

    fn bind_manifest(&mut self, manifest: Arc<PluginManifest>) {
        self.manifest = Some(manifest);
    }

    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
        self.inner.initialize(config).await
    }

    async fn shutdown(&mut self) -> PluginResult<bool> {
        self.inner.shutdown().await
    }

    fn health_check(&self) -> HealthStatus {
        self.inner.health_check()
    }

    async fn invoke(&mut self, op: &str, params: Value) -> PluginResult<Value> {
        match op {
            "transcribe" => {
                let p: TranscribeParams = decode(params)?;
                let result = self.inner.transcribe(&p.audio_data, p.options).await?;
                encode(&result)
            }
            "start_streaming" => {
                let p: StartStreamingParams = decode(params)?;
                encode(&self.inner.start_streaming(p.config).await?)
            }
            "feed_audio" => {
                let p: FeedAudioParams = decode(params)?;
                encode(&self.inner.feed_audio(&p.chunk).await?)
            }
            "stop_streaming" => encode(&self.inner.stop_streaming().await?),
            "supported_languages" => encode(&self.inner.supported_languages()),
            other => Err(PluginError::UnknownOperation(other.to_string())),
        }
    }
}

// ─── LLM ──────────────────────────────────────────────────────────────────────

/// Wraps an [`LlmContract`] implementation as a [`DynPlugin`].
pub struct LlmDispatch<P> {
    inner: P,
    manifest: Option<Arc<PluginManifest>>,
}

impl<P: LlmContract> LlmDispatch<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, manifest: None }
    }
}

#[derive(Deserialize)]
struct CompleteParams {
    messages: Vec<Message>,
    #[serde(default)]
    options: CompletionOptions,
}

#[derive(Deserialize)]
struct SetModelParams {
    model_id: String,
}

#[async_trait]
impl<P: LlmContract> DynPlugin for LlmDispatch<P> {
    fn contract(&self) -> &'static str {
        "llm"
    }

    fn methods(&self) -> &'static [&'static str] {
        LLM_METHODS
    }

    fn manifest(&self) -> Option<&Arc<PluginManifest>> {
        self.manifest.as_ref()
    }

    fn bind_manifest(&mut self, manifest: Arc<PluginManifest>) {
        self.manifest = Some(manifest);
    }

    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
        self.inner.initialize(config).await
    }

    async fn shutdown(&mut self) -> PluginResult<bool> {
        self.inner.shutdown().await
    }

    fn health_check(&self) -> HealthStatus {
        self.inner.health_check()
    }

    async fn invoke(&mut self, op: &str, params: Value) -> PluginResult<Value> {
        match op {
            "complete" => {
                let p: CompleteParams = decode(params)?;
                let result = self.inner.complete(p.messages, p.options).await?;
                encode(&result)
            }
            "complete_stream" => {
                // One request maps to one response frame: the lazy sequence
                // is drained here, chunk by chunk, and answered as an array.
                // An error chunk aborts the drain and fails the call.
                let p: CompleteParams = decode(params)?;
                let mut stream = self.inner.complete_stream(p.messages, p.options);
                let mut chunks: Vec<StreamChunk> = Vec::new();
                while let Some(chunk) = stream.next().await {
                    chunks.push(chunk?);
                }
                drop(stream);
                encode(&chunks)
            }
            "list_models" => encode(&self.inner.list_models()),
            "set_model" => {
                let p: SetModelParams = decode(params)?;
                encode(&self.inner.set_model(&p.model_id)?)
            }
            "current_model" => Ok(json!(self.inner.current_model())),
            other => Err(PluginError::UnknownOperation(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::PluginBase;
    use crate::contract::tts::{SynthesisResult, Voice};
    use crate::status::{HealthStatus, PluginStatus};

    struct FakeTts {
        status: PluginStatus,
        voice: String,
    }

    #[async_trait]
    impl PluginBase for FakeTts {
        async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
            if let Some(voice) = config.get("default_voice").and_then(Value::as_str) {
                self.voice = voice.to_string();
            }
            self.status = PluginStatus::Ready;
            Ok(true)
        }

        async fn shutdown(&mut self) -> PluginResult<bool> {
            self.status = PluginStatus::Stopped;
            Ok(true)
        }

        fn health_check(&self) -> HealthStatus {
            HealthStatus::new(self.status, "fake")
        }
    }

    #[async_trait]
    impl TtsContract for FakeTts {
        async fn synthesize(
            &mut self,
            text: &str,
            voice_id: Option<&str>,
            options: SynthesisOptions,
        ) -> PluginResult<SynthesisResult> {
            if text.is_empty() {
                return Err(PluginError::InvalidParams("text cannot be empty".into()));
            }
            Ok(SynthesisResult {
                audio_data: vec![0; 4],
                format: options.format,
                sample_rate: 22_050,
                duration_ms: text.len() as f64 * 50.0,
                text: text.to_string(),
                voice_id: voice_id.unwrap_or(&self.voice).to_string(),
                metadata: JsonMap::new(),
            })
        }

        fn list_voices(&self) -> Vec<Voice> {
            vec![Voice {
                id: self.voice.clone(),
                name: "Fake".into(),
                language: "en-US".into(),
                gender: "neutral".into(),
                description: String::new(),
                sample_rate: 22_050,
                preview_url: String::new(),
            }]
        }

        fn set_voice(&mut self, voice_id: &str) -> PluginResult<bool> {
            self.voice = voice_id.to_string();
            Ok(true)
        }

        fn current_voice(&self) -> Option<String> {
            Some(self.voice.clone())
        }
    }

    fn fake() -> TtsDispatch<FakeTts> {
        TtsDispatch::new(FakeTts { status: PluginStatus::Unloaded, voice: "alice".into() })
    }

    #[tokio::test]
    async fn synthesize_decodes_params_and_encodes_result() {
        let mut plugin = fake();
        let result = plugin
            .invoke("synthesize", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result["voice_id"], "alice");
        assert_eq!(result["duration_ms"], 100.0);
        assert_eq!(result["format"], "wav");
    }

    #[tokio::test]
    async fn unknown_operation_is_reported_as_such() {
        let mut plugin = fake();
        let err = plugin.invoke("whistle", json!({})).await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownOperation(_)));
    }

    #[tokio::test]
    async fn missing_required_param_is_invalid_params() {
        let mut plugin = fake();
        let err = plugin.invoke("synthesize", json!({})).await.unwrap_err();
        assert!(matches!(err, PluginError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn set_voice_mutates_current_voice() {
        let mut plugin = fake();
        plugin
            .invoke("set_voice", json!({"voice_id": "bob"}))
            .await
            .unwrap();
        let current = plugin.invoke("current_voice", Value::Null).await.unwrap();
        assert_eq!(current, json!("bob"));
    }

    #[tokio::test]
    async fn null_params_decode_as_empty_object() {
        let mut plugin = fake();
        let voices = plugin.invoke("list_voices", Value::Null).await.unwrap();
        assert_eq!(voices.as_array().unwrap().len(), 1);
    }
}
