//! Shared test fixtures: a deterministic TTS plugin registered in the
//! process factory registry, plus on-disk plugin scaffolding helpers.

use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use linkme::distributed_slice;
use serde_json::{Value, json};

use crucible_core::contract::PluginBase;
use crucible_core::contract::tts::{SynthesisOptions, SynthesisResult, TtsContract, Voice};
use crucible_core::dispatch::{DynPlugin, TtsDispatch};
use crucible_core::error::{PluginError, PluginResult};
use crucible_core::manifest::JsonMap;
use crucible_core::registry::{PLUGIN_FACTORIES, PROVIDED_PACKAGES, PluginFactory};
use crucible_core::status::{HealthStatus, PluginStatus};

/// Test TTS plugin with scriptable failure modes.
///
/// Config keys: `fail_init` (initialize returns false), `explode_init`
/// (initialize errors), `default_voice`. Synthesize reacts to magic text:
/// `"boom"` panics, `"fail"` errors, `"exhaust"` raises a memory-class
/// error, `"sleep:<ms>"` stalls before answering.
pub struct FakeTts {
    status: PluginStatus,
    voice: String,
    init_calls: u32,
}

impl FakeTts {
    pub fn new() -> Self {
        Self { status: PluginStatus::Unloaded, voice: "alice".to_string(), init_calls: 0 }
    }
}

#[async_trait]
impl PluginBase for FakeTts {
    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
        self.init_calls += 1;
        if config.get("explode_init").and_then(Value::as_bool).unwrap_or(false) {
            return Err(PluginError::failed("initialization exploded"));
        }
        if config.get("fail_init").and_then(Value::as_bool).unwrap_or(false) {
            self.status = PluginStatus::Error;
            return Ok(false);
        }
        // Second initialization of the same instance can be scripted to
        // fail, which is how rollback-failure paths are exercised.
        if self.init_calls > 1
            && config.get("fail_reinit").and_then(Value::as_bool).unwrap_or(false)
        {
            self.status = PluginStatus::Error;
            return Ok(false);
        }
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
        HealthStatus::new(self.status, "fake tts").with_detail("current_voice", self.voice.clone())
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
        match text {
            "" => return Err(PluginError::InvalidParams("text cannot be empty".into())),
            "boom" => panic!("synthetic plugin panic"),
            "fail" => return Err(PluginError::failed("synthetic failure")),
            "exhaust" => return Err(PluginError::ResourceExhausted("synthetic oom".into())),
            _ => {}
        }
        if let Some(ms) = text.strip_prefix("sleep:").and_then(|v| v.parse::<u64>().ok()) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        let duration_ms = text.len() as f64 * 50.0 / options.speed;
        Ok(SynthesisResult {
            audio_data: vec![0; 16],
            format: options.format,
            sample_rate: options.sample_rate.unwrap_or(22_050),
            duration_ms,
            text: text.to_string(),
            voice_id: voice_id.unwrap_or(&self.voice).to_string(),
            metadata: JsonMap::new(),
        })
    }

    fn list_voices(&self) -> Vec<Voice> {
        ["alice", "bob"]
            .into_iter()
            .map(|id| Voice {
                id: id.to_string(),
                name: id.to_string(),
                language: "en-US".to_string(),
                gender: "neutral".to_string(),
                description: String::new(),
                sample_rate: 22_050,
                preview_url: String::new(),
            })
            .collect()
    }

    fn set_voice(&mut self, voice_id: &str) -> PluginResult<bool> {
        if !self.list_voices().iter().any(|v| v.id == voice_id) {
            return Err(PluginError::InvalidParams(format!("Voice '{voice_id}' not found")));
        }
        self.voice = voice_id.to_string();
        Ok(true)
    }

    fn current_voice(&self) -> Option<String> {
        Some(self.voice.clone())
    }
}

fn construct_fake_tts() -> Box<dyn DynPlugin> {
    Box::new(TtsDispatch::new(FakeTts::new()))
}

#[distributed_slice(PLUGIN_FACTORIES)]
static FAKE_TTS_FACTORY: PluginFactory = PluginFactory {
    entry_point: "fake_tts",
    contract: "tts",
    construct: construct_fake_tts,
};

#[distributed_slice(PROVIDED_PACKAGES)]
static FAKE_AUDIO_RUNTIME: &str = "fake-audio-runtime";

/// Writes a plugin folder with the given manifest document.
pub fn write_plugin_dir(plugins_dir: &Path, folder: &str, manifest: Value) {
    let dir = plugins_dir.join(folder);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
}

/// Minimal valid manifest for the registered fake TTS factory.
pub fn fake_tts_manifest(name: &str) -> Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "contract": "tts",
        "entry_point": "fake_tts",
    })
}
