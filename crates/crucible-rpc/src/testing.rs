//! Test fixtures for the wire layer: a scriptable TTS plugin registered in
//! the process factory registry, plus plugin-folder scaffolding.

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
use crucible_core::registry::{PLUGIN_FACTORIES, PluginFactory};
use crucible_core::status::{HealthStatus, PluginStatus};

/// TTS plugin with scriptable failures, driven by config keys
/// (`fail_init`, `fail_reinit`, `default_voice`) and by magic text values
/// (`"boom"` panics, `"fail"` errors, `"sleep:<ms>"` stalls).
pub struct ScriptedTts {
    status: PluginStatus,
    voice: String,
    init_calls: u32,
}

impl ScriptedTts {
    fn new() -> Self {
        Self { status: PluginStatus::Unloaded, voice: "alice".to_string(), init_calls: 0 }
    }
}

#[async_trait]
impl PluginBase for ScriptedTts {
    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
        self.init_calls += 1;
        if config.get("fail_init").and_then(Value::as_bool).unwrap_or(false) {
            self.status = PluginStatus::Error;
            return Ok(false);
        }
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
        HealthStatus::new(self.status, "scripted tts")
            .with_detail("current_voice", self.voice.clone())
    }
}

#[async_trait]
impl TtsContract for ScriptedTts {
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

        Ok(SynthesisResult {
            audio_data: vec![0; 8],
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
            name: self.voice.clone(),
            language: "en-US".to_string(),
            gender: "neutral".to_string(),
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

fn construct_scripted_tts() -> Box<dyn DynPlugin> {
    Box::new(TtsDispatch::new(ScriptedTts::new()))
}

#[distributed_slice(PLUGIN_FACTORIES)]
static SCRIPTED_TTS_FACTORY: PluginFactory = PluginFactory {
    entry_point: "scripted_tts",
    contract: "tts",
    construct: construct_scripted_tts,
};

/// Writes a plugin folder with the given manifest document.
pub fn write_plugin_dir(plugins_dir: &Path, folder: &str, manifest: Value) {
    let dir = plugins_dir.join(folder);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
}

/// Manifest for the scripted TTS factory, optionally with default config.
pub fn scripted_manifest(name: &str, default_config: Option<Value>) -> Value {
    let mut manifest = json!({
        "name": name,
        "version": "1.0.0",
        "contract": "tts",
        "entry_point": "scripted_tts",
    });
    if let Some(config) = default_config {
        manifest["default_config"] = config;
    }
    manifest
}
