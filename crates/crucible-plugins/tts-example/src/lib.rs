//! Example TTS plugin.
//!
//! Generates silent audio with duration proportional to text length
//! (about 50 ms per character), which exercises the whole synthesis
//! pipeline without pulling in a model. Three fixed voices are offered;
//! `alice` is the default.

use async_trait::async_trait;
use linkme::distributed_slice;
use serde_json::Value;
use tracing::debug;

use crucible_core::contract::PluginBase;
use crucible_core::contract::tts::{
    AudioFormat, SynthesisOptions, SynthesisResult, TtsContract, Voice,
};
use crucible_core::dispatch::{DynPlugin, TtsDispatch};
use crucible_core::error::{PluginError, PluginResult};
use crucible_core::manifest::JsonMap;
use crucible_core::registry::{PLUGIN_FACTORIES, PluginFactory};
use crucible_core::status::{HealthStatus, PluginStatus};

/// Milliseconds of audio generated per character of input text.
const MS_PER_CHAR: f64 = 50.0;

/// Minimal TTS plugin for testing and demonstration.
pub struct ExampleTtsPlugin {
    status: PluginStatus,
    sample_rate: u32,
    default_voice: String,
    current_voice: String,
    voices: Vec<Voice>,
}

impl ExampleTtsPlugin {
    pub fn new() -> Self {
        let voices = vec![
            voice("alice", "Alice", "en-US", "female", "Default female voice (example)", 22_050),
            voice("bob", "Bob", "en-US", "male", "Default male voice (example)", 22_050),
            voice("charlie", "Charlie", "en-GB", "neutral", "British neutral voice (example)", 44_100),
        ];
        Self {
            status: PluginStatus::Unloaded,
            sample_rate: 22_050,
            default_voice: "alice".to_string(),
            current_voice: "alice".to_string(),
            voices,
        }
    }

    fn voice_by_id(&self, voice_id: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id == voice_id)
    }
}

impl Default for ExampleTtsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn voice(
    id: &str,
    name: &str,
    language: &str,
    gender: &str,
    description: &str,
    sample_rate: u32,
) -> Voice {
    Voice {
        id: id.to_string(),
        name: name.to_string(),
        language: language.to_string(),
        gender: gender.to_string(),
        description: description.to_string(),
        sample_rate,
        preview_url: String::new(),
    }
}

#[async_trait]
impl PluginBase for ExampleTtsPlugin {
    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
        if let Some(voice) = config.get("default_voice").and_then(Value::as_str) {
            self.default_voice = voice.to_string();
        }
        if let Some(rate) = config.get("sample_rate").and_then(Value::as_u64) {
            self.sample_rate = rate as u32;
        }
        self.current_voice = self.default_voice.clone();

        // The en-US voices follow the configured rate; charlie keeps his own.
        for voice in &mut self.voices {
            if voice.id == "alice" || voice.id == "bob" {
                voice.sample_rate = self.sample_rate;
            }
        }

        debug!(voice = %self.current_voice, sample_rate = self.sample_rate, "Example TTS initialized");
        self.status = PluginStatus::Ready;
        Ok(true)
    }

    async fn shutdown(&mut self) -> PluginResult<bool> {
        self.status = PluginStatus::Stopped;
        Ok(true)
    }

    fn health_check(&self) -> HealthStatus {
        let message = if self.status == PluginStatus::Ready {
            "Example TTS plugin operational"
        } else {
            "Plugin not ready"
        };
        HealthStatus::new(self.status, message)
            .with_detail("voices_available", self.voices.len())
            .with_detail("current_voice", self.current_voice.clone())
            .with_detail("sample_rate", self.sample_rate)
    }
}

#[async_trait]
impl TtsContract for ExampleTtsPlugin {
    async fn synthesize(
        &mut self,
        text: &str,
        voice_id: Option<&str>,
        options: SynthesisOptions,
    ) -> PluginResult<SynthesisResult> {
        if text.is_empty() {
            return Err(PluginError::InvalidParams("Text cannot be empty".into()));
        }

        let use_voice_id = voice_id.unwrap_or(&self.current_voice).to_string();
        let voice = self
            .voice_by_id(&use_voice_id)
            .ok_or_else(|| PluginError::InvalidParams(format!("Voice '{use_voice_id}' not found")))?;

        let sample_rate = options.sample_rate.unwrap_or(voice.sample_rate);
        let duration_ms = text.chars().count() as f64 * MS_PER_CHAR / options.speed;
        let num_samples = (duration_ms / 1000.0 * sample_rate as f64) as usize;

        let audio_data = match options.format {
            AudioFormat::Wav => silent_wav(num_samples, sample_rate),
            // Other formats get raw 16-bit PCM zeros.
            _ => vec![0; num_samples * 2],
        };

        let mut metadata = JsonMap::new();
        metadata.insert("plugin".into(), Value::from("tts_example_plugin"));
        metadata.insert("is_silent".into(), Value::from(true));
        metadata.insert("char_count".into(), Value::from(text.chars().count()));

        Ok(SynthesisResult {
            audio_data,
            format: options.format,
            sample_rate,
            duration_ms,
            text: text.to_string(),
            voice_id: use_voice_id,
            metadata,
        })
    }

    fn list_voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn set_voice(&mut self, voice_id: &str) -> PluginResult<bool> {
        if self.voice_by_id(voice_id).is_none() {
            return Err(PluginError::InvalidParams(format!("Voice '{voice_id}' not found")));
        }
        self.current_voice = voice_id.to_string();
        Ok(true)
    }

    fn current_voice(&self) -> Option<String> {
        Some(self.current_voice.clone())
    }
}

/// Builds a WAV file containing `num_samples` of 16-bit mono silence.
fn silent_wav(num_samples: usize, sample_rate: u32) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    let byte_rate = sample_rate * u32::from(CHANNELS) * u32::from(BITS_PER_SAMPLE) / 8;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let data_size = (num_samples * block_align as usize) as u32;

    let mut wav = Vec::with_capacity(44 + data_size as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    wav.resize(44 + data_size as usize, 0);
    wav
}

fn construct() -> Box<dyn DynPlugin> {
    Box::new(TtsDispatch::new(ExampleTtsPlugin::new()))
}

#[distributed_slice(PLUGIN_FACTORIES)]
static FACTORY: PluginFactory = PluginFactory {
    entry_point: "tts_example",
    contract: "tts",
    construct,
};

#[cfg(test)]
mod tests {
    use super::*;

    async fn ready_plugin() -> ExampleTtsPlugin {
        let mut plugin = ExampleTtsPlugin::new();
        plugin.initialize(&JsonMap::new()).await.unwrap();
        plugin
    }

    #[tokio::test]
    async fn synthesize_produces_silent_wav() {
        let mut plugin = ready_plugin().await;
        let result = plugin
            .synthesize("hi", None, SynthesisOptions::default())
            .await
            .unwrap();

        assert_eq!(result.format, AudioFormat::Wav);
        assert_eq!(result.voice_id, "alice");
        assert_eq!(result.duration_ms, 100.0);
        assert_eq!(&result.audio_data[..4], b"RIFF");
        assert_eq!(&result.audio_data[8..12], b"WAVE");
        // Everything after the 44-byte header is silence.
        assert!(result.audio_data[44..].iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn speed_shortens_duration() {
        let mut plugin = ready_plugin().await;
        let options = SynthesisOptions { speed: 2.0, ..SynthesisOptions::default() };
        let result = plugin.synthesize("hello", None, options).await.unwrap();
        assert_eq!(result.duration_ms, 125.0);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let mut plugin = ready_plugin().await;
        let err = plugin
            .synthesize("", None, SynthesisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn unknown_voice_is_rejected() {
        let mut plugin = ready_plugin().await;
        let err = plugin
            .synthesize("hi", Some("mallory"), SynthesisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidParams(_)));
        assert!(plugin.set_voice("mallory").is_err());
    }

    #[tokio::test]
    async fn config_overrides_voice_and_sample_rate() {
        let mut plugin = ExampleTtsPlugin::new();
        let mut config = JsonMap::new();
        config.insert("default_voice".into(), Value::from("bob"));
        config.insert("sample_rate".into(), Value::from(16_000));
        plugin.initialize(&config).await.unwrap();

        let result = plugin
            .synthesize("hey", None, SynthesisOptions::default())
            .await
            .unwrap();
        assert_eq!(result.voice_id, "bob");
        assert_eq!(result.sample_rate, 16_000);
    }

    #[tokio::test]
    async fn health_reports_voice_inventory() {
        let plugin = ready_plugin().await;
        let health = plugin.health_check();
        assert_eq!(health.status, PluginStatus::Ready);
        assert_eq!(health.details["voices_available"], 3);
        assert_eq!(health.details["current_voice"], "alice");
    }

    #[test]
    fn wav_header_describes_the_payload() {
        let wav = silent_wav(100, 22_050);
        assert_eq!(wav.len(), 44 + 200);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 22_050);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 200);
    }
}
