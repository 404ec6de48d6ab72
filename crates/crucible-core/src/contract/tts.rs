//! Text-to-speech contract and data shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::PluginBase;
use crate::error::PluginResult;
use crate::manifest::JsonMap;

/// Supported audio output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    Ogg,
    /// Raw PCM samples without a container.
    Pcm,
    Opus,
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Pcm => "pcm",
            AudioFormat::Opus => "opus",
        };
        f.write_str(tag)
    }
}

/// A voice offered by a TTS plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    /// Unique voice identifier within the plugin.
    pub id: String,
    /// Human-readable voice name.
    pub name: String,
    /// BCP-47 language code, e.g. `"en-US"`.
    pub language: String,
    #[serde(default = "default_gender")]
    pub gender: String,
    #[serde(default)]
    pub description: String,
    /// Native sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub preview_url: String,
}

fn default_gender() -> String {
    "neutral".to_string()
}

fn default_sample_rate() -> u32 {
    22_050
}

/// Options accepted by `synthesize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Playback speed multiplier (0.5 = half speed, 2.0 = double).
    pub speed: f64,
    /// Pitch adjustment in `[-1.0, 1.0]`, 0.0 = normal.
    pub pitch: f64,
    /// Volume multiplier in `[0.0, 1.0]`.
    pub volume: f64,
    pub format: AudioFormat,
    /// Desired output sample rate; `None` uses the voice default.
    pub sample_rate: Option<u32>,
    /// Language override for multilingual voices.
    pub language: Option<String>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 0.0,
            volume: 1.0,
            format: AudioFormat::Wav,
            sample_rate: None,
            language: None,
        }
    }
}

/// Result of a synthesis operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    /// Audio bytes in `format`; base64 on the wire.
    #[serde(with = "super::b64")]
    pub audio_data: Vec<u8>,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub duration_ms: f64,
    /// The text that was synthesized.
    pub text: String,
    /// The voice that produced the audio.
    pub voice_id: String,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Capability set for text-to-speech plugins.
///
/// Required operations: `synthesize`, `list_voices`, `set_voice`. The
/// capability probes and `current_voice` are optional conveniences with
/// sensible defaults.
#[async_trait]
pub trait TtsContract: PluginBase {
    /// Synthesizes speech for `text` with the given (or current) voice.
    async fn synthesize(
        &mut self,
        text: &str,
        voice_id: Option<&str>,
        options: SynthesisOptions,
    ) -> PluginResult<SynthesisResult>;

    /// All voices this plugin offers.
    fn list_voices(&self) -> Vec<Voice>;

    /// Makes `voice_id` the default for subsequent synthesis.
    fn set_voice(&mut self, voice_id: &str) -> PluginResult<bool>;

    /// The currently active voice, if one is set.
    fn current_voice(&self) -> Option<String> {
        None
    }

    /// Distinct language codes across the plugin's voices.
    fn supported_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> =
            self.list_voices().into_iter().map(|v| v.language).collect();
        languages.sort();
        languages.dedup();
        languages
    }

    fn supports_ssml(&self) -> bool {
        false
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fill_defaults_from_partial_json() {
        let options: SynthesisOptions =
            serde_json::from_value(serde_json::json!({"speed": 2.0})).unwrap();
        assert_eq!(options.speed, 2.0);
        assert_eq!(options.format, AudioFormat::Wav);
        assert_eq!(options.volume, 1.0);
        assert!(options.sample_rate.is_none());
    }

    #[test]
    fn format_serializes_as_lowercase_tag() {
        assert_eq!(serde_json::to_value(AudioFormat::Opus).unwrap(), "opus");
        assert_eq!(AudioFormat::Pcm.to_string(), "pcm");
    }

    #[test]
    fn synthesis_result_wire_form_is_base64() {
        let result = SynthesisResult {
            audio_data: vec![1, 2, 3],
            format: AudioFormat::Wav,
            sample_rate: 22_050,
            duration_ms: 100.0,
            text: "hi".into(),
            voice_id: "alice".into(),
            metadata: JsonMap::new(),
        };
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["format"], "wav");
        assert_eq!(wire["audio_data"], "AQID");
        assert_eq!(wire["voice_id"], "alice");
    }
}
