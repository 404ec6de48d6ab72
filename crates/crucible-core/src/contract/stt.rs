//! Speech-to-text contract and data shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::PluginBase;
use crate::error::{PluginError, PluginResult};
use crate::manifest::JsonMap;

/// Status of a transcription operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    Pending,
    Processing,
    #[default]
    Complete,
    Error,
    Cancelled,
}

/// A segment of transcribed text with timing information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub text: String,
    /// Start offset in milliseconds from the beginning of the audio.
    pub start_ms: f64,
    pub end_ms: f64,
    /// Confidence score in `[0.0, 1.0]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Speaker label when diarization is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Detected language for this segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Word-level timing entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<JsonMap>,
}

fn default_confidence() -> f64 {
    1.0
}

/// Result of a transcription operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Full transcribed text.
    pub text: String,
    pub segments: Vec<TranscriptionSegment>,
    /// Detected or requested language code.
    pub language: String,
    /// Total audio duration in milliseconds.
    pub duration_ms: f64,
    #[serde(default)]
    pub status: TranscriptionStatus,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Options accepted by `transcribe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionOptions {
    /// Target language; `None` auto-detects.
    pub language: Option<String>,
    /// `"transcribe"` or `"translate"` (to English).
    pub task: String,
    pub word_timestamps: bool,
    pub speaker_diarization: bool,
    pub max_speakers: u32,
    /// Decoder beam size (quality vs. speed).
    pub beam_size: u32,
    pub temperature: f64,
    /// Prompt used to bias the transcription.
    pub initial_prompt: Option<String>,
    pub suppress_tokens: Vec<i64>,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            language: None,
            task: "transcribe".to_string(),
            word_timestamps: false,
            speaker_diarization: false,
            max_speakers: 2,
            beam_size: 5,
            temperature: 0.0,
            initial_prompt: None,
            suppress_tokens: Vec::new(),
        }
    }
}

/// Configuration for a streaming transcription session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub sample_rate: u32,
    /// 1 = mono, 2 = stereo.
    pub channels: u16,
    /// Audio encoding, e.g. `"pcm_s16le"`.
    pub encoding: String,
    pub chunk_duration_ms: u32,
    pub vad_enabled: bool,
    pub vad_threshold: f64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            encoding: "pcm_s16le".to_string(),
            chunk_duration_ms: 100,
            vad_enabled: true,
            vad_threshold: 0.5,
        }
    }
}

/// Capability set for speech-to-text plugins.
///
/// `transcribe` is the only required operation. The streaming sub-protocol
/// (`start_streaming` / `feed_audio` / `stop_streaming`) is optional; the
/// default implementations refuse with an unsupported-operation error, which
/// the host surfaces without marking the plugin unhealthy.
#[async_trait]
pub trait SttContract: PluginBase {
    /// Transcribes a complete audio buffer (WAV, MP3, or raw PCM).
    async fn transcribe(
        &mut self,
        audio_data: &[u8],
        options: TranscriptionOptions,
    ) -> PluginResult<TranscriptionResult>;

    /// Opens a streaming session.
    async fn start_streaming(&mut self, _config: StreamingConfig) -> PluginResult<bool> {
        Err(PluginError::Unsupported("start_streaming".into()))
    }

    /// Feeds one audio chunk; returns a segment when one completes.
    async fn feed_audio(&mut self, _chunk: &[u8]) -> PluginResult<Option<TranscriptionSegment>> {
        Err(PluginError::Unsupported("feed_audio".into()))
    }

    /// Closes the streaming session and returns the final result.
    async fn stop_streaming(&mut self) -> PluginResult<TranscriptionResult> {
        Err(PluginError::Unsupported("stop_streaming".into()))
    }

    /// Supported language codes.
    fn supported_languages(&self) -> Vec<String> {
        vec!["en".to_string()]
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn supports_diarization(&self) -> bool {
        false
    }

    fn supports_translation(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_omits_empty_optional_fields() {
        let segment = TranscriptionSegment {
            text: "hello".into(),
            start_ms: 0.0,
            end_ms: 480.0,
            confidence: 0.9,
            speaker: None,
            language: None,
            words: Vec::new(),
        };
        let wire = serde_json::to_value(&segment).unwrap();
        assert!(wire.get("speaker").is_none());
        assert!(wire.get("words").is_none());
        assert_eq!(wire["confidence"], 0.9);
    }

    #[test]
    fn options_default_to_transcribe_task() {
        let options: TranscriptionOptions = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(options.task, "transcribe");
        assert_eq!(options.beam_size, 5);
        assert!(options.language.is_none());
    }

    #[test]
    fn streaming_config_defaults_match_pcm_mono() {
        let config = StreamingConfig::default();
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.encoding, "pcm_s16le");
    }
}
