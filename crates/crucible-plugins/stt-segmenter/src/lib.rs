//! Example STT plugin.
//!
//! Performs energy-based segmentation over 16-bit mono PCM: windows with
//! mean amplitude above a threshold are "speech", contiguous voiced windows
//! merge into one segment. No language model is involved — every voiced
//! segment transcribes as the literal token `speech` — which is exactly
//! enough to exercise the transcription pipeline and the streaming
//! sub-protocol deterministically.

use async_trait::async_trait;
use linkme::distributed_slice;
use serde_json::Value;
use tracing::debug;

use crucible_core::contract::PluginBase;
use crucible_core::contract::stt::{
    StreamingConfig, SttContract, TranscriptionOptions, TranscriptionResult, TranscriptionSegment,
    TranscriptionStatus,
};
use crucible_core::dispatch::{DynPlugin, SttDispatch};
use crucible_core::error::{PluginError, PluginResult};
use crucible_core::manifest::JsonMap;
use crucible_core::registry::{PLUGIN_FACTORIES, PluginFactory};
use crucible_core::status::{HealthStatus, PluginStatus};

/// Text emitted for every voiced segment.
const SPEECH_TOKEN: &str = "speech";

struct StreamState {
    config: StreamingConfig,
    /// Bytes not yet forming a complete window.
    pending: Vec<u8>,
    segments: Vec<TranscriptionSegment>,
    /// Start of the currently open voiced run, if any.
    run_start_ms: Option<f64>,
    position_ms: f64,
}

/// Energy-window transcriber.
pub struct SegmenterSttPlugin {
    status: PluginStatus,
    sample_rate: u32,
    window_ms: u32,
    /// Mean-amplitude threshold separating speech from silence.
    threshold: f64,
    stream: Option<StreamState>,
}

impl SegmenterSttPlugin {
    pub fn new() -> Self {
        Self {
            status: PluginStatus::Unloaded,
            sample_rate: 16_000,
            window_ms: 100,
            threshold: 256.0,
            stream: None,
        }
    }

    fn window_bytes(&self, sample_rate: u32) -> usize {
        (sample_rate as usize * self.window_ms as usize / 1000) * 2
    }
}

impl Default for SegmenterSttPlugin {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips a RIFF/WAVE header when present; payload is otherwise raw PCM.
fn pcm_payload(audio: &[u8]) -> &[u8] {
    if audio.len() > 44 && &audio[..4] == b"RIFF" && &audio[8..12] == b"WAVE" {
        &audio[44..]
    } else {
        audio
    }
}

/// Mean absolute amplitude of a little-endian s16 window.
fn window_energy(window: &[u8]) -> f64 {
    let mut total = 0.0;
    let samples = window.len() / 2;
    if samples == 0 {
        return 0.0;
    }
    for pair in window.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        total += f64::from(sample).abs();
    }
    total / samples as f64
}

fn make_segment(start_ms: f64, end_ms: f64, language: Option<&str>) -> TranscriptionSegment {
    TranscriptionSegment {
        text: SPEECH_TOKEN.to_string(),
        start_ms,
        end_ms,
        confidence: 1.0,
        speaker: None,
        language: language.map(str::to_string),
        words: Vec::new(),
    }
}

fn assemble_result(
    segments: Vec<TranscriptionSegment>,
    language: String,
    duration_ms: f64,
    metadata: JsonMap,
) -> TranscriptionResult {
    let text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    TranscriptionResult {
        text,
        segments,
        language,
        duration_ms,
        status: TranscriptionStatus::Complete,
        metadata,
    }
}

#[async_trait]
impl PluginBase for SegmenterSttPlugin {
    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
        if let Some(rate) = config.get("sample_rate").and_then(Value::as_u64) {
            self.sample_rate = rate as u32;
        }
        if let Some(window) = config.get("window_ms").and_then(Value::as_u64) {
            if window == 0 {
                return Err(PluginError::InvalidParams("window_ms must be positive".into()));
            }
            self.window_ms = window as u32;
        }
        if let Some(threshold) = config.get("threshold").and_then(Value::as_f64) {
            self.threshold = threshold;
        }

        debug!(
            sample_rate = self.sample_rate,
            window_ms = self.window_ms,
            "Segmenter STT initialized"
        );
        self.status = PluginStatus::Ready;
        Ok(true)
    }

    async fn shutdown(&mut self) -> PluginResult<bool> {
        self.stream = None;
        self.status = PluginStatus::Stopped;
        Ok(true)
    }

    fn health_check(&self) -> HealthStatus {
        HealthStatus::new(self.status, "Segmenter STT plugin operational")
            .with_detail("sample_rate", self.sample_rate)
            .with_detail("window_ms", self.window_ms)
            .with_detail("streaming", self.stream.is_some())
    }
}

#[async_trait]
impl SttContract for SegmenterSttPlugin {
    async fn transcribe(
        &mut self,
        audio_data: &[u8],
        options: TranscriptionOptions,
    ) -> PluginResult<TranscriptionResult> {
        if audio_data.is_empty() {
            return Err(PluginError::InvalidParams("Audio data cannot be empty".into()));
        }

        let payload = pcm_payload(audio_data);
        let window_bytes = self.window_bytes(self.sample_rate);
        let language = options.language.clone().unwrap_or_else(|| "en".to_string());

        let mut segments = Vec::new();
        let mut run_start: Option<f64> = None;
        let mut voiced_windows = 0usize;
        let mut position_ms = 0.0;
        let window_count = payload.len().div_ceil(window_bytes.max(1));

        for window in payload.chunks(window_bytes.max(1)) {
            let window_duration = window.len() as f64 / 2.0 / self.sample_rate as f64 * 1000.0;
            let voiced = window_energy(window) >= self.threshold;
            if voiced {
                voiced_windows += 1;
                run_start.get_or_insert(position_ms);
            } else if let Some(start) = run_start.take() {
                segments.push(make_segment(start, position_ms, Some(&language)));
            }
            position_ms += window_duration;
        }
        if let Some(start) = run_start {
            segments.push(make_segment(start, position_ms, Some(&language)));
        }

        let mut metadata = JsonMap::new();
        metadata.insert("plugin".into(), Value::from("stt_segmenter_plugin"));
        metadata.insert("windows".into(), Value::from(window_count));
        metadata.insert("voiced_windows".into(), Value::from(voiced_windows));

        Ok(assemble_result(segments, language, position_ms, metadata))
    }

    async fn start_streaming(&mut self, config: StreamingConfig) -> PluginResult<bool> {
        if self.stream.is_some() {
            return Err(PluginError::failed("Streaming session already active"));
        }
        if config.channels != 1 || config.encoding != "pcm_s16le" {
            return Err(PluginError::InvalidParams(
                "Streaming supports mono pcm_s16le only".into(),
            ));
        }

        self.stream = Some(StreamState {
            config,
            pending: Vec::new(),
            segments: Vec::new(),
            run_start_ms: None,
            position_ms: 0.0,
        });
        Ok(true)
    }

    async fn feed_audio(&mut self, chunk: &[u8]) -> PluginResult<Option<TranscriptionSegment>> {
        let window_ms = self.window_ms;
        let threshold = self.threshold;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PluginError::failed("No active streaming session"))?;

        stream.pending.extend_from_slice(chunk);
        let window_bytes =
            (stream.config.sample_rate as usize * window_ms as usize / 1000).max(1) * 2;
        let window_duration = window_ms as f64;

        let mut completed = None;
        while stream.pending.len() >= window_bytes {
            let window: Vec<u8> = stream.pending.drain(..window_bytes).collect();
            let voiced = window_energy(&window) >= threshold;
            if voiced {
                stream.run_start_ms.get_or_insert(stream.position_ms);
            } else if let Some(start) = stream.run_start_ms.take() {
                let segment = make_segment(start, stream.position_ms, None);
                stream.segments.push(segment.clone());
                completed = Some(segment);
            }
            stream.position_ms += window_duration;
        }

        Ok(completed)
    }

    async fn stop_streaming(&mut self) -> PluginResult<TranscriptionResult> {
        let window_ms = self.window_ms;
        let threshold = self.threshold;
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| PluginError::failed("No active streaming session"))?;

        // Flush the trailing partial window and close any open run.
        if !stream.pending.is_empty() {
            let window_duration =
                stream.pending.len() as f64 / 2.0 / stream.config.sample_rate as f64 * 1000.0;
            let voiced = window_energy(&stream.pending) >= threshold;
            if voiced {
                stream.run_start_ms.get_or_insert(stream.position_ms);
            } else if let Some(start) = stream.run_start_ms.take() {
                stream.segments.push(make_segment(start, stream.position_ms, None));
            }
            stream.position_ms += window_duration;
        }
        if let Some(start) = stream.run_start_ms.take() {
            stream.segments.push(make_segment(start, stream.position_ms, None));
        }

        let mut metadata = JsonMap::new();
        metadata.insert("plugin".into(), Value::from("stt_segmenter_plugin"));
        metadata.insert("streaming".into(), Value::from(true));
        metadata.insert("window_ms".into(), Value::from(window_ms));

        Ok(assemble_result(
            stream.segments,
            "en".to_string(),
            stream.position_ms,
            metadata,
        ))
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

fn construct() -> Box<dyn DynPlugin> {
    Box::new(SttDispatch::new(SegmenterSttPlugin::new()))
}

#[distributed_slice(PLUGIN_FACTORIES)]
static FACTORY: PluginFactory = PluginFactory {
    entry_point: "stt_segmenter",
    contract: "stt",
    construct,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// One 100 ms window at 16 kHz is 1600 samples.
    fn windows(pattern: &[i16]) -> Vec<u8> {
        let mut samples = Vec::new();
        for &amplitude in pattern {
            samples.extend(std::iter::repeat_n(amplitude, 1600));
        }
        pcm(&samples)
    }

    async fn ready_plugin() -> SegmenterSttPlugin {
        let mut plugin = SegmenterSttPlugin::new();
        plugin.initialize(&JsonMap::new()).await.unwrap();
        plugin
    }

    #[tokio::test]
    async fn silence_transcribes_to_nothing() {
        let mut plugin = ready_plugin().await;
        let result = plugin
            .transcribe(&windows(&[0, 0, 0]), TranscriptionOptions::default())
            .await
            .unwrap();
        assert_eq!(result.text, "");
        assert!(result.segments.is_empty());
        assert_eq!(result.duration_ms, 300.0);
    }

    #[tokio::test]
    async fn voiced_windows_merge_into_segments() {
        let mut plugin = ready_plugin().await;
        // silence, speech, speech, silence, speech
        let result = plugin
            .transcribe(&windows(&[0, 3000, 3000, 0, 3000]), TranscriptionOptions::default())
            .await
            .unwrap();
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.text, "speech speech");
        assert_eq!(result.segments[0].start_ms, 100.0);
        assert_eq!(result.segments[0].end_ms, 300.0);
        assert_eq!(result.segments[1].start_ms, 400.0);
    }

    #[tokio::test]
    async fn requested_language_is_echoed() {
        let mut plugin = ready_plugin().await;
        let options = TranscriptionOptions {
            language: Some("de".to_string()),
            ..TranscriptionOptions::default()
        };
        let result = plugin.transcribe(&windows(&[3000]), options).await.unwrap();
        assert_eq!(result.language, "de");
        assert_eq!(result.segments[0].language.as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn empty_audio_is_rejected() {
        let mut plugin = ready_plugin().await;
        let err = plugin
            .transcribe(&[], TranscriptionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn streaming_reports_segments_as_runs_close() {
        let mut plugin = ready_plugin().await;
        plugin.start_streaming(StreamingConfig::default()).await.unwrap();

        // Voiced window: no segment yet (run still open).
        assert!(plugin.feed_audio(&windows(&[3000])).await.unwrap().is_none());
        // Silent window closes the run.
        let segment = plugin.feed_audio(&windows(&[0])).await.unwrap().unwrap();
        assert_eq!(segment.text, "speech");
        assert_eq!(segment.start_ms, 0.0);
        assert_eq!(segment.end_ms, 100.0);

        let result = plugin.stop_streaming().await.unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.duration_ms, 200.0);
    }

    #[tokio::test]
    async fn stop_flushes_an_open_run() {
        let mut plugin = ready_plugin().await;
        plugin.start_streaming(StreamingConfig::default()).await.unwrap();
        plugin.feed_audio(&windows(&[3000, 3000])).await.unwrap();

        let result = plugin.stop_streaming().await.unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.text, "speech");
        assert_eq!(result.segments[0].end_ms, 200.0);
    }

    #[tokio::test]
    async fn streaming_session_guards() {
        let mut plugin = ready_plugin().await;
        assert!(plugin.feed_audio(&[0, 0]).await.is_err());
        assert!(plugin.stop_streaming().await.is_err());

        plugin.start_streaming(StreamingConfig::default()).await.unwrap();
        let err = plugin.start_streaming(StreamingConfig::default()).await.unwrap_err();
        assert!(matches!(err, PluginError::Failed(_)));
    }

    #[tokio::test]
    async fn wav_header_is_stripped() {
        let mut plugin = ready_plugin().await;
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&0u32.to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.resize(44, 0);
        wav.extend_from_slice(&windows(&[3000]));

        let result = plugin.transcribe(&wav, TranscriptionOptions::default()).await.unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.duration_ms, 100.0);
    }
}
