//! Large-language-model contract and data shapes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::base::PluginBase;
use crate::error::{PluginError, PluginResult};
use crate::manifest::JsonMap;

/// Role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Why a completion terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end-of-sequence token).
    Stop,
    /// Token budget reached.
    Length,
    /// The model wants to call tools.
    ToolCalls,
    /// Blocked by a safety filter.
    ContentFilter,
    Error,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    /// Name attribution for tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Links a tool result back to the call that requested it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }
}

/// An available model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Unique model identifier, e.g. `"llama3.2:3b"`.
    pub id: String,
    pub name: String,
    /// Providing backend, e.g. `"ollama"`.
    pub provider: String,
    /// Maximum context window in tokens.
    #[serde(default = "default_context_length")]
    pub context_length: u32,
    #[serde(default)]
    pub description: String,
    /// Capability tags: `"chat"`, `"completion"`, `"vision"`, `"tools"`.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
}

fn default_context_length() -> u32 {
    4096
}

fn default_capabilities() -> Vec<String> {
    vec!["chat".to_string()]
}

/// Options accepted by `complete` and `complete_stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionOptions {
    /// Model to use; `None` means the plugin's current model.
    pub model: Option<String>,
    /// Sampling temperature; 0.0 is deterministic.
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
    /// Stop sequences.
    pub stop: Vec<String>,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    /// Tool definitions for function calling.
    pub tools: Vec<Value>,
    /// `"auto"`, `"none"`, or a specific tool name.
    pub tool_choice: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: 1024,
            top_p: 1.0,
            top_k: 40,
            stop: Vec::new(),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            tools: Vec::new(),
            tool_choice: None,
        }
    }
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Result of a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub content: String,
    pub finish_reason: FinishReason,
    /// The model that produced the response.
    pub model: String,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Content delta; may be empty.
    #[serde(default)]
    pub content: String,
    /// Set on the final chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Partial tool-call data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
}

/// Lazy chunk sequence produced by [`LlmContract::complete_stream`].
///
/// Dropping the stream cancels production; implementations must observe the
/// drop at the next chunk boundary and must not block the caller between
/// chunks.
pub type ChunkStream<'a> = BoxStream<'a, PluginResult<StreamChunk>>;

/// Capability set for large-language-model plugins.
///
/// Required operations: `complete`, `complete_stream`, `list_models`.
#[async_trait]
pub trait LlmContract: PluginBase {
    /// Generates a completion for the conversation.
    async fn complete(
        &mut self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> PluginResult<CompletionResult>;

    /// Streams a completion as a lazy chunk sequence.
    fn complete_stream(
        &mut self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> ChunkStream<'_>;

    /// All models this plugin offers.
    fn list_models(&self) -> Vec<Model>;

    /// Makes `model_id` the default for subsequent completions.
    fn set_model(&mut self, model_id: &str) -> PluginResult<bool> {
        Err(PluginError::Unsupported(format!("set_model({model_id})")))
    }

    /// The currently active model, if one is set.
    fn current_model(&self) -> Option<String> {
        None
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_tools(&self) -> bool {
        false
    }

    fn supports_vision(&self) -> bool {
        false
    }

    /// Context window of `model_id` (or the current model), defaulting to
    /// 4096 when unknown.
    fn context_length(&self, model_id: Option<&str>) -> u32 {
        let target = model_id.map(str::to_string).or_else(|| self.current_model());
        self.list_models()
            .into_iter()
            .find(|m| Some(&m.id) == target.as_ref())
            .map(|m| m.context_length)
            .unwrap_or(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roles_serialize_lowercase() {
        let message = Message::user("hi");
        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(wire["role"], "user");
        assert!(wire.get("tool_calls").is_none());
    }

    #[test]
    fn finish_reason_uses_snake_case_tags() {
        assert_eq!(serde_json::to_value(FinishReason::ToolCalls).unwrap(), "tool_calls");
        assert_eq!(serde_json::to_value(FinishReason::Stop).unwrap(), "stop");
    }

    #[test]
    fn completion_options_default_is_deterministic() {
        let options = CompletionOptions::default();
        assert_eq!(options.temperature, 0.0);
        assert_eq!(options.max_tokens, 1024);
        assert!(options.model.is_none());
    }

    #[test]
    fn stream_chunk_omits_absent_finish_reason() {
        let chunk = StreamChunk {
            content: "tok".into(),
            finish_reason: None,
            tool_calls: Vec::new(),
        };
        let wire = serde_json::to_value(&chunk).unwrap();
        assert!(wire.get("finish_reason").is_none());
    }
}
