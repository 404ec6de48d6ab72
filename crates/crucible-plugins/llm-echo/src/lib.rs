//! Example LLM plugin.
//!
//! Completes every conversation by echoing the last user message, with a
//! configurable prefix. Deterministic token accounting (whitespace words)
//! and word-by-word streaming make it a predictable stand-in for a real
//! model when testing the completion pipeline.

use async_trait::async_trait;
use futures::stream;
use linkme::distributed_slice;
use serde_json::Value;
use tracing::debug;

use crucible_core::contract::PluginBase;
use crucible_core::contract::llm::{
    ChunkStream, CompletionOptions, CompletionResult, FinishReason, LlmContract, Message,
    MessageRole, Model, StreamChunk, TokenUsage,
};
use crucible_core::dispatch::{DynPlugin, LlmDispatch};
use crucible_core::error::{PluginError, PluginResult};
use crucible_core::manifest::JsonMap;
use crucible_core::registry::{PLUGIN_FACTORIES, PluginFactory};
use crucible_core::status::{HealthStatus, PluginStatus};

const MODEL_ID: &str = "echo-1";

/// Deterministic echo model.
pub struct EchoLlmPlugin {
    status: PluginStatus,
    prefix: String,
    current_model: String,
}

impl EchoLlmPlugin {
    pub fn new() -> Self {
        Self {
            status: PluginStatus::Unloaded,
            prefix: String::new(),
            current_model: MODEL_ID.to_string(),
        }
    }

    fn reply_for(&self, messages: &[Message]) -> PluginResult<String> {
        if messages.is_empty() {
            return Err(PluginError::InvalidParams("Messages cannot be empty".into()));
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .ok_or_else(|| PluginError::InvalidParams("No user message to respond to".into()))?;

        Ok(if self.prefix.is_empty() {
            last_user.content.clone()
        } else {
            format!("{} {}", self.prefix, last_user.content)
        })
    }
}

impl Default for EchoLlmPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[async_trait]
impl PluginBase for EchoLlmPlugin {
    async fn initialize(&mut self, config: &JsonMap) -> PluginResult<bool> {
        if let Some(prefix) = config.get("prefix").and_then(Value::as_str) {
            self.prefix = prefix.to_string();
        }
        debug!(prefix = %self.prefix, "Echo LLM initialized");
        self.status = PluginStatus::Ready;
        Ok(true)
    }

    async fn shutdown(&mut self) -> PluginResult<bool> {
        self.status = PluginStatus::Stopped;
        Ok(true)
    }

    fn health_check(&self) -> HealthStatus {
        HealthStatus::new(self.status, "Echo LLM plugin operational")
            .with_detail("current_model", self.current_model.clone())
    }
}

#[async_trait]
impl LlmContract for EchoLlmPlugin {
    async fn complete(
        &mut self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> PluginResult<CompletionResult> {
        let content = self.reply_for(&messages)?;
        let prompt_tokens: u64 = messages.iter().map(|m| word_count(&m.content)).sum();
        let completion_tokens = word_count(&content);

        let mut metadata = JsonMap::new();
        metadata.insert("plugin".into(), Value::from("llm_echo_plugin"));
        metadata.insert("is_echo".into(), Value::from(true));

        Ok(CompletionResult {
            content,
            finish_reason: FinishReason::Stop,
            model: options.model.unwrap_or_else(|| self.current_model.clone()),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            tool_calls: Vec::new(),
            metadata,
        })
    }

    fn complete_stream(
        &mut self,
        messages: Vec<Message>,
        _options: CompletionOptions,
    ) -> ChunkStream<'_> {
        let chunks: Vec<PluginResult<StreamChunk>> = match self.reply_for(&messages) {
            Err(e) => vec![Err(e)],
            Ok(content) => {
                let words: Vec<&str> = content.split_whitespace().collect();
                let mut chunks: Vec<PluginResult<StreamChunk>> = words
                    .iter()
                    .enumerate()
                    .map(|(i, word)| {
                        let delta = if i == 0 { (*word).to_string() } else { format!(" {word}") };
                        Ok(StreamChunk {
                            content: delta,
                            finish_reason: None,
                            tool_calls: Vec::new(),
                        })
                    })
                    .collect();
                chunks.push(Ok(StreamChunk {
                    content: String::new(),
                    finish_reason: Some(FinishReason::Stop),
                    tool_calls: Vec::new(),
                }));
                chunks
            }
        };
        Box::pin(stream::iter(chunks))
    }

    fn list_models(&self) -> Vec<Model> {
        vec![Model {
            id: MODEL_ID.to_string(),
            name: "Echo".to_string(),
            provider: "crucible".to_string(),
            context_length: 8192,
            description: "Deterministic echo model for pipeline testing".to_string(),
            capabilities: vec!["chat".to_string(), "completion".to_string()],
        }]
    }

    fn set_model(&mut self, model_id: &str) -> PluginResult<bool> {
        if model_id != MODEL_ID {
            return Err(PluginError::InvalidParams(format!(
                "Model '{model_id}' not found. Available: {MODEL_ID}"
            )));
        }
        self.current_model = model_id.to_string();
        Ok(true)
    }

    fn current_model(&self) -> Option<String> {
        Some(self.current_model.clone())
    }
}

fn construct() -> Box<dyn DynPlugin> {
    Box::new(LlmDispatch::new(EchoLlmPlugin::new()))
}

#[distributed_slice(PLUGIN_FACTORIES)]
static FACTORY: PluginFactory = PluginFactory {
    entry_point: "llm_echo",
    contract: "llm",
    construct,
};

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn ready_plugin() -> EchoLlmPlugin {
        let mut plugin = EchoLlmPlugin::new();
        plugin.initialize(&JsonMap::new()).await.unwrap();
        plugin
    }

    #[tokio::test]
    async fn completion_echoes_last_user_message() {
        let mut plugin = ready_plugin().await;
        let messages = vec![
            Message::system("be brief"),
            Message::user("first"),
            Message::assistant("ok"),
            Message::user("hello world"),
        ];
        let result = plugin
            .complete(messages, CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(result.content, "hello world");
        assert_eq!(result.finish_reason, FinishReason::Stop);
        assert_eq!(result.model, "echo-1");
        assert_eq!(result.usage.completion_tokens, 2);
        assert_eq!(result.usage.total_tokens, result.usage.prompt_tokens + 2);
    }

    #[tokio::test]
    async fn prefix_config_is_applied() {
        let mut plugin = EchoLlmPlugin::new();
        let mut config = JsonMap::new();
        config.insert("prefix".into(), Value::from("You said:"));
        plugin.initialize(&config).await.unwrap();

        let result = plugin
            .complete(vec![Message::user("hi")], CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content, "You said: hi");
    }

    #[tokio::test]
    async fn empty_conversations_are_rejected() {
        let mut plugin = ready_plugin().await;
        let err = plugin
            .complete(Vec::new(), CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidParams(_)));

        let err = plugin
            .complete(vec![Message::system("only system")], CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn stream_yields_words_then_finish() {
        let mut plugin = ready_plugin().await;
        let mut stream =
            plugin.complete_stream(vec![Message::user("one two three")], CompletionOptions::default());

        let mut content = String::new();
        let mut finish = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            content.push_str(&chunk.content);
            if chunk.finish_reason.is_some() {
                finish = chunk.finish_reason;
            }
        }
        assert_eq!(content, "one two three");
        assert_eq!(finish, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn abandoned_stream_is_simply_dropped() {
        let mut plugin = ready_plugin().await;
        let mut stream =
            plugin.complete_stream(vec![Message::user("one two three")], CompletionOptions::default());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.content, "one");
        drop(stream);

        // The plugin is unaffected and serves the next call.
        let result = plugin
            .complete(vec![Message::user("next")], CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content, "next");
    }

    #[tokio::test]
    async fn model_management_round_trips() {
        let mut plugin = ready_plugin().await;
        assert_eq!(plugin.list_models().len(), 1);
        assert_eq!(plugin.current_model().as_deref(), Some("echo-1"));
        assert!(plugin.set_model("echo-1").unwrap());
        assert!(plugin.set_model("gpt-7").is_err());
        assert_eq!(plugin.context_length(None), 8192);
    }
}
