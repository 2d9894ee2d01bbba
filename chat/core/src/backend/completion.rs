//! Stateless Chat Completion Backend
//!
//! Sends the whole conversation on every turn:
//!
//! ```text
//! system prompt
//! user: <retrieved passages joined by blank lines>   (omitted when empty)
//! ...prior history...
//! user: <new input>
//! ```
//!
//! and streams `choices[0].delta.content` from the `/chat/completions`
//! event stream until `data: [DONE]`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::client::ApiClient;
use super::sse::{spawn_reader, SseEvent, SseHandler};
use super::traits::{CompletionBackend, CompletionRequest, CompletionStream, StreamingToken};
use crate::error::{UpstreamFailure, UpstreamStage};

/// Default completion model
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano-2025-04-14";

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Default reply length cap in tokens
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Default persona instructions for the portfolio assistant
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an AI assistant representing Mindaugas Gudeliūnas, a professional frontend developer.
Your job is to answer questions as if you are Mindaugas himself.
Speak in the first person using a confident, friendly, and clear tone. You are approachable and professional, and you explain technical decisions thoughtfully.

When sharing contact details:
- Don't add my email or phone number to your response. Never.
- Always add a link to my social media profile. Never change the link text.
- Only share the link to my social media without any additional text.

When answering questions about your experience:
- Never give code examples that represent my solutions, but rather explain how to implement them.
- Always structure your response as a resume.
- If the answer depends on portfolio content, draw from the provided context or documents.

When answering questions:
- Don't add filler words to your response, like \"Certainly\", \"Absolutely\", \"Of course\", etc.
- Reference specific projects or code snippets from Mindaugas' portfolio when available.
- If you don't have enough information, say so clearly instead of guessing.";

/// Sampling and prompt settings for a completion request
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionSettings {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Reply length cap
    pub max_tokens: u32,
    /// System prompt sent first on every request
    pub system_prompt: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

/// Stateless backend over `/chat/completions`
#[derive(Clone, Debug)]
pub struct ChatCompletionBackend {
    client: ApiClient,
    settings: CompletionSettings,
}

impl ChatCompletionBackend {
    /// Create a backend
    #[must_use]
    pub fn new(client: ApiClient, settings: CompletionSettings) -> Self {
        Self { client, settings }
    }

    fn build_messages<'a>(&'a self, request: &'a CompletionRequest, context: Option<&'a str>) -> Vec<ChatMessage<'a>> {
        let mut messages = vec![ChatMessage {
            role: "system",
            content: &self.settings.system_prompt,
        }];
        if let Some(context) = context {
            messages.push(ChatMessage {
                role: "user",
                content: context,
            });
        }
        messages.extend(request.history.upstream_messages().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: &request.input,
        });
        messages
    }
}

/// Maps completion chunks to deltas
#[derive(Debug, Default)]
struct CompletionChunks {
    done: bool,
}

impl SseHandler for CompletionChunks {
    fn on_event(&mut self, event: SseEvent) -> Vec<StreamingToken> {
        if event.data.trim() == "[DONE]" {
            self.done = true;
            return vec![StreamingToken::Complete];
        }

        let chunk: Value = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable completion chunk");
                return Vec::new();
            }
        };

        if let Some(error) = chunk.get("error") {
            let cause = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("provider reported an error")
                .to_string();
            return vec![StreamingToken::Error(UpstreamFailure::new(
                UpstreamStage::DeltaRead,
                cause,
            ))];
        }

        chunk
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(|text| vec![StreamingToken::Delta(text.to_string())])
            .unwrap_or_default()
    }

    fn on_end(&mut self) -> Vec<StreamingToken> {
        if self.done {
            return Vec::new();
        }
        vec![StreamingToken::Error(UpstreamFailure::new(
            UpstreamStage::DeltaRead,
            "completion stream ended before [DONE]",
        ))]
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionBackend {
    fn name(&self) -> &'static str {
        "chat-completion"
    }

    async fn start(&self, request: CompletionRequest) -> Result<CompletionStream, UpstreamFailure> {
        let context = request.joined_context();
        let body = ChatCompletionBody {
            model: &self.settings.model,
            messages: self.build_messages(&request, context.as_deref()),
            stream: true,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        tracing::debug!(
            model = %self.settings.model,
            messages = body.messages.len(),
            has_context = context.is_some(),
            "Starting chat completion"
        );

        let response = self
            .client
            .post_stream("chat/completions", &body, UpstreamStage::Completion)
            .await?;

        let (tx, stream) = CompletionStream::channel(None);
        spawn_reader(response, tx, CompletionChunks::default());
        Ok(stream)
    }
}
