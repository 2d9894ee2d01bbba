//! Stateful Assistant Backend
//!
//! Keeps the conversation on the provider side in a thread. Each turn:
//!
//! 1. reuse the thread named by the history (checked with a lookup), or
//!    create one on the first turn
//! 2. post the user input as a thread message
//! 3. start a streaming run for the configured assistant
//! 4. forward the text of every `thread.message.delta` event, with citation
//!    markers stripped
//!
//! Retrieved context travels as the run's `additional_instructions`.
//! Prior history is not replayed; the thread already holds it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::ApiClient;
use super::sse::{spawn_reader, SseEvent, SseHandler};
use super::traits::{CompletionBackend, CompletionRequest, CompletionStream, StreamingToken};
use crate::citations::CitationFilter;
use crate::error::{UpstreamFailure, UpstreamStage};
use crate::messages::ThreadId;

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Serialize)]
struct ThreadMessageBody<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct RunBody<'a> {
    assistant_id: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_instructions: Option<&'a str>,
}

/// Backend over assistant threads and runs
#[derive(Clone, Debug)]
pub struct AssistantBackend {
    client: ApiClient,
    assistant_id: String,
}

impl AssistantBackend {
    /// Create a backend for the given assistant
    pub fn new(client: ApiClient, assistant_id: impl Into<String>) -> Self {
        Self {
            client,
            assistant_id: assistant_id.into(),
        }
    }

    async fn resolve_thread(&self, existing: Option<&ThreadId>) -> Result<ThreadId, UpstreamFailure> {
        if let Some(thread_id) = existing {
            if !is_safe_id(thread_id.as_str()) {
                return Err(UpstreamFailure::new(
                    UpstreamStage::ThreadRetrieval,
                    format!("rejected thread id {thread_id:?}"),
                ));
            }
            let thread: ThreadObject = self
                .client
                .get_json(&format!("threads/{thread_id}"), UpstreamStage::ThreadRetrieval)
                .await?;
            tracing::debug!(thread_id = %thread.id, "Reusing assistant thread");
            return Ok(thread_id.clone());
        }

        let thread: ThreadObject = self
            .client
            .post_json("threads", &serde_json::json!({}), UpstreamStage::ThreadCreation)
            .await?;
        tracing::info!(thread_id = %thread.id, "Created assistant thread");
        Ok(ThreadId::new(thread.id))
    }
}

/// Provider ids are short ASCII tokens like `thread_abc123`
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Maps run events to citation-free deltas
#[derive(Debug, Default)]
struct RunEvents {
    citations: CitationFilter,
    done: bool,
}

impl RunEvents {
    fn flush(&mut self) -> Option<StreamingToken> {
        let rest = self.citations.finish();
        (!rest.is_empty()).then_some(StreamingToken::Delta(rest))
    }

    fn failed(&mut self, event: &str, data: &str) -> Vec<StreamingToken> {
        let detail = serde_json::from_str::<Value>(data)
            .ok()
            .and_then(|v| {
                v.pointer("/last_error/message")
                    .or_else(|| v.pointer("/message"))
                    .or_else(|| v.pointer("/error/message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "no detail".to_string());
        self.done = true;
        vec![StreamingToken::Error(UpstreamFailure::new(
            UpstreamStage::DeltaRead,
            format!("{event}: {detail}"),
        ))]
    }
}

/// Concatenate the text parts of a `thread.message.delta` payload
fn delta_text(data: &str) -> Option<String> {
    let payload: Value = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unparseable message delta");
            return None;
        }
    };
    let parts = payload.pointer("/delta/content")?.as_array()?;
    let text: String = parts
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.pointer("/text/value").and_then(Value::as_str))
        .collect();
    Some(text)
}

impl SseHandler for RunEvents {
    fn on_event(&mut self, event: SseEvent) -> Vec<StreamingToken> {
        let name = event.event.as_deref().unwrap_or_default();
        match name {
            "thread.message.delta" => delta_text(&event.data)
                .map(|text| self.citations.push(&text))
                .filter(|text| !text.is_empty())
                .map(|text| vec![StreamingToken::Delta(text)])
                .unwrap_or_default(),
            "thread.run.failed"
            | "thread.run.cancelled"
            | "thread.run.expired"
            | "thread.run.requires_action"
            | "error" => {
                let mut tokens: Vec<StreamingToken> = self.flush().into_iter().collect();
                tokens.extend(self.failed(name, &event.data));
                tokens
            }
            "done" => {
                self.done = true;
                let mut tokens: Vec<StreamingToken> = self.flush().into_iter().collect();
                tokens.push(StreamingToken::Complete);
                tokens
            }
            _ => Vec::new(),
        }
    }

    fn on_end(&mut self) -> Vec<StreamingToken> {
        if self.done {
            return Vec::new();
        }
        let mut tokens: Vec<StreamingToken> = self.flush().into_iter().collect();
        tokens.push(StreamingToken::Error(UpstreamFailure::new(
            UpstreamStage::DeltaRead,
            "run stream ended before done",
        )));
        tokens
    }
}

#[async_trait]
impl CompletionBackend for AssistantBackend {
    fn name(&self) -> &'static str {
        "assistant"
    }

    async fn start(&self, request: CompletionRequest) -> Result<CompletionStream, UpstreamFailure> {
        let thread_id = self.resolve_thread(request.history.thread_id.as_ref()).await?;

        let _: Value = self
            .client
            .post_json(
                &format!("threads/{thread_id}/messages"),
                &ThreadMessageBody {
                    role: "user",
                    content: &request.input,
                },
                UpstreamStage::MessagePost,
            )
            .await?;

        let context = request.joined_context();
        let run = RunBody {
            assistant_id: &self.assistant_id,
            stream: true,
            additional_instructions: context.as_deref(),
        };
        let response = self
            .client
            .post_stream(&format!("threads/{thread_id}/runs"), &run, UpstreamStage::RunCreation)
            .await?;

        tracing::debug!(
            thread_id = %thread_id,
            has_context = context.is_some(),
            "Assistant run started"
        );

        let (tx, stream) = CompletionStream::channel(Some(thread_id));
        spawn_reader(response, tx, RunEvents::default());
        Ok(stream)
    }
}
