//! Chat Service
//!
//! The server-side request path, independent of any HTTP framework:
//!
//! ```text
//! input + history ──▶ retrieve context ──▶ backend.start ──▶ encode_stream ──▶ body
//! ```
//!
//! Everything that can fail before the first byte (validation, retrieval,
//! thread setup, run creation) fails here, so the HTTP layer can still pick
//! the status code. Failures after that are encoded into the body.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::backend::{self, CompletionBackend, CompletionRequest};
use crate::config::{ChatConfig, ConfigError};
use crate::error::ChatError;
use crate::messages::History;
use crate::retrieval::{ContextRetriever, NoRetrieval, VectorStoreRetriever};
use crate::streaming::{encode_stream, WireFormat};

/// Encoded response body
pub type ResponseBody = BoxStream<'static, Result<Bytes, ChatError>>;

/// Turns chat requests into encoded response streams
#[derive(Clone)]
pub struct ChatService {
    backend: Arc<dyn CompletionBackend>,
    retriever: Arc<dyn ContextRetriever>,
    format: WireFormat,
    idle_timeout: Duration,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("backend", &self.backend.name())
            .field("format", &self.format)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl ChatService {
    /// Assemble a service from parts
    #[must_use]
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        retriever: Arc<dyn ContextRetriever>,
        format: WireFormat,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            retriever,
            format,
            idle_timeout,
        }
    }

    /// Build the backend and retriever a configuration asks for
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration is incomplete.
    pub fn from_config(config: &ChatConfig) -> Result<Self, ConfigError> {
        let backend = backend::build_backend(config)?;
        let retriever: Arc<dyn ContextRetriever> = match config.vector_store_id {
            Some(ref store) => Arc::new(VectorStoreRetriever::new(
                backend::api_client(config)?,
                store.clone(),
                config.max_results,
            )),
            None => {
                tracing::warn!("No vector store configured, replies will have no portfolio context");
                Arc::new(NoRetrieval)
            }
        };
        Ok(Self::new(backend, retriever, config.wire_format(), config.idle_timeout))
    }

    /// Wire format of produced bodies
    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Start a reply for `input`
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Validation` for blank input and
    /// `ChatError::Upstream` when retrieval or stream setup fails.
    pub async fn respond(&self, input: &str, history: History) -> Result<ResponseBody, ChatError> {
        if input.trim().is_empty() {
            return Err(ChatError::Validation("input is required".to_string()));
        }

        let context = self.retriever.retrieve(input).await?;
        let request = CompletionRequest::new(input)
            .with_history(history)
            .with_context(context);

        let completion = self.backend.start(request).await?;
        Ok(encode_stream(completion, self.format, self.idle_timeout).boxed())
    }
}
