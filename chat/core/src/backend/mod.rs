//! Upstream Completion Backends
//!
//! Abstracted access to the model provider through [`CompletionBackend`].
//!
//! # Available Backends
//!
//! - **Chat completion**: stateless, replays history every turn
//! - **Assistant**: stateful thread + streaming run
//!
//! # Usage
//!
//! ```ignore
//! use chat_core::backend::{build_backend, CompletionRequest};
//!
//! let backend = build_backend(&config)?;
//! let stream = backend.start(CompletionRequest::new("Hello!")).await?;
//! ```

mod assistant;
mod client;
mod completion;
mod sse;
mod traits;

use std::sync::Arc;

pub use assistant::AssistantBackend;
pub use client::{ApiClient, DEFAULT_BASE_URL};
pub use completion::{
    ChatCompletionBackend, CompletionSettings, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE,
};
pub use sse::SseEvent;
pub use traits::{
    CompletionBackend, CompletionRequest, CompletionStream, StreamingToken, DELTA_CHANNEL_CAPACITY,
};

use crate::config::{ChatConfig, ConfigError, UpstreamMode};
use crate::error::ChatError;

/// Provider client for a configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` without an API key, or if the HTTP
/// client cannot be constructed.
pub fn api_client(config: &ChatConfig) -> Result<ApiClient, ConfigError> {
    let key = config
        .api_key
        .as_deref()
        .ok_or_else(|| ConfigError::ValidationError("an API key is required".to_string()))?;
    ApiClient::new(config.base_url.clone(), key).map_err(|e: ChatError| ConfigError::ValidationError(e.to_string()))
}

/// Build the backend selected by `config.mode`
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` when a required setting is missing.
pub fn build_backend(config: &ChatConfig) -> Result<Arc<dyn CompletionBackend>, ConfigError> {
    let client = api_client(config)?;
    let backend: Arc<dyn CompletionBackend> = match config.mode {
        UpstreamMode::Completion => {
            Arc::new(ChatCompletionBackend::new(client, config.completion.clone()))
        }
        UpstreamMode::Assistant => {
            let assistant_id = config.assistant_id.clone().ok_or_else(|| {
                ConfigError::ValidationError("assistant mode requires an assistant id".to_string())
            })?;
            Arc::new(AssistantBackend::new(client, assistant_id))
        }
    };
    tracing::info!(backend = backend.name(), mode = %config.mode, "Upstream backend ready");
    Ok(backend)
}
