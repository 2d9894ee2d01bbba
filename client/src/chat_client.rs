//! Chat Client
//!
//! Sends one turn to the chat server and feeds the streamed reply into a
//! [`Conversation`] as it arrives.
//!
//! # Architecture
//!
//! The client holds no protocol logic of its own. Its job is:
//! 1. Submit the input to the conversation (policy checks happen there)
//! 2. Post `input` + `history` as a form
//! 3. Pick the decoder from the response `Content-Type`
//! 4. Drive the reassembler over the body until it ends or fails

use std::time::Duration;

use thiserror::Error;

use chat_core::{ChatError, Conversation, Reassembler, SubmitRejection, WireFormat};

/// Why a turn did not produce a complete reply
#[derive(Debug, Error)]
pub enum ClientError {
    /// The conversation refused the input
    #[error(transparent)]
    Rejected(#[from] SubmitRejection),

    /// The request could not be sent
    #[error("could not reach the chat server: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("server answered {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (plain text)
        body: String,
    },

    /// History could not be serialized
    #[error("could not encode history: {0}")]
    Encode(#[from] serde_json::Error),

    /// The reply stream ended abnormally
    #[error(transparent)]
    Stream(#[from] ChatError),
}

impl ClientError {
    /// One-line notification for the user
    #[must_use]
    pub fn notification(&self) -> String {
        match self {
            Self::Rejected(SubmitRejection::TurnCapReached) => {
                "Conversation limit reached. Type /new to start over.".to_string()
            }
            Self::Rejected(reason) => reason.to_string(),
            Self::Status { status: 400, .. } => "The server rejected that message.".to_string(),
            Self::Stream(ChatError::Remote(message)) => message.clone(),
            Self::Stream(ChatError::IdleTimeout(_)) => {
                "The reply stalled. Please try again.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Wire format announced by a `Content-Type` header
fn format_from_content_type(content_type: Option<&str>, fallback: WireFormat) -> WireFormat {
    match content_type {
        Some(ct) if ct.starts_with(WireFormat::Framed.content_type()) => WireFormat::Framed,
        Some(ct) if ct.starts_with("text/plain") => WireFormat::RawText,
        _ => fallback,
    }
}

/// HTTP client for the chat endpoint
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    fallback_format: WireFormat,
    idle_timeout: Duration,
}

impl ChatClient {
    /// Create a client for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, idle_timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            fallback_format: WireFormat::default(),
            idle_timeout,
        })
    }

    /// Format assumed when the server does not announce one
    #[must_use]
    pub fn with_fallback_format(mut self, format: WireFormat) -> Self {
        self.fallback_format = format;
        self
    }

    /// Chat endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `input` and stream the reply into `conversation`
    ///
    /// `on_update` is called with the newly received text after every chunk.
    /// On any failure after submission the conversation returns to idle with
    /// the user message and any partial reply kept.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] describing why the turn did not complete.
    pub async fn send<F>(
        &self,
        conversation: &mut Conversation,
        input: &str,
        on_update: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&Conversation, &str),
    {
        let history = conversation.submit(input)?;

        let result = self.exchange(conversation, input, &history, on_update).await;
        if result.is_err() && conversation.is_pending() {
            conversation.fail();
        }
        result
    }

    async fn exchange<F>(
        &self,
        conversation: &mut Conversation,
        input: &str,
        history: &[chat_core::Message],
        on_update: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&Conversation, &str),
    {
        let history = serde_json::to_string(history)?;
        let response = self
            .http
            .post(&self.endpoint)
            .form(&[("input", input), ("history", history.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %body, "Chat request rejected");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let format = format_from_content_type(content_type, self.fallback_format);
        tracing::debug!(%format, "Streaming reply");

        Reassembler::new(format)
            .drive(conversation, response.bytes_stream(), self.idle_timeout, on_update)
            .await?;
        Ok(())
    }
}
