//! Error Types
//!
//! The chat pipeline distinguishes four kinds of failure, each with its own
//! propagation rule:
//!
//! | Error                | Origin                       | Handling                          |
//! |----------------------|------------------------------|-----------------------------------|
//! | `Validation`         | inbound form                 | HTTP 400, user-correctable        |
//! | `Upstream`           | provider / retrieval calls   | HTTP 500 or abnormal stream close |
//! | `Parse`              | one wire frame               | logged and skipped                |
//! | `HistoryDecode`      | client-supplied history      | treated as empty history          |
//!
//! Only `Validation` and `Upstream` are terminal for a request.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Stage of an upstream interaction that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamStage {
    /// Vector store search for supporting context
    ContextRetrieval,
    /// Stateless streaming chat completion request
    Completion,
    /// Looking up an existing provider thread
    ThreadRetrieval,
    /// Creating a new provider thread
    ThreadCreation,
    /// Posting the user input onto a thread
    MessagePost,
    /// Starting an assistant run on a thread
    RunCreation,
    /// Reading deltas from an open upstream stream
    DeltaRead,
    /// Listing provider resources (development only)
    ResourceListing,
}

impl fmt::Display for UpstreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ContextRetrieval => "context retrieval",
            Self::Completion => "completion",
            Self::ThreadRetrieval => "thread retrieval",
            Self::ThreadCreation => "thread creation",
            Self::MessagePost => "message post",
            Self::RunCreation => "run creation",
            Self::DeltaRead => "delta read",
            Self::ResourceListing => "resource listing",
        };
        f.write_str(name)
    }
}

/// A provider call failed at a specific stage
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("upstream {stage} failed: {cause}")]
pub struct UpstreamFailure {
    /// Which call failed
    pub stage: UpstreamStage,
    /// Human-readable cause (may contain provider detail; do not forward to clients)
    pub cause: String,
}

impl UpstreamFailure {
    /// Create a failure for the given stage
    pub fn new(stage: UpstreamStage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    /// Message that is safe to show to an end user
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        UNAVAILABLE_MESSAGE
    }
}

const UNAVAILABLE_MESSAGE: &str = "The assistant is unavailable right now. Please try again.";

/// Errors produced by the chat pipeline
#[derive(Debug, Error)]
pub enum ChatError {
    /// Bad or missing input (user-correctable)
    #[error("invalid request: {0}")]
    Validation(String),

    /// Provider call failed
    #[error(transparent)]
    Upstream(#[from] UpstreamFailure),

    /// A single wire frame could not be parsed
    #[error("malformed frame: {0}")]
    Parse(String),

    /// Client-supplied history could not be decoded
    #[error("malformed history: {0}")]
    HistoryDecode(String),

    /// No bytes arrived within the idle window
    #[error("stream idle for {0:?}")]
    IdleTimeout(Duration),

    /// The server reported an error record on the stream
    #[error("server reported: {0}")]
    Remote(String),

    /// Transport error while reading the response body
    #[error("transport error: {0}")]
    Transport(String),

    /// An outbound frame could not be serialized
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

impl ChatError {
    /// Whether this error ends the request
    ///
    /// Frame and history problems are recovered locally.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Parse(_) | Self::HistoryDecode(_))
    }

    /// Description safe to send to a client
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid request",
            _ => UNAVAILABLE_MESSAGE,
        }
    }
}
