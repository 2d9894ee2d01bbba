//! Stream Encoder
//!
//! Turns a [`CompletionStream`] into response body bytes.
//!
//! # Wire Formats
//!
//! ```text
//! raw:     He|llo| there            (deltas verbatim, no framing)
//! framed:  data: {"type":"message","content":"He","threadId":"t1"}\n\n
//!          data: {"type":"message","content":"llo","threadId":"t1"}\n\n
//! ```
//!
//! Framed output carries the thread token on every record so a client can
//! pick it up from whichever frame it sees first.
//!
//! # Failure
//!
//! An upstream failure after the body started cannot change the status code.
//! The framed format ends with a single `{"type":"error"}` record; the raw
//! format has no in-band signal, so the body stream itself ends with an error
//! and the connection closes abnormally.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::backend::{CompletionStream, StreamingToken};
use crate::error::{ChatError, UpstreamFailure, UpstreamStage};
use crate::messages::{StreamFrame, ThreadId};

/// Response body encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Plain text deltas
    #[default]
    #[serde(rename = "raw")]
    RawText,
    /// `data: <json>` records separated by blank lines
    Framed,
}

impl WireFormat {
    /// `Content-Type` header for this format
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::RawText => "text/plain; charset=utf-8",
            Self::Framed => "text/event-stream",
        }
    }

    /// Configuration name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RawText => "raw",
            Self::Framed => "framed",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "text" => Ok(Self::RawText),
            "framed" | "sse" | "event-stream" => Ok(Self::Framed),
            other => Err(format!("unknown wire format '{other}' (expected raw or framed)")),
        }
    }
}

/// Per-response encoder state
#[derive(Clone, Debug)]
pub struct StreamEncoder {
    format: WireFormat,
    thread_id: Option<ThreadId>,
}

impl StreamEncoder {
    /// Create an encoder; `thread_id` is stamped on every framed record
    #[must_use]
    pub fn new(format: WireFormat, thread_id: Option<ThreadId>) -> Self {
        Self { format, thread_id }
    }

    /// Encode one delta; empty deltas produce nothing
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Encode` if the frame cannot be serialized.
    pub fn encode_delta(&self, delta: &str) -> Result<Option<Bytes>, ChatError> {
        if delta.is_empty() {
            return Ok(None);
        }
        match self.format {
            WireFormat::RawText => Ok(Some(Bytes::copy_from_slice(delta.as_bytes()))),
            WireFormat::Framed => {
                let frame = StreamFrame::message(delta, self.thread_id.clone());
                encode_frame(&frame).map(Some)
            }
        }
    }

    /// Turn a terminal failure into the format's final item
    ///
    /// Framed output gets an error record; raw output passes the error on.
    ///
    /// # Errors
    ///
    /// Returns `err` itself for the raw format.
    pub fn encode_failure(&self, err: ChatError) -> Result<Bytes, ChatError> {
        match self.format {
            WireFormat::RawText => Err(err),
            WireFormat::Framed => encode_frame(&StreamFrame::error(err.public_message())),
        }
    }
}

fn encode_frame(frame: &StreamFrame) -> Result<Bytes, ChatError> {
    let json = serde_json::to_string(frame).map_err(|e| ChatError::Encode(e.to_string()))?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Encode a completion stream as a response body
///
/// The body ends after [`StreamingToken::Complete`], after a failure, or when
/// no delta arrives within `idle_timeout`.
pub fn encode_stream(
    completion: CompletionStream,
    format: WireFormat,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Bytes, ChatError>> + Send + 'static {
    let CompletionStream {
        thread_id,
        mut receiver,
    } = completion;
    let encoder = StreamEncoder::new(format, thread_id);

    async_stream::stream! {
        let mut delta_count = 0usize;
        loop {
            let failure = match tokio::time::timeout(idle_timeout, receiver.recv()).await {
                Ok(Some(StreamingToken::Delta(text))) => match encoder.encode_delta(&text) {
                    Ok(Some(bytes)) => {
                        delta_count += 1;
                        yield Ok(bytes);
                        continue;
                    }
                    Ok(None) => continue,
                    Err(e) => e,
                },
                Ok(Some(StreamingToken::Complete)) => {
                    tracing::debug!(deltas = delta_count, format = %format, "Response stream complete");
                    break;
                }
                Ok(Some(StreamingToken::Error(failure))) => ChatError::Upstream(failure),
                Ok(None) => ChatError::Upstream(UpstreamFailure::new(
                    UpstreamStage::DeltaRead,
                    "upstream stream ended without completing",
                )),
                Err(_) => ChatError::IdleTimeout(idle_timeout),
            };

            tracing::error!(error = %failure, deltas = delta_count, "Response stream failed");
            yield encoder.encode_failure(failure);
            break;
        }
    }
}
