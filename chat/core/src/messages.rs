//! Wire Messages
//!
//! Shapes that cross the network between the chat server and its clients:
//! transcript [`Message`]s (sent back up as history) and the [`StreamFrame`]
//! records of the framed response format.
//!
//! All JSON uses camelCase field names (`threadId`) so a browser client and
//! the terminal client can share the same payloads.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Opaque provider-side conversation handle (stateful upstream only)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Wrap a provider thread identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person chatting
    User,
    /// The model
    Assistant,
}

impl MessageRole {
    /// Provider role name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One transcript entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Author
    pub role: MessageRole,
    /// Text content (possibly partial while streaming)
    pub content: String,
    /// Provider thread that produced this message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
}

impl Message {
    /// A user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            thread_id: None,
        }
    }

    /// An assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            thread_id: None,
        }
    }

    /// Attach a thread handle
    #[must_use]
    pub fn with_thread(mut self, thread_id: ThreadId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }
}

/// Discriminator of a [`StreamFrame`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// Carries one content delta
    Message,
    /// Terminal error record; content is a user-safe description
    Error,
}

/// One framed-format record: `data: <json>\n\n`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFrame {
    /// Record kind
    #[serde(rename = "type")]
    pub kind: FrameType,
    /// Delta text, or the error description for error records
    #[serde(default)]
    pub content: String,
    /// Thread handle, repeated on every frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
}

impl StreamFrame {
    /// A content delta frame
    pub fn message(content: impl Into<String>, thread_id: Option<ThreadId>) -> Self {
        Self {
            kind: FrameType::Message,
            content: content.into(),
            thread_id,
        }
    }

    /// An error record
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: FrameType::Error,
            content: content.into(),
            thread_id: None,
        }
    }
}

/// History as sent by clients: a bare array or a `{messages, threadId}` envelope
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryWire {
    Messages(Vec<Message>),
    Envelope {
        messages: Vec<Message>,
        #[serde(default, rename = "threadId")]
        thread_id: Option<ThreadId>,
    },
}

/// Prior conversation supplied with a chat request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    /// Prior turns, oldest first
    pub messages: Vec<Message>,
    /// Thread to continue (envelope field, else the latest assistant message's thread)
    pub thread_id: Option<ThreadId>,
}

impl History {
    /// Decode the optional `history` form field
    ///
    /// A missing or blank field is an empty history.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::HistoryDecode` if the field is not valid history JSON.
    pub fn decode(raw: Option<&str>) -> Result<Self, ChatError> {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Ok(Self::default());
        };

        let wire: HistoryWire =
            serde_json::from_str(raw).map_err(|e| ChatError::HistoryDecode(e.to_string()))?;

        let (messages, envelope_thread) = match wire {
            HistoryWire::Messages(messages) => (messages, None),
            HistoryWire::Envelope {
                messages,
                thread_id,
            } => (messages, thread_id),
        };

        let thread_id = envelope_thread.or_else(|| {
            messages
                .iter()
                .rev()
                .filter(|m| m.role == MessageRole::Assistant)
                .find_map(|m| m.thread_id.clone())
        });

        Ok(Self {
            messages,
            thread_id,
        })
    }

    /// Decode, falling back to an empty history on malformed input
    #[must_use]
    pub fn decode_or_empty(raw: Option<&str>) -> Self {
        Self::decode(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring malformed history");
            Self::default()
        })
    }

    /// Turns worth forwarding upstream (empty placeholders from failed turns are dropped)
    pub fn upstream_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.content.is_empty())
    }
}
