//! Reassembler
//!
//! Applies decoded events to the trailing assistant message of a
//! [`Conversation`]. Raw chunks are appended; framed records replace the
//! message with the decoder's accumulator. Either way the message only ever
//! grows, so every intermediate state is a prefix of the final reply.

use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};

use super::decoder::{DecodeEvent, StreamDecoder};
use super::encoder::WireFormat;
use crate::conversation::Conversation;
use crate::error::ChatError;

/// Drives one response body into a conversation
#[derive(Debug)]
pub struct Reassembler {
    decoder: StreamDecoder,
}

impl Reassembler {
    /// Create a reassembler for the given wire format
    #[must_use]
    pub fn new(format: WireFormat) -> Self {
        Self {
            decoder: StreamDecoder::new(format),
        }
    }

    /// Apply one body chunk
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Remote` when the server sent an error record.
    pub fn apply_chunk(&mut self, conversation: &mut Conversation, chunk: &[u8]) -> Result<(), ChatError> {
        let events = self.decoder.push(chunk);
        apply_events(conversation, events)
    }

    /// Apply whatever the decoder still holds at end of body
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Remote` when a trailing error record was recovered.
    pub fn finish(&mut self, conversation: &mut Conversation) -> Result<(), ChatError> {
        let events = self.decoder.finish();
        apply_events(conversation, events)
    }

    /// Consume a whole body stream, settling the conversation when it ends
    ///
    /// `on_update` receives the conversation and the text newly added to the
    /// trailing assistant message after every chunk that changed it. On
    /// success the conversation is completed; on any error it is failed with
    /// the received prefix kept.
    ///
    /// # Errors
    ///
    /// Returns the terminal error: a transport error, an idle timeout, or a
    /// server error record.
    pub async fn drive<S, B, E, F>(
        mut self,
        conversation: &mut Conversation,
        body: S,
        idle_timeout: Duration,
        mut on_update: F,
    ) -> Result<(), ChatError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
        F: FnMut(&Conversation, &str),
    {
        let result = self.pump(conversation, body, idle_timeout, &mut on_update).await;
        match &result {
            Ok(()) => conversation.complete(),
            Err(e) => {
                tracing::warn!(error = %e, "Reply stream ended with an error");
                conversation.fail();
            }
        }
        result
    }

    async fn pump<S, B, E, F>(
        &mut self,
        conversation: &mut Conversation,
        body: S,
        idle_timeout: Duration,
        on_update: &mut F,
    ) -> Result<(), ChatError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
        F: FnMut(&Conversation, &str),
    {
        futures::pin_mut!(body);
        loop {
            let next = tokio::time::timeout(idle_timeout, body.next())
                .await
                .map_err(|_| ChatError::IdleTimeout(idle_timeout))?;

            let at_end = next.is_none();
            let before = trailing_len(conversation);
            let step = match next {
                Some(Ok(chunk)) => self.apply_chunk(conversation, chunk.as_ref()),
                Some(Err(e)) => Err(ChatError::Transport(e.to_string())),
                None => self.finish(conversation),
            };
            notify(conversation, before, on_update);
            step?;

            if at_end {
                return Ok(());
            }
        }
    }
}

fn trailing_len(conversation: &Conversation) -> usize {
    conversation.messages().last().map_or(0, |m| m.content.len())
}

fn notify<F>(conversation: &Conversation, before: usize, on_update: &mut F)
where
    F: FnMut(&Conversation, &str),
{
    let Some(last) = conversation.messages().last() else {
        return;
    };
    if let Some(added) = last.content.get(before..).filter(|s| !s.is_empty()) {
        on_update(conversation, added);
    }
}

fn apply_events(conversation: &mut Conversation, events: Vec<DecodeEvent>) -> Result<(), ChatError> {
    for event in events {
        match event {
            DecodeEvent::Append(text) => {
                conversation.append_trailing_assistant_content(&text);
            }
            DecodeEvent::Replace { content, thread_id } => {
                conversation.replace_trailing_assistant_content(&content, thread_id.as_ref());
            }
            DecodeEvent::Error(message) => return Err(ChatError::Remote(message)),
        }
    }
    Ok(())
}
