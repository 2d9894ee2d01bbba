//! Upstream Event-Stream Reader
//!
//! Both upstream shapes answer with `text/event-stream` bodies. The reader
//! task parses them with `eventsource-stream` and turns each [`SseEvent`] into
//! [`StreamingToken`]s on a channel.
//!
//! Each backend supplies an [`SseHandler`] that knows its own event schema;
//! the reader owns the channel plumbing and failure mapping. The task stops
//! as soon as the receiving side goes away, even while the upstream is
//! silent, so the provider connection is released with it.

use eventsource_stream::{Event, Eventsource};
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::StreamingToken;
use crate::error::{UpstreamFailure, UpstreamStage};

/// Event type the wire uses when the server names none
const DEFAULT_EVENT_TYPE: &str = "message";

/// One dispatched server-sent event
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, if the server named the event
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

impl From<Event> for SseEvent {
    fn from(event: Event) -> Self {
        let name = (!event.event.is_empty() && event.event != DEFAULT_EVENT_TYPE)
            .then_some(event.event);
        Self {
            event: name,
            data: event.data,
        }
    }
}

/// Backend-specific interpretation of upstream events
pub trait SseHandler: Send + 'static {
    /// Map one event to zero or more tokens
    ///
    /// Returning `Complete` or `Error` ends the stream.
    fn on_event(&mut self, event: SseEvent) -> Vec<StreamingToken>;

    /// The body closed; return the final tokens
    fn on_end(&mut self) -> Vec<StreamingToken>;
}

/// Whether a token ends the stream
fn is_terminal(token: &StreamingToken) -> bool {
    matches!(token, StreamingToken::Complete | StreamingToken::Error(_))
}

/// Send tokens in order; `false` once the stream is over or the reader left
async fn forward(tx: &mpsc::Sender<StreamingToken>, tokens: Vec<StreamingToken>) -> bool {
    for token in tokens {
        let terminal = is_terminal(&token);
        if tx.send(token).await.is_err() {
            tracing::debug!("Delta receiver dropped, stopping upstream read");
            return false;
        }
        if terminal {
            return false;
        }
    }
    true
}

/// Read an upstream event-stream body on a background task
pub fn spawn_reader<H: SseHandler>(
    response: reqwest::Response,
    tx: mpsc::Sender<StreamingToken>,
    mut handler: H,
) {
    let mut events = response.bytes_stream().eventsource();

    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                () = tx.closed() => {
                    tracing::debug!("Delta receiver dropped, closing upstream connection");
                    return;
                }
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    if event.data.is_empty() {
                        continue;
                    }
                    if !forward(&tx, handler.on_event(event.into())).await {
                        return;
                    }
                }
                Some(Err(e)) => {
                    let failure = UpstreamFailure::new(UpstreamStage::DeltaRead, e.to_string());
                    tracing::warn!(error = %failure, "Upstream body read failed");
                    let _ = tx.send(StreamingToken::Error(failure)).await;
                    return;
                }
                None => break,
            }
        }

        forward(&tx, handler.on_end()).await;
    });
}
