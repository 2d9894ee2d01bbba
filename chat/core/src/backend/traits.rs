//! Completion Backend Traits
//!
//! One contract over two very different upstream shapes: a stateless chat
//! completion and a stateful assistant thread/run. Either way the caller gets
//! an ordered channel of text deltas and, for stateful upstreams, the thread
//! the reply belongs to.
//!
//! # Design Philosophy
//!
//! The mode is chosen once, when the backend is built from configuration. The
//! request path never branches on it: it calls [`CompletionBackend::start`]
//! and drains the channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::UpstreamFailure;
use crate::messages::{History, ThreadId};

/// Capacity of the delta channel between a backend task and its reader
pub const DELTA_CHANNEL_CAPACITY: usize = 100;

/// Events on a completion stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A text delta (may be empty; empty deltas are dropped by the encoder)
    Delta(String),
    /// The upstream finished normally
    Complete,
    /// The upstream failed after the stream was opened
    Error(UpstreamFailure),
}

/// Everything an adapter needs to produce one reply
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    /// Prior turns and the thread to continue
    pub history: History,
    /// The new user input
    pub input: String,
    /// Retrieved passages, best first
    pub context: Vec<String>,
}

impl CompletionRequest {
    /// Create a request for `input` with no history or context
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Set prior history
    #[must_use]
    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    /// Set retrieved context passages
    #[must_use]
    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    /// Context passages joined by blank lines, or `None` when there are none
    #[must_use]
    pub fn joined_context(&self) -> Option<String> {
        let passages: Vec<&str> = self
            .context
            .iter()
            .map(String::as_str)
            .filter(|p| !p.trim().is_empty())
            .collect();
        (!passages.is_empty()).then(|| passages.join("\n\n"))
    }
}

/// An opened reply stream
#[derive(Debug)]
pub struct CompletionStream {
    /// Thread the reply belongs to (stateful upstreams only)
    pub thread_id: Option<ThreadId>,
    /// Deltas in upstream order
    pub receiver: mpsc::Receiver<StreamingToken>,
}

impl CompletionStream {
    /// Create a stream and the sender that feeds it
    #[must_use]
    pub fn channel(thread_id: Option<ThreadId>) -> (mpsc::Sender<StreamingToken>, Self) {
        let (tx, receiver) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        (
            tx,
            Self {
                thread_id,
                receiver,
            },
        )
    }
}

/// Upstream completion backend
///
/// Implement this trait to add another upstream shape.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Open a reply stream
    ///
    /// Setup failures (thread lookup, message post, run creation, the
    /// completion request itself) are returned here. Failures after the
    /// stream opened arrive as [`StreamingToken::Error`].
    async fn start(&self, request: CompletionRequest) -> Result<CompletionStream, UpstreamFailure>;
}
