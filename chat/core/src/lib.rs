//! Chat Core - Streaming Portfolio Chat Protocol
//!
//! This crate holds everything about a portfolio chat that is not HTTP or
//! terminal plumbing: the upstream completion adapters, the response wire
//! formats, the incremental decoder that rebuilds a reply on the client, and
//! the conversation state machine that reply mutates.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────── server ─────────────────────────────┐
//! │  input + history                                                 │
//! │       │                                                          │
//! │       ▼                                                          │
//! │  ContextRetriever ──passages──▶ CompletionBackend ──deltas──┐    │
//! │  (vector store)                 (completion | assistant)    │    │
//! │                                                             ▼    │
//! │                                              StreamEncoder (raw │ framed)
//! └─────────────────────────────────────────────────────────────┼────┘
//!                                                               │ bytes
//! ┌───────────────────────────── client ────────────────────────┼────┐
//! │  Conversation ◀── Reassembler ◀── StreamDecoder ◀───────────┘    │
//! │       │                                                          │
//! │       ▼                                                          │
//! │  PolicyState { can_submit, requires_refresh }                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatService`]: Server request path, from input to encoded body
//! - [`CompletionBackend`]: Uniform "yields text deltas" upstream contract
//! - [`StreamEncoder`] / [`StreamDecoder`]: Both ends of the wire format
//! - [`Conversation`]: Ordered transcript plus turn state
//! - [`ChatConfig`]: Layered TOML / environment / CLI configuration
//!
//! # Module Overview
//!
//! - [`backend`]: Upstream adapters (chat completion, assistant thread/run)
//! - [`citations`]: Citation marker stripping for assistant output
//! - [`config`]: Configuration loading
//! - [`conversation`]: Conversation state machine and starter questions
//! - [`error`]: Error taxonomy
//! - [`messages`]: Wire messages, frames and history decoding
//! - [`policy`]: Turn cap policy
//! - [`retrieval`]: Context retrieval
//! - [`service`]: Server request path
//! - [`streaming`]: Encoder, decoder and reassembler

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod citations;
pub mod config;
pub mod conversation;
pub mod error;
pub mod messages;
pub mod policy;
pub mod retrieval;
pub mod service;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    build_backend, AssistantBackend, ChatCompletionBackend, CompletionBackend, CompletionRequest,
    CompletionSettings, CompletionStream, StreamingToken,
};
pub use citations::{strip_citations, CitationFilter};
pub use conversation::{
    Conversation, SubmitRejection, SuggestedQuestion, TurnState, DEFAULT_QUESTIONS,
};
pub use error::{ChatError, UpstreamFailure, UpstreamStage};
pub use messages::{FrameType, History, Message, MessageRole, StreamFrame, ThreadId};
pub use policy::{evaluate, PolicyState, DEFAULT_MAX_TURNS};
pub use retrieval::{
    ContextRetriever, NoRetrieval, ResourceCatalog, ResourceListing, VectorStoreRetriever,
};
pub use service::{ChatService, ResponseBody};
pub use streaming::{
    encode_stream, DecodeEvent, Reassembler, StreamDecoder, StreamEncoder, WireFormat,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ChatConfig, ChatToml, ConfigError,
    ConfigOverrides, ConfigSource, Environment, UpstreamMode,
};
