//! Chat Client - Terminal interface for folio-chat
//!
//! A thin client: the conversation state machine, turn cap and stream
//! decoding all live in `chat_core`. This crate only moves bytes and text.
//!
//! # Architecture
//!
//! - **ChatClient**: posts a turn and drives the reassembler over the body
//! - **App**: line-oriented session loop with commands and starter questions

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod chat_client;

pub use app::{parse_line, App, Command, Flow};
pub use chat_client::{ChatClient, ClientError};
