//! Terminal chat session
//!
//! A line-oriented loop: read a line, turn it into a [`Command`], and either
//! handle it locally or send it as a turn and print the reply as it streams.
//!
//! ```text
//! you> 3
//! assistant> Mostly Rust and TypeScript...
//! you> /new
//! ```

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use chat_core::{Conversation, DEFAULT_QUESTIONS};

use crate::chat_client::ChatClient;

const PROMPT: &str = "you> ";
const REPLY_PREFIX: &str = "assistant> ";
const REFRESH_HINT: &str = "Conversation limit reached. Type /new to start a new conversation.";

/// One parsed input line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Leave the session
    Quit,
    /// Clear the transcript
    NewConversation,
    /// Show commands and starter questions
    Help,
    /// Send a turn
    Send(String),
    /// Nothing to do (empty line)
    Ignore,
}

/// Whether the loop keeps going
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Read another line
    Continue,
    /// Stop
    Quit,
}

/// Interpret a line in the context of `conversation`
///
/// Before the first turn, `1`..`4` pick a starter question.
#[must_use]
pub fn parse_line(line: &str, conversation: &Conversation) -> Command {
    let line = line.trim();
    match line {
        "" => Command::Ignore,
        "/quit" | "/exit" => Command::Quit,
        "/new" | "/reset" => Command::NewConversation,
        "/help" | "?" => Command::Help,
        _ => {
            if conversation.message_count() == 0 {
                let picked = line
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| DEFAULT_QUESTIONS.get(i));
                if let Some(suggestion) = picked {
                    return Command::Send(suggestion.question.to_string());
                }
            }
            Command::Send(line.to_string())
        }
    }
}

/// Interactive chat session writing to `out`
pub struct App<W: Write> {
    client: ChatClient,
    conversation: Conversation,
    out: W,
}

impl<W: Write> App<W> {
    /// Create a session
    pub fn new(client: ChatClient, max_turns: usize, out: W) -> Self {
        Self {
            client,
            conversation: Conversation::new(max_turns),
            out,
        }
    }

    /// Current transcript and turn state
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Output sink
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Print the greeting and starter questions
    pub fn print_welcome(&mut self) -> Result<()> {
        writeln!(self.out, "Ask me anything about my work. Some ideas:")?;
        for (i, suggestion) in DEFAULT_QUESTIONS.iter().enumerate() {
            writeln!(
                self.out,
                "  {}. {}  ({})",
                i + 1,
                suggestion.question,
                suggestion.description
            )?;
        }
        writeln!(self.out, "Commands: /new, /help, /quit")?;
        Ok(())
    }

    /// Handle one input line
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        match parse_line(line, &self.conversation) {
            Command::Quit => return Ok(Flow::Quit),
            Command::Ignore => {}
            Command::Help => self.print_welcome()?,
            Command::NewConversation => {
                self.conversation.reset();
                tracing::info!("Conversation reset");
                writeln!(self.out, "Started a new conversation.")?;
            }
            Command::Send(text) => self.send(&text).await?,
        }
        Ok(Flow::Continue)
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        if self.conversation.policy().requires_refresh {
            writeln!(self.out, "{REFRESH_HINT}")?;
            return Ok(());
        }

        write!(self.out, "{REPLY_PREFIX}")?;
        self.out.flush()?;

        let Self {
            client,
            conversation,
            out,
        } = &mut *self;
        let result = client
            .send(conversation, text, |_, delta| {
                // Write errors here surface on the next line-level write
                let _ = write!(out, "{delta}");
                let _ = out.flush();
            })
            .await;
        writeln!(self.out)?;

        if let Err(e) = result {
            tracing::debug!(error = %e, "Turn failed");
            writeln!(self.out, "! {}", e.notification())?;
        } else if self.conversation.policy().requires_refresh {
            writeln!(self.out, "{REFRESH_HINT}")?;
        }
        Ok(())
    }

    /// Run until `/quit` or end of input
    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.print_welcome()?;
        let mut lines = input.lines();
        loop {
            write!(self.out, "{PROMPT}")?;
            self.out.flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            if self.handle_line(&line).await? == Flow::Quit {
                break;
            }
        }
        writeln!(self.out)?;
        Ok(())
    }
}
