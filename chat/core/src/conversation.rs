//! Conversation State Machine
//!
//! Owns the ordered transcript of one chat session and the turn state that
//! the response stream drives.
//!
//! # Design Philosophy
//!
//! The transcript is only ever changed in three ways: a user message and an
//! empty assistant placeholder are appended together, the trailing assistant
//! message is rewritten while its reply streams in, or everything is reset.
//! Because of that the transcript always alternates user/assistant starting
//! with a user turn, and the only open message is the last one.
//!
//! ```text
//! Idle ──submit──▶ AwaitingFirstByte ──first content──▶ Streaming
//!  ▲                     │                                  │
//!  └──── complete / fail / cancel ◀──────────────────────────┘
//! reset: any state ──▶ Idle (empty)
//! ```

use thiserror::Error;

use crate::messages::{Message, MessageRole, ThreadId};
use crate::policy::{self, PolicyState, DEFAULT_MAX_TURNS};

/// A starter prompt offered before the first turn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuggestedQuestion {
    /// Text submitted when chosen
    pub question: &'static str,
    /// Short description shown alongside
    pub description: &'static str,
}

/// Starter prompts for an empty conversation
pub const DEFAULT_QUESTIONS: [SuggestedQuestion; 4] = [
    SuggestedQuestion {
        question: "What is your professional experience?",
        description: "Learn about my professional journey",
    },
    SuggestedQuestion {
        question: "What are your clean code principles?",
        description: "Learn about my coding standards",
    },
    SuggestedQuestion {
        question: "What tech stack do you use?",
        description: "Explore my development tools",
    },
    SuggestedQuestion {
        question: "Contact me",
        description: "Let's discuss your project or opportunity",
    },
];

/// Where the conversation is in the request/response cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    /// Ready for input
    Idle,
    /// Request sent, no content received yet
    AwaitingFirstByte,
    /// Content is arriving
    Streaming,
}

/// Why `submit` refused the input
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SubmitRejection {
    /// Input was empty or whitespace
    #[error("message is empty")]
    Blank,
    /// A reply is still streaming
    #[error("a reply is still in progress")]
    Pending,
    /// The turn cap is reached; reset to continue
    #[error("conversation limit reached, start a new conversation to continue")]
    TurnCapReached,
}

/// Ordered transcript plus turn state for one session
#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    state: TurnState,
    max_turns: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl Conversation {
    /// Create an empty conversation capped at `max_turns` exchanges
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            state: TurnState::Idle,
            max_turns,
        }
    }

    /// Accept user input, appending the user turn and an empty assistant placeholder
    ///
    /// Returns the transcript as it was before this turn, which is what a
    /// client sends as `history`.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitRejection`] when the input is blank, a reply is
    /// pending, or the turn cap is reached. The transcript is unchanged.
    pub fn submit(&mut self, text: &str) -> Result<Vec<Message>, SubmitRejection> {
        if text.trim().is_empty() {
            return Err(SubmitRejection::Blank);
        }
        if self.is_pending() {
            return Err(SubmitRejection::Pending);
        }
        if policy::turn_limit_reached(self.messages.len(), self.max_turns) {
            return Err(SubmitRejection::TurnCapReached);
        }

        let history = self.messages.clone();
        self.messages.push(Message::user(text));
        self.messages.push(Message::assistant(String::new()));
        self.state = TurnState::AwaitingFirstByte;

        tracing::debug!(
            message_count = self.messages.len(),
            max_turns = self.max_turns,
            "Turn submitted"
        );
        Ok(history)
    }

    fn open_assistant(&mut self) -> Option<&mut Message> {
        if !self.is_pending() {
            return None;
        }
        self.messages
            .last_mut()
            .filter(|m| m.role == MessageRole::Assistant)
    }

    /// Replace the open assistant message's content (and thread) wholesale
    ///
    /// Returns `false` if no reply is pending.
    pub fn replace_trailing_assistant_content(
        &mut self,
        content: &str,
        thread_id: Option<&ThreadId>,
    ) -> bool {
        let Some(message) = self.open_assistant() else {
            return false;
        };
        message.content.clear();
        message.content.push_str(content);
        if let Some(id) = thread_id {
            message.thread_id = Some(id.clone());
        }
        self.state = TurnState::Streaming;
        true
    }

    /// Append a delta to the open assistant message
    ///
    /// Returns `false` if no reply is pending.
    pub fn append_trailing_assistant_content(&mut self, delta: &str) -> bool {
        let Some(message) = self.open_assistant() else {
            return false;
        };
        message.content.push_str(delta);
        self.state = TurnState::Streaming;
        true
    }

    /// The reply finished normally
    pub fn complete(&mut self) {
        if self.is_pending() {
            tracing::debug!(message_count = self.messages.len(), "Turn complete");
        }
        self.state = TurnState::Idle;
    }

    /// The reply failed; the user turn and any partial content are kept
    pub fn fail(&mut self) {
        if self.is_pending() {
            tracing::debug!(
                partial_bytes = self.messages.last().map_or(0, |m| m.content.len()),
                "Turn failed"
            );
        }
        self.state = TurnState::Idle;
    }

    /// The reader stopped early; the received prefix is kept
    pub fn cancel(&mut self) {
        self.state = TurnState::Idle;
    }

    /// Clear the transcript and return to `Idle`
    pub fn reset(&mut self) {
        self.messages.clear();
        self.state = TurnState::Idle;
    }

    /// Current turn state
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether a reply is in flight
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state != TurnState::Idle
    }

    /// Transcript, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages including any placeholder
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Configured turn cap
    #[must_use]
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Thread carried by the most recent assistant message, if any
    #[must_use]
    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::Assistant)
            .find_map(|m| m.thread_id.as_ref())
    }

    /// Derived submit/refresh state
    #[must_use]
    pub fn policy(&self) -> PolicyState {
        policy::evaluate(self.messages.len(), self.max_turns, self.is_pending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_submit_appends_pair_and_returns_prior_history() {
        let mut conv = Conversation::new(10);
        let history = conv.submit("Hi").unwrap();
        assert!(history.is_empty());
        assert_eq!(
            conv.messages(),
            &[Message::user("Hi"), Message::assistant("")]
        );
        assert_eq!(conv.state(), TurnState::AwaitingFirstByte);
    }

    #[test]
    fn test_blank_input_is_rejected_without_change() {
        let mut conv = Conversation::new(10);
        assert_eq!(conv.submit("   \n"), Err(SubmitRejection::Blank));
        assert_eq!(conv.message_count(), 0);
        assert_eq!(conv.state(), TurnState::Idle);
    }

    #[test]
    fn test_submit_while_pending_is_rejected() {
        let mut conv = Conversation::new(10);
        conv.submit("one").unwrap();
        assert_eq!(conv.submit("two"), Err(SubmitRejection::Pending));
        assert_eq!(conv.message_count(), 2);
    }

    #[test]
    fn test_replace_moves_to_streaming_and_sets_thread() {
        let mut conv = Conversation::new(10);
        conv.submit("Hi").unwrap();
        let thread = ThreadId::new("t1");
        assert!(conv.replace_trailing_assistant_content("He", Some(&thread)));
        assert_eq!(conv.state(), TurnState::Streaming);
        assert!(conv.replace_trailing_assistant_content("Hello", Some(&thread)));
        assert_eq!(conv.messages()[1].content, "Hello");
        assert_eq!(conv.thread_id(), Some(&thread));
    }

    #[test]
    fn test_mutation_without_pending_reply_is_ignored() {
        let mut conv = Conversation::new(10);
        assert!(!conv.append_trailing_assistant_content("stray"));
        assert!(!conv.replace_trailing_assistant_content("stray", None));
        assert_eq!(conv.message_count(), 0);
    }

    #[test]
    fn test_fail_keeps_user_turn_and_partial_reply() {
        let mut conv = Conversation::new(10);
        conv.submit("Hi").unwrap();
        conv.append_trailing_assistant_content("Hel");
        conv.fail();
        assert_eq!(conv.state(), TurnState::Idle);
        assert_eq!(conv.messages()[0], Message::user("Hi"));
        assert_eq!(conv.messages()[1].content, "Hel");
        assert!(conv.policy().can_submit);
    }

    #[test]
    fn test_turn_cap_rejects_and_requires_refresh() {
        let mut conv = Conversation::new(1);
        conv.submit("Hi").unwrap();
        conv.append_trailing_assistant_content("Hello there");
        conv.complete();

        let policy = conv.policy();
        assert!(!policy.can_submit);
        assert!(policy.requires_refresh);
        assert_eq!(conv.submit("again"), Err(SubmitRejection::TurnCapReached));
        assert_eq!(conv.message_count(), 2);
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut conv = Conversation::new(1);
        conv.submit("Hi").unwrap();
        conv.append_trailing_assistant_content("partial");
        conv.reset();
        assert_eq!(conv.message_count(), 0);
        assert_eq!(conv.state(), TurnState::Idle);
        assert!(conv.policy().can_submit);
    }

    #[test]
    fn test_second_submit_returns_completed_transcript() {
        let mut conv = Conversation::new(10);
        conv.submit("a").unwrap();
        conv.replace_trailing_assistant_content("b", Some(&ThreadId::new("t1")));
        conv.complete();
        let history = conv.submit("c").unwrap();
        assert_eq!(
            history,
            vec![
                Message::user("a"),
                Message::assistant("b").with_thread(ThreadId::new("t1")),
            ]
        );
    }

    #[test]
    fn test_default_questions_are_non_blank() {
        assert!(DEFAULT_QUESTIONS.iter().all(|q| !q.question.trim().is_empty()));
    }
}
