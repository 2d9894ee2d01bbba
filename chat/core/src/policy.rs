//! Session Policy
//!
//! A conversation is capped at a fixed number of turns. Each turn is a user
//! message plus its assistant reply, so the cap is reached at `max_turns * 2`
//! messages. Everything here is derived from `(message_count, max_turns,
//! pending)` and never stored.

use serde::Serialize;

/// Turns allowed per conversation unless configured otherwise
pub const DEFAULT_MAX_TURNS: usize = 10;

/// What the client may do next
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyState {
    /// Input is accepted
    pub can_submit: bool,
    /// The turn cap is reached; only a reset can continue
    pub requires_refresh: bool,
}

/// Whether `message_count` has reached the cap for `max_turns`
#[must_use]
pub fn turn_limit_reached(message_count: usize, max_turns: usize) -> bool {
    message_count >= max_turns.saturating_mul(2)
}

/// Derive the policy for a conversation snapshot
#[must_use]
pub fn evaluate(message_count: usize, max_turns: usize, pending: bool) -> PolicyState {
    let capped = turn_limit_reached(message_count, max_turns);
    PolicyState {
        can_submit: !capped && !pending,
        requires_refresh: capped,
    }
}
