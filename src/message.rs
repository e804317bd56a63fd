//! Chat turns exchanged between the caller and the answer pipeline.

use serde::{Deserialize, Serialize};

/// A single turn in a conversation: a role plus text content.
///
/// History is supplied by the caller per request and passed through to
/// prompt construction unmodified; the core never persists it.
///
/// # Examples
///
/// ```
/// use sitechat::message::ChatTurn;
///
/// let turn = ChatTurn::user("What does the pricing page say?");
/// assert_eq!(turn.role, ChatTurn::USER);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Sender role, one of the constants on [`ChatTurn`].
    pub role: String,
    /// The text content of the turn.
    pub content: String,
}

impl ChatTurn {
    /// Caller input role.
    pub const USER: &'static str = "user";
    /// Model response role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System instruction role.
    pub const SYSTEM: &'static str = "system";

    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Self::USER, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Self::SYSTEM, content)
    }
}
