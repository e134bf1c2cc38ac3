//! Character and author agents.
//!
//! Agents turn episode state into prompts, send them through a
//! [`TextGenerator`](crate::generator::TextGenerator), and coerce the reply
//! into structured responses. Unparseable replies degrade to empty
//! responses; only a failed collaborator call surfaces as an error.

mod author;
mod character;
pub mod prompts;

pub use author::{AuthorAgent, AuthorResponse, ClaimDraft};
pub use character::{CharacterAgent, CharacterResponse};

use crate::generator::TokenUsage;

/// A structured response plus what it cost to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub response: T,
    pub usage: TokenUsage,
    /// False when the reply could not be parsed and `response` is the empty
    /// fallback.
    pub parsed: bool,
}
