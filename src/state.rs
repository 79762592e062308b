//! UI-agnostic conversation state
//!
//! These types carry no terminal or HTTP dependencies so the controller can be
//! driven from tests, the TUI, or the one-shot `ask` command alike.

use crate::markup::{self, CodeFragment, MarkupTree};

/// Seed turn shown on start-up and after a reset
pub const GREETING: &str = "Hii, how can I help you with Data Structures and Algorithms today?";

/// Shown in place of a reply whenever an exchange fails
pub const APOLOGY: &str = "Sorry, I encountered an error. Please check the console or try again.";

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "AI",
        }
    }
}

/// One message in the conversation
#[derive(Debug, Clone)]
pub struct Turn {
    pub sender: Sender,
    pub raw_text: String,
    pub rendered: MarkupTree,
}

impl Turn {
    pub fn user(text: &str) -> Self {
        Self {
            sender: Sender::User,
            raw_text: text.to_string(),
            rendered: MarkupTree::plain(text),
        }
    }

    pub fn assistant(text: &str) -> Self {
        Self {
            sender: Sender::Assistant,
            raw_text: text.to_string(),
            rendered: markup::render(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    AwaitingResponse,
}

/// Ordered, append-only list of turns
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// A conversation holding only the greeting
    pub fn seeded() -> Self {
        Self {
            turns: vec![Turn::assistant(GREETING)],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Replace everything with the single greeting turn
    pub fn reset(&mut self) {
        self.turns.clear();
        self.turns.push(Turn::assistant(GREETING));
    }

    /// Code fragment `block` of turn `turn`, if both exist
    pub fn code_fragment(&self, turn: usize, block: usize) -> Option<&CodeFragment> {
        self.turns.get(turn)?.rendered.code_fragment(block)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_conversation_has_greeting() {
        let conversation = Conversation::seeded();
        assert_eq!(conversation.len(), 1);
        let turn = &conversation.turns()[0];
        assert_eq!(turn.sender, Sender::Assistant);
        assert_eq!(turn.raw_text, GREETING);
    }

    #[test]
    fn test_reset_replaces_all_turns() {
        let mut conversation = Conversation::seeded();
        conversation.push(Turn::user("hi"));
        conversation.push(Turn::assistant("Hii, how can I help you?"));
        conversation.reset();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns()[0].raw_text, GREETING);
    }

    #[test]
    fn test_user_turns_are_not_parsed_for_code() {
        let mut conversation = Conversation::seeded();
        conversation.push(Turn::user("```js\nx\n```"));
        assert!(conversation.code_fragment(1, 0).is_none());

        conversation.push(Turn::assistant("```js\nx\n```"));
        assert_eq!(conversation.code_fragment(2, 0).map(|f| f.code.as_str()), Some("x"));
    }
}
