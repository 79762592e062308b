//! Turn submission controller
//!
//! Owns the conversation and the exchange state machine. An exchange is split
//! into `begin` (validate, record the user turn, lock intake) and `finish`
//! (record the reply or apology, unlock intake) so the TUI can run the network
//! call on a spawned task in between. `submit` chains the two for callers that
//! can simply await.

use crate::gemini::{Generate, GenerationError};
use crate::state::{Conversation, ExchangeState, Turn, APOLOGY};

/// Handle for an accepted submission that is waiting on a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    epoch: u64,
    utterance: String,
}

impl Exchange {
    pub fn utterance(&self) -> &str {
        &self.utterance
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// How a `submit` call ended. A failed exchange still appends the apology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, or an exchange was already in flight
    Rejected,
    Replied,
    Failed(String),
}

pub struct TurnController {
    conversation: Conversation,
    state: ExchangeState,
    // Bumped on every reset so replies to older exchanges can be recognised
    epoch: u64,
    discard_stale_replies: bool,
    scroll_requested: bool,
    focus_requested: bool,
}

impl TurnController {
    pub fn new(discard_stale_replies: bool) -> Self {
        Self {
            conversation: Conversation::seeded(),
            state: ExchangeState::Idle,
            epoch: 0,
            discard_stale_replies,
            scroll_requested: false,
            focus_requested: false,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state() == ExchangeState::AwaitingResponse
    }

    /// Accept a submission if it is non-blank and no exchange is in flight.
    /// Returns `None` (and changes nothing) otherwise.
    pub fn begin(&mut self, utterance: &str) -> Option<Exchange> {
        let utterance = utterance.trim();
        if utterance.is_empty() || self.state != ExchangeState::Idle {
            return None;
        }

        self.conversation.push(Turn::user(utterance));
        self.state = ExchangeState::AwaitingResponse;
        self.scroll_requested = true;

        tracing::info!(epoch = self.epoch, chars = utterance.len(), "exchange started");

        Some(Exchange {
            epoch: self.epoch,
            utterance: utterance.to_string(),
        })
    }

    /// Record the outcome of an exchange. Always returns the controller to
    /// `Idle`; returns whether a turn was appended.
    pub fn finish(&mut self, exchange: Exchange, result: Result<String, GenerationError>) -> bool {
        self.state = ExchangeState::Idle;

        if exchange.epoch != self.epoch && self.discard_stale_replies {
            tracing::info!(
                exchange_epoch = exchange.epoch,
                current_epoch = self.epoch,
                "dropping reply to an exchange started before reset"
            );
            return false;
        }

        let turn = match result {
            Ok(reply) => Turn::assistant(&reply),
            Err(e) => {
                tracing::warn!(error = %e, "exchange failed, showing apology");
                Turn::assistant(APOLOGY)
            }
        };

        self.conversation.push(turn);
        self.scroll_requested = true;
        true
    }

    /// Run a whole exchange against `client`
    pub async fn submit<G>(&mut self, client: &G, utterance: &str) -> SubmitOutcome
    where
        G: Generate + ?Sized,
    {
        let Some(exchange) = self.begin(utterance) else {
            return SubmitOutcome::Rejected;
        };
        let result = client.generate(exchange.utterance()).await;
        let outcome = match &result {
            Ok(_) => SubmitOutcome::Replied,
            Err(e) => SubmitOutcome::Failed(e.to_string()),
        };
        self.finish(exchange, result);
        outcome
    }

    /// Back to the greeting. Does not cancel an exchange in flight.
    pub fn reset(&mut self) {
        self.conversation.reset();
        self.epoch += 1;
        self.focus_requested = true;
        tracing::info!(epoch = self.epoch, busy = self.is_busy(), "conversation reset");
    }

    /// True once after each appended turn
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }

    /// True once after each reset
    pub fn take_focus_request(&mut self) -> bool {
        std::mem::take(&mut self.focus_requested)
    }
}

impl Default for TurnController {
    fn default() -> Self {
        Self::new(true)
    }
}
