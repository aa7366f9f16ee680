use crate::types::{Message, Sender, TurnId};

/// Lifecycle of the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Submitted,
    FirstTokenPending,
    Streaming,
    Settled,
    Failed,
}

impl TurnPhase {
    /// A turn in this phase still expects events.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TurnPhase::Submitted | TurnPhase::FirstTokenPending | TurnPhase::Streaming
        )
    }
}

/// Snapshot of the conversation broadcast to views via watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub suggested_questions: Vec<String>,
    pub phase: TurnPhase,
    pub active_turn: Option<TurnId>,
}

impl ConversationState {
    pub fn latest_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Assistant)
    }

    /// True while a turn is in flight or its reply is still streaming.
    pub fn is_responding(&self) -> bool {
        self.phase.is_active() || self.messages.last().is_some_and(|m| m.streaming)
    }
}
