use bytes::Bytes;
use indexmap::IndexMap;
use parley_core::{
    AudioRef, ConversationState, ErrorKind, FinalPayload, Message, MessageId, StreamEvent, Turn,
    TurnId, TurnPhase, TurnRejected, APOLOGY_TEXT,
};
use tokio::sync::watch;

const MAILTO_SCHEME: &str = "mailto:";

/// Text shown in place of a reply when a turn fails.
pub fn apology_text(kind: ErrorKind, detail: &str) -> String {
    if detail.trim().is_empty() {
        APOLOGY_TEXT.to_string()
    } else {
        format!("{}\n\n({}: {})", APOLOGY_TEXT, kind, detail)
    }
}

/// Markdown link appended to a reply carrying a mail action.
pub fn mail_link(address: &str) -> String {
    let address = address.trim();
    let address = match address.get(..MAILTO_SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(MAILTO_SCHEME) => &address[MAILTO_SCHEME.len()..],
        _ => address,
    };
    format!("\n\n[Contact us by email](mailto:{})", address)
}

/// Owns the conversation's messages and the lifecycle of the current turn.
///
/// Every change is published as a [`ConversationState`] snapshot. The
/// machine never performs I/O; reply audio is returned to the caller.
pub struct TurnMachine {
    messages: IndexMap<MessageId, Message>,
    suggested_questions: Vec<String>,
    phase: TurnPhase,
    active_turn: Option<TurnId>,
    reply: Option<MessageId>,
    state_tx: watch::Sender<ConversationState>,
}

impl TurnMachine {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConversationState::default());
        Self {
            messages: IndexMap::new(),
            suggested_questions: Vec::new(),
            phase: TurnPhase::Idle,
            active_turn: None,
            reply: None,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.state_tx.subscribe()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn active_turn(&self) -> Option<TurnId> {
        self.active_turn
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn suggested_questions(&self) -> &[String] {
        &self.suggested_questions
    }

    pub fn snapshot(&self) -> ConversationState {
        ConversationState {
            messages: self.messages.values().cloned().collect(),
            suggested_questions: self.suggested_questions.clone(),
            phase: self.phase,
            active_turn: self.active_turn,
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "turn phase changed");
        self.phase = phase;
    }

    /// Start a new turn. Rejected turns leave the conversation untouched.
    pub fn submit(&mut self, text: &str, audio: Option<Bytes>) -> Result<Turn, TurnRejected> {
        if self.phase.is_active() {
            return Err(TurnRejected::Busy);
        }
        let turn = Turn::new(text, audio);
        if turn.is_empty() {
            return Err(TurnRejected::EmptyInput);
        }

        self.suggested_questions.clear();
        let echo = Message::user(text);
        self.messages.insert(echo.id, echo);
        self.reply = None;
        self.active_turn = Some(turn.id);
        self.set_phase(TurnPhase::Submitted);
        tracing::info!(turn_id = %turn.id, with_audio = turn.audio.is_some(), "turn submitted");
        self.publish();
        Ok(turn)
    }

    /// The request for `turn_id` has been handed to the transport.
    pub fn dispatched(&mut self, turn_id: TurnId) {
        if self.active_turn != Some(turn_id) || self.phase != TurnPhase::Submitted {
            return;
        }
        self.set_phase(TurnPhase::FirstTokenPending);
        self.publish();
    }

    /// Apply one normalized event to `turn_id`. Returns reply audio that
    /// should be handed to playback once the turn has settled.
    pub fn apply(&mut self, turn_id: TurnId, event: &StreamEvent) -> Option<AudioRef> {
        if self.active_turn != Some(turn_id) || !self.phase.is_active() {
            tracing::debug!(turn_id = %turn_id, "ignoring event for inactive turn");
            return None;
        }
        let audio = match event {
            StreamEvent::Token(text) => {
                self.append_token(text);
                None
            }
            StreamEvent::Final(payload) => self.settle(payload),
            StreamEvent::Error { kind, detail } => {
                self.fail(*kind, detail);
                None
            }
        };
        self.publish();
        audio
    }

    fn reply_message(&mut self) -> &mut Message {
        let id = match self.reply {
            Some(id) if self.messages.contains_key(&id) => id,
            _ => {
                let message = Message::assistant("", true);
                let id = message.id;
                self.messages.insert(id, message);
                self.reply = Some(id);
                id
            }
        };
        // Inserted above when missing.
        &mut self.messages[&id]
    }

    fn append_token(&mut self, text: &str) {
        if self.phase != TurnPhase::Streaming {
            self.set_phase(TurnPhase::Streaming);
        }
        self.reply_message().text.push_str(text);
    }

    fn settle(&mut self, payload: &FinalPayload) -> Option<AudioRef> {
        let message = self.reply_message();
        if let Some(address) = payload.mail_action.as_deref() {
            message.text.push_str(&mail_link(address));
        }
        message.reply_audio = payload.audio.clone();
        message.streaming = false;

        self.suggested_questions = payload.suggested_questions.clone().unwrap_or_default();
        self.set_phase(TurnPhase::Settled);
        tracing::info!(
            turn_id = ?self.active_turn,
            suggestions = self.suggested_questions.len(),
            with_audio = payload.audio.is_some(),
            "turn settled"
        );
        self.active_turn = None;
        payload.audio.clone()
    }

    fn fail(&mut self, kind: ErrorKind, detail: &str) {
        let message = self.reply_message();
        message.text = apology_text(kind, detail);
        message.streaming = false;
        self.set_phase(TurnPhase::Failed);
        tracing::warn!(turn_id = ?self.active_turn, kind = %kind, "turn failed: {}", detail);
        self.active_turn = None;
    }
}

impl Default for TurnMachine {
    fn default() -> Self {
        Self::new()
    }
}
