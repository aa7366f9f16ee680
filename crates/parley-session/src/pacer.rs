use parley_core::{ConversationState, Message, MessageId};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::watch;

fn unit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*\S+\s*").expect("static pattern is valid"))
}

/// Number of word-plus-trailing-whitespace units in `text`.
pub fn unit_count(text: &str) -> usize {
    unit_pattern().find_iter(text).count()
}

/// Prefix of `text` covering its first `units` units.
pub fn revealed_prefix(text: &str, units: usize) -> &str {
    if units == 0 {
        return "";
    }
    match unit_pattern().find_iter(text).nth(units - 1) {
        Some(m) => &text[..m.end()],
        None => text,
    }
}

/// Reveals a message one unit at a time.
///
/// Holds only a reveal counter and the id it belongs to; a message with a
/// different id resets the counter. The message text itself is never
/// modified.
#[derive(Debug, Default)]
pub struct Pacer {
    message_id: Option<MessageId>,
    revealed: usize,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revealed(&self) -> usize {
        self.revealed
    }

    /// Advance by one unit. Returns the newly visible prefix, or `None` when
    /// everything received so far is already shown.
    pub fn tick<'a>(&mut self, message: &'a Message) -> Option<&'a str> {
        if self.message_id != Some(message.id) {
            self.message_id = Some(message.id);
            self.revealed = 0;
        }
        if self.revealed >= unit_count(&message.text) {
            return None;
        }
        self.revealed += 1;
        Some(revealed_prefix(&message.text, self.revealed))
    }

    pub fn is_caught_up(&self, message: &Message) -> bool {
        self.message_id == Some(message.id) && self.revealed >= unit_count(&message.text)
    }
}

/// Pace the latest assistant reply until its turn has ended and the reply
/// is fully shown, or the state channel closes.
///
/// `render` receives the message and its visible prefix after every step.
/// Ingestion never waits on this loop.
pub async fn run_pacer<F>(
    mut state_rx: watch::Receiver<ConversationState>,
    interval: Duration,
    mut render: F,
) where
    F: FnMut(&Message, &str),
{
    let mut pacer = Pacer::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let closed = state_rx.has_changed().is_err();
        let state = state_rx.borrow_and_update().clone();

        let done = match state.latest_assistant() {
            Some(message) => {
                if let Some(visible) = pacer.tick(message) {
                    render(message, visible);
                }
                pacer.is_caught_up(message) && (!state.is_responding() || closed)
            }
            None => closed,
        };
        if done {
            break;
        }
    }
}
