use crate::error::ErrorKind;
use crate::types::{FinalPayload, StreamEvent};

/// Caller-supplied receiver of a turn's events.
///
/// For one turn the sink sees zero or more `on_token` calls followed by
/// exactly one `on_final` or `on_error`.
pub trait EventSink: Send {
    fn on_token(&mut self, text: &str);
    fn on_final(&mut self, payload: &FinalPayload);
    fn on_error(&mut self, kind: ErrorKind, detail: &str);

    /// Dispatch a normalized event to the matching callback.
    fn deliver(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Token(text) => self.on_token(text),
            StreamEvent::Final(payload) => self.on_final(payload),
            StreamEvent::Error { kind, detail } => self.on_error(*kind, detail),
        }
    }
}

/// Collects every event in arrival order.
impl EventSink for Vec<StreamEvent> {
    fn on_token(&mut self, text: &str) {
        self.push(StreamEvent::Token(text.to_string()));
    }

    fn on_final(&mut self, payload: &FinalPayload) {
        self.push(StreamEvent::Final(payload.clone()));
    }

    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        self.push(StreamEvent::Error {
            kind,
            detail: detail.to_string(),
        });
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_token(&mut self, _text: &str) {}
    fn on_final(&mut self, _payload: &FinalPayload) {}
    fn on_error(&mut self, _kind: ErrorKind, _detail: &str) {}
}
