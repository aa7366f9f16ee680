use async_trait::async_trait;
use bytes::Bytes;
use parley_core::{ResponseError, SessionId, Turn, TurnId};
use parley_wire::RawResponse;

/// Everything the backend needs to answer one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub text: String,
    /// Outbound PCM container, already re-encoded.
    pub audio: Option<Bytes>,
}

impl TurnRequest {
    pub fn new(session_id: SessionId, turn: &Turn) -> Self {
        Self {
            session_id,
            turn_id: turn.id,
            text: turn.text.clone(),
            audio: turn.audio.clone(),
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Carries a turn to the backend and hands back the raw, un-normalized reply.
///
/// A failure before any response exists (connect error, DNS, TLS) is a
/// [`ResponseError::Transport`]. Non-success statuses are *not* errors here;
/// they are returned as a [`RawResponse`] so the normalizer can report them.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Short identifier used in logs (e.g. `"http"`, `"scripted"`).
    fn name(&self) -> &str;
    async fn send(&self, request: &TurnRequest) -> Result<RawResponse, ResponseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_request_copies_turn_fields() {
        let turn = Turn::new("hello", Some(Bytes::from_static(b"RIFF")));
        let request = TurnRequest::new(SessionId::from("s-1"), &turn);
        assert_eq!(request.session_id.as_str(), "s-1");
        assert_eq!(request.turn_id, turn.id);
        assert_eq!(request.text, "hello");
        assert!(request.has_audio());
    }

    #[test]
    fn test_turn_request_without_audio() {
        let turn = Turn::new("text only", None);
        let request = TurnRequest::new(SessionId::generate(), &turn);
        assert!(!request.has_audio());
    }
}
