use bytes::Bytes;
use parley_core::{
    AudioRef, ConversationState, ErrorKind, EventSink, FinalPayload, SessionId, StreamEvent,
    TurnId, TurnPhase, TurnRejected,
};
use parley_transport::{ChatTransport, TurnRequest};
use parley_wire::normalize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::machine::TurnMachine;
use crate::playback::PlaybackSurface;

/// How a submitted turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    pub phase: TurnPhase,
}

/// Entry point for callers: submits turns and reports their events.
///
/// Holds one session for its whole lifetime. At most one turn runs at a
/// time; a concurrent submission is rejected with [`TurnRejected::Busy`].
pub struct ChatClient {
    session_id: SessionId,
    transport: Arc<dyn ChatTransport>,
    machine: Arc<Mutex<TurnMachine>>,
    playback: Option<Arc<dyn PlaybackSurface>>,
}

impl ChatClient {
    pub fn new(session_id: SessionId, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            session_id,
            transport,
            machine: Arc::new(Mutex::new(TurnMachine::new())),
            playback: None,
        }
    }

    pub fn with_playback(mut self, playback: Arc<dyn PlaybackSurface>) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.lock_machine().subscribe()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.lock_machine().snapshot()
    }

    fn lock_machine(&self) -> MutexGuard<'_, TurnMachine> {
        lock(&self.machine)
    }

    /// Submit one turn and drive it to its terminal event.
    ///
    /// `sink` sees `on_token* (on_final | on_error)`. Rejected submissions
    /// return immediately without touching the conversation or the sink.
    pub async fn submit_turn(
        &self,
        text: &str,
        audio: Option<Bytes>,
        sink: &mut dyn EventSink,
    ) -> Result<TurnOutcome, TurnRejected> {
        let turn = self.lock_machine().submit(text, audio)?;
        let request = TurnRequest::new(self.session_id.clone(), &turn);
        self.lock_machine().dispatched(turn.id);

        tracing::debug!(
            turn_id = %turn.id,
            session_id = %self.session_id,
            transport = self.transport.name(),
            "dispatching turn"
        );
        let mut fanout = FanOut {
            machine: &self.machine,
            turn_id: turn.id,
            sink,
            reply_audio: None,
        };
        match self.transport.send(&request).await {
            Ok(response) => normalize(response, &mut fanout).await,
            Err(err) => fanout.deliver(&err.into_event()),
        }
        let reply_audio = fanout.reply_audio.take();

        if let (Some(audio), Some(playback)) = (reply_audio, &self.playback) {
            if let Err(e) = playback.play(&audio).await {
                tracing::warn!(surface = playback.name(), "reply audio playback failed: {}", e);
            }
        }

        let phase = self.lock_machine().phase();
        Ok(TurnOutcome {
            turn_id: turn.id,
            phase,
        })
    }
}

fn lock(machine: &Mutex<TurnMachine>) -> MutexGuard<'_, TurnMachine> {
    machine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Applies each event to the machine, then forwards it to the caller.
struct FanOut<'a> {
    machine: &'a Mutex<TurnMachine>,
    turn_id: TurnId,
    sink: &'a mut dyn EventSink,
    reply_audio: Option<AudioRef>,
}

impl FanOut<'_> {
    fn apply(&mut self, event: StreamEvent) {
        let audio = lock(self.machine).apply(self.turn_id, &event);
        if audio.is_some() {
            self.reply_audio = audio;
        }
    }
}

/// A turn whose future is dropped before its terminal event (timeout,
/// `select!`, aborted task) has lost its connection; fail it so the
/// client accepts the next submission.
impl Drop for FanOut<'_> {
    fn drop(&mut self) {
        let mut machine = lock(self.machine);
        if machine.active_turn() != Some(self.turn_id) || !machine.phase().is_active() {
            return;
        }
        tracing::warn!(turn_id = %self.turn_id, "turn dropped before its terminal event");
        machine.apply(
            self.turn_id,
            &StreamEvent::Error {
                kind: ErrorKind::TransportFailure,
                detail: "turn cancelled".to_string(),
            },
        );
    }
}

impl EventSink for FanOut<'_> {
    fn on_token(&mut self, text: &str) {
        self.apply(StreamEvent::Token(text.to_string()));
        self.sink.on_token(text);
    }

    fn on_final(&mut self, payload: &FinalPayload) {
        self.apply(StreamEvent::Final(payload.clone()));
        self.sink.on_final(payload);
    }

    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        self.apply(StreamEvent::Error {
            kind,
            detail: detail.to_string(),
        });
        self.sink.on_error(kind, detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::NullSink;
    use parley_transport::{ScriptedReply, ScriptedTransport};
    use std::time::Duration;

    fn client_with(replies: Vec<ScriptedReply>) -> (ChatClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let client = ChatClient::new(SessionId::from("sess-1"), transport.clone());
        (client, transport)
    }

    #[tokio::test]
    async fn test_submit_turn_settles() {
        let (client, _) = client_with(vec![ScriptedReply::body(
            200,
            "application/json",
            r#"{"response":"Hello"}"#,
        )]);
        let outcome = client.submit_turn("hi", None, &mut NullSink).await.unwrap();
        assert_eq!(outcome.phase, TurnPhase::Settled);
        let state = client.snapshot();
        assert_eq!(state.latest_assistant().unwrap().text, "Hello");
    }

    #[tokio::test]
    async fn test_submit_turn_forwards_session_and_audio() {
        let (client, transport) = client_with(vec![ScriptedReply::body(
            200,
            "application/json",
            r#"{"response":"ok"}"#,
        )]);
        client
            .submit_turn("", Some(Bytes::from_static(b"RIFF")), &mut NullSink)
            .await
            .unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].session_id.as_str(), "sess-1");
        assert_eq!(requests[0].audio.as_deref(), Some(&b"RIFF"[..]));
    }

    #[tokio::test]
    async fn test_empty_turn_rejected_before_transport() {
        let (client, transport) = client_with(vec![]);
        let mut events: Vec<StreamEvent> = Vec::new();
        let result = client.submit_turn("  ", None, &mut events).await;
        assert_eq!(result.unwrap_err(), TurnRejected::EmptyInput);
        assert!(events.is_empty());
        assert!(transport.requests().is_empty());
        assert!(client.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_failed_turn() {
        let (client, _) = client_with(vec![ScriptedReply::Fail("refused".to_string())]);
        let mut events: Vec<StreamEvent> = Vec::new();
        let outcome = client.submit_turn("hi", None, &mut events).await.unwrap();
        assert_eq!(outcome.phase, TurnPhase::Failed);
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                kind: ErrorKind::TransportFailure,
                detail: "refused".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_dropped_turn_fails_with_apology() {
        let transport = Arc::new(
            ScriptedTransport::new(vec![ScriptedReply::body(
                200,
                "application/json",
                r#"{"response":"late"}"#,
            )])
            .with_latency(Duration::from_millis(200)),
        );
        let client = ChatClient::new(SessionId::from("sess-1"), transport);

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            client.submit_turn("hi", None, &mut NullSink),
        )
        .await;
        assert!(result.is_err());

        let state = client.snapshot();
        assert_eq!(state.phase, TurnPhase::Failed);
        assert!(state.active_turn.is_none());
        let reply = state.latest_assistant().unwrap();
        assert!(reply.text.starts_with(parley_core::APOLOGY_TEXT));
        assert!(reply.text.contains("turn cancelled"));
        assert!(!reply.streaming);
    }
}
