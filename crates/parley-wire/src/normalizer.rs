use bytes::Bytes;
use futures_util::StreamExt;
use parley_core::{AudioRef, EventSink, FinalPayload, ResponseError, StreamEvent};
use serde::Deserialize;
use serde_json::Value;

use crate::content_kind::ContentKind;
use crate::lines::LineBuffer;
use crate::multipart;
use crate::response::{RawResponse, ResponseBody};

/// Field marker prefixing payload lines in an event stream.
const DATA_FIELD: &str = "data:";

/// Terminal fields shared by all three wire shapes.
#[derive(Debug, Default, Deserialize)]
struct TerminalFields {
    #[serde(default)]
    suggested_questions: Option<Vec<String>>,
    #[serde(default)]
    mailto: Option<String>,
}

impl TerminalFields {
    fn into_payload(self, audio: Option<AudioRef>) -> FinalPayload {
        FinalPayload {
            suggested_questions: self.suggested_questions,
            mail_action: self.mailto.filter(|m| !m.trim().is_empty()),
            audio,
        }
    }
}

/// Whole-reply document of the single-JSON and multipart shapes.
#[derive(Debug, Deserialize)]
struct ReplyDocument {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    ai_response: Option<String>,
    #[serde(flatten)]
    terminal: TerminalFields,
}

// ── Emitter ───────────────────────────────────────────────────

/// Wraps the caller's sink and enforces the per-turn event contract:
/// tokens only before the terminal event, exactly one terminal event.
struct Emitter<'a> {
    sink: &'a mut dyn EventSink,
    tokens: usize,
    terminated: bool,
}

impl<'a> Emitter<'a> {
    fn new(sink: &'a mut dyn EventSink) -> Self {
        Self {
            sink,
            tokens: 0,
            terminated: false,
        }
    }

    fn emit(&mut self, event: StreamEvent) {
        if self.terminated {
            tracing::debug!("ignoring event after terminal payload");
            return;
        }
        if event.is_terminal() {
            self.terminated = true;
        } else {
            self.tokens += 1;
        }
        self.sink.deliver(&event);
    }

    /// Guarantee a terminal event once the body is exhausted.
    fn close(mut self) {
        if self.terminated {
            return;
        }
        if self.tokens > 0 {
            tracing::warn!(
                tokens = self.tokens,
                "stream ended without a final payload, settling with empty metadata"
            );
            self.emit(StreamEvent::Final(FinalPayload::default()));
        } else {
            self.emit(
                ResponseError::Transport("stream closed before a final payload".to_string())
                    .into_event(),
            );
        }
    }
}

// ── Entry point ───────────────────────────────────────────────

/// Turn one raw backend response into `Token* (Final | Error)` on `sink`.
///
/// Events are delivered in the order they are produced and never after the
/// terminal one. Transport and parse failures become a single `Error`.
pub async fn normalize(response: RawResponse, sink: &mut dyn EventSink) {
    let mut emitter = Emitter::new(sink);
    if let Err(err) = dispatch(response, &mut emitter).await {
        tracing::warn!(kind = %err.kind(), "response failed: {}", err.detail());
        emitter.emit(err.into_event());
    }
    emitter.close();
}

async fn dispatch(response: RawResponse, emitter: &mut Emitter<'_>) -> Result<(), ResponseError> {
    if !response.is_success() {
        return Err(ResponseError::Transport(http_error_detail(response).await));
    }

    let kind = ContentKind::parse(response.content_type.as_deref())?;
    let body = response
        .body
        .ok_or_else(|| ResponseError::Transport("response has no body".to_string()))?;
    tracing::debug!(content_kind = kind.name(), "decoding response");

    match kind {
        ContentKind::EventStream => decode_event_stream(body, emitter).await,
        ContentKind::SingleJson => decode_single_json(body, emitter).await,
        ContentKind::Multipart { boundary } => decode_multipart(body, &boundary, emitter).await,
    }
}

async fn http_error_detail(response: RawResponse) -> String {
    let text = match response.body {
        Some(body) => body
            .collect()
            .await
            .map(|b| String::from_utf8_lossy(&b).trim().to_string())
            .unwrap_or_default(),
        None => String::new(),
    };
    let message = if text.is_empty() {
        "An error occurred"
    } else {
        text.as_str()
    };
    format!("HTTP error! status: {}, message: {}", response.status, message)
}

// ── Event stream ──────────────────────────────────────────────

async fn decode_event_stream(
    body: ResponseBody,
    emitter: &mut Emitter<'_>,
) -> Result<(), ResponseError> {
    let mut chunks = body.into_stream();
    let mut lines = LineBuffer::new();

    while let Some(chunk) = chunks.next().await {
        lines.push(&chunk?);
        for line in lines.drain_lines() {
            handle_event_line(&line, emitter);
        }
    }
    if let Some(tail) = lines.finish() {
        handle_event_line(&tail, emitter);
    }
    Ok(())
}

fn handle_event_line(line: &str, emitter: &mut Emitter<'_>) {
    let Some(data) = line.strip_prefix(DATA_FIELD) else {
        return;
    };
    let data = data.trim();
    if data.is_empty() {
        return;
    }
    match parse_event_data(data) {
        Ok(event) => emitter.emit(event),
        Err(reason) => {
            tracing::warn!(data = %data, "dropping unparsable event-stream line: {}", reason);
        }
    }
}

/// `{"token": ..}` is an incremental fragment; any other object is the
/// terminal payload.
fn parse_event_data(data: &str) -> Result<StreamEvent, String> {
    let value: Value = serde_json::from_str(data).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("payload is not a JSON object".to_string());
    }
    match value.get("token") {
        Some(Value::String(token)) => Ok(StreamEvent::Token(token.clone())),
        Some(other) => Err(format!("token field is not a string: {}", other)),
        None => {
            let fields: TerminalFields =
                serde_json::from_value(value).map_err(|e| e.to_string())?;
            Ok(StreamEvent::Final(fields.into_payload(None)))
        }
    }
}

// ── Single JSON ───────────────────────────────────────────────

async fn decode_single_json(
    body: ResponseBody,
    emitter: &mut Emitter<'_>,
) -> Result<(), ResponseError> {
    let bytes = body.collect().await?;
    let document = parse_document(&bytes)?;
    let text = document
        .response
        .or(document.ai_response)
        .ok_or_else(|| ResponseError::Malformed("reply has no response text".to_string()))?;

    emitter.emit(StreamEvent::Token(text));
    emitter.emit(StreamEvent::Final(document.terminal.into_payload(None)));
    Ok(())
}

fn parse_document(bytes: &Bytes) -> Result<ReplyDocument, ResponseError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ResponseError::Malformed(format!("invalid JSON body: {}", e)))
}

// ── Multipart ─────────────────────────────────────────────────

async fn decode_multipart(
    body: ResponseBody,
    boundary: &str,
    emitter: &mut Emitter<'_>,
) -> Result<(), ResponseError> {
    let bytes = body.collect().await?;
    let parts = multipart::extract(&bytes, boundary)?;
    let document: ReplyDocument = serde_json::from_value(parts.metadata)
        .map_err(|e| ResponseError::Malformed(format!("invalid metadata part: {}", e)))?;
    let text = document
        .ai_response
        .or(document.response)
        .ok_or_else(|| ResponseError::Malformed("metadata has no ai_response text".to_string()))?;
    let audio = parts.audio.map(|part| {
        tracing::debug!(bytes = part.data.len(), content_type = %part.content_type, "reply carries audio");
        AudioRef::new(part.content_type, part.data)
    });

    emitter.emit(StreamEvent::Token(text));
    emitter.emit(StreamEvent::Final(document.terminal.into_payload(audio)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use parley_core::ErrorKind;

    async fn run(response: RawResponse) -> Vec<StreamEvent> {
        let mut events: Vec<StreamEvent> = Vec::new();
        normalize(response, &mut events).await;
        events
    }

    fn token(text: &str) -> StreamEvent {
        StreamEvent::Token(text.to_string())
    }

    fn tokens_of(events: &[StreamEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    fn error_kind(event: &StreamEvent) -> ErrorKind {
        match event {
            StreamEvent::Error { kind, .. } => *kind,
            other => panic!("expected Error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_json_token_then_final() {
        let events = run(RawResponse::buffered(
            200,
            "application/json",
            r#"{"response":"Hello","suggested_questions":["A?"]}"#,
        ))
        .await;
        assert_eq!(
            events,
            vec![
                token("Hello"),
                StreamEvent::Final(FinalPayload {
                    suggested_questions: Some(vec!["A?".to_string()]),
                    ..Default::default()
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_single_json_accepts_ai_response_shape() {
        let events = run(RawResponse::buffered(
            200,
            "application/json; charset=utf-8",
            r#"{"ai_response":"Hi","suggested_questions":[],"mailto":"team@example.com"}"#,
        ))
        .await;
        assert_eq!(events[0], token("Hi"));
        match &events[1] {
            StreamEvent::Final(payload) => {
                assert_eq!(payload.suggested_questions, Some(vec![]));
                assert_eq!(payload.mail_action.as_deref(), Some("team@example.com"));
            }
            other => panic!("expected Final, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_json_unparsable_is_malformed() {
        let events = run(RawResponse::buffered(200, "application/json", "{oops")).await;
        assert_eq!(events.len(), 1);
        assert_eq!(error_kind(&events[0]), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_single_json_missing_text_is_malformed() {
        let events = run(RawResponse::buffered(
            200,
            "application/json",
            r#"{"suggested_questions":["a"]}"#,
        ))
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(error_kind(&events[0]), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_event_stream_split_mid_json() {
        let events = run(RawResponse::chunked(
            200,
            "text/event-stream",
            vec![
                "data: {\"to",
                "ken\":\"x\"}\ndata: {\"suggested_questions\":[]}\n",
            ],
        ))
        .await;
        assert_eq!(
            events,
            vec![
                token("x"),
                StreamEvent::Final(FinalPayload {
                    suggested_questions: Some(vec![]),
                    ..Default::default()
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_event_stream_chunking_invariance() {
        let body = "data: {\"token\":\"a\"}\ndata: {\"token\":\"b\"}\n";
        let whole = run(RawResponse::chunked(200, "text/event-stream", vec![body])).await;
        assert_eq!(tokens_of(&whole), vec!["a", "b"]);

        for split in 1..body.len() {
            let (head, tail) = body.split_at(split);
            let events = run(RawResponse::chunked(
                200,
                "text/event-stream",
                vec![head.to_string(), tail.to_string()],
            ))
            .await;
            assert_eq!(events, whole, "split at byte {}", split);
        }

        let bytewise: Vec<Bytes> = body
            .as_bytes()
            .iter()
            .map(|b| Bytes::copy_from_slice(&[*b]))
            .collect();
        let events = run(RawResponse::chunked(200, "text/event-stream", bytewise)).await;
        assert_eq!(events, whole);
    }

    #[tokio::test]
    async fn test_event_stream_without_final_settles_when_tokens_seen() {
        let events = run(RawResponse::chunked(
            200,
            "text/event-stream",
            vec!["data: {\"token\":\"a\"}\n"],
        ))
        .await;
        assert_eq!(
            events,
            vec![token("a"), StreamEvent::Final(FinalPayload::default())]
        );
    }

    #[tokio::test]
    async fn test_event_stream_empty_body_is_transport_failure() {
        let events = run(RawResponse::chunked(
            200,
            "text/event-stream",
            Vec::<Bytes>::new(),
        ))
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(error_kind(&events[0]), ErrorKind::TransportFailure);
    }

    #[tokio::test]
    async fn test_event_stream_bad_line_is_skipped() {
        let events = run(RawResponse::chunked(
            200,
            "text/event-stream",
            vec!["data: {broken\ndata: {\"token\":\"ok\"}\n: comment\n\ndata: \ndata: {\"mailto\":\"a@b.c\"}\n"],
        ))
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], token("ok"));
        match &events[1] {
            StreamEvent::Final(payload) => {
                assert_eq!(payload.mail_action.as_deref(), Some("a@b.c"));
                assert!(payload.suggested_questions.is_none());
            }
            other => panic!("expected Final, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_stream_unterminated_tail_is_processed() {
        let events = run(RawResponse::chunked(
            200,
            "text/event-stream",
            vec!["data: {\"token\":\"a\"}\ndata: {\"suggested_questions\":[\"q\"]}"],
        ))
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Final(_)));
    }

    #[tokio::test]
    async fn test_event_stream_ignores_events_after_final() {
        let events = run(RawResponse::chunked(
            200,
            "text/event-stream",
            vec!["data: {}\ndata: {\"token\":\"late\"}\ndata: {}\n"],
        ))
        .await;
        assert_eq!(events, vec![StreamEvent::Final(FinalPayload::default())]);
    }

    #[tokio::test]
    async fn test_event_stream_crlf_lines() {
        let events = run(RawResponse::chunked(
            200,
            "text/event-stream",
            vec!["data: {\"token\":\"a\"}\r\n\r\ndata: {}\r\n\r\n"],
        ))
        .await;
        assert_eq!(
            events,
            vec![token("a"), StreamEvent::Final(FinalPayload::default())]
        );
    }

    #[tokio::test]
    async fn test_event_stream_connection_reset_after_tokens() {
        let body = ResponseBody::chunked(stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"token\":\"a\"}\n")),
            Err(ResponseError::Transport("connection reset".to_string())),
        ]));
        let events = run(RawResponse::new(200, Some("text/event-stream"), Some(body))).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], token("a"));
        assert_eq!(error_kind(&events[1]), ErrorKind::TransportFailure);
    }

    #[tokio::test]
    async fn test_non_success_status_is_single_transport_error() {
        let events = run(RawResponse::buffered(503, "text/plain", "upstream down")).await;
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                kind: ErrorKind::TransportFailure,
                detail: "HTTP error! status: 503, message: upstream down".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_non_success_without_body_uses_generic_message() {
        let events = run(RawResponse::new(500, None, None)).await;
        match &events[0] {
            StreamEvent::Error { detail, .. } => {
                assert_eq!(detail, "HTTP error! status: 500, message: An error occurred");
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_body_is_transport_failure() {
        let events = run(RawResponse::new(200, Some("application/json"), None)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(error_kind(&events[0]), ErrorKind::TransportFailure);
    }

    #[tokio::test]
    async fn test_multipart_token_final_with_audio() {
        let body = b"--xyz\r\nContent-Type: application/json\r\n\r\n\
{\"ai_response\":\"spoken\",\"suggested_questions\":[\"More?\"]}\r\n\
--xyz\r\nContent-Type: audio/mpeg\r\n\r\nID3\x00\x01\r\n--xyz--\r\n";
        let events = run(RawResponse::buffered(
            200,
            "multipart/mixed; boundary=xyz",
            Bytes::from_static(body),
        ))
        .await;
        assert_eq!(events[0], token("spoken"));
        match &events[1] {
            StreamEvent::Final(payload) => {
                assert_eq!(payload.suggested_questions, Some(vec!["More?".to_string()]));
                let audio = payload.audio.as_ref().unwrap();
                assert_eq!(audio.mime_type, "audio/mpeg");
                assert_eq!(audio.data.as_ref(), b"ID3\x00\x01");
            }
            other => panic!("expected Final, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multipart_missing_boundary_is_malformed() {
        let events = run(RawResponse::buffered(200, "multipart/mixed", "--x--")).await;
        assert_eq!(events.len(), 1);
        assert_eq!(error_kind(&events[0]), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_multipart_without_metadata_is_parse_error() {
        let body = b"--b\r\nContent-Type: audio/mpeg\r\n\r\nXX\r\n--b--";
        let events = run(RawResponse::buffered(
            200,
            "multipart/mixed; boundary=b",
            Bytes::from_static(body),
        ))
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(error_kind(&events[0]), ErrorKind::MultipartParseError);
    }
}
