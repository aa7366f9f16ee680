use bytes::Bytes;
use std::fmt;
use uuid::Uuid;

use crate::error::ErrorKind;

// ── Identifiers ───────────────────────────────────────────────

/// Opaque session identifier, created once per client lifetime.
///
/// The core never looks inside it; it is only forwarded with every turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Turn ──────────────────────────────────────────────────────

/// One user submission. The audio, when present, is already in the
/// outbound PCM container.
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: TurnId,
    pub text: String,
    pub audio: Option<Bytes>,
}

impl Turn {
    pub fn new(text: impl Into<String>, audio: Option<Bytes>) -> Self {
        Self {
            id: TurnId::new(),
            text: text.into(),
            audio,
        }
    }

    /// True when there is nothing to send: blank text and no audio.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.audio.is_none()
    }
}

// ── Message ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

/// Playable handle to reply audio extracted from a response.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRef {
    pub id: Uuid,
    pub mime_type: String,
    pub data: Bytes,
}

impl AudioRef {
    pub fn new(mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// File extension matching the MIME type, `bin` when unknown.
    pub fn extension(&self) -> &'static str {
        let essence = self
            .mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
            "audio/ogg" => "ogg",
            "audio/webm" => "webm",
            "audio/flac" => "flac",
            _ => "bin",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub streaming: bool,
    pub reply_audio: Option<AudioRef>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::User,
            text: text.into(),
            streaming: false,
            reply_audio: None,
        }
    }

    pub fn assistant(text: impl Into<String>, streaming: bool) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::Assistant,
            text: text.into(),
            streaming,
            reply_audio: None,
        }
    }
}

// ── StreamEvent ───────────────────────────────────────────────

/// Terminal metadata closing a turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalPayload {
    pub suggested_questions: Option<Vec<String>>,
    pub mail_action: Option<String>,
    pub audio: Option<AudioRef>,
}

/// Uniform event produced by the response normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Final(FinalPayload),
    Error { kind: ErrorKind, detail: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Token(_))
    }
}

// ── AudioCapture ──────────────────────────────────────────────

/// Compressed recording as produced by the capture surface. Rate and
/// channel count are discovered while decoding.
#[derive(Debug, Clone)]
pub struct AudioCapture {
    data: Bytes,
}

impl AudioCapture {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
