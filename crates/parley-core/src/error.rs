use std::fmt;
use thiserror::Error;

use crate::types::StreamEvent;

/// Classification carried by terminal `Error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransportFailure,
    MalformedResponse,
    MultipartParseError,
    DecodeError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportFailure => "TransportFailure",
            ErrorKind::MalformedResponse => "MalformedResponse",
            ErrorKind::MultipartParseError => "MultipartParseError",
            ErrorKind::DecodeError => "DecodeError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),
}

/// Failures while receiving or reshaping a chat response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("multipart parse error: {0}")]
    MultipartParse(String),
}

impl ResponseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResponseError::Transport(_) => ErrorKind::TransportFailure,
            ResponseError::Malformed(_) => ErrorKind::MalformedResponse,
            ResponseError::MultipartParse(_) => ErrorKind::MultipartParseError,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ResponseError::Transport(d)
            | ResponseError::Malformed(d)
            | ResponseError::MultipartParse(d) => d,
        }
    }

    pub fn into_event(self) -> StreamEvent {
        let kind = self.kind();
        let detail = match self {
            ResponseError::Transport(d)
            | ResponseError::Malformed(d)
            | ResponseError::MultipartParse(d) => d,
        };
        StreamEvent::Error { kind, detail }
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("failed to resample audio: {0}")]
    Resample(String),

    #[error("failed to encode audio: {0}")]
    Encode(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to enumerate devices: {0}")]
    DeviceEnumeration(String),

    #[error("failed to build stream: {0}")]
    StreamBuild(String),

    #[error("stream error: {0}")]
    StreamError(String),
}

impl AudioError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AudioError::Decode(_) => Some(ErrorKind::DecodeError),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to store reply audio: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a submission was refused. Rejected turns create no message and
/// fire no event.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TurnRejected {
    #[error("a previous turn has not settled yet")]
    Busy,

    #[error("turn has neither text nor audio")]
    EmptyInput,
}
