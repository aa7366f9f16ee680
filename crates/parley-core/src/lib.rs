pub mod config;
pub mod conversation;
pub mod error;
pub mod sink;
pub mod types;

pub use config::ClientConfig;
pub use conversation::{ConversationState, TurnPhase};
pub use error::{
    AudioError, ConfigError, ErrorKind, PlaybackError, ResponseError, TurnRejected,
};
pub use sink::{EventSink, NullSink};
pub use types::{
    AudioCapture, AudioRef, FinalPayload, Message, MessageId, SessionId, Sender, StreamEvent,
    Turn, TurnId,
};

/// Sample rate of the outbound PCM container.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Apology shown in place of a reply when a turn fails.
pub const APOLOGY_TEXT: &str = "I apologize, but I'm encountering a technical issue at the moment. Please try again in a little while.";
