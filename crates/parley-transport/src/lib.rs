pub mod http;
pub mod scripted;
pub mod transport;

pub use http::HttpTransport;
pub use scripted::{ScriptedReply, ScriptedTransport};
pub use transport::{ChatTransport, TurnRequest};
