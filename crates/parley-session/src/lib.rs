pub mod client;
pub mod machine;
pub mod pacer;
pub mod playback;

pub use client::{ChatClient, TurnOutcome};
pub use machine::{apology_text, mail_link, TurnMachine};
pub use pacer::{run_pacer, Pacer};
pub use playback::{FilePlayback, PlaybackSurface};
