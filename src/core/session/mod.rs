//! Session orchestration: consumes wake/VAD events from the siren
//! front-end, drives the speech client, and dispatches recognition results
//! to the host callback sink.

pub mod callbacks;
pub mod events;
pub mod manager;
pub mod siren;
mod state;

#[cfg(test)]
mod tests;

pub use callbacks::VoiceCallback;
pub use events::{FLAG_VOICE, FLAG_VT, SirenEvent, SirenEventKind, VoiceEvent, VoiceTrigger};
pub use manager::VoiceSessionManager;
pub use siren::{SirenBackend, SirenCommand, SirenState};
pub use state::SpeechState;
