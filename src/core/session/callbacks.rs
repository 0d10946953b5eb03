//! Host-facing result dispatch.

use async_trait::async_trait;

use crate::core::speech::{SpeechError, SpeechResultKind};

use super::events::VoiceEvent;

/// Sink for everything the session manager reports to the host.
///
/// Wake events arrive with id `-1` (no session exists yet); session-scoped
/// callbacks carry the id returned when the voice session opened.
#[async_trait]
pub trait VoiceCallback: Send + Sync {
    /// Session lifecycle and arbitration events.
    async fn voice_event(&self, id: i32, event: VoiceEvent, sound_location: f64);

    /// Interim recognition text.
    async fn intermediate_result(&self, id: i32, kind: SpeechResultKind, asr: &str);

    /// Final recognition: transcript, NLP document and resolved action.
    async fn voice_command(&self, id: i32, asr: &str, nlp: &str, action: &str);

    /// A session failed; `error` names the kind.
    async fn speech_error(&self, id: i32, error: SpeechError);
}
