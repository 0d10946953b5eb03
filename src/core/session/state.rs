//! Session-scoped state shared between the manager's tasks.

use super::events::VoiceTrigger;

/// Speech-side lifecycle, driven by network connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    Unknown,
    Prepared,
    Released,
}

/// State of the utterance in flight.
///
/// `session_id` is 0 when no session is active; a failed voice start leaves
/// its negative sentinel here so stray data events are dropped until the
/// next VAD start retries.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub session_id: i32,
    /// Voice-trigger window pending for the next voice start.
    pub vt: Option<VoiceTrigger>,
    /// Foreground application id, carried as the `stack` option.
    pub stack: String,
    /// Latest server activation verdict for the session in flight.
    pub activation: String,
    pub asr_finished: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            session_id: 0,
            vt: None,
            stack: String::new(),
            activation: String::new(),
            asr_finished: false,
        }
    }
}
