//! Events exchanged with the siren front-end and the host.

use bytes::Bytes;

/// Payload flag: the event carries voice samples.
pub const FLAG_VOICE: u32 = 1 << 0;
/// Payload flag: the event carries voice-trigger data.
pub const FLAG_VT: u32 = 1 << 1;

/// Event kinds produced by the wake-word/VAD front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SirenEventKind {
    /// Wake word onset detected, no session yet.
    WakePre,
    /// Wake word confirmed locally.
    WakeCmd,
    VadStart,
    VadData,
    VadEnd,
    VadCancel,
    /// Voice-trigger window captured at wake onset.
    VoicePrint,
    Sleep,
}

/// One front-end event. The payload is an owned buffer: events are copied
/// out of the capture thread before they are queued, so a view into the
/// capture buffer never escapes it.
#[derive(Debug, Clone)]
pub struct SirenEvent {
    pub kind: SirenEventKind,
    pub flags: u32,
    /// Sound location angle reported with wake events.
    pub sound_location: f64,
    /// Voice-trigger window, meaningful on `VoicePrint` with `FLAG_VT`.
    pub vt_start: u32,
    pub vt_end: u32,
    pub vt_energy: f32,
    pub payload: Bytes,
}

impl SirenEvent {
    pub fn new(kind: SirenEventKind) -> Self {
        Self {
            kind,
            flags: 0,
            sound_location: 0.0,
            vt_start: 0,
            vt_end: 0,
            vt_energy: 0.0,
            payload: Bytes::new(),
        }
    }

    pub fn voice_data(payload: Bytes) -> Self {
        Self {
            kind: SirenEventKind::VadData,
            flags: FLAG_VOICE,
            ..Self::new(SirenEventKind::VadData)
        }
        .with_payload(payload)
    }

    pub fn voice_print(start: u32, end: u32, energy: f32, data: Bytes) -> Self {
        Self {
            kind: SirenEventKind::VoicePrint,
            flags: FLAG_VT,
            vt_start: start,
            vt_end: end,
            vt_energy: energy,
            ..Self::new(SirenEventKind::VoicePrint)
        }
        .with_payload(data)
    }

    fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    pub fn has_voice(&self) -> bool {
        self.flags & FLAG_VOICE != 0
    }

    pub fn has_vt(&self) -> bool {
        self.flags & FLAG_VT != 0
    }
}

/// Voice-trigger descriptor captured on a wake event; spliced into the next
/// voice start and consumed by it.
#[derive(Debug, Clone)]
pub struct VoiceTrigger {
    pub start: u32,
    pub end: u32,
    pub energy: f32,
    pub data: Bytes,
}

/// Host-facing session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// Wake onset detected.
    Coming,
    /// Wake word confirmed by the local front-end.
    LocalWake,
    /// A voice session opened.
    Start,
    /// Server accepted the wake.
    Accept,
    /// Server rejected the wake.
    Reject,
    /// Server judged the wake spurious.
    Fake,
    Cancel,
    Sleep,
    /// Any other activation verdict, passed through verbatim.
    Activation(String),
}

impl VoiceEvent {
    /// Maps a server activation verdict onto an event. Only `fake` and
    /// `reject` arbitrate the utterance away; anything else passes through.
    pub fn from_activation(activation: &str) -> Self {
        match activation {
            "accept" => VoiceEvent::Accept,
            "reject" => VoiceEvent::Reject,
            "fake" => VoiceEvent::Fake,
            other => VoiceEvent::Activation(other.to_string()),
        }
    }
}

/// Whether an activation verdict suppresses user-visible dispatch.
pub(crate) fn is_arbitrated_away(activation: &str) -> bool {
    activation == "fake" || activation == "reject"
}
