//! Seam to the wake-word/VAD engine.

use tokio::sync::mpsc;

use super::events::SirenEvent;

/// Lifecycle of the siren front-end as tracked by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SirenState {
    Unknown,
    Inited,
    Started,
    Stopped,
}

/// Runtime commands pushed down to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SirenCommand {
    /// Stop listening for an utterance and fall back to wake-word spotting.
    Sleep,
    Awake,
}

/// The wake-word/VAD engine. The engine owns its capture thread; events are
/// pushed through the sender installed by `setup` and must already be
/// detached from any capture-side buffers.
pub trait SirenBackend: Send + Sync {
    /// Installs the event sink. Returns false when the engine cannot start.
    fn setup(&self, events: mpsc::UnboundedSender<SirenEvent>) -> bool;

    /// Begins streaming audio through the engine.
    fn start_stream(&self);

    /// Stops streaming audio.
    fn stop_stream(&self);

    /// Pushes a state command down to the engine.
    fn set_state(&self, command: SirenCommand);
}
