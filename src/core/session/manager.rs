//! Session manager: bridges the siren front-end and the speech client.
//!
//! Two long-running tasks do the work. The event task drains the siren
//! event queue and drives the speech client (open, feed, close or cancel
//! the voice session); the response task loops on
//! [`SpeechClient::poll`] and dispatches results to the host callback
//! sink, arbitrating away wakes the server judged spurious.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::VoiceConfig;
use crate::core::speech::{SpeechClient, SpeechResult, SpeechResultKind, VoiceOptions};

use super::callbacks::VoiceCallback;
use super::events::{SirenEvent, SirenEventKind, VoiceEvent, VoiceTrigger, is_arbitrated_away};
use super::siren::{SirenBackend, SirenCommand, SirenState};
use super::state::{SessionState, SpeechState};

struct SessionShared {
    speech: Arc<SpeechClient>,
    siren: Arc<dyn SirenBackend>,
    callback: Arc<dyn VoiceCallback>,
    config: Arc<VoiceConfig>,
    session: parking_lot::Mutex<SessionState>,
}

/// Siren lifecycle plus the host's open/closed latch. The latch survives
/// disconnects so a reconnect restarts the stream without host involvement.
struct SirenControl {
    state: SirenState,
    open: bool,
}

/// Orchestrates the lifecycle of spoken utterances.
///
/// Host surface: `init`, `start_siren`, `set_siren_state`,
/// `network_state_change`, `update_stack`, `update_config`. Results flow
/// back through the [`VoiceCallback`] sink.
pub struct VoiceSessionManager {
    shared: Arc<SessionShared>,
    events_tx: mpsc::UnboundedSender<SirenEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<SirenEvent>>>,
    siren_ctl: parking_lot::Mutex<SirenControl>,
    speech_state: tokio::sync::Mutex<SpeechState>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl VoiceSessionManager {
    pub fn new(
        speech: Arc<SpeechClient>,
        siren: Arc<dyn SirenBackend>,
        callback: Arc<dyn VoiceCallback>,
        config: Arc<VoiceConfig>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(SessionShared {
                speech,
                siren,
                callback,
                config,
                session: parking_lot::Mutex::new(SessionState::new()),
            }),
            events_tx,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
            siren_ctl: parking_lot::Mutex::new(SirenControl {
                state: SirenState::Unknown,
                open: false,
            }),
            speech_state: tokio::sync::Mutex::new(SpeechState::Unknown),
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Installs the siren event sink and starts the event task. Idempotent.
    pub fn init(&self) -> bool {
        let mut ctl = self.siren_ctl.lock();
        if ctl.state != SirenState::Unknown {
            return true;
        }
        if !self.shared.siren.setup(self.events_tx.clone()) {
            error!("siren setup failed");
            return false;
        }
        ctl.state = SirenState::Inited;
        if let Some(events) = self.events_rx.lock().take() {
            let shared = self.shared.clone();
            self.spawn_task(tokio::spawn(run_event_loop(shared, events)));
        }
        info!("session manager initialized");
        true
    }

    /// Opens or closes the audio stream through the siren engine.
    pub fn start_siren(&self, open: bool) {
        let mut ctl = self.siren_ctl.lock();
        debug!(open, state = ?ctl.state, latched = ctl.open, "start_siren");
        if open && matches!(ctl.state, SirenState::Inited | SirenState::Stopped) {
            ctl.open = true;
            self.shared.siren.start_stream();
            ctl.state = SirenState::Started;
        } else if !open && ctl.state == SirenState::Started {
            self.shared.siren.stop_stream();
            ctl.state = SirenState::Stopped;
        }
        if !open && ctl.state != SirenState::Unknown {
            ctl.open = false;
        }
    }

    /// Forwards a runtime command to the siren engine.
    pub fn set_siren_state(&self, command: SirenCommand) {
        debug!(?command, "siren state command");
        self.shared.siren.set_state(command);
    }

    /// Connectivity edge: on connect, configures and prepares the speech
    /// client and starts the response task; on disconnect, stops the siren
    /// stream and releases the client.
    pub async fn network_state_change(&self, connected: bool) {
        let mut speech_state = self.speech_state.lock().await;
        info!(connected, "network state change");
        if connected && *speech_state != SpeechState::Prepared {
            let speech = self.shared.speech.clone();
            let applied = self
                .shared
                .config
                .apply(|key, value| speech.config(key, value));
            if applied && self.shared.speech.prepare().await {
                *speech_state = SpeechState::Prepared;
                let shared = self.shared.clone();
                self.spawn_task(tokio::spawn(run_response_loop(shared)));

                let mut ctl = self.siren_ctl.lock();
                if ctl.open && matches!(ctl.state, SirenState::Inited | SirenState::Stopped) {
                    self.shared.siren.start_stream();
                    ctl.state = SirenState::Started;
                }
            } else {
                warn!("speech prepare skipped, configuration incomplete or transport failed");
            }
        } else if !connected && *speech_state == SpeechState::Prepared {
            {
                let mut ctl = self.siren_ctl.lock();
                if ctl.state == SirenState::Started {
                    self.shared.siren.stop_stream();
                    ctl.state = SirenState::Stopped;
                }
            }
            self.shared.speech.release().await;
            *speech_state = SpeechState::Released;
        }
    }

    /// Records the foreground application id carried on the next voice
    /// start.
    pub fn update_stack(&self, app_id: &str) {
        debug!(app_id, "stack updated");
        self.shared.session.lock().stack = app_id.to_string();
    }

    /// Persists device credentials. Failure is silent towards the host: the
    /// next connect simply fails to prepare.
    pub fn update_config(
        &self,
        device_id: &str,
        device_type_id: &str,
        key: &str,
        secret: &str,
    ) {
        if !self
            .shared
            .config
            .save_config(device_id, device_type_id, key, secret)
        {
            warn!("credential update not persisted");
        }
    }

    fn spawn_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

async fn run_event_loop(
    shared: Arc<SessionShared>,
    mut events: mpsc::UnboundedReceiver<SirenEvent>,
) {
    debug!("event loop started");
    while let Some(event) = events.recv().await {
        handle_event(&shared, event).await;
    }
    debug!("event loop quit");
}

async fn handle_event(shared: &Arc<SessionShared>, event: SirenEvent) {
    debug!(kind = ?event.kind, "siren event");
    match event.kind {
        SirenEventKind::WakePre => {
            shared
                .callback
                .voice_event(-1, VoiceEvent::Coming, event.sound_location)
                .await;
        }
        SirenEventKind::WakeCmd => {
            shared
                .callback
                .voice_event(-1, VoiceEvent::LocalWake, event.sound_location)
                .await;
        }
        SirenEventKind::VadStart => {
            let active = shared.session.lock().session_id > 0;
            if !active {
                let id = start_session_voice(shared).await;
                shared.session.lock().session_id = id;
                info!(id, "voice session started");
                shared.callback.voice_event(id, VoiceEvent::Start, 0.0).await;
            }
        }
        SirenEventKind::VadData => {
            let id = shared.session.lock().session_id;
            if id > 0 && event.has_voice() {
                shared.speech.put_voice(id, &event.payload).await;
            }
        }
        SirenEventKind::VadEnd => {
            // With cloud-side VAD the server segments the utterance itself.
            if !shared.config.cloud_vad_enabled() {
                let id = shared.session.lock().session_id;
                debug!(id, "local vad end");
                if id > 0 {
                    shared.speech.end_voice(id).await;
                }
                clear_session(shared);
            }
        }
        SirenEventKind::VadCancel => {
            let (id, asr_finished) = {
                let session = shared.session.lock();
                (session.session_id, session.asr_finished)
            };
            info!(id, asr_finished, "vad cancel");
            if id > 0 && !asr_finished {
                shared.speech.cancel(id).await;
            }
            shared.session.lock().asr_finished = false;
            if !shared.config.cloud_vad_enabled() {
                clear_session(shared);
            }
        }
        SirenEventKind::VoicePrint => {
            if event.has_vt() {
                let mut session = shared.session.lock();
                session.vt = Some(VoiceTrigger {
                    start: event.vt_start,
                    end: event.vt_end,
                    energy: event.vt_energy,
                    data: event.payload.clone(),
                });
            }
        }
        SirenEventKind::Sleep => {
            if !shared.config.cloud_vad_enabled() {
                let id = shared.session.lock().session_id;
                shared.callback.voice_event(id, VoiceEvent::Sleep, 0.0).await;
            }
        }
    }
}

/// Opens a voice session on the speech client, splicing any pending
/// voice-trigger window and the current stack into the start options.
async fn start_session_voice(shared: &Arc<SessionShared>) -> i32 {
    if !shared.speech.is_prepared() {
        return -1;
    }
    let mut options = VoiceOptions::new();
    {
        let mut session = shared.session.lock();
        if let Some(vt) = session.vt.take() {
            options.set("voice_trigger", hex_string(&vt.data));
            options.set("trigger_start", vt.start.to_string());
            options.set(
                "trigger_length",
                vt.end.saturating_sub(vt.start).to_string(),
            );
            options.set("voice_power", format!("{:.6}", vt.energy));
        }
        options.set("stack", session.stack.clone());
    }
    debug!(options = %options.to_json(), "voice start options");
    shared.speech.start_voice(Some(options), None).await
}

async fn run_response_loop(shared: Arc<SessionShared>) {
    debug!("response loop started");
    while let Some(result) = shared.speech.poll().await {
        handle_result(&shared, result).await;
    }
    clear_session(&shared);
    debug!("response loop quit");
}

async fn handle_result(shared: &Arc<SessionShared>, result: SpeechResult) {
    debug!(
        id = result.id,
        kind = ?result.kind,
        error = ?result.error,
        "speech result"
    );

    if result.kind == SpeechResultKind::Start {
        let mut session = shared.session.lock();
        session.asr_finished = false;
        session.activation.clear();
    } else if matches!(
        result.kind,
        SpeechResultKind::Intermediate | SpeechResultKind::End
    ) && !result.extra.is_empty()
        && let Some(activation) = activation_from_extra(&result.extra)
    {
        debug!(activation = %activation, "server activation verdict");
        shared.session.lock().activation = activation.clone();
        shared
            .callback
            .voice_event(result.id, VoiceEvent::from_activation(&activation), 0.0)
            .await;
        if is_arbitrated_away(&activation) {
            shared.siren.set_state(SirenCommand::Sleep);
        }
    }

    let arbitrated = is_arbitrated_away(&shared.session.lock().activation);
    if !arbitrated {
        match result.kind {
            SpeechResultKind::Intermediate => {
                shared
                    .callback
                    .intermediate_result(result.id, result.kind, &result.asr)
                    .await;
            }
            SpeechResultKind::End => {
                shared
                    .callback
                    .voice_command(result.id, &result.asr, &result.nlp, &result.action)
                    .await;
            }
            SpeechResultKind::Cancelled => {
                shared
                    .callback
                    .voice_event(result.id, VoiceEvent::Cancel, 0.0)
                    .await;
            }
            SpeechResultKind::Error => {
                if let Some(error) = result.error {
                    let session_id = shared.session.lock().session_id;
                    if session_id == result.id && shared.config.cloud_vad_enabled() {
                        shared.siren.set_state(SirenCommand::Sleep);
                    }
                    shared.callback.speech_error(result.id, error).await;
                    let mut session = shared.session.lock();
                    session.asr_finished = false;
                    session.activation.clear();
                }
            }
            SpeechResultKind::Start => {}
        }
    }

    if result.kind.is_terminal() {
        clear_session_for(shared, result.id);
    }
}

fn activation_from_extra(extra: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(extra).ok()?;
    value.get("activation")?.as_str().map(str::to_string)
}

fn clear_session(shared: &SessionShared) {
    let mut session = shared.session.lock();
    session.session_id = 0;
    session.vt = None;
}

fn clear_session_for(shared: &SessionShared, id: i32) {
    let mut session = shared.session.lock();
    if session.session_id == id {
        session.session_id = 0;
        session.vt = None;
    }
}

fn hex_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
