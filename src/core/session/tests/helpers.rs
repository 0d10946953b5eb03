//! Stub implementations and the shared test harness.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use crate::config::VoiceConfig;
use crate::core::speech::test_support::ScriptedTransport;
use crate::core::speech::{
    SpeechClient, SpeechError, SpeechResponse, SpeechResultKind, TransportConfig,
};

use super::super::callbacks::VoiceCallback;
use super::super::events::{SirenEvent, VoiceEvent};
use super::super::manager::VoiceSessionManager;
use super::super::siren::{SirenBackend, SirenCommand};

/// Siren stub: records stream/state commands and lets tests inject events
/// through the sink installed by `setup`.
pub struct StubSiren {
    events: parking_lot::Mutex<Option<mpsc::UnboundedSender<SirenEvent>>>,
    commands: parking_lot::Mutex<Vec<SirenCommand>>,
    streaming: AtomicBool,
    setup_ok: AtomicBool,
}

impl StubSiren {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: parking_lot::Mutex::new(None),
            commands: parking_lot::Mutex::new(Vec::new()),
            streaming: AtomicBool::new(false),
            setup_ok: AtomicBool::new(true),
        })
    }

    pub fn emit(&self, event: SirenEvent) {
        let guard = self.events.lock();
        let sender = guard.as_ref().expect("siren not set up");
        sender.send(event).expect("event loop gone");
    }

    pub fn commands(&self) -> Vec<SirenCommand> {
        self.commands.lock().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn refuse_setup(&self) {
        self.setup_ok.store(false, Ordering::Release);
    }
}

impl SirenBackend for StubSiren {
    fn setup(&self, events: mpsc::UnboundedSender<SirenEvent>) -> bool {
        if !self.setup_ok.load(Ordering::Acquire) {
            return false;
        }
        *self.events.lock() = Some(events);
        true
    }

    fn start_stream(&self) {
        self.streaming.store(true, Ordering::Release);
    }

    fn stop_stream(&self) {
        self.streaming.store(false, Ordering::Release);
    }

    fn set_state(&self, command: SirenCommand) {
        self.commands.lock().push(command);
    }
}

/// One observed host callback.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackRecord {
    Event(i32, VoiceEvent, f64),
    Intermediate(i32, String),
    Command {
        id: i32,
        asr: String,
        nlp: String,
        action: String,
    },
    Error(i32, SpeechError),
}

/// Callback sink that records every dispatch.
pub struct RecordingCallback {
    records: parking_lot::Mutex<Vec<CallbackRecord>>,
    notify: Notify,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: parking_lot::Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    pub fn records(&self) -> Vec<CallbackRecord> {
        self.records.lock().clone()
    }

    /// Waits until the recorded sequence satisfies `pred`, then returns it.
    pub async fn wait_until<F>(&self, pred: F) -> Vec<CallbackRecord>
    where
        F: Fn(&[CallbackRecord]) -> bool,
    {
        let fut = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let records = self.records.lock();
                    if pred(&records) {
                        return records.clone();
                    }
                }
                notified.await;
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), fut)
            .await
            .expect("expected callbacks never arrived")
    }

    fn push(&self, record: CallbackRecord) {
        self.records.lock().push(record);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl VoiceCallback for RecordingCallback {
    async fn voice_event(&self, id: i32, event: VoiceEvent, sound_location: f64) {
        self.push(CallbackRecord::Event(id, event, sound_location));
    }

    async fn intermediate_result(&self, id: i32, _kind: SpeechResultKind, asr: &str) {
        self.push(CallbackRecord::Intermediate(id, asr.to_string()));
    }

    async fn voice_command(&self, id: i32, asr: &str, nlp: &str, action: &str) {
        self.push(CallbackRecord::Command {
            id,
            asr: asr.to_string(),
            nlp: nlp.to_string(),
            action: action.to_string(),
        });
    }

    async fn speech_error(&self, id: i32, error: SpeechError) {
        self.push(CallbackRecord::Error(id, error));
    }
}

pub struct TestHarness {
    pub transport: Arc<ScriptedTransport>,
    pub siren: Arc<StubSiren>,
    pub callback: Arc<RecordingCallback>,
    pub config: Arc<VoiceConfig>,
    pub manager: VoiceSessionManager,
    _dir: tempfile::TempDir,
}

/// Builds a manager with stub collaborators; credentials are present but
/// nothing is connected yet.
pub fn harness() -> TestHarness {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Arc::new(VoiceConfig::new(dir.path()));
    assert!(config.save_config("device-1", "type-1", "key-1", "secret-1"));

    let transport = ScriptedTransport::new();
    let speech = Arc::new(SpeechClient::new(
        transport.clone(),
        TransportConfig::default(),
    ));
    let siren = StubSiren::new();
    let callback = RecordingCallback::new();
    let manager =
        VoiceSessionManager::new(speech, siren.clone(), callback.clone(), config.clone());

    TestHarness {
        transport,
        siren,
        callback,
        config,
        manager,
        _dir: dir,
    }
}

/// Harness with the manager initialized and the network up.
pub async fn connected_harness() -> TestHarness {
    let h = harness();
    assert!(h.manager.init());
    h.manager.network_state_change(true).await;
    h
}

pub fn interim(id: i32, asr: &str, extra: &str) -> SpeechResponse {
    SpeechResponse {
        id,
        asr: asr.to_string(),
        extra: extra.to_string(),
        ..Default::default()
    }
}

pub fn final_resp(id: i32, asr: &str, nlp: &str, action: &str, extra: &str) -> SpeechResponse {
    SpeechResponse {
        id,
        finish: true,
        asr: asr.to_string(),
        nlp: nlp.to_string(),
        action: action.to_string(),
        extra: extra.to_string(),
        ..Default::default()
    }
}
