//! Voice session core for an on-device assistant.
//!
//! The crate bridges a local wake-word/VAD front-end with a remote cloud
//! speech service. The [`core::speech`] subsystem is a full-duplex
//! streaming client with strict one-operation-at-a-time serialization; the
//! [`core::session`] subsystem turns front-end events into speech sessions
//! and dispatches recognition results to the host.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxcore::{SpeechClient, TcpTransport, TransportConfig, VoiceConfig, VoiceSessionManager};
//! # use voxcore::{SirenBackend, VoiceCallback};
//! # async fn run(siren: Arc<dyn SirenBackend>, callback: Arc<dyn VoiceCallback>) {
//! let transport = Arc::new(TcpTransport::new());
//! let speech = Arc::new(SpeechClient::new(
//!     transport,
//!     TransportConfig {
//!         endpoint: "speech.example.com:443".into(),
//!         ..Default::default()
//!     },
//! ));
//! let config = Arc::new(VoiceConfig::new("/var/lib/voice"));
//! let manager = VoiceSessionManager::new(speech, siren, callback, config);
//! manager.init();
//! manager.start_siren(true);
//! manager.network_state_change(true).await;
//! # }
//! ```

pub mod config;
pub mod core;

pub use crate::config::{ConfigError, DeviceInfo, VoiceConfig};
pub use crate::core::session::{
    SirenBackend, SirenCommand, SirenEvent, SirenEventKind, SirenState, SpeechState, VoiceCallback,
    VoiceEvent, VoiceSessionManager, VoiceTrigger,
};
pub use crate::core::speech::{
    ReqType, SpeechClient, SpeechConfig, SpeechError, SpeechRequest, SpeechResponse, SpeechResult,
    SpeechResultKind, TcpTransport, Transport, TransportConfig, VoiceOptions,
};
