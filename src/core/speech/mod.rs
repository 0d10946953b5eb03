//! Streaming client for the cloud speech service.
//!
//! The subsystem is layered leaves-first: wire [`protocol`] messages, the
//! framed [`transport`], the request/response queues, the single-slot
//! operation [`controller`], and the [`client`] that coordinates them all
//! behind `put_text` / `start_voice` / `put_voice` / `end_voice` / `cancel`
//! / `poll`.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod req_queue;
pub mod resp_queue;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::SpeechClient;
pub use config::SpeechConfig;
pub use error::SpeechError;
pub use protocol::{ReqType, SpeechRequest, SpeechResponse};
pub use transport::{RecvOutcome, SendOutcome, TcpTransport, Transport, TransportConfig};
pub use types::{SpeechResult, SpeechResultKind, VoiceOptions};
