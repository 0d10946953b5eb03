//! Framed full-duplex transport to the cloud speech service.
//!
//! The trait is the seam the client is tested through; the production
//! implementation is a lazily-connected TCP stream carrying 4-byte
//! length-prefixed protobuf frames.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Notify};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{SpeechRequest, SpeechResponse};

/// Settings handed to [`Transport::initialize`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// `host:port` of the speech service.
    pub endpoint: String,
    /// Maximum frame length accepted on either direction.
    pub buffer_size: usize,
    /// Service name, carried for diagnostics.
    pub service: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            buffer_size: 0x10000,
            service: "speech".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    /// No connection could be established.
    NotAvailable,
    Timeout,
    /// The connection dropped mid-send.
    Broken,
    Unknown,
}

#[derive(Debug)]
pub enum RecvOutcome {
    Message(SpeechResponse),
    Timeout,
    Broken,
    /// The transport was released; the receiver should exit.
    NotReady,
    Unknown,
}

/// Full-duplex framed transport.
///
/// `send` and `recv` are independently callable from different tasks;
/// `release` unblocks a pending `recv` with [`RecvOutcome::NotReady`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stores the transport settings and arms the channel. The network
    /// connection itself may be established lazily on first send.
    async fn initialize(&self, config: &TransportConfig);

    async fn send(&self, req: &SpeechRequest, timeout: Duration) -> SendOutcome;

    async fn recv(&self, timeout: Duration) -> RecvOutcome;

    async fn release(&self);
}

type FrameWriter = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;
type FrameReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;

/// Intermediate read outcome; the reader slot is only touched after the
/// select above it has returned and its borrows have ended.
enum ReadStep {
    Frame(bytes::BytesMut),
    Failed(io::Error),
    Eof,
    Timeout,
    NotReady,
}

/// TCP transport speaking length-prefixed protobuf frames.
pub struct TcpTransport {
    config: parking_lot::Mutex<TransportConfig>,
    writer: Mutex<Option<FrameWriter>>,
    reader: Mutex<Option<FrameReader>>,
    /// Read half of a freshly established connection, parked here until the
    /// receive side picks it up.
    pending_reader: parking_lot::Mutex<Option<FrameReader>>,
    released: parking_lot::Mutex<CancellationToken>,
    connected: Notify,
}

impl TcpTransport {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self {
            config: parking_lot::Mutex::new(TransportConfig::default()),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            pending_reader: parking_lot::Mutex::new(None),
            released: parking_lot::Mutex::new(token),
            connected: Notify::new(),
        }
    }

    fn codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(self.config.lock().buffer_size)
            .new_codec()
    }

    async fn connect(&self) -> io::Result<(FrameWriter, FrameReader)> {
        let endpoint = self.config.lock().endpoint.clone();
        let stream = TcpStream::connect(&endpoint).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        info!(endpoint = %endpoint, "speech transport connected");
        Ok((
            FramedWrite::new(write_half, self.codec()),
            FramedRead::new(read_half, self.codec()),
        ))
    }

    fn token(&self) -> CancellationToken {
        self.released.lock().clone()
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn initialize(&self, config: &TransportConfig) {
        *self.config.lock() = config.clone();
        *self.writer.lock().await = None;
        *self.reader.lock().await = None;
        *self.pending_reader.lock() = None;
        *self.released.lock() = CancellationToken::new();
        debug!(endpoint = %config.endpoint, service = %config.service, "transport initialized");
    }

    async fn send(&self, req: &SpeechRequest, timeout: Duration) -> SendOutcome {
        let token = self.token();
        if token.is_cancelled() {
            return SendOutcome::NotAvailable;
        }

        let attempt = async {
            let mut writer = self.writer.lock().await;
            if writer.is_none() {
                match self.connect().await {
                    Ok((w, r)) => {
                        *writer = Some(w);
                        *self.pending_reader.lock() = Some(r);
                        self.connected.notify_waiters();
                    }
                    Err(e) => {
                        debug!(error = %e, "speech service not reachable");
                        return SendOutcome::NotAvailable;
                    }
                }
            }
            let Some(sink) = writer.as_mut() else {
                return SendOutcome::NotAvailable;
            };
            let frame = Bytes::from(req.encode_to_vec());
            match sink.send(frame).await {
                Ok(()) => SendOutcome::Success,
                Err(e) => {
                    warn!(error = %e, "send failed, dropping connection");
                    *writer = None;
                    SendOutcome::Broken
                }
            }
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => SendOutcome::NotAvailable,
            res = tokio::time::timeout(timeout, attempt) => match res {
                Ok(outcome) => outcome,
                Err(_) => SendOutcome::Timeout,
            },
        };
        if outcome == SendOutcome::Timeout {
            // A frame may have been partially written; the connection
            // framing can no longer be trusted. The guard held by the
            // abandoned attempt is gone once the select returns.
            *self.writer.lock().await = None;
        }
        outcome
    }

    async fn recv(&self, timeout: Duration) -> RecvOutcome {
        let token = self.token();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if token.is_cancelled() {
                return RecvOutcome::NotReady;
            }

            let mut reader = self.reader.lock().await;
            if let Some(fresh) = self.pending_reader.lock().take() {
                *reader = Some(fresh);
            }

            let Some(frames) = reader.as_mut() else {
                // Not connected yet; wait for the send side to establish
                // the stream, bounded by the caller's timeout.
                drop(reader);
                tokio::select! {
                    _ = token.cancelled() => return RecvOutcome::NotReady,
                    _ = self.connected.notified() => continue,
                    _ = tokio::time::sleep_until(deadline) => return RecvOutcome::Timeout,
                }
            };

            let step = tokio::select! {
                _ = token.cancelled() => ReadStep::NotReady,
                _ = tokio::time::sleep_until(deadline) => ReadStep::Timeout,
                frame = frames.next() => match frame {
                    Some(Ok(buf)) => ReadStep::Frame(buf),
                    Some(Err(e)) => ReadStep::Failed(e),
                    None => ReadStep::Eof,
                },
            };
            return match step {
                ReadStep::NotReady => RecvOutcome::NotReady,
                ReadStep::Timeout => RecvOutcome::Timeout,
                ReadStep::Frame(buf) => match SpeechResponse::decode(buf.freeze()) {
                    Ok(resp) => RecvOutcome::Message(resp),
                    Err(e) => {
                        warn!(error = %e, "undecodable response frame");
                        RecvOutcome::Unknown
                    }
                },
                ReadStep::Failed(e) => {
                    warn!(error = %e, "read failed, dropping connection");
                    *reader = None;
                    RecvOutcome::Broken
                }
                ReadStep::Eof => {
                    info!("speech service closed the connection");
                    *reader = None;
                    RecvOutcome::Broken
                }
            };
        }
    }

    async fn release(&self) {
        self.token().cancel();
        *self.writer.lock().await = None;
        *self.pending_reader.lock() = None;
        debug!("transport released");
    }
}
