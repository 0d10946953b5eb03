//! Error kinds surfaced by the speech client.

/// Error kinds as surfaced to the host.
///
/// Server-side kinds arrive as numeric result codes on the wire
/// (`from_server_code`); `ServiceUnavailable`, `Timeout` and `SdkClosed`
/// are injected client-side by the transport, the operation controller and
/// the lifecycle latch respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("authentication failed")]
    Unauthenticated,
    #[error("connection quota exceeded")]
    ConnectionExceed,
    #[error("server resources exhausted")]
    ServerResourceExhausted,
    #[error("server busy")]
    ServerBusy,
    #[error("server internal error")]
    ServerInternal,
    #[error("speech service unavailable")]
    ServiceUnavailable,
    #[error("operation timed out")]
    Timeout,
    #[error("client already released")]
    SdkClosed,
    #[error("unknown speech error")]
    Unknown,
}

impl SpeechError {
    /// Maps a server result code to an error kind. Code 0 is success.
    /// Unrecognized codes collapse to `Unknown`.
    pub fn from_server_code(code: u32) -> Option<SpeechError> {
        match code {
            0 => None,
            2 => Some(SpeechError::Unauthenticated),
            3 => Some(SpeechError::ConnectionExceed),
            4 => Some(SpeechError::ServerResourceExhausted),
            5 => Some(SpeechError::ServerBusy),
            6 => Some(SpeechError::ServerInternal),
            101 => Some(SpeechError::ServiceUnavailable),
            102 => Some(SpeechError::SdkClosed),
            _ => Some(SpeechError::Unknown),
        }
    }
}
