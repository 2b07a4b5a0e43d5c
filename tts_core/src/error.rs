use std::time::Duration;

use thiserror::Error;

/// Failure kinds of a single synthesis session or one of its paths.
#[derive(Debug, Error)]
pub enum TtsError {
    /// The transport could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote endpoint rejected the credentials.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// A frame was sent after the send side was closed.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// The connection dropped before the final message arrived.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The playback destination failed.
    #[error("Sink error: {0}")]
    Sink(String),

    /// Nothing arrived on the inbound path within the idle interval.
    #[error("No data received for {0:?}")]
    Stall(Duration),

    /// An inbound message could not be decoded, or carried a remote error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The upstream token source failed.
    #[error("Token source error: {0}")]
    Upstream(String),
}

/// Error surfaced by [`crate::Pipeline::run`]. The variant names the path
/// that failed first.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Session setup failed: {0}")]
    Open(#[source] TtsError),

    #[error("Send path failed: {0}")]
    Send(#[source] TtsError),

    #[error("Receive path failed: {0}")]
    Receive(#[source] TtsError),

    #[error("Pipeline run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// The underlying session error, if the run did not end by cancellation.
    pub fn kind(&self) -> Option<&TtsError> {
        match self {
            PipelineError::Open(e) | PipelineError::Send(e) | PipelineError::Receive(e) => Some(e),
            PipelineError::Cancelled => None,
        }
    }
}

pub type Result<T, E = TtsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TtsError::Stall(Duration::from_secs(3));
        assert_eq!(err.to_string(), "No data received for 3s");

        let err = PipelineError::Receive(TtsError::ConnectionLost("reset".into()));
        assert_eq!(err.to_string(), "Receive path failed: Connection lost: reset");
    }

    #[test]
    fn test_kind_distinguishes_paths() {
        let send = PipelineError::Send(TtsError::SessionClosed("send side closed".into()));
        let recv = PipelineError::Receive(TtsError::SessionClosed("send side closed".into()));
        assert!(matches!(send, PipelineError::Send(_)));
        assert!(matches!(recv, PipelineError::Receive(_)));
        assert!(matches!(send.kind(), Some(TtsError::SessionClosed(_))));
        assert!(PipelineError::Cancelled.kind().is_none());
    }
}
