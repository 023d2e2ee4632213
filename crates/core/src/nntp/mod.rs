//! NNTP transport: single sessions and the fixed-size pool.

mod client;
mod pool;

pub use client::{NntpClient, StatOutcome};
pub use pool::{NntpPool, PoolConfig, PoolMetrics, PoolRegistry, PooledClient};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NntpError {
    #[error("NNTP connection failed: {0}")]
    ConnectionFailed(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("NNTP authentication failed: {0}")]
    Auth(String),

    #[error("NNTP protocol error: {0}")]
    Protocol(String),

    #[error("NNTP operation timed out")]
    Timeout,

    #[error("yEnc decode failed: {0}")]
    Decode(String),

    #[error("NNTP pool is shutting down")]
    ShuttingDown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NntpError {
    /// Transport-level failures poison the session; the owning client
    /// must be dropped from the pool and replaced.
    pub fn is_transport_error(&self) -> bool {
        match self {
            NntpError::ConnectionFailed(_) | NntpError::Timeout | NntpError::Tls(_) => true,
            NntpError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classification() {
        assert!(NntpError::ConnectionFailed("reset".into()).is_transport_error());
        assert!(NntpError::Timeout.is_transport_error());
        assert!(NntpError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe"
        ))
        .is_transport_error());
        assert!(!NntpError::Auth("rejected".into()).is_transport_error());
        assert!(!NntpError::Protocol("500".into()).is_transport_error());
        assert!(!NntpError::Decode("bad".into()).is_transport_error());
    }
}
