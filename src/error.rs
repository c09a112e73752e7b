//! Error taxonomy for the admin protocol client.

use crate::protocol::Command;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the protocol client.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to a job server's admin port.
#[derive(Debug, Error)]
pub enum Error {
    /// The TCP connection could not be established.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connection did not complete within the connect timeout.
    #[error("timed out connecting to {host}:{port} after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// A read or write on an established connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The server did not send anything within the read timeout.
    #[error("timed out after {0:?} waiting for the server")]
    Timeout(Duration),

    /// The server closed the connection before the response was complete.
    #[error("connection closed before the `{command}` response was complete")]
    EndOfStream { command: Command },

    /// A line did not fit in the configured bound.
    #[error("line exceeds {limit} bytes without a newline")]
    LineTooLong { limit: usize },

    /// A response line did not have the shape expected for its command.
    #[error("malformed `{command}` line {line:?}: {reason}")]
    MalformedLine {
        command: Command,
        line: String,
        reason: String,
    },
}

impl Error {
    /// Whether the error happened before any exchange took place.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::ConnectTimeout { .. })
    }

    /// Whether the error comes from the underlying stream rather than the
    /// content of the response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Timeout(_) | Error::EndOfStream { .. }
        )
    }

    pub(crate) fn malformed(command: Command, line: &str, reason: impl Into<String>) -> Self {
        Error::MalformedLine {
            command,
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let refused = Error::Connect {
            host: "localhost".to_string(),
            port: 4730,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(refused.is_connect_failure());
        assert!(!refused.is_transport());

        let eos = Error::EndOfStream {
            command: Command::Status,
        };
        assert!(eos.is_transport());
        assert!(!eos.is_connect_failure());

        assert!(!Error::LineTooLong { limit: 127 }.is_transport());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::malformed(Command::Status, "reverse\t1", "expected 4 fields, found 2");
        assert_eq!(
            err.to_string(),
            "malformed `status` line \"reverse\\t1\": expected 4 fields, found 2"
        );

        let err = Error::EndOfStream {
            command: Command::Workers,
        };
        assert_eq!(
            err.to_string(),
            "connection closed before the `workers` response was complete"
        );
    }
}
