use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::transport::is_fatal_kind;

/// Failure taxonomy for every debug-link operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The transport neither opened nor reported an error within the open bound.
    #[error("timed out after {0:?} waiting for the port to open")]
    OpenTimeout(Duration),
    /// The target never became ready (or never answered) within the call bound.
    #[error("target did not become ready within {0:?}")]
    ReadyTimeout(Duration),
    /// Transfer length outside the `1..=64` words one command can carry.
    #[error("transfer length {0} is outside 1..=64 words")]
    InvalidLength(usize),
    /// A command must be exactly one of read or write.
    #[error("a command must either read or write, not both or neither")]
    InvalidDirection,
    /// Fewer response bytes than the command asked for.
    #[error("expected {expected} response bytes, got {actual}")]
    ShortRead {
        /// Bytes required to decode the response.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
    /// The transport itself reported a fault.
    #[error("transport error ({kind}): {message}")]
    TransportError {
        /// Category of the underlying I/O failure.
        kind: io::ErrorKind,
        /// Human-readable description from the transport.
        message: String,
    },
    /// Transfer does not fit inside the addressed region.
    #[error("{length} words at {address:#010X} fall outside the addressed region")]
    InvalidAddress {
        /// First wire address of the transfer.
        address: u32,
        /// Number of words requested.
        length: usize,
    },
    /// Link configuration rejected before opening.
    #[error("invalid link configuration: {0}")]
    InvalidConfig(&'static str),
    /// Operation attempted on a link that has been closed.
    #[error("link is closed")]
    Closed,
}

impl LinkError {
    /// Errors after which the link is left `Closed` rather than idle.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::OpenTimeout(_) | Self::Closed => true,
            Self::TransportError { kind, .. } => is_fatal_kind(*kind),
            Self::ReadyTimeout(_)
            | Self::InvalidLength(_)
            | Self::InvalidDirection
            | Self::ShortRead { .. }
            | Self::InvalidAddress { .. }
            | Self::InvalidConfig(_) => false,
        }
    }
}

impl From<io::Error> for LinkError {
    fn from(err: io::Error) -> Self {
        Self::TransportError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use super::LinkError;

    #[test]
    fn only_closing_errors_are_fatal() {
        assert!(LinkError::OpenTimeout(Duration::from_secs(3)).is_fatal());
        assert!(LinkError::Closed.is_fatal());
        assert!(!LinkError::ReadyTimeout(Duration::from_secs(30)).is_fatal());
        assert!(!LinkError::InvalidLength(65).is_fatal());
        assert!(!LinkError::InvalidDirection.is_fatal());
        assert!(!LinkError::ShortRead {
            expected: 4,
            actual: 2
        }
        .is_fatal());
    }

    #[test]
    fn transport_fatality_follows_io_kind() {
        let broken = LinkError::from(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        assert!(broken.is_fatal());

        let glitch = LinkError::from(io::Error::other("framing error"));
        assert!(!glitch.is_fatal());
        assert_eq!(
            glitch,
            LinkError::TransportError {
                kind: io::ErrorKind::Other,
                message: "framing error".to_string(),
            }
        );
    }
}
