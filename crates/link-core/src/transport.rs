//! Transport event plumbing.
//!
//! The raw byte stream is read by a dedicated pump task that turns every read
//! result into a [`TransportEvent`] message for the protocol driver.

use std::io;
use std::time::Duration;

use log::{trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Byte stream the debug link runs over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Something the transport reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes arrived from the target.
    Data(Vec<u8>),
    /// The transport reported a fault.
    Error {
        /// Category of the failure.
        kind: io::ErrorKind,
        /// Description from the transport.
        message: String,
    },
    /// The stream reached end of file.
    Closed,
}

const READ_CHUNK_BYTES: usize = 256;
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// I/O failures after which the link cannot be used again.
#[must_use]
pub const fn is_fatal_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::UnexpectedEof
    )
}

/// Spawns the pump forwarding reads from `reader` as events.
pub(crate) fn spawn_reader<R>(mut reader: R, events: mpsc::Sender<TransportEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0_u8; READ_CHUNK_BYTES];
        loop {
            let event = match reader.read(&mut buf).await {
                Ok(0) => TransportEvent::Closed,
                Ok(n) => {
                    trace!("rx {:02X?}", &buf[..n]);
                    TransportEvent::Data(buf[..n].to_vec())
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("transport read failed: {err}");
                    TransportEvent::Error {
                        kind: err.kind(),
                        message: err.to_string(),
                    }
                }
            };

            let stop = match &event {
                TransportEvent::Data(_) => false,
                TransportEvent::Closed => true,
                TransportEvent::Error { kind, .. } => is_fatal_kind(*kind),
            };
            let backoff = matches!(event, TransportEvent::Error { .. });

            if events.send(event).await.is_err() || stop {
                return;
            }
            if backoff {
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    })
}
