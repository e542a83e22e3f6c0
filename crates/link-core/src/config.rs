use std::time::Duration;

use crate::codec::MAX_TRANSFER_WORDS;
use crate::LinkError;

/// Default bound on waiting for the transport to open.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(3000);
/// Default bound on one transaction, queueing included.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Default words per batched sub-transaction.
pub const DEFAULT_BATCH_SIZE: usize = 8;
/// Default number of requests that may wait for the link.
pub const DEFAULT_REQUEST_QUEUE_DEPTH: usize = 32;
/// Default window for discarding late bytes after a timed-out read.
pub const DEFAULT_STALE_SETTLE: Duration = Duration::from_millis(50);
/// Default cap on mailbox polls in one console drain.
pub const DEFAULT_CONSOLE_MAX_ROUNDS: usize = 64;

/// Tunables for one debug-link connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LinkConfig {
    /// Bound on waiting for the transport to open.
    pub open_timeout: Duration,
    /// Bound on one transaction, from submission to completion.
    pub ready_timeout: Duration,
    /// Words per batched sub-transaction (`1..=64`).
    pub batch_size: usize,
    /// Requests that may queue behind the one in flight before callers wait to enqueue.
    pub request_queue_depth: usize,
    /// How long late bytes are discarded after a read times out.
    pub stale_settle: Duration,
    /// Mailbox polls allowed in one console drain.
    pub console_max_rounds: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            request_queue_depth: DEFAULT_REQUEST_QUEUE_DEPTH,
            stale_settle: DEFAULT_STALE_SETTLE,
            console_max_rounds: DEFAULT_CONSOLE_MAX_ROUNDS,
        }
    }
}

impl LinkConfig {
    /// Rejects settings the driver cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidLength`] for a batch size outside `1..=64` and
    /// [`LinkError::InvalidConfig`] for zero-sized queues, drains or timeouts.
    pub const fn validate(&self) -> Result<(), LinkError> {
        if self.batch_size == 0 || self.batch_size > MAX_TRANSFER_WORDS {
            return Err(LinkError::InvalidLength(self.batch_size));
        }
        if self.request_queue_depth == 0 {
            return Err(LinkError::InvalidConfig("request queue depth must be non-zero"));
        }
        if self.console_max_rounds == 0 {
            return Err(LinkError::InvalidConfig("console drain needs at least one round"));
        }
        if self.ready_timeout.is_zero() || self.open_timeout.is_zero() {
            return Err(LinkError::InvalidConfig("timeouts must be non-zero"));
        }
        Ok(())
    }
}
