//! Host-side driver for the Retroputer debug link.

/// Error taxonomy for link operations.
pub mod error;
pub use error::LinkError;

/// Link tuning knobs and their defaults.
pub mod config;
pub use config::{
    LinkConfig, DEFAULT_BATCH_SIZE, DEFAULT_CONSOLE_MAX_ROUNDS, DEFAULT_OPEN_TIMEOUT,
    DEFAULT_READY_TIMEOUT, DEFAULT_REQUEST_QUEUE_DEPTH, DEFAULT_STALE_SETTLE,
};

/// Command framing and response decoding.
pub mod codec;
pub use codec::{
    decode, encode, Command, Direction, CMD_AUTO_INCREMENT, CMD_LENGTH_MASK, CMD_WRITE,
    HEADER_BYTES, MAX_TRANSFER_WORDS, WORD_SLOT_BYTES,
};

/// Wire address map.
pub mod map;
pub use map::{
    decode_region, io_address, io_span, memory_span, register_address, Region, CONSOLE_MAILBOX,
    IO_BASE, MEMORY_END, MEMORY_START, NMI_MAILBOX, REGISTER_BANK_BASE,
};

/// Readiness gate state.
pub mod gate;
pub use gate::LinkState;

/// Byte-stream transport abstraction.
pub mod transport;
pub use transport::{is_fatal_kind, Transport, TransportEvent};

/// Serialized transaction engine.
pub mod engine;
pub use engine::Link;

/// Multi-word transfers split into wire-sized batches.
pub mod batch;
pub use batch::{plan_batches, Batch};

/// Register bank decoding.
pub mod registers;
pub use registers::{CpuSnapshot, ParseRegisterError, Register, StatusFlags, REGISTER_BANK_WORDS};

/// Console mailbox and NMI helpers.
pub mod console;
pub use console::{collect_burst, BURST_STEP, CONSOLE_POLL_WORDS, SINGLE_STEP};

/// Simulated target for tests and offline use.
pub mod sim;
pub use sim::{ReadBehavior, SimulatedTarget, TransactionRecord};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
