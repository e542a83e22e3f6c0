//! In-memory target speaking the debug-link protocol.
//!
//! [`SimulatedTarget`] answers commands over a [`tokio::io::duplex`] pipe the
//! way the hardware bridge does, and records every transaction it sees. It backs
//! the crate's own tests and lets front ends run without a board attached.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::codec::{
    push_word_slot, CMD_AUTO_INCREMENT, CMD_LENGTH_MASK, CMD_WRITE, HEADER_BYTES, WORD_SLOT_BYTES,
};
use crate::map::{CONSOLE_MAILBOX, NMI_MAILBOX};

/// How the target answers the next read command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBehavior {
    /// Reply immediately.
    Respond,
    /// Never reply.
    Ignore,
    /// Reply after the given delay.
    Delay(Duration),
    /// Drop the connection instead of replying.
    Hangup,
}

/// One command as decoded by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionRecord {
    /// Write command.
    pub write: bool,
    /// Auto-increment flag.
    pub auto_increment: bool,
    /// Word count.
    pub length: usize,
    /// Wire address.
    pub address: u32,
}

#[derive(Debug, Default)]
struct TargetState {
    words: HashMap<u32, u16>,
    console_output: VecDeque<u8>,
    console_input: Vec<u8>,
    nmi_words: usize,
    records: Vec<TransactionRecord>,
    read_behaviors: VecDeque<ReadBehavior>,
    write_budget: Option<usize>,
}

/// Shared handle to a simulated target.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTarget {
    state: Arc<Mutex<TargetState>>,
}

impl SimulatedTarget {
    /// Creates an empty target: all words read as zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TargetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns a server task and returns the host end of its pipe.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn connect(&self, buffer: usize) -> DuplexStream {
        let (host, target) = tokio::io::duplex(buffer);
        tokio::spawn(self.clone().serve(target));
        host
    }

    /// Presets the word at a wire address.
    pub fn set_word(&self, address: u32, value: u16) {
        self.state().words.insert(address, value);
    }

    /// Current word at a wire address.
    #[must_use]
    pub fn word(&self, address: u32) -> u16 {
        self.state().words.get(&address).copied().unwrap_or(0)
    }

    /// Queues bytes the target will emit through the console mailbox.
    pub fn queue_console_output(&self, bytes: &[u8]) {
        self.state().console_output.extend(bytes);
    }

    /// Characters written to the console mailbox so far.
    #[must_use]
    pub fn console_input(&self) -> Vec<u8> {
        self.state().console_input.clone()
    }

    /// Zero words written to the NMI mailbox so far.
    #[must_use]
    pub fn nmi_words(&self) -> usize {
        self.state().nmi_words
    }

    /// Every command received, in order.
    #[must_use]
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.state().records.clone()
    }

    /// Sets how the next unanswered read is handled; later reads fall back to
    /// [`ReadBehavior::Respond`] once the queue runs dry.
    pub fn push_read_behavior(&self, behavior: ReadBehavior) {
        self.state().read_behaviors.push_back(behavior);
    }

    /// Stops reading the pipe once `writes` more write commands have landed.
    ///
    /// The connection stays open, so the host's writes eventually block.
    pub fn stall_after_writes(&self, writes: usize) {
        self.state().write_budget = Some(writes);
    }

    async fn serve(self, mut stream: DuplexStream) {
        let mut header = [0_u8; HEADER_BYTES];
        loop {
            let stalled = self.state().write_budget == Some(0);
            if stalled {
                debug!("simulated target stalled");
                std::future::pending::<()>().await;
            }
            if stream.read_exact(&mut header).await.is_err() {
                break;
            }
            let record = TransactionRecord {
                write: header[0] & CMD_WRITE != 0,
                auto_increment: header[0] & CMD_AUTO_INCREMENT != 0,
                length: usize::from(header[0] & CMD_LENGTH_MASK) + 1,
                address: u32::from_le_bytes([header[1], header[2], header[3], header[4]]),
            };
            trace!("target got {record:?}");

            if record.write {
                let mut payload = vec![0_u8; record.length * WORD_SLOT_BYTES];
                if stream.read_exact(&mut payload).await.is_err() {
                    break;
                }
                let words: Vec<u16> = payload
                    .chunks_exact(WORD_SLOT_BYTES)
                    .map(|slot| u16::from_le_bytes([slot[0], slot[1]]))
                    .collect();
                self.apply_write(record, &words);
                continue;
            }

            let behavior = {
                let mut state = self.state();
                state.records.push(record);
                state
                    .read_behaviors
                    .pop_front()
                    .unwrap_or(ReadBehavior::Respond)
            };
            match behavior {
                ReadBehavior::Respond => {}
                ReadBehavior::Ignore => continue,
                ReadBehavior::Delay(delay) => tokio::time::sleep(delay).await,
                ReadBehavior::Hangup => {
                    debug!("simulated target hanging up");
                    return;
                }
            }

            let response = self.answer_read(record);
            if stream.write_all(&response).await.is_err() {
                break;
            }
        }
    }

    fn apply_write(&self, record: TransactionRecord, words: &[u16]) {
        let mut state = self.state();
        state.records.push(record);
        if let Some(budget) = state.write_budget.as_mut() {
            *budget = budget.saturating_sub(1);
        }
        for (step, word) in (0_u32..).zip(words) {
            let address = if record.auto_increment {
                record.address.wrapping_add(step)
            } else {
                record.address
            };
            match address {
                NMI_MAILBOX => state.nmi_words += 1,
                CONSOLE_MAILBOX => state.console_input.push(word.to_le_bytes()[0]),
                _ => {
                    state.words.insert(address, *word);
                }
            }
        }
    }

    fn answer_read(&self, record: TransactionRecord) -> Vec<u8> {
        let mut state = self.state();
        let mut bytes = Vec::with_capacity(record.length * WORD_SLOT_BYTES);
        for step in (0_u32..).take(record.length) {
            let address = if record.auto_increment {
                record.address.wrapping_add(step)
            } else {
                record.address
            };
            let word = if address == CONSOLE_MAILBOX {
                state.console_output.pop_front().map_or(0, u16::from)
            } else {
                state.words.get(&address).copied().unwrap_or(0)
            };
            push_word_slot(&mut bytes, word);
        }
        bytes
    }
}
