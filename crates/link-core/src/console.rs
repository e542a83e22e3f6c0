//! Console mailbox driver and NMI triggers.

use log::{debug, warn};

use crate::codec::{Command, CMD_WRITE, HEADER_BYTES, WORD_SLOT_BYTES};
use crate::map::{CONSOLE_MAILBOX, NMI_MAILBOX};
use crate::{Link, LinkError};

/// Words fetched from the console mailbox per poll round.
pub const CONSOLE_POLL_WORDS: usize = 16;

/// Zero words written by a burst single step.
pub const BURST_STEP_WORDS: usize = 16;

/// Pre-encoded single step: one zero word to the NMI mailbox.
pub const SINGLE_STEP: [u8; HEADER_BYTES + WORD_SLOT_BYTES] = nmi_trigger();

/// Pre-encoded burst single step: sixteen zero words to the NMI mailbox.
pub const BURST_STEP: [u8; HEADER_BYTES + BURST_STEP_WORDS * WORD_SLOT_BYTES] = nmi_trigger();

#[allow(clippy::cast_possible_truncation)]
const fn nmi_trigger<const N: usize>() -> [u8; N] {
    let words = (N - HEADER_BYTES) / WORD_SLOT_BYTES;
    let address = NMI_MAILBOX.to_le_bytes();
    let mut bytes = [0; N];
    bytes[0] = CMD_WRITE | (words - 1) as u8;
    bytes[1] = address[0];
    bytes[2] = address[1];
    bytes[3] = address[2];
    bytes[4] = address[3];
    bytes
}

/// Appends the non-zero low bytes of one poll round to `out`.
///
/// Returns `true` when the target may have more output queued, i.e. the last
/// byte of the round was non-zero.
pub fn collect_burst(words: &[u16], out: &mut Vec<u8>) -> bool {
    out.extend(
        words
            .iter()
            .map(|word| word.to_le_bytes()[0])
            .filter(|byte| *byte != 0),
    );
    words.last().is_some_and(|word| word.to_le_bytes()[0] != 0)
}

impl Link {
    /// Collects console output until the target reports an empty mailbox.
    ///
    /// At most `console_max_rounds` polls are made; output still queued after
    /// that is picked up by the next call.
    ///
    /// # Errors
    ///
    /// Any [`Link::transact`] error. Output gathered before the failure is lost.
    pub async fn drain_output(&self) -> Result<Vec<u8>, LinkError> {
        let poll = Command::read(CONSOLE_MAILBOX, CONSOLE_POLL_WORDS, false);
        let mut output = Vec::new();
        for _ in 0..self.config().console_max_rounds {
            let words = self.transact(&poll).await?;
            if !collect_burst(&words, &mut output) {
                return Ok(output);
            }
        }
        warn!(
            "console still streaming after {} round(s)",
            self.config().console_max_rounds
        );
        Ok(output)
    }

    /// Queues one input character on the target's console.
    ///
    /// # Errors
    ///
    /// Any [`Link::transact`] error.
    pub async fn send_input_char(&self, byte: u8) -> Result<(), LinkError> {
        self.transact(&Command::write(CONSOLE_MAILBOX, vec![u16::from(byte)], false))
            .await
            .map(drop)
    }

    /// Writes `length` zero words to the NMI mailbox.
    ///
    /// # Errors
    ///
    /// [`LinkError::InvalidLength`] outside `1..=64`, otherwise any
    /// [`Link::transact`] error.
    pub async fn send_nmi(&self, length: usize) -> Result<(), LinkError> {
        self.transact(&Command::write(NMI_MAILBOX, vec![0; length], false))
            .await
            .map(drop)
    }

    /// Single-steps the target.
    ///
    /// # Errors
    ///
    /// As [`Link::send_raw`].
    pub async fn single_step(&self) -> Result<(), LinkError> {
        debug!("single step");
        self.send_raw(SINGLE_STEP.to_vec()).await
    }

    /// Burst single-steps the target.
    ///
    /// # Errors
    ///
    /// As [`Link::send_raw`].
    pub async fn burst_step(&self) -> Result<(), LinkError> {
        debug!("burst step");
        self.send_raw(BURST_STEP.to_vec()).await
    }
}
