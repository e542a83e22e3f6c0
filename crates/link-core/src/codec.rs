//! Wire framing for debug-link commands and responses.
//!
//! A command is a one-byte header (`write`, `auto-increment`, `length - 1`), a
//! little-endian 32-bit address and, for writes, one 4-byte slot per word. Read
//! responses use the same slot layout; only the low two bytes carry data.

use crate::LinkError;

/// Maximum number of words one command can transfer.
pub const MAX_TRANSFER_WORDS: usize = 64;
/// Bytes occupied by each word on the wire.
pub const WORD_SLOT_BYTES: usize = 4;
/// Bytes in a command header (command byte plus address).
pub const HEADER_BYTES: usize = 5;

/// Header bit selecting a write command.
pub const CMD_WRITE: u8 = 0x80;
/// Header bit asking the target to advance its address after every word.
pub const CMD_AUTO_INCREMENT: u8 = 0x40;
/// Header bits carrying `length - 1`.
pub const CMD_LENGTH_MASK: u8 = 0x3F;

/// Transfer direction of a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host reads words from the target.
    Read,
    /// Host writes words to the target.
    Write,
}

impl Direction {
    /// Resolves a pair of read/write request flags into a direction.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidDirection`] when both or neither flag is set.
    pub const fn from_flags(read: bool, write: bool) -> Result<Self, LinkError> {
        match (read, write) {
            (true, false) => Ok(Self::Read),
            (false, true) => Ok(Self::Write),
            _ => Err(LinkError::InvalidDirection),
        }
    }
}

/// One wire-level transaction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Read or write.
    pub direction: Direction,
    /// Whether the target advances its address after each word.
    pub auto_increment: bool,
    /// Number of words transferred (`1..=64`).
    pub length: usize,
    /// Starting wire address.
    pub address: u32,
    /// Words to write; empty for reads.
    pub payload: Vec<u16>,
}

impl Command {
    /// Builds a read of `length` words.
    #[must_use]
    pub const fn read(address: u32, length: usize, auto_increment: bool) -> Self {
        Self {
            direction: Direction::Read,
            auto_increment,
            length,
            address,
            payload: Vec::new(),
        }
    }

    /// Builds a write of `payload`; the length follows the payload.
    #[must_use]
    pub fn write(address: u32, payload: Vec<u16>, auto_increment: bool) -> Self {
        Self {
            direction: Direction::Write,
            auto_increment,
            length: payload.len(),
            address,
            payload,
        }
    }

    /// Builds a command from loose read/write flags, validating the request.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidDirection`] for both/neither flags and
    /// [`LinkError::InvalidLength`] for lengths outside `1..=64` or a payload
    /// that does not match `length`.
    pub fn from_flags(
        read: bool,
        write: bool,
        auto_increment: bool,
        length: usize,
        address: u32,
        payload: Vec<u16>,
    ) -> Result<Self, LinkError> {
        let command = Self {
            direction: Direction::from_flags(read, write)?,
            auto_increment,
            length,
            address,
            payload,
        };
        command.validate()?;
        Ok(command)
    }

    /// Checks the command against the wire limits.
    ///
    /// # Errors
    ///
    /// See [`Command::from_flags`].
    pub fn validate(&self) -> Result<(), LinkError> {
        if !(1..=MAX_TRANSFER_WORDS).contains(&self.length) {
            return Err(LinkError::InvalidLength(self.length));
        }
        match self.direction {
            Direction::Write if self.payload.len() != self.length => {
                Err(LinkError::InvalidLength(self.payload.len()))
            }
            Direction::Read if !self.payload.is_empty() => Err(LinkError::InvalidDirection),
            Direction::Read | Direction::Write => Ok(()),
        }
    }

    /// Number of response words the target sends back for this command.
    #[must_use]
    pub const fn response_words(&self) -> usize {
        match self.direction {
            Direction::Read => self.length,
            Direction::Write => 0,
        }
    }

    /// Header byte for this command; assumes the length is already validated.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn header_byte(&self) -> u8 {
        let mut byte = (self.length.wrapping_sub(1) as u8) & CMD_LENGTH_MASK;
        if matches!(self.direction, Direction::Write) {
            byte |= CMD_WRITE;
        }
        if self.auto_increment {
            byte |= CMD_AUTO_INCREMENT;
        }
        byte
    }
}

/// Encodes a command into the bytes sent to the target.
///
/// # Errors
///
/// Returns [`LinkError::InvalidLength`] or [`LinkError::InvalidDirection`] for
/// malformed commands.
pub fn encode(command: &Command) -> Result<Vec<u8>, LinkError> {
    command.validate()?;

    let mut bytes = Vec::with_capacity(HEADER_BYTES + command.payload.len() * WORD_SLOT_BYTES);
    bytes.push(command.header_byte());
    bytes.extend_from_slice(&command.address.to_le_bytes());
    for word in &command.payload {
        push_word_slot(&mut bytes, *word);
    }
    Ok(bytes)
}

/// Appends one word in its 4-byte wire slot (low, high, two zero pad bytes).
pub fn push_word_slot(bytes: &mut Vec<u8>, word: u16) {
    let [lo, hi] = word.to_le_bytes();
    bytes.extend_from_slice(&[lo, hi, 0x00, 0x00]);
}

/// Decodes `count` words from raw response bytes.
///
/// Bytes beyond `count` slots are ignored.
///
/// # Errors
///
/// Returns [`LinkError::ShortRead`] when fewer than `count * 4` bytes are present.
pub fn decode(bytes: &[u8], count: usize) -> Result<Vec<u16>, LinkError> {
    // A count too large to address can never be satisfied.
    let expected = count.checked_mul(WORD_SLOT_BYTES).unwrap_or(usize::MAX);
    if bytes.len() < expected {
        return Err(LinkError::ShortRead {
            expected,
            actual: bytes.len(),
        });
    }

    Ok(bytes[..expected]
        .chunks_exact(WORD_SLOT_BYTES)
        .map(|slot| u16::from_le_bytes([slot[0], slot[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::{
        decode, encode, Command, Direction, HEADER_BYTES, MAX_TRANSFER_WORDS, WORD_SLOT_BYTES,
    };
    use crate::LinkError;

    #[test]
    fn register_zero_single_read_matches_reference_bytes() {
        let bytes = encode(&Command::read(0xC000_0000, 1, false)).expect("valid read");
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x00, 0xC0]);
    }

    #[test]
    fn sixteen_word_incrementing_write_matches_reference_header() {
        let command = Command::write(0x1000, (0..16).collect(), true);
        let bytes = encode(&command).expect("valid write");

        assert_eq!(&bytes[..HEADER_BYTES], &[0xCF, 0x00, 0x10, 0x00, 0x00]);
        assert_eq!(bytes.len(), HEADER_BYTES + 16 * WORD_SLOT_BYTES);
        assert_eq!(&bytes[HEADER_BYTES..HEADER_BYTES + 8], &[0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn write_payload_words_are_low_byte_first_with_padding() {
        let bytes = encode(&Command::write(0x4000_0001, vec![0xBEEF], false)).expect("valid");
        assert_eq!(bytes, vec![0x80, 0x01, 0x00, 0x00, 0x40, 0xEF, 0xBE, 0x00, 0x00]);
    }

    #[rstest]
    #[case(0)]
    #[case(65)]
    #[case(128)]
    #[case(usize::MAX)]
    fn out_of_range_lengths_are_rejected(#[case] length: usize) {
        assert_eq!(
            encode(&Command::read(0, length, true)),
            Err(LinkError::InvalidLength(length))
        );
    }

    #[rstest]
    #[case(true, false, Ok(Direction::Read))]
    #[case(false, true, Ok(Direction::Write))]
    #[case(true, true, Err(LinkError::InvalidDirection))]
    #[case(false, false, Err(LinkError::InvalidDirection))]
    fn direction_flags_must_be_exclusive(
        #[case] read: bool,
        #[case] write: bool,
        #[case] expected: Result<Direction, LinkError>,
    ) {
        assert_eq!(Direction::from_flags(read, write), expected);
    }

    #[test]
    fn write_payload_must_match_length() {
        let result = Command::from_flags(false, true, false, 2, 0, vec![1]);
        assert_eq!(result, Err(LinkError::InvalidLength(1)));
    }

    #[test]
    fn read_with_payload_is_rejected() {
        let mut command = Command::read(0, 1, false);
        command.payload.push(7);
        assert_eq!(encode(&command), Err(LinkError::InvalidDirection));
    }

    #[test]
    fn decode_ignores_padding_bytes() {
        let words = decode(&[0x34, 0x12, 0xAA, 0xBB, 0xFF, 0x00, 0x01, 0x02], 2).expect("two slots");
        assert_eq!(words, vec![0x1234, 0x00FF]);
    }

    #[test]
    fn decode_reports_short_reads() {
        assert_eq!(
            decode(&[0x01, 0x02, 0x00], 1),
            Err(LinkError::ShortRead {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn decode_rejects_counts_past_the_address_space() {
        assert_eq!(
            decode(&[0; 8], usize::MAX),
            Err(LinkError::ShortRead {
                expected: usize::MAX,
                actual: 8
            })
        );
    }

    proptest! {
        #[test]
        fn echoed_write_slots_decode_to_the_payload(
            payload in prop::collection::vec(any::<u16>(), 1..=MAX_TRANSFER_WORDS),
            address in any::<u32>(),
            auto_increment in any::<bool>(),
        ) {
            let command = Command::write(address, payload.clone(), auto_increment);
            let bytes = encode(&command).expect("payload length is in range");

            let header = bytes[0];
            prop_assert_eq!(usize::from(header & 0x3F) + 1, payload.len());
            prop_assert_eq!(header & 0x40 != 0, auto_increment);
            prop_assert!(header & 0x80 != 0);
            prop_assert_eq!(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), address);

            let echoed = decode(&bytes[HEADER_BYTES..], payload.len()).expect("full echo");
            prop_assert_eq!(echoed, payload);
        }

        #[test]
        fn every_valid_read_length_encodes(length in 1..=MAX_TRANSFER_WORDS, address in any::<u32>()) {
            let bytes = encode(&Command::read(address, length, false)).expect("valid read");
            prop_assert_eq!(bytes.len(), HEADER_BYTES);
            prop_assert_eq!(usize::from(bytes[0]) + 1, length);
        }

        #[test]
        fn every_oversized_length_is_rejected(length in (MAX_TRANSFER_WORDS + 1)..10_000_usize) {
            prop_assert_eq!(
                encode(&Command::read(0, length, false)),
                Err(LinkError::InvalidLength(length))
            );
        }
    }
}
