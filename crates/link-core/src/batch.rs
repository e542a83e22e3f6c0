//! Batched multi-word transfers over memory and I/O ports.
//!
//! Every logical transfer is split into auto-incrementing sub-transactions of
//! at most the configured batch size. Sub-transactions are independent: a
//! failure aborts the call, and batches already written stay written.

use crate::codec::{Command, MAX_TRANSFER_WORDS};
use crate::map::{io_span, memory_span};
use crate::{Link, LinkError};

/// One wire-level piece of a larger transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Batch {
    /// Wire address of the first word.
    pub address: u32,
    /// Offset of the first word within the logical transfer.
    pub offset: usize,
    /// Words carried by this batch.
    pub length: usize,
}

/// Splits `length` words starting at `address` into batches of at most `batch_size`.
///
/// `batch_size` is clamped to `1..=64`.
#[allow(clippy::cast_possible_truncation)]
pub fn plan_batches(address: u32, length: usize, batch_size: usize) -> impl Iterator<Item = Batch> {
    let step = batch_size.clamp(1, MAX_TRANSFER_WORDS);
    (0..length).step_by(step).map(move |offset| Batch {
        address: address.wrapping_add(offset as u32),
        offset,
        length: step.min(length - offset),
    })
}

impl Link {
    /// Reads `length` words of linear memory starting at `address`.
    ///
    /// # Errors
    ///
    /// [`LinkError::InvalidAddress`] if the range leaves memory, otherwise the
    /// first failing batch's error.
    pub async fn read_memory(&self, address: u32, length: usize) -> Result<Vec<u16>, LinkError> {
        let base = memory_span(address, length)?;
        self.read_batched(base, length).await
    }

    /// Writes `values` to linear memory starting at `address`.
    ///
    /// # Errors
    ///
    /// As [`Link::read_memory`]; earlier batches are not rolled back.
    pub async fn write_memory(&self, address: u32, values: &[u16]) -> Result<(), LinkError> {
        let base = memory_span(address, values.len())?;
        self.write_batched(base, values).await
    }

    /// Reads `length` consecutive I/O ports starting at `port`.
    ///
    /// # Errors
    ///
    /// [`LinkError::InvalidAddress`] if the range runs past the last port,
    /// otherwise the first failing batch's error.
    pub async fn read_io(&self, port: u16, length: usize) -> Result<Vec<u16>, LinkError> {
        let base = io_span(port, length)?;
        self.read_batched(base, length).await
    }

    /// Writes `values` to consecutive I/O ports starting at `port`.
    ///
    /// # Errors
    ///
    /// As [`Link::read_io`]; earlier batches are not rolled back.
    pub async fn write_io(&self, port: u16, values: &[u16]) -> Result<(), LinkError> {
        let base = io_span(port, values.len())?;
        self.write_batched(base, values).await
    }

    async fn read_batched(&self, base: u32, length: usize) -> Result<Vec<u16>, LinkError> {
        let mut words = Vec::with_capacity(length);
        for batch in plan_batches(base, length, self.config().batch_size) {
            let chunk = self
                .transact(&Command::read(batch.address, batch.length, true))
                .await?;
            words.extend(chunk);
        }
        Ok(words)
    }

    async fn write_batched(&self, base: u32, values: &[u16]) -> Result<(), LinkError> {
        for batch in plan_batches(base, values.len(), self.config().batch_size) {
            let payload = values[batch.offset..batch.offset + batch.length].to_vec();
            self.transact(&Command::write(batch.address, payload, true))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{plan_batches, Batch};
    use crate::codec::MAX_TRANSFER_WORDS;

    #[test]
    fn transfers_split_at_the_batch_size() {
        let batches: Vec<_> = plan_batches(0x1000, 20, 8).collect();
        assert_eq!(
            batches,
            vec![
                Batch {
                    address: 0x1000,
                    offset: 0,
                    length: 8
                },
                Batch {
                    address: 0x1008,
                    offset: 8,
                    length: 8
                },
                Batch {
                    address: 0x1010,
                    offset: 16,
                    length: 4
                },
            ]
        );
    }

    #[test]
    fn empty_transfers_plan_nothing() {
        assert_eq!(plan_batches(0, 0, 8).count(), 0);
    }

    #[test]
    fn oversized_batch_sizes_are_clamped_to_the_wire_cap() {
        let lengths: Vec<_> = plan_batches(0, 130, 1000).map(|b| b.length).collect();
        assert_eq!(lengths, vec![64, 64, 2]);
    }

    proptest! {
        #[test]
        fn batches_tile_the_transfer_exactly(
            address in 0_u32..0x0007_0000,
            length in 0_usize..600,
            batch_size in 1_usize..=MAX_TRANSFER_WORDS,
        ) {
            let batches: Vec<_> = plan_batches(address, length, batch_size).collect();

            prop_assert_eq!(batches.len(), length.div_ceil(batch_size));
            let mut next = 0;
            for batch in &batches {
                prop_assert!(batch.length >= 1 && batch.length <= batch_size);
                prop_assert_eq!(batch.offset, next);
                prop_assert_eq!(batch.address, address + u32::try_from(batch.offset).unwrap());
                next += batch.length;
            }
            prop_assert_eq!(next, length);
        }
    }
}
