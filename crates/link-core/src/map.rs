//! Wire address-space map and logical-target translation.

use crate::LinkError;

/// Inclusive start address of linear memory.
pub const MEMORY_START: u32 = 0x0000_0000;
/// Inclusive end address of linear memory.
pub const MEMORY_END: u32 = 0x0007_FFFF;
/// NMI trigger mailbox.
pub const NMI_MAILBOX: u32 = 0x4000_0000;
/// Console character mailbox.
pub const CONSOLE_MAILBOX: u32 = 0x4000_0001;
/// Base of the memory-mapped I/O port window.
pub const IO_BASE: u32 = 0x8000_0000;
/// Base of the CPU register bank.
pub const REGISTER_BANK_BASE: u32 = 0xC000_0000;

const REGION_SELECT_MASK: u32 = 0xC000_0000;
const MAILBOX_SELECT: u32 = 0x4000_0000;

/// Logical region selected by the top bits of a wire address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Linear memory (`0x00000000..=0x0007FFFF`).
    Memory,
    /// NMI mailbox (`0x40000000`).
    NmiMailbox,
    /// Console mailbox (`0x40000001`).
    ConsoleMailbox,
    /// I/O port window (`0x80000000 | port`).
    Io,
    /// CPU register bank (`0xC0000000 | index`).
    RegisterBank,
}

/// Classifies a wire address, or `None` for addresses no region claims.
#[must_use]
pub const fn decode_region(address: u32) -> Option<Region> {
    match address {
        MEMORY_START..=MEMORY_END => Some(Region::Memory),
        NMI_MAILBOX => Some(Region::NmiMailbox),
        CONSOLE_MAILBOX => Some(Region::ConsoleMailbox),
        _ => match address & REGION_SELECT_MASK {
            IO_BASE => Some(Region::Io),
            REGISTER_BANK_BASE => Some(Region::RegisterBank),
            _ => None,
        },
    }
}

/// Wire address of an I/O port.
#[must_use]
pub const fn io_address(port: u16) -> u32 {
    IO_BASE | port as u32
}

/// Wire address of a register-bank slot.
#[must_use]
pub const fn register_address(index: u8) -> u32 {
    REGISTER_BANK_BASE | index as u32
}

/// Validates an incrementing transfer of `length` words starting at memory `address`.
///
/// # Errors
///
/// Returns [`LinkError::InvalidAddress`] when any word falls outside linear memory.
pub const fn memory_span(address: u32, length: usize) -> Result<u32, LinkError> {
    span_within(address, length, MEMORY_START, MEMORY_END)
}

/// Validates an incrementing transfer of `length` words starting at I/O `port`.
///
/// # Errors
///
/// Returns [`LinkError::InvalidAddress`] when the transfer runs past the last port.
pub const fn io_span(port: u16, length: usize) -> Result<u32, LinkError> {
    span_within(io_address(port), length, IO_BASE, io_address(u16::MAX))
}

const fn span_within(address: u32, length: usize, start: u32, end: u32) -> Result<u32, LinkError> {
    if address < start || address > end {
        return Err(LinkError::InvalidAddress { address, length });
    }
    let room = (end - address) as usize + 1;
    if length > room {
        return Err(LinkError::InvalidAddress { address, length });
    }
    Ok(address)
}

const _: () = assert_region_layout();

const fn assert_region_layout() {
    assert!(
        MEMORY_END & REGION_SELECT_MASK == 0,
        "memory must sit below the region select bits"
    );
    assert!(
        NMI_MAILBOX & REGION_SELECT_MASK == MAILBOX_SELECT
            && CONSOLE_MAILBOX & REGION_SELECT_MASK == MAILBOX_SELECT,
        "mailboxes share the mailbox select pattern"
    );
    assert!(
        IO_BASE & !REGION_SELECT_MASK == 0 && REGISTER_BANK_BASE & !REGION_SELECT_MASK == 0,
        "region bases must be pure select patterns"
    );
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        decode_region, io_address, io_span, memory_span, register_address, Region, CONSOLE_MAILBOX,
        IO_BASE, MEMORY_END, NMI_MAILBOX, REGISTER_BANK_BASE,
    };
    use crate::LinkError;

    #[rstest]
    #[case(0x0000_0000, Some(Region::Memory))]
    #[case(MEMORY_END, Some(Region::Memory))]
    #[case(MEMORY_END + 1, None)]
    #[case(NMI_MAILBOX, Some(Region::NmiMailbox))]
    #[case(CONSOLE_MAILBOX, Some(Region::ConsoleMailbox))]
    #[case(0x4000_0002, None)]
    #[case(IO_BASE, Some(Region::Io))]
    #[case(0x8000_FFFF, Some(Region::Io))]
    #[case(REGISTER_BANK_BASE, Some(Region::RegisterBank))]
    #[case(0xC000_000F, Some(Region::RegisterBank))]
    fn regions_decode_at_boundaries(#[case] address: u32, #[case] expected: Option<Region>) {
        assert_eq!(decode_region(address), expected);
    }

    #[test]
    fn logical_targets_map_to_wire_addresses() {
        assert_eq!(io_address(0x81), 0x8000_0081);
        assert_eq!(register_address(9), 0xC000_0009);
        assert_eq!(decode_region(io_address(u16::MAX)), Some(Region::Io));
        assert_eq!(decode_region(register_address(u8::MAX)), Some(Region::RegisterBank));
    }

    #[test]
    fn memory_span_accepts_transfers_ending_on_the_last_word() {
        assert_eq!(memory_span(MEMORY_END, 1), Ok(MEMORY_END));
        assert_eq!(memory_span(0, 0x8_0000), Ok(0));
        assert_eq!(memory_span(0x1000, 0), Ok(0x1000));
    }

    #[test]
    fn memory_span_rejects_overruns() {
        assert_eq!(
            memory_span(MEMORY_END, 2),
            Err(LinkError::InvalidAddress {
                address: MEMORY_END,
                length: 2
            })
        );
        assert_eq!(
            memory_span(MEMORY_END + 1, 1),
            Err(LinkError::InvalidAddress {
                address: MEMORY_END + 1,
                length: 1
            })
        );
    }

    #[test]
    fn io_span_stays_inside_the_port_window() {
        assert_eq!(io_span(0, 16), Ok(IO_BASE));
        assert_eq!(io_span(u16::MAX, 1), Ok(0x8000_FFFF));
        assert!(io_span(u16::MAX, 2).is_err());
    }
}
