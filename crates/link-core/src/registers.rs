//! CPU register bank layout and the snapshot decoded from it.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::codec::Command;
use crate::map::{register_address, REGISTER_BANK_BASE};
use crate::{Link, LinkError};

/// Words read from the register bank for one snapshot.
pub const REGISTER_BANK_WORDS: usize = 16;

/// `STATUS` bit for extend mode.
pub const STATUS_EX: u8 = 1 << 7;
/// `STATUS` bit for interrupts disabled.
pub const STATUS_ID: u8 = 1 << 6;
/// `STATUS` bit for interrupt in service.
pub const STATUS_IS: u8 = 1 << 5;
/// `STATUS` bit for single-step mode.
pub const STATUS_SS: u8 = 1 << 4;
/// `STATUS` bit for negative result.
pub const STATUS_N: u8 = 1 << 3;
/// `STATUS` bit for carry.
pub const STATUS_C: u8 = 1 << 2;
/// `STATUS` bit for signed overflow.
pub const STATUS_V: u8 = 1 << 1;
/// `STATUS` bit for zero result.
pub const STATUS_Z: u8 = 1 << 0;

/// Writable register-bank slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Register {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    X = 4,
    Y = 5,
    Bp = 6,
    Sp = 7,
    /// Interrupt byte (high) and `STATUS` flags (low).
    Flags = 8,
    Pc = 9,
    /// Memory pointer.
    Mp = 10,
    /// Memory map / page register.
    Mm = 11,
}

impl Register {
    /// Every writable slot in bank order.
    pub const ALL: [Self; 12] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::X,
        Self::Y,
        Self::Bp,
        Self::Sp,
        Self::Flags,
        Self::Pc,
        Self::Mp,
        Self::Mm,
    ];

    /// Slot index within the register bank.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Wire address of this register.
    #[must_use]
    pub const fn address(self) -> u32 {
        register_address(self.index())
    }

    /// Conventional lower-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
            Self::D => "d",
            Self::X => "x",
            Self::Y => "y",
            Self::Bp => "bp",
            Self::Sp => "sp",
            Self::Flags => "flags",
            Self::Pc => "pc",
            Self::Mp => "mp",
            Self::Mm => "mm",
        }
    }

    /// Decodes a bank index back into a register.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        if (index as usize) < Self::ALL.len() {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown register name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown register `{0}`")]
pub struct ParseRegisterError(String);

impl FromStr for Register {
    type Err = ParseRegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|reg| reg.name() == lower)
            .ok_or_else(|| ParseRegisterError(s.to_string()))
    }
}

/// Decomposed `STATUS` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct StatusFlags {
    /// Extend mode (`EX`).
    pub extend: bool,
    /// Interrupts disabled (`ID`).
    pub interrupt_disable: bool,
    /// Interrupt in service (`IS`).
    pub interrupt_set: bool,
    /// Single-step mode (`SS`).
    pub single_step: bool,
    /// Negative (`N`).
    pub negative: bool,
    /// Carry (`C`).
    pub carry: bool,
    /// Overflow (`V`).
    pub overflow: bool,
    /// Zero (`Z`).
    pub zero: bool,
}

impl StatusFlags {
    /// Splits a `STATUS` byte into flags.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            extend: bits & STATUS_EX != 0,
            interrupt_disable: bits & STATUS_ID != 0,
            interrupt_set: bits & STATUS_IS != 0,
            single_step: bits & STATUS_SS != 0,
            negative: bits & STATUS_N != 0,
            carry: bits & STATUS_C != 0,
            overflow: bits & STATUS_V != 0,
            zero: bits & STATUS_Z != 0,
        }
    }

    /// Packs the flags back into a `STATUS` byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        let mut bits = 0;
        if self.extend {
            bits |= STATUS_EX;
        }
        if self.interrupt_disable {
            bits |= STATUS_ID;
        }
        if self.interrupt_set {
            bits |= STATUS_IS;
        }
        if self.single_step {
            bits |= STATUS_SS;
        }
        if self.negative {
            bits |= STATUS_N;
        }
        if self.carry {
            bits |= STATUS_C;
        }
        if self.overflow {
            bits |= STATUS_V;
        }
        if self.zero {
            bits |= STATUS_Z;
        }
        bits
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = [
            (self.extend, "EX"),
            (self.interrupt_disable, "ID"),
            (self.interrupt_set, "IS"),
            (self.single_step, "SS"),
            (self.negative, "N"),
            (self.carry, "C"),
            (self.overflow, "V"),
            (self.zero, "Z"),
        ];
        for (index, (set, label)) in labels.into_iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            if set {
                f.write_str(label)?;
            } else {
                f.write_str(&label.to_ascii_lowercase())?;
            }
        }
        Ok(())
    }
}

/// Read-only view of the CPU register bank at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuSnapshot {
    gpr: [u16; 8],
    irq: u8,
    status: u8,
    flags: StatusFlags,
    pc: u16,
    mp: u16,
    mm: u16,
    cpu_cycles: u16,
    total_cycles: u16,
    instruction: u32,
}

impl CpuSnapshot {
    /// Decodes the 16 register-bank words.
    ///
    /// # Errors
    ///
    /// [`LinkError::ShortRead`] when fewer than 16 words are supplied.
    pub fn from_words(words: &[u16]) -> Result<Self, LinkError> {
        if words.len() < REGISTER_BANK_WORDS {
            return Err(LinkError::ShortRead {
                expected: REGISTER_BANK_WORDS,
                actual: words.len(),
            });
        }

        let mut gpr = [0; 8];
        gpr.copy_from_slice(&words[..8]);
        let [status, irq] = words[Register::Flags as usize].to_le_bytes();

        Ok(Self {
            gpr,
            irq,
            status,
            flags: StatusFlags::from_bits(status),
            pc: words[Register::Pc as usize],
            mp: words[Register::Mp as usize],
            mm: words[Register::Mm as usize],
            cpu_cycles: words[12],
            total_cycles: words[13],
            instruction: (u32::from(words[14]) << 16) | u32::from(words[15]),
        })
    }

    /// Value of a register slot as captured.
    #[must_use]
    pub const fn register(&self, reg: Register) -> u16 {
        match reg {
            Register::A
            | Register::B
            | Register::C
            | Register::D
            | Register::X
            | Register::Y
            | Register::Bp
            | Register::Sp => self.gpr[reg as usize],
            Register::Flags => u16::from_le_bytes([self.status, self.irq]),
            Register::Pc => self.pc,
            Register::Mp => self.mp,
            Register::Mm => self.mm,
        }
    }

    /// Pending-interrupt byte (high byte of the flags word).
    #[must_use]
    pub const fn irq(&self) -> u8 {
        self.irq
    }

    /// Raw `STATUS` byte.
    #[must_use]
    pub const fn status(&self) -> u8 {
        self.status
    }

    /// Decoded `STATUS` flags.
    #[must_use]
    pub const fn flags(&self) -> StatusFlags {
        self.flags
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.pc
    }

    /// CPU cycle counter.
    #[must_use]
    pub const fn cpu_cycles(&self) -> u16 {
        self.cpu_cycles
    }

    /// Total cycle counter.
    #[must_use]
    pub const fn total_cycles(&self) -> u16 {
        self.total_cycles
    }

    /// Two-word instruction prefetch buffer.
    #[must_use]
    pub const fn instruction(&self) -> u32 {
        self.instruction
    }
}

impl fmt::Display for CpuSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for reg in &Register::ALL[..8] {
            write!(f, "{:>2}={:04X} ", reg.name().to_ascii_uppercase(), self.register(*reg))?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "PC={:04X} MP={:04X} MM={:04X} IRQ={:02X} [{}]",
            self.pc, self.mp, self.mm, self.irq, self.flags
        )?;
        write!(
            f,
            "cycles={} total={} inst={:08X}",
            self.cpu_cycles, self.total_cycles, self.instruction
        )
    }
}

impl Link {
    /// Reads the whole register bank in one incrementing transaction.
    ///
    /// # Errors
    ///
    /// Any [`Link::transact`] error.
    pub async fn cpu_snapshot(&self) -> Result<CpuSnapshot, LinkError> {
        let words = self
            .transact(&Command::read(REGISTER_BANK_BASE, REGISTER_BANK_WORDS, true))
            .await?;
        CpuSnapshot::from_words(&words)
    }

    /// Overwrites one register.
    ///
    /// # Errors
    ///
    /// Any [`Link::transact`] error.
    pub async fn set_cpu_register(&self, which: Register, value: u16) -> Result<(), LinkError> {
        self.transact(&Command::write(which.address(), vec![value], false))
            .await
            .map(drop)
    }
}
