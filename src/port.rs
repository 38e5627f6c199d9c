//! Register Access Port
//!
//! The SDHI register file is reached through accessor routines supplied by a
//! loaded firmware blob, not through a memory map owned by this driver. The
//! `RegisterPort` trait models that capability so the engine can be driven
//! against real firmware accessors or a deterministic test double.

use crate::regs::RegId;

/// Injected register access capability.
///
/// Implementations take `&self` because the command executor and the
/// interrupt bottom half access the port concurrently; any interior
/// mutability or volatility is the implementation's concern. Accessors are
/// expected to block internally while the controller is busy rather than
/// report failure, matching the firmware accessor contract.
pub trait RegisterPort {
    /// Read a 16-bit register of channel `ch`.
    fn read(&self, ch: usize, reg: RegId) -> u16;

    /// Write a 16-bit register of channel `ch`.
    fn write(&self, ch: usize, reg: RegId, value: u16);
}

impl<T: RegisterPort + ?Sized> RegisterPort for &T {
    fn read(&self, ch: usize, reg: RegId) -> u16 {
        (**self).read(ch, reg)
    }

    fn write(&self, ch: usize, reg: RegId, value: u16) {
        (**self).write(ch, reg, value)
    }
}
