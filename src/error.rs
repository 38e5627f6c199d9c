//! SDHI error taxonomy

/// Terminal outcome attached to a failed command or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No card present in the slot
    NoMedium,
    /// Command or data phase timed out
    Timeout,
    /// CRC or command format error
    DataCorruption,
    /// System-level controller error
    SystemError,
    /// Command completed but no valid response was latched
    ResponseFormat,
    /// The data transfer engine cannot map this physical opcode
    UnsupportedOpcode(u16),
    /// Scatter list inconsistent with the block size / block count
    InvalidDescriptor,
}

pub type Result<T> = core::result::Result<T, Error>;
