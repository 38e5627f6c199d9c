//! SDHI Register Definitions
//!
//! The SDHI controller is not memory mapped from the driver's point of view:
//! every access goes through a firmware-provided accessor that takes a small
//! register index. `RegId` names those indices by function. The status and
//! interrupt registers that are bit-tested all over the driver are defined as
//! type-safe tock-registers bitfields; opcode translations and multi-bit
//! group masks are plain constants.

use tock_registers::register_bitfields;
use tock_registers::LocalRegisterCopy;

/// Register indices of the firmware accessor interface.
///
/// The discriminants are the indices the firmware blob expects, not hardware
/// offsets. `AppCmd` is a pseudo-register: reading it yields the opcode
/// modifier to OR in when an application-command prefix is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegId {
    /// Command register
    Cmd = 1,
    /// Card port select
    PortSel = 2,
    /// Argument, low 16 bits
    ArgLo = 3,
    /// Argument, high 16 bits
    ArgHi = 4,
    /// Stop / block-count-enable control
    Stop = 5,
    /// Block count for multi-block transfers
    SecCnt = 6,
    /// Response word 0 (least significant)
    Resp0 = 7,
    Resp1 = 8,
    Resp2 = 9,
    Resp3 = 10,
    Resp4 = 11,
    Resp5 = 12,
    Resp6 = 13,
    /// Response word 7 (most significant)
    Resp7 = 14,
    /// Card status / completion interrupt status
    Info1 = 15,
    /// Buffer / error interrupt status
    Info2 = 16,
    /// Interrupt mask for `Info1` (set bit = masked)
    Info1Mask = 17,
    /// Interrupt mask for `Info2` (set bit = masked)
    Info2Mask = 18,
    /// Clock divider and enable
    ClkCtrl = 19,
    /// Transfer block size
    Size = 20,
    /// Bus width and timeout options
    Option = 21,
    /// Extended error status 1 (CRC / command format)
    ErrSts1 = 22,
    /// Extended error status 2 (system-level)
    ErrSts2 = 23,
    /// Data port, one 16-bit transfer unit per access
    Buf = 24,
    /// SDIO addressing mode
    SdioMode = 25,
    /// SDIO interrupt status
    SdioInfo1 = 26,
    /// SDIO interrupt mask
    SdioInfo1Mask = 27,
    /// Software reset
    SoftRst = 29,
    /// Byte-swap control for big-endian hosts
    ExtSwap = 31,
    /// Pseudo-register: pending app-command opcode modifier
    AppCmd = 50,
}

register_bitfields![u16,
    /// Card status / completion interrupt status (`Info1`); the same layout
    /// is used by its mask register.
    pub INFO1 [
        /// Response has been latched in the response registers
        RESP_END OFFSET(0) NUMBITS(1) [],
        /// Data access (read or write) completed
        ACCESS_END OFFSET(2) NUMBITS(1) [],
        /// Card removal detected
        CARD_REMOVE OFFSET(3) NUMBITS(1) [],
        /// Card insertion detected
        CARD_INSERT OFFSET(4) NUMBITS(1) [],
        /// Card detect pin level (card present when set)
        CARD_PRESENT OFFSET(5) NUMBITS(1) [],
        /// Write protect pin level (writable when set)
        WRITE_PROTECT OFFSET(7) NUMBITS(1) [],
        /// Card removal detected on DAT3
        DATA3_CARD_REMOVE OFFSET(8) NUMBITS(1) [],
        /// Card insertion detected on DAT3
        DATA3_CARD_INSERT OFFSET(9) NUMBITS(1) [],
        /// DAT3 pin level
        DATA3 OFFSET(10) NUMBITS(1) []
    ],

    /// Buffer / error interrupt status (`Info2`); the same layout is used by
    /// its mask register.
    pub INFO2 [
        /// Command format error
        CMD_ERROR OFFSET(0) NUMBITS(1) [],
        /// CRC error
        CRC_ERROR OFFSET(1) NUMBITS(1) [],
        /// End bit error
        END_ERROR OFFSET(2) NUMBITS(1) [],
        /// Data timeout
        TIMEOUT OFFSET(3) NUMBITS(1) [],
        /// Illegal write access to the buffer
        BUF_ILL_WRITE OFFSET(4) NUMBITS(1) [],
        /// Illegal read access from the buffer
        BUF_ILL_READ OFFSET(5) NUMBITS(1) [],
        /// Response timeout
        RESP_TIMEOUT OFFSET(6) NUMBITS(1) [],
        /// DAT0 pin level
        DAT0 OFFSET(7) NUMBITS(1) [],
        /// Buffer read enable: a full block is ready to be read
        BRE OFFSET(8) NUMBITS(1) [],
        /// Buffer write enable: the buffer can accept a full block
        BWE OFFSET(9) NUMBITS(1) [],
        /// Command/clock busy, divider must not be changed
        CLOCK_BUSY OFFSET(14) NUMBITS(1) [],
        /// Illegal access error
        ILLEGAL_ACCESS OFFSET(15) NUMBITS(1) []
    ],

    /// SDIO interrupt status (`SdioInfo1`)
    pub SDIO_INFO1 [
        /// SDIO card interrupt (IO IRQ)
        IOIRQ OFFSET(0) NUMBITS(1) [],
        /// Extended: interrupt during 52 clock cycles after bus power-up
        EXPUB52 OFFSET(14) NUMBITS(1) [],
        /// Extended: interrupt during bus wait
        EXWT OFFSET(15) NUMBITS(1) []
    ]
];

/// Wrap a raw `Info1` value for type-safe bit tests.
#[inline]
pub fn info1(value: u16) -> LocalRegisterCopy<u16, INFO1::Register> {
    LocalRegisterCopy::new(value)
}

/// Wrap a raw `Info2` value for type-safe bit tests.
#[inline]
pub fn info2(value: u16) -> LocalRegisterCopy<u16, INFO2::Register> {
    LocalRegisterCopy::new(value)
}

/// Wrap a raw `SdioInfo1` value for type-safe bit tests.
#[inline]
pub fn sdio_info1(value: u16) -> LocalRegisterCopy<u16, SDIO_INFO1::Register> {
    LocalRegisterCopy::new(value)
}

// ============================================================================
// Group masks and fixed register values
// ============================================================================

/// All error sources of `Info2` (ILA, BRE-path illegal accesses, response
/// timeouts, CRC, command format)
pub const INFO2_ALL_ERR: u16 = 0x807F;

/// Every interrupt source masked
pub const MASK_ALL: u16 = 0xFFFF;

/// `Info1` mask programmed at attach: response end, access end, removal and
/// DAT3 detect sources masked; insertion left enabled
pub const INFO1_MASK_ATTACH: u16 =
    (1 << 0) | (1 << 2) | (1 << 3) | (1 << 8) | (1 << 9);

/// `Info1` mask written after error recovery: re-arm DAT3 card detect only
pub const INFO1_MASK_DETECT_REARM: u16 = (1 << 8) | (1 << 9);

/// `ErrSts1` CRC error group
pub const ERR1_CRC: u16 = (1 << 11) | (1 << 10) | (1 << 9) | (1 << 8) | (1 << 5);

/// `ErrSts1` command format error group
pub const ERR1_CMD: u16 = 0x001F;

/// `ErrSts2` system-level error group
pub const ERR2_SYS: u16 = 0x007F;

/// `ErrSts2` stop / response timeout sub-bits
pub const ERR2_STOP_TIMEOUT: u16 = 0x0003;

/// `Stop` register: enable block counting for multi-block commands
pub const STOP_SEC_ENABLE: u16 = 0x0100;

/// `ClkCtrl` clock output enable
pub const CLK_ENABLE: u16 = 0x0100;

/// `ClkCtrl` divider for the 400 kHz identification clock
pub const CLK_DIV_INIT: u16 = 0x0040;

/// `ClkCtrl` divider for 25 MHz SD data transfer
pub const CLK_DIV_DATA: u16 = 0x0000;

/// `ClkCtrl` divider for 50 MHz high-speed transfer
pub const CLK_DIV_HS: u16 = 0x0000;

/// `ClkCtrl` divider for 20 MHz MMC transfer
pub const CLK_DIV_MMC: u16 = 0x0000;

/// `Option` register: 1-bit bus width flag (cleared for 4-bit)
pub const OPTION_WIDTH_1: u16 = 0x8000;

/// `SdioMode` values
pub const SDIO_MODE_ON: u16 = 0x0001;
pub const SDIO_MODE_OFF: u16 = 0x0000;

/// `SdioInfo1Mask` values
pub const SDIO_MASK_UNMASK: u16 = 0x0006;
pub const SDIO_MASK_ALL: u16 = 0xC007;

/// `SoftRst` values: reset is asserted low
pub const SOFT_RST_ASSERT: u16 = 0x0000;
pub const SOFT_RST_RELEASE: u16 = 0x0001;

/// `PortSel`: route the controller to card port 0
pub const PORT_SEL_PORT0: u16 = 0x0100;

/// `ExtSwap`: byte-swap the data port on big-endian hosts
pub const EXT_SWAP_ENABLE: u16 = 0x00C0;

// ============================================================================
// Physical command register encodings
// ============================================================================

// Some logical commands do not map 1:1 onto their command index: the
// controller needs mode bits in the upper byte of the command register to
// describe the response and data phase. These are the translated encodings
// the command framer emits.

/// ACMD51 SEND_SCR with data phase
pub const CMD_APP_SEND_SCR: u16 = 0x0073;
/// CMD6 SWITCH with data phase
pub const CMD_SWITCH: u16 = 0x1C06;
/// CMD5 IO_SEND_OP_COND
pub const CMD_IO_SEND_OP_COND: u16 = 0x0705;
/// CMD52 IO_RW_DIRECT
pub const CMD_IO_RW_DIRECT: u16 = 0x0434;
/// CMD53 IO_RW_EXTENDED, single-block read
pub const CMD_IO_RW_EXT_SREAD: u16 = 0x1C35;
/// CMD53 IO_RW_EXTENDED, multi-block read
pub const CMD_IO_RW_EXT_MREAD: u16 = 0x7C35;
/// CMD53 IO_RW_EXTENDED, single-block write
pub const CMD_IO_RW_EXT_SWRITE: u16 = 0x0C35;
/// CMD53 IO_RW_EXTENDED, multi-block write
pub const CMD_IO_RW_EXT_MWRITE: u16 = 0x6C35;
