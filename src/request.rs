//! Request, command and data descriptor types
//!
//! A `Request` is one logical unit of work handed to the command executor:
//! one command, an optional stop command and an optional data descriptor.
//! The executor consumes it synchronously and hands it back with the
//! `response`, `error` and `bytes_transferred` fields populated.

use crate::error::{Error, Result};

/// Logical SD/MMC command, dispatched as a tagged variant rather than a raw
/// command index so the framer's translation table is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// CMD0 GO_IDLE_STATE
    GoIdleState,
    /// CMD2 ALL_SEND_CID
    AllSendCid,
    /// CMD3 SEND_RELATIVE_ADDR
    SendRelativeAddr,
    /// CMD5 IO_SEND_OP_COND
    IoSendOpCond,
    /// CMD6 SWITCH (data-bearing function switch)
    SwitchFunc,
    /// CMD7 SELECT_CARD
    SelectCard,
    /// CMD8 SEND_IF_COND
    SendIfCond,
    /// CMD9 SEND_CSD
    SendCsd,
    /// CMD12 STOP_TRANSMISSION
    StopTransmission,
    /// CMD16 SET_BLOCKLEN
    SetBlockLen,
    /// CMD17 READ_SINGLE_BLOCK
    ReadSingleBlock,
    /// CMD18 READ_MULTIPLE_BLOCK
    ReadMultipleBlock,
    /// CMD24 WRITE_BLOCK
    WriteBlock,
    /// CMD25 WRITE_MULTIPLE_BLOCK
    WriteMultipleBlock,
    /// CMD52 IO_RW_DIRECT
    IoRwDirect,
    /// CMD53 IO_RW_EXTENDED
    IoRwExtended,
    /// CMD55 APP_CMD prefix
    AppCmd,
    /// ACMD6 SET_BUS_WIDTH
    AppSetBusWidth,
    /// ACMD22 SEND_NUM_WR_BLOCKS
    AppSendNumWrBlocks,
    /// ACMD41 SD_SEND_OP_COND
    AppOpCond,
    /// ACMD51 SEND_SCR
    AppSendScr,
    /// Any other command index, passed through unframed
    Other(u8),
}

impl Opcode {
    /// The raw command index of this opcode.
    pub fn index(self) -> u8 {
        match self {
            Opcode::GoIdleState => 0,
            Opcode::AllSendCid => 2,
            Opcode::SendRelativeAddr => 3,
            Opcode::IoSendOpCond => 5,
            Opcode::SwitchFunc | Opcode::AppSetBusWidth => 6,
            Opcode::SelectCard => 7,
            Opcode::SendIfCond => 8,
            Opcode::SendCsd => 9,
            Opcode::StopTransmission => 12,
            Opcode::SetBlockLen => 16,
            Opcode::ReadSingleBlock => 17,
            Opcode::ReadMultipleBlock => 18,
            Opcode::WriteBlock => 24,
            Opcode::WriteMultipleBlock => 25,
            Opcode::IoRwDirect => 52,
            Opcode::IoRwExtended => 53,
            Opcode::AppCmd => 55,
            Opcode::AppSendNumWrBlocks => 22,
            Opcode::AppOpCond => 41,
            Opcode::AppSendScr => 51,
            Opcode::Other(n) => n,
        }
    }
}

/// Shape of the response a command expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// No response phase
    None,
    /// 48-bit response carrying one 32-bit field
    Short,
    /// 136-bit response carrying four 32-bit fields
    Long,
}

/// A decoded card response.
///
/// For `Long`, field 0 holds the most significant 32 bits of the 128-bit
/// payload, matching the card's transmission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    None,
    Short(u32),
    Long([u32; 4]),
}

/// Direction of a data transfer, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One command within a request.
#[derive(Debug)]
pub struct Command {
    pub opcode: Opcode,
    pub arg: u32,
    pub response_kind: ResponseKind,
    /// Populated by the executor on successful response capture.
    pub response: Response,
    /// `None` until the executor records the command's outcome.
    pub error: Option<Error>,
}

impl Command {
    pub fn new(opcode: Opcode, arg: u32, response_kind: ResponseKind) -> Self {
        Self {
            opcode,
            arg,
            response_kind,
            response: Response::None,
            error: None,
        }
    }
}

/// Data descriptor: direction, geometry and the scatter list.
///
/// Scatter buffers are slices of 16-bit words because the data port register
/// moves one 16-bit transfer unit per access; the 2-byte granularity
/// invariant is therefore structural.
#[derive(Debug)]
pub struct Data<'a, 'b> {
    pub direction: Direction,
    /// Transfer block size in bytes.
    pub block_size: u16,
    /// Total number of blocks across the whole scatter list.
    pub blocks: u16,
    /// Ordered scatter list of word buffers.
    pub sg: &'a mut [&'b mut [u16]],
    /// Total bytes moved; set to `blocks * block_size` only on success.
    pub bytes_transferred: usize,
}

impl<'a, 'b> Data<'a, 'b> {
    pub fn new(
        direction: Direction,
        block_size: u16,
        blocks: u16,
        sg: &'a mut [&'b mut [u16]],
    ) -> Self {
        Self {
            direction,
            block_size,
            blocks,
            sg,
            bytes_transferred: 0,
        }
    }

    /// Byte length of the first scatter buffer. The framer and the stop
    /// sequencing key SDIO single/multi decisions off this length.
    pub(crate) fn head_len(&self) -> usize {
        self.sg.first().map_or(0, |buf| buf.len() * 2)
    }

    /// Check the scatter list against the block geometry before any register
    /// traffic: every buffer must hold a whole number of blocks and the list
    /// must total exactly `blocks` of them. Block sizes are rounded up to
    /// the 16-bit transfer unit, as the data phase moves whole words.
    pub(crate) fn validate(&self) -> Result<()> {
        let unit = (self.block_size as usize + 1) & !1;
        if unit == 0 || self.blocks == 0 || self.sg.is_empty() {
            return Err(Error::InvalidDescriptor);
        }
        let mut total = 0usize;
        for buf in self.sg.iter() {
            let bytes = buf.len() * 2;
            if bytes == 0 || bytes % unit != 0 {
                return Err(Error::InvalidDescriptor);
            }
            total += bytes;
        }
        if total != unit * self.blocks as usize {
            return Err(Error::InvalidDescriptor);
        }
        Ok(())
    }
}

/// A logical unit of work: one command, optionally data, optionally a stop
/// command issued after the data phase.
#[derive(Debug)]
pub struct Request<'a, 'b> {
    pub cmd: Command,
    pub data: Option<Data<'a, 'b>>,
    pub stop: Option<Command>,
}

impl<'a, 'b> Request<'a, 'b> {
    /// A plain command request with no data phase.
    pub fn command(cmd: Command) -> Self {
        Self {
            cmd,
            data: None,
            stop: None,
        }
    }

    /// A data-bearing request.
    pub fn with_data(cmd: Command, data: Data<'a, 'b>) -> Self {
        Self {
            cmd,
            data: Some(data),
            stop: None,
        }
    }

    /// Attach a stop command, issued after the data phase completes.
    pub fn and_stop(mut self, stop: Command) -> Self {
        self.stop = Some(stop);
        self
    }
}
