//! Command and data engine for the SuperH SDHI SD/MMC host controller.
//!
//! The controller's register file is reached through firmware-provided
//! accessor routines rather than a memory map, modeled here by the
//! [`port::RegisterPort`] trait. A [`channel::Channel`] holds the per-slot
//! state; callers submit [`request::Request`]s, which the executor drives
//! synchronously while the interrupt bottom half ([`Channel::interrupt`])
//! paces command completion and PIO block transfer.
//!
//! [`Channel::interrupt`]: channel::Channel::interrupt

#![cfg_attr(not(test), no_std)]

pub mod channel;
pub mod completion;
pub mod error;
pub mod irq;
pub mod port;
pub mod regs;
pub mod request;

mod executor;
mod response;
mod transfer;

#[cfg(test)]
mod testutil;

pub use channel::{ActiveTransfer, BusWidth, Channel, ClockMode, Config};
pub use completion::{Completion, WaitStatus};
pub use error::{Error, Result};
pub use irq::HostEvents;
pub use port::RegisterPort;
pub use request::{
    Command, Data, Direction, Opcode, Request, Response, ResponseKind,
};
