//! Test double for the firmware register accessors.
//!
//! `MockPort` stores the register file in an array and replays the
//! controller's interrupt behavior inline, at the hardware-faithful
//! moments: a command write latches a response, unmasking a buffer
//! interrupt makes the next block ready, and draining the data port raises
//! access end. Everything fires synchronously inside `read`/`write`, so
//! tests stay single threaded and deterministic.

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use crate::completion::Completion;
use crate::port::RegisterPort;
use crate::regs::RegId;

/// How the mock reacts to a command register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Respond {
    /// Latch the response-end status bit and signal completion.
    Latch,
    /// Signal completion without latching a response.
    SignalOnly,
    /// Never answer; the waiter times out.
    Silent,
    /// Signal the error branch.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArmMode {
    None,
    Read,
    Write,
}

const RESP_END: u16 = 1 << 0;
const BRE: u16 = 1 << 8;
const BWE: u16 = 1 << 9;
const IOIRQ: u16 = 1 << 0;

pub struct MockPort<'a> {
    comp: Option<&'a Completion>,
    regs: RefCell<[u16; 64]>,
    rx: RefCell<VecDeque<u16>>,
    tx: RefCell<Vec<u16>>,
    writes: RefCell<Vec<(RegId, u16)>>,
    reads: RefCell<Vec<RegId>>,
    respond: Cell<Respond>,
    arm: Cell<ArmMode>,
    blocks: Cell<u16>,
    words_per_block: Cell<usize>,
    blocks_fired: Cell<u16>,
    port_words: Cell<usize>,
    access_end_fired: Cell<bool>,
    fail_at: Cell<Option<u16>>,
    hold_sdio: Cell<bool>,
}

impl MockPort<'static> {
    pub fn new() -> Self {
        Self::build(None)
    }
}

impl<'a> MockPort<'a> {
    pub fn with_completion(comp: &'a Completion) -> Self {
        Self::build(Some(comp))
    }

    fn build(comp: Option<&'a Completion>) -> Self {
        let mut regs = [0u16; 64];
        // Reset state: every interrupt source masked.
        regs[RegId::Info1Mask as usize] = 0xFFFF;
        regs[RegId::Info2Mask as usize] = 0xFFFF;
        Self {
            comp,
            regs: RefCell::new(regs),
            rx: RefCell::new(VecDeque::new()),
            tx: RefCell::new(Vec::new()),
            writes: RefCell::new(Vec::new()),
            reads: RefCell::new(Vec::new()),
            respond: Cell::new(Respond::Latch),
            arm: Cell::new(ArmMode::None),
            blocks: Cell::new(0),
            words_per_block: Cell::new(0),
            blocks_fired: Cell::new(0),
            port_words: Cell::new(0),
            access_end_fired: Cell::new(false),
            fail_at: Cell::new(None),
            hold_sdio: Cell::new(false),
        }
    }

    pub fn set_reg(&self, reg: RegId, value: u16) {
        self.regs.borrow_mut()[reg as usize] = value;
    }

    pub fn reg(&self, reg: RegId) -> u16 {
        self.regs.borrow()[reg as usize]
    }

    /// Every write performed through the port, in order.
    pub fn writes(&self) -> Vec<(RegId, u16)> {
        self.writes.borrow().clone()
    }

    /// Every register read performed through the port, in order.
    pub fn reads(&self) -> Vec<RegId> {
        self.reads.borrow().clone()
    }

    pub fn set_respond(&self, mode: Respond) {
        self.respond.set(mode);
    }

    /// Arm a read data phase: each unmask of the buffer-read interrupt
    /// makes the next of `blocks` blocks ready, and draining
    /// `blocks * words_per_block` words from the data port raises access
    /// end.
    pub fn arm_read_blocks(&self, blocks: u16, words_per_block: usize) {
        self.arm.set(ArmMode::Read);
        self.blocks.set(blocks);
        self.words_per_block.set(words_per_block);
    }

    /// Arm a write data phase, symmetric to [`Self::arm_read_blocks`].
    pub fn arm_write_blocks(&self, blocks: u16, words_per_block: usize) {
        self.arm.set(ArmMode::Write);
        self.blocks.set(blocks);
        self.words_per_block.set(words_per_block);
    }

    /// Make the zero-based `block` fire the error branch instead of
    /// block-ready.
    pub fn fail_at_block(&self, block: u16) {
        self.fail_at.set(Some(block));
    }

    /// Keep the SDIO interrupt line asserted across acknowledge writes.
    pub fn hold_sdio_irq(&self, hold: bool) {
        self.hold_sdio.set(hold);
    }

    /// Words pushed through the data port by the driver.
    pub fn tx(&self) -> Vec<u16> {
        self.tx.borrow().clone()
    }

    /// Queue words the data port will yield on reads.
    pub fn queue_rx(&self, words: &[u16]) {
        self.rx.borrow_mut().extend(words.iter().copied());
    }

    fn signal(&self) {
        if let Some(comp) = self.comp {
            comp.signal();
        }
    }

    fn signal_error(&self) {
        if let Some(comp) = self.comp {
            comp.signal_error();
        }
    }

    fn fire_block(&self) {
        let fired = self.blocks_fired.get();
        if self.fail_at.get() == Some(fired) {
            self.signal_error();
        } else {
            self.signal();
        }
        self.blocks_fired.set(fired + 1);
    }

    fn maybe_access_end(&self) {
        let total = self.blocks.get() as usize * self.words_per_block.get();
        if total > 0 && self.port_words.get() == total && !self.access_end_fired.get() {
            self.access_end_fired.set(true);
            self.signal();
        }
    }
}

impl RegisterPort for MockPort<'_> {
    fn read(&self, _ch: usize, reg: RegId) -> u16 {
        self.reads.borrow_mut().push(reg);
        if reg == RegId::Buf {
            let word = self.rx.borrow_mut().pop_front().unwrap_or(0);
            if self.arm.get() == ArmMode::Read {
                self.port_words.set(self.port_words.get() + 1);
                self.maybe_access_end();
            }
            return word;
        }
        self.regs.borrow()[reg as usize]
    }

    fn write(&self, _ch: usize, reg: RegId, value: u16) {
        self.writes.borrow_mut().push((reg, value));
        match reg {
            RegId::Cmd => {
                self.regs.borrow_mut()[reg as usize] = value;
                match self.respond.get() {
                    Respond::Latch => {
                        self.regs.borrow_mut()[RegId::Info1 as usize] |= RESP_END;
                        self.signal();
                    }
                    Respond::SignalOnly => self.signal(),
                    Respond::Silent => {}
                    Respond::Error => self.signal_error(),
                }
            }
            RegId::Info2Mask => {
                let armed_bit = match self.arm.get() {
                    ArmMode::Read => BRE,
                    ArmMode::Write => BWE,
                    ArmMode::None => {
                        self.regs.borrow_mut()[reg as usize] = value;
                        return;
                    }
                };
                let prev = self.regs.borrow()[reg as usize];
                let unmasked = prev & armed_bit != 0 && value & armed_bit == 0;
                // Keep the armed bit masked in the stored value so the next
                // unmask is a fresh edge.
                self.regs.borrow_mut()[reg as usize] = value | armed_bit;
                if unmasked && self.blocks_fired.get() < self.blocks.get() {
                    self.fire_block();
                }
            }
            RegId::Buf => {
                self.tx.borrow_mut().push(value);
                if self.arm.get() == ArmMode::Write {
                    self.port_words.set(self.port_words.get() + 1);
                    self.maybe_access_end();
                }
            }
            RegId::SdioInfo1 => {
                let stored = if self.hold_sdio.get() {
                    value | IOIRQ
                } else {
                    value
                };
                self.regs.borrow_mut()[reg as usize] = stored;
            }
            _ => {
                self.regs.borrow_mut()[reg as usize] = value;
            }
        }
    }
}
