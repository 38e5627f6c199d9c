//! Per-channel controller state
//!
//! A `Channel` owns everything the executor and the interrupt bottom half
//! share for one SDHI instance: the completion flags, the timeout budget,
//! the clock mode and the metadata of the transfer in flight. Register
//! access always goes through a caller-supplied [`RegisterPort`], so the
//! channel itself holds no hardware handle.

use core::sync::atomic::AtomicBool;

use spin::Mutex;

use crate::completion::Completion;
use crate::error::Error;
use crate::port::RegisterPort;
use crate::regs::{self, RegId, INFO1, INFO2};
use crate::request::Direction;

/// Tunables fixed at channel creation.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Completion wait budget in 10 ms units.
    pub timeout: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self { timeout: 1000 }
    }
}

/// Card clock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Clock gated off
    Off,
    /// 400 kHz identification clock
    Init,
    /// 25 MHz SD transfer clock
    Data,
    /// 50 MHz high-speed clock
    HighSpeed,
    /// 20 MHz MMC clock
    Mmc,
}

/// Card bus width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    One,
    Four,
}

/// Geometry of the transfer currently in flight, recorded so the bottom
/// half and recovery paths can reason about the data phase without holding
/// the request itself.
#[derive(Debug, Clone, Copy)]
pub struct ActiveTransfer {
    pub direction: Direction,
    pub block_size: u16,
    pub blocks: u16,
}

/// One SDHI controller channel.
pub struct Channel {
    ch: usize,
    config: Config,
    clock: Mutex<ClockMode>,
    active: Mutex<Option<ActiveTransfer>>,
    completion: Completion,
    pub(crate) detect_pending: AtomicBool,
}

impl Channel {
    pub fn new(ch: usize, config: Config) -> Self {
        Self {
            ch,
            config,
            clock: Mutex::new(ClockMode::Off),
            active: Mutex::new(None),
            completion: Completion::new(),
            detect_pending: AtomicBool::new(false),
        }
    }

    /// Channel index passed to the register port on every access.
    pub fn index(&self) -> usize {
        self.ch
    }

    /// The completion flags the interrupt bottom half signals.
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    pub(crate) fn timeout(&self) -> u32 {
        self.config.timeout
    }

    /// Geometry of the data phase currently in flight, if any.
    pub fn active_transfer(&self) -> Option<ActiveTransfer> {
        *self.active.lock()
    }

    pub(crate) fn set_active(&self, meta: ActiveTransfer) {
        *self.active.lock() = Some(meta);
    }

    pub(crate) fn clear_active(&self) {
        *self.active.lock() = None;
    }

    /// Bring the channel to a known state and arm card-detect interrupts.
    pub fn attach<P: RegisterPort>(&self, port: &P) {
        self.sync_reset(port);
        port.write(self.ch, RegId::PortSel, regs::PORT_SEL_PORT0);
        if cfg!(target_endian = "big") {
            // The data port presents little-endian words; swap them on
            // big-endian hosts so buffers hold card byte order.
            port.write(self.ch, RegId::ExtSwap, regs::EXT_SWAP_ENABLE);
        }
        port.write(self.ch, RegId::Info1Mask, regs::INFO1_MASK_ATTACH);
        log::info!("SDHI: channel {} attached", self.ch);
    }

    /// Mask every interrupt source and forget channel state.
    pub fn detach<P: RegisterPort>(&self, port: &P) {
        port.write(self.ch, RegId::Info1Mask, regs::MASK_ALL);
        port.write(self.ch, RegId::Info2Mask, regs::MASK_ALL);
        self.completion.clear_all();
        self.clear_active();
        *self.clock.lock() = ClockMode::Off;
        log::info!("SDHI: channel {} detached", self.ch);
    }

    /// Pulse the software reset and re-enable the clock output.
    pub fn sync_reset<P: RegisterPort>(&self, port: &P) {
        port.write(self.ch, RegId::SoftRst, regs::SOFT_RST_ASSERT);
        port.write(self.ch, RegId::SoftRst, regs::SOFT_RST_RELEASE);
        let clk = port.read(self.ch, RegId::ClkCtrl);
        port.write(self.ch, RegId::ClkCtrl, clk | regs::CLK_ENABLE);
    }

    /// Card detect pin level.
    pub fn card_present<P: RegisterPort>(&self, port: &P) -> bool {
        regs::info1(port.read(self.ch, RegId::Info1)).is_set(INFO1::CARD_PRESENT)
    }

    /// Write protect pin level; the pin reads high when the card is
    /// writable.
    pub fn read_only<P: RegisterPort>(&self, port: &P) -> bool {
        !regs::info1(port.read(self.ch, RegId::Info1)).is_set(INFO1::WRITE_PROTECT)
    }

    /// Reprogram the card clock divider. Refused while the controller
    /// reports the clock line busy, since changing the divider mid-command
    /// corrupts the transaction.
    pub fn set_clock<P: RegisterPort>(&self, port: &P, mode: ClockMode) {
        *self.clock.lock() = mode;
        if regs::info2(port.read(self.ch, RegId::Info2)).is_set(INFO2::CLOCK_BUSY) {
            log::error!("SDHI: channel {} clock busy, divider unchanged", self.ch);
            return;
        }
        let clk = port.read(self.ch, RegId::ClkCtrl);
        port.write(self.ch, RegId::ClkCtrl, clk & !regs::CLK_ENABLE);
        let div = match mode {
            ClockMode::Off => return,
            ClockMode::Init => regs::CLK_DIV_INIT,
            ClockMode::Data => regs::CLK_DIV_DATA,
            ClockMode::HighSpeed => regs::CLK_DIV_HS,
            ClockMode::Mmc => regs::CLK_DIV_MMC,
        };
        port.write(self.ch, RegId::ClkCtrl, div);
        port.write(self.ch, RegId::ClkCtrl, div | regs::CLK_ENABLE);
    }

    /// Currently requested clock mode.
    pub fn clock_mode(&self) -> ClockMode {
        *self.clock.lock()
    }

    /// Switch the card bus between 1-bit and 4-bit data width.
    pub fn set_bus_width<P: RegisterPort>(&self, port: &P, width: BusWidth) {
        let opt = port.read(self.ch, RegId::Option);
        let opt = match width {
            BusWidth::One => opt | regs::OPTION_WIDTH_1,
            BusWidth::Four => opt & !regs::OPTION_WIDTH_1,
        };
        port.write(self.ch, RegId::Option, opt);
    }

    /// Enable or disable delivery of the SDIO card interrupt. Gating is
    /// mask-only; the SDIO addressing mode itself is switched by command
    /// framing and card removal.
    pub fn enable_sdio_irq<P: RegisterPort>(&self, port: &P, enable: bool) {
        let mask = if enable {
            regs::SDIO_MASK_UNMASK
        } else {
            regs::SDIO_MASK_ALL
        };
        port.write(self.ch, RegId::SdioInfo1Mask, mask);
    }

    /// Classify a failed command or data phase and put the controller back
    /// into a usable state.
    ///
    /// A missing card explains every error pattern and needs no reset; it
    /// is checked first. Otherwise the extended status registers decide:
    /// system-level errors outrank CRC and command format errors, and the
    /// stop/response timeout sub-bits refine a system error into a plain
    /// timeout. All paths except `NoMedium` reset the controller and re-arm
    /// card detect.
    pub(crate) fn recover<P: RegisterPort>(&self, port: &P) -> Error {
        self.completion.clear_all();

        if !self.card_present(port) {
            log::debug!("SDHI: channel {} error with no card present", self.ch);
            return Error::NoMedium;
        }

        let err2 = port.read(self.ch, RegId::ErrSts2);
        if err2 & regs::ERR2_SYS != 0 {
            let err = if err2 & regs::ERR2_STOP_TIMEOUT != 0 {
                Error::Timeout
            } else {
                Error::SystemError
            };
            log::error!(
                "SDHI: channel {} system error, ErrSts2 {:#06x}",
                self.ch,
                err2
            );
            self.sync_reset(port);
            port.write(self.ch, RegId::Info1Mask, regs::INFO1_MASK_DETECT_REARM);
            return err;
        }

        let err1 = port.read(self.ch, RegId::ErrSts1);
        let err = if err1 & (regs::ERR1_CRC | regs::ERR1_CMD) != 0 {
            Error::DataCorruption
        } else {
            Error::Timeout
        };
        log::error!(
            "SDHI: channel {} transfer error, ErrSts1 {:#06x}",
            self.ch,
            err1
        );
        self.sync_reset(port);
        port.write(self.ch, RegId::Info1Mask, regs::INFO1_MASK_DETECT_REARM);
        err
    }
}
