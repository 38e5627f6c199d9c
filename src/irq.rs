//! Interrupt bottom half
//!
//! Runs on every controller interrupt with a snapshot of the two status
//! registers. Exactly one source is serviced per invocation, highest
//! priority first: card detect, then errors, then the completion sources
//! the executor is parked on. Serviced sources are acknowledged and
//! re-masked so they cannot re-fire before the executor consumes them; the
//! response-end status bit is deliberately left latched because the
//! executor checks it to tell a real response from a spurious wakeup.

use core::sync::atomic::Ordering;

use crate::channel::Channel;
use crate::port::RegisterPort;
use crate::regs::{self, RegId, INFO1, INFO2, SDIO_INFO1};

/// Host-level notifications the bottom half raises out of interrupt
/// context decisions.
pub trait HostEvents {
    /// A card was inserted or removed; the host should rescan the slot.
    fn card_detect_change(&self);

    /// The SDIO card raised its interrupt line.
    fn sdio_signal(&self);
}

impl Channel {
    /// Common part of the Info1 mask armed after a detect event. Each
    /// branch adds its own serviced edge, so the opposite edge stays
    /// enabled and the next insertion or removal is still seen.
    const DETECT_MASK_BASE: u16 = INFO1::RESP_END::SET.value
        | INFO1::ACCESS_END::SET.value
        | INFO1::DATA3_CARD_REMOVE::SET.value
        | INFO1::DATA3_CARD_INSERT::SET.value;

    fn notify_detect<E: HostEvents>(&self, port: &impl RegisterPort, events: &E) {
        // Collapse bursts of detect edges into one host notification.
        if !self.detect_pending.swap(true, Ordering::AcqRel) {
            let opt = port.read(self.index(), RegId::Option);
            port.write(self.index(), RegId::Option, opt | regs::OPTION_WIDTH_1);
            events.card_detect_change();
            self.detect_pending.store(false, Ordering::Release);
        }
    }

    /// Service one interrupt of channel `self`.
    pub fn interrupt<P: RegisterPort, E: HostEvents>(&self, port: &P, events: &E) {
        let ch = self.index();
        let state1 = port.read(ch, RegId::Info1);
        let state2 = port.read(ch, RegId::Info2);
        let info1 = regs::info1(state1);
        let info2 = regs::info2(state2);

        if info1.is_set(INFO1::CARD_INSERT) {
            port.write(ch, RegId::Info1, state1 & !INFO1::CARD_INSERT::SET.value);
            self.notify_detect(port, events);
            port.write(
                ch,
                RegId::Info1Mask,
                Self::DETECT_MASK_BASE | INFO1::CARD_INSERT::SET.value,
            );
            return;
        }

        if info1.is_set(INFO1::CARD_REMOVE) {
            port.write(ch, RegId::Info1, state1 & !INFO1::CARD_REMOVE::SET.value);
            self.notify_detect(port, events);
            port.write(
                ch,
                RegId::Info1Mask,
                Self::DETECT_MASK_BASE | INFO1::CARD_REMOVE::SET.value,
            );
            // A removed card cannot hold SDIO interrupts pending.
            port.write(ch, RegId::SdioInfo1Mask, regs::SDIO_MASK_ALL);
            port.write(ch, RegId::SdioMode, regs::SDIO_MODE_OFF);
            return;
        }

        if state2 & regs::INFO2_ALL_ERR != 0 {
            log::debug!("SDHI: ch {} error irq, Info2 {:#06x}", ch, state2);
            port.write(ch, RegId::Info2, state2 & !regs::INFO2_ALL_ERR);
            let mask = port.read(ch, RegId::Info2Mask);
            port.write(ch, RegId::Info2Mask, mask | regs::INFO2_ALL_ERR);
            self.completion().signal_error();
            return;
        }

        if info1.is_set(INFO1::RESP_END) {
            // Leave the status bit for the executor; only silence the
            // source.
            let mask = port.read(ch, RegId::Info1Mask);
            port.write(ch, RegId::Info1Mask, mask | INFO1::RESP_END::SET.value);
            self.completion().signal();
            return;
        }

        if info2.is_set(INFO2::BRE) {
            port.write(ch, RegId::Info2, state2 & !INFO2::BRE::SET.value);
            let mask = port.read(ch, RegId::Info2Mask);
            port.write(
                ch,
                RegId::Info2Mask,
                mask | INFO2::BRE::SET.value | INFO2::BUF_ILL_READ::SET.value,
            );
            self.completion().signal();
            return;
        }

        if info2.is_set(INFO2::BWE) {
            port.write(ch, RegId::Info2, state2 & !INFO2::BWE::SET.value);
            let mask = port.read(ch, RegId::Info2Mask);
            port.write(
                ch,
                RegId::Info2Mask,
                mask | INFO2::BWE::SET.value | INFO2::BUF_ILL_WRITE::SET.value,
            );
            self.completion().signal();
            return;
        }

        if info1.is_set(INFO1::ACCESS_END) {
            port.write(ch, RegId::Info1, state1 & !INFO1::ACCESS_END::SET.value);
            let mask = port.read(ch, RegId::Info1Mask);
            port.write(ch, RegId::Info1Mask, mask | INFO1::ACCESS_END::SET.value);
            self.completion().signal();
        }
    }

    /// Service one SDIO interrupt of channel `self`.
    ///
    /// The card interrupt is level-triggered through the card's own
    /// interrupt enable; it is acknowledged and then confirmed by a
    /// re-read, since an acknowledge can race the card dropping the line.
    pub fn sdio_interrupt<P: RegisterPort, E: HostEvents>(
        &self,
        port: &P,
        events: &E,
    ) {
        let ch = self.index();
        let state = port.read(ch, RegId::SdioInfo1);
        let sdio = regs::sdio_info1(state);

        if sdio.is_set(SDIO_INFO1::IOIRQ) {
            port.write(ch, RegId::SdioInfo1, state & !SDIO_INFO1::IOIRQ::SET.value);
            let confirm = regs::sdio_info1(port.read(ch, RegId::SdioInfo1));
            if confirm.is_set(SDIO_INFO1::IOIRQ) {
                events.sdio_signal();
            }
        } else if sdio.is_set(SDIO_INFO1::EXPUB52) {
            port.write(
                ch,
                RegId::SdioInfo1,
                state & !SDIO_INFO1::EXPUB52::SET.value,
            );
        } else if sdio.is_set(SDIO_INFO1::EXWT) {
            port.write(ch, RegId::SdioInfo1, state & !SDIO_INFO1::EXWT::SET.value);
        } else {
            log::error!("SDHI: ch {} spurious sdio irq {:#06x}", ch, state);
        }
    }
}
