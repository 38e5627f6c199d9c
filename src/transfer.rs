//! Interrupt-paced PIO data transfer engine
//!
//! Every data phase is a sequence of buffer-ready interrupts. The engine
//! unmasks the buffer interrupt, parks on the channel completion, then
//! moves one block through the 16-bit data port. Single-block transfers end
//! with an explicit wait for the access-end interrupt; multi-block
//! transfers leave access-end to the stop command that follows.

use crate::channel::Channel;
use crate::completion::WaitStatus;
use crate::error::{Error, Result};
use crate::port::RegisterPort;
use crate::regs::{self, RegId, INFO1, INFO2};
use crate::request::Data;

impl Channel {
    fn unmask_info2<P: RegisterPort>(&self, port: &P, sources: u16) {
        let mask = port.read(self.index(), RegId::Info2Mask);
        port.write(self.index(), RegId::Info2Mask, mask & !sources);
    }

    fn unmask_access_end<P: RegisterPort>(&self, port: &P) {
        let mask = port.read(self.index(), RegId::Info1Mask);
        port.write(
            self.index(),
            RegId::Info1Mask,
            mask & !(INFO1::ACCESS_END::SET.value),
        );
    }

    fn wait_block<P: RegisterPort>(&self, port: &P) -> Result<()> {
        match self.completion().wait(self.timeout()) {
            WaitStatus::Signaled => {
                self.completion().clear_ready();
                Ok(())
            }
            WaitStatus::Error | WaitStatus::TimedOut => Err(self.recover(port)),
        }
    }

    /// Block size in 16-bit words, read back from the size register. A
    /// single-block transfer rounds an odd byte count up to whole words.
    fn single_block_words<P: RegisterPort>(&self, port: &P) -> usize {
        (port.read(self.index(), RegId::Size) as usize + 1) / 2
    }

    fn multi_block_words<P: RegisterPort>(&self, port: &P) -> usize {
        port.read(self.index(), RegId::Size) as usize / 2
    }

    pub(crate) fn single_read<P: RegisterPort>(
        &self,
        port: &P,
        buf: &mut [u16],
    ) -> Result<()> {
        self.completion().clear_ready();
        self.unmask_info2(
            port,
            INFO2::BRE::SET.value | INFO2::BUF_ILL_READ::SET.value,
        );
        self.unmask_access_end(port);
        self.wait_block(port)?;

        let words = self.single_block_words(port);
        for slot in buf.iter_mut().take(words) {
            *slot = port.read(self.index(), RegId::Buf);
        }

        // Access end fires once the card releases the bus.
        self.wait_block(port)
    }

    pub(crate) fn single_write<P: RegisterPort>(
        &self,
        port: &P,
        buf: &[u16],
    ) -> Result<()> {
        self.completion().clear_ready();
        self.unmask_info2(
            port,
            INFO2::BWE::SET.value | INFO2::BUF_ILL_WRITE::SET.value,
        );
        self.unmask_access_end(port);
        self.wait_block(port)?;

        let words = self.single_block_words(port);
        for word in buf.iter().take(words) {
            port.write(self.index(), RegId::Buf, *word);
        }

        self.wait_block(port)
    }

    pub(crate) fn multi_read<P: RegisterPort>(
        &self,
        port: &P,
        data: &mut Data<'_, '_>,
    ) -> Result<()> {
        let words = self.multi_block_words(port);
        if words == 0 {
            return Err(Error::InvalidDescriptor);
        }
        for buf in data.sg.iter_mut() {
            self.completion().clear_ready();
            for chunk in buf.chunks_exact_mut(words) {
                self.unmask_info2(
                    port,
                    INFO2::BRE::SET.value | INFO2::BUF_ILL_READ::SET.value,
                );
                self.wait_block(port)?;
                for slot in chunk.iter_mut() {
                    *slot = port.read(self.index(), RegId::Buf);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn multi_write<P: RegisterPort>(
        &self,
        port: &P,
        data: &mut Data<'_, '_>,
    ) -> Result<()> {
        let words = self.multi_block_words(port);
        if words == 0 {
            return Err(Error::InvalidDescriptor);
        }
        for buf in data.sg.iter_mut() {
            self.completion().clear_ready();
            for chunk in buf.chunks_exact(words) {
                self.unmask_info2(
                    port,
                    INFO2::BWE::SET.value | INFO2::BUF_ILL_WRITE::SET.value,
                );
                self.wait_block(port)?;
                for word in chunk.iter() {
                    port.write(self.index(), RegId::Buf, *word);
                }
            }
        }
        Ok(())
    }

    /// Dispatch the data phase keyed on the physical opcode the framer
    /// emitted, since the single/multi split for SDIO extended transfers
    /// lives in the translated encoding rather than the command index.
    pub(crate) fn run_transfer<P: RegisterPort>(
        &self,
        port: &P,
        opcode: u16,
        data: &mut Data<'_, '_>,
    ) -> Result<()> {
        match opcode {
            18 | regs::CMD_IO_RW_EXT_MREAD => self.multi_read(port, data),
            25 | regs::CMD_IO_RW_EXT_MWRITE => self.multi_write(port, data),
            24 | regs::CMD_IO_RW_EXT_SWRITE => {
                if data.sg.is_empty() {
                    return Err(Error::InvalidDescriptor);
                }
                self.single_write(port, &*data.sg[0])
            }
            17 | regs::CMD_APP_SEND_SCR | regs::CMD_SWITCH
            | regs::CMD_IO_RW_EXT_SREAD => {
                if data.sg.is_empty() {
                    return Err(Error::InvalidDescriptor);
                }
                self.single_read(port, &mut *data.sg[0])
            }
            other => {
                log::error!("SDHI: no data path for opcode {:#06x}", other);
                Err(Error::UnsupportedOpcode(other))
            }
        }
    }
}
