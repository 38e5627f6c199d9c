//! Command executor
//!
//! Drives one request through the controller: program the transfer
//! geometry, translate the logical opcode into the physical command
//! encoding, fire the command, wait for the response interrupt, decode the
//! response, run the data phase and sequence the stop command. The executor
//! returns only when the request has fully completed or failed, and records
//! the outcome in the request itself.

use crate::channel::{ActiveTransfer, Channel};
use crate::completion::WaitStatus;
use crate::error::{Error, Result};
use crate::port::RegisterPort;
use crate::regs::{self, RegId, INFO1, INFO2};
use crate::request::{Command, Data, Opcode, Request, ResponseKind};
use crate::response::decode_response;

/// CMD53 payloads above this byte count use the controller's multi-block
/// encoding and need an explicit access-end wait after the data phase.
const SDIO_SINGLE_MAX: usize = 512;

/// Info2 mask bits to clear so command-phase errors reach the bottom half.
fn cmd_error_sources() -> u16 {
    INFO2::CMD_ERROR::SET.value
        | INFO2::CRC_ERROR::SET.value
        | INFO2::END_ERROR::SET.value
        | INFO2::TIMEOUT::SET.value
        | INFO2::RESP_TIMEOUT::SET.value
        | INFO2::ILLEGAL_ACCESS::SET.value
}

/// Commands whose failure during card probing is expected; a flagged error
/// is reported as a plain timeout without touching the error classifier or
/// resetting the controller state machine mid-enumeration.
fn expected_to_fail(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::AllSendCid
            | Opcode::IoSendOpCond
            | Opcode::SelectCard
            | Opcode::SendIfCond
            | Opcode::AppCmd
    )
}

impl Channel {
    /// Translate a logical opcode into the physical command register
    /// encoding. Application commands pick up the pending prefix modifier
    /// from the `AppCmd` pseudo-register; CMD6 doubles as ACMD6 and is told
    /// apart by data presence; CMD53 splits into four encodings by
    /// direction and payload size.
    fn frame<P: RegisterPort>(
        &self,
        port: &P,
        opcode: Opcode,
        data: Option<&Data<'_, '_>>,
    ) -> u16 {
        let index = opcode.index() as u16;
        match opcode {
            Opcode::AppOpCond | Opcode::AppSendNumWrBlocks | Opcode::AppSendScr => {
                index | port.read(self.index(), RegId::AppCmd)
            }
            Opcode::AppSetBusWidth => match data {
                None => index | port.read(self.index(), RegId::AppCmd),
                Some(_) => regs::CMD_SWITCH,
            },
            Opcode::SwitchFunc => regs::CMD_SWITCH,
            Opcode::IoSendOpCond => regs::CMD_IO_SEND_OP_COND,
            Opcode::IoRwDirect => {
                port.write(self.index(), RegId::SdioMode, regs::SDIO_MODE_ON);
                port.write(
                    self.index(),
                    RegId::SdioInfo1Mask,
                    regs::SDIO_MASK_UNMASK,
                );
                regs::CMD_IO_RW_DIRECT
            }
            Opcode::IoRwExtended => {
                port.write(self.index(), RegId::SdioMode, regs::SDIO_MODE_ON);
                port.write(
                    self.index(),
                    RegId::SdioInfo1Mask,
                    regs::SDIO_MASK_UNMASK,
                );
                match data {
                    Some(d) => {
                        use crate::request::Direction;
                        let multi = d.head_len() > SDIO_SINGLE_MAX;
                        match (d.direction, multi) {
                            (Direction::Read, false) => regs::CMD_IO_RW_EXT_SREAD,
                            (Direction::Read, true) => regs::CMD_IO_RW_EXT_MREAD,
                            (Direction::Write, false) => regs::CMD_IO_RW_EXT_SWRITE,
                            (Direction::Write, true) => regs::CMD_IO_RW_EXT_MWRITE,
                        }
                    }
                    None => {
                        log::error!("SDHI: CMD53 issued without a data phase");
                        index
                    }
                }
            }
            _ => index,
        }
    }

    /// Whether the command uses the controller's automatic block counting,
    /// which also implies an automatic CMD12 on completion.
    fn is_multi_block(opcode: Opcode, data: &Data<'_, '_>) -> bool {
        match opcode {
            Opcode::ReadMultipleBlock | Opcode::WriteMultipleBlock => true,
            Opcode::IoRwExtended => data.head_len() > SDIO_SINGLE_MAX,
            _ => false,
        }
    }

    fn start_cmd<P: RegisterPort>(
        &self,
        port: &P,
        cmd: &mut Command,
        data: &mut Option<Data<'_, '_>>,
    ) -> Result<()> {
        let ch = self.index();

        if let Some(d) = data.as_ref() {
            if Self::is_multi_block(cmd.opcode, d) {
                port.write(ch, RegId::Stop, regs::STOP_SEC_ENABLE);
                port.write(ch, RegId::SecCnt, d.blocks);
            }
            port.write(ch, RegId::Size, d.block_size);
        }

        let opc = self.frame(port, cmd.opcode, data.as_ref());
        log::debug!(
            "SDHI: ch {} cmd {} -> {:#06x} arg {:#010x}",
            ch,
            cmd.opcode.index(),
            opc,
            cmd.arg
        );

        // Keep response-end masked while the argument is loaded so a stale
        // latch cannot fire early.
        let mask1 = port.read(ch, RegId::Info1Mask);
        port.write(ch, RegId::Info1Mask, mask1 | INFO1::RESP_END::SET.value);
        port.write(ch, RegId::ArgLo, cmd.arg as u16);
        port.write(ch, RegId::ArgHi, (cmd.arg >> 16) as u16);

        self.completion().clear_ready();
        port.write(ch, RegId::Cmd, opc);

        let mask1 = port.read(ch, RegId::Info1Mask);
        port.write(ch, RegId::Info1Mask, mask1 & !INFO1::RESP_END::SET.value);
        let mask2 = port.read(ch, RegId::Info2Mask);
        port.write(ch, RegId::Info2Mask, mask2 & !cmd_error_sources());

        match self.completion().wait(self.timeout()) {
            WaitStatus::Signaled => {}
            WaitStatus::TimedOut => return Err(self.recover(port)),
            WaitStatus::Error => {
                if expected_to_fail(cmd.opcode) {
                    self.completion().clear_all();
                    return Err(Error::Timeout);
                }
                log::error!("SDHI: ch {} cmd {} flagged error", ch, cmd.opcode.index());
                return Err(self.recover(port));
            }
        }

        if cmd.response_kind == ResponseKind::None {
            self.completion().clear_ready();
            return Ok(());
        }

        let info1 = port.read(ch, RegId::Info1);
        if !regs::info1(info1).is_set(INFO1::RESP_END) {
            // Signaled but nothing latched; the card answered with a frame
            // the controller did not accept as a response.
            return Err(Error::ResponseFormat);
        }
        port.write(ch, RegId::Info1, info1 & !INFO1::RESP_END::SET.value);

        cmd.response = decode_response(port, ch, cmd.response_kind);
        self.completion().clear_ready();

        if let Some(d) = data.as_mut() {
            self.run_transfer(port, opc, d)?;
            d.bytes_transferred = d.blocks as usize * d.block_size as usize;
        }
        Ok(())
    }

    /// Wait out the automatic CMD12 the controller issues after a counted
    /// multi-block transfer and capture its response.
    fn stop_cmd<P: RegisterPort>(&self, port: &P, stop: &mut Command) -> Result<()> {
        let ch = self.index();
        let mask1 = port.read(ch, RegId::Info1Mask);
        port.write(ch, RegId::Info1Mask, mask1 & !INFO1::ACCESS_END::SET.value);

        match self.completion().wait(self.timeout()) {
            WaitStatus::Signaled => {}
            WaitStatus::Error | WaitStatus::TimedOut => return Err(self.recover(port)),
        }
        stop.response = decode_response(port, ch, stop.response_kind);
        self.completion().clear_ready();
        Ok(())
    }

    /// Multi-block CMD53 has no stop command; the transfer still ends with
    /// an access-end interrupt that must be consumed.
    fn sdio_access_end<P: RegisterPort>(&self, port: &P) -> Result<()> {
        let ch = self.index();
        let mask1 = port.read(ch, RegId::Info1Mask);
        port.write(ch, RegId::Info1Mask, mask1 & !INFO1::ACCESS_END::SET.value);

        match self.completion().wait(self.timeout()) {
            WaitStatus::Signaled => {}
            WaitStatus::Error | WaitStatus::TimedOut => return Err(self.recover(port)),
        }
        self.completion().clear_ready();
        Ok(())
    }

    /// Execute one request to completion.
    ///
    /// Synchronous: returns once the command, data and stop phases have all
    /// finished. The outcome is both the return value and the `error`
    /// fields of the request's commands.
    pub fn request<P: RegisterPort>(
        &self,
        port: &P,
        mrq: &mut Request<'_, '_>,
    ) -> Result<()> {
        if !self.card_present(port) {
            mrq.cmd.error = Some(Error::NoMedium);
            return Err(Error::NoMedium);
        }

        if let Some(d) = mrq.data.as_ref() {
            if let Err(e) = d.validate() {
                mrq.cmd.error = Some(e);
                return Err(e);
            }
            self.set_active(ActiveTransfer {
                direction: d.direction,
                block_size: d.block_size,
                blocks: d.blocks,
            });
        }

        let Request { cmd, data, stop } = mrq;
        let res = self.start_cmd(port, cmd, data);
        cmd.error = res.err();
        self.clear_active();
        res?;

        if let Some(stop) = stop.as_mut() {
            let res = self.stop_cmd(port, stop);
            stop.error = res.err();
            res?;
        } else if cmd.opcode == Opcode::IoRwExtended
            && data.as_ref().map_or(false, |d| d.head_len() > SDIO_SINGLE_MAX)
        {
            let res = self.sdio_access_end(port);
            cmd.error = res.err();
            res?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Config;
    use crate::request::{Direction, Response};
    use crate::testutil::{MockPort, Respond};

    fn channel() -> Channel {
        Channel::new(0, Config { timeout: 2 })
    }

    fn present(mock: &MockPort<'_>) {
        mock.set_reg(RegId::Info1, 1 << 5);
    }

    #[test]
    fn plain_command_latches_short_response() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        present(&mock);
        mock.set_reg(RegId::Resp0, 0x0120);
        mock.set_reg(RegId::Resp1, 0x0000);

        let mut mrq = Request::command(Command::new(
            Opcode::SendRelativeAddr,
            0,
            ResponseKind::Short,
        ));
        assert_eq!(ch.request(&mock, &mut mrq), Ok(()));
        assert_eq!(mrq.cmd.response, Response::Short(0x0120));
        assert_eq!(mrq.cmd.error, None);

        let writes = mock.writes();
        let cmd_pos = writes
            .iter()
            .position(|(reg, _)| *reg == RegId::Cmd)
            .unwrap();
        assert_eq!(writes[cmd_pos], (RegId::Cmd, 3));
        // Argument is loaded before the command fires.
        assert!(writes[..cmd_pos]
            .iter()
            .any(|(reg, _)| *reg == RegId::ArgLo));
    }

    #[test]
    fn missing_card_fails_before_any_write() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());

        let mut mrq = Request::command(Command::new(
            Opcode::SendCsd,
            0x1234_0000,
            ResponseKind::Long,
        ));
        assert_eq!(ch.request(&mock, &mut mrq), Err(Error::NoMedium));
        assert_eq!(mrq.cmd.error, Some(Error::NoMedium));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn bad_descriptor_fails_before_any_write() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        present(&mock);

        let mut b0 = [0u16; 100];
        let mut sg = [&mut b0[..]];
        let data = Data::new(Direction::Read, 512, 1, &mut sg);
        let mut mrq = Request::with_data(
            Command::new(Opcode::ReadSingleBlock, 0, ResponseKind::Short),
            data,
        );
        assert_eq!(ch.request(&mock, &mut mrq), Err(Error::InvalidDescriptor));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn single_block_read_moves_one_block() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        present(&mock);
        mock.arm_read_blocks(1, 256);
        let pattern: Vec<u16> = (0..256u16).collect();
        mock.queue_rx(&pattern);

        let mut b0 = [0u16; 256];
        let mut sg = [&mut b0[..]];
        let data = Data::new(Direction::Read, 512, 1, &mut sg);
        let mut mrq = Request::with_data(
            Command::new(Opcode::ReadSingleBlock, 0x2000, ResponseKind::Short),
            data,
        );
        assert_eq!(ch.request(&mock, &mut mrq), Ok(()));
        assert_eq!(mrq.data.as_ref().unwrap().bytes_transferred, 512);
        drop(mrq);
        assert_eq!(b0[0], 0);
        assert_eq!(b0[255], 255);
        // No block counting programmed for a single-block command.
        assert!(!mock
            .writes()
            .iter()
            .any(|(reg, _)| *reg == RegId::SecCnt));
    }

    #[test]
    fn multi_block_write_programs_count_and_runs_stop() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        present(&mock);
        mock.arm_write_blocks(4, 256);
        mock.set_reg(RegId::Resp0, 0x0900);

        let mut b0 = [0x5A5Au16; 512];
        let mut b1 = [0xA5A5u16; 512];
        let mut sg = [&mut b0[..], &mut b1[..]];
        let data = Data::new(Direction::Write, 512, 4, &mut sg);
        let mut mrq = Request::with_data(
            Command::new(Opcode::WriteMultipleBlock, 0x4000, ResponseKind::Short),
            data,
        )
        .and_stop(Command::new(
            Opcode::StopTransmission,
            0,
            ResponseKind::Short,
        ));

        assert_eq!(ch.request(&mock, &mut mrq), Ok(()));
        assert_eq!(mock.tx().len(), 1024);
        assert_eq!(mrq.data.as_ref().unwrap().bytes_transferred, 2048);
        assert_eq!(mrq.stop.as_ref().unwrap().response, Response::Short(0x0900));
        assert_eq!(mrq.stop.as_ref().unwrap().error, None);

        let writes = mock.writes();
        assert!(writes.contains(&(RegId::Stop, regs::STOP_SEC_ENABLE)));
        assert!(writes.contains(&(RegId::SecCnt, 4)));
        assert!(writes.contains(&(RegId::Size, 512)));
    }

    #[test]
    fn failed_block_leaves_bytes_transferred_zero() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        present(&mock);
        mock.set_reg(RegId::ErrSts1, regs::ERR1_CRC);
        mock.arm_read_blocks(4, 256);
        mock.fail_at_block(2);
        let pattern: Vec<u16> = (0..512u16).collect();
        mock.queue_rx(&pattern);

        let mut b0 = [0u16; 1024];
        let mut sg = [&mut b0[..]];
        let data = Data::new(Direction::Read, 512, 4, &mut sg);
        let mut mrq = Request::with_data(
            Command::new(Opcode::ReadMultipleBlock, 0, ResponseKind::Short),
            data,
        )
        .and_stop(Command::new(
            Opcode::StopTransmission,
            0,
            ResponseKind::Short,
        ));

        assert_eq!(ch.request(&mock, &mut mrq), Err(Error::DataCorruption));
        assert_eq!(mrq.cmd.error, Some(Error::DataCorruption));
        assert_eq!(mrq.data.as_ref().unwrap().bytes_transferred, 0);
        // Recovery re-arming card detect is the final register access.
        assert_eq!(
            mock.writes().last(),
            Some(&(RegId::Info1Mask, regs::INFO1_MASK_DETECT_REARM))
        );
    }

    #[test]
    fn probing_command_error_reports_plain_timeout() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        present(&mock);
        // Error status that would classify as DataCorruption if consulted.
        mock.set_reg(RegId::ErrSts1, regs::ERR1_CRC);
        mock.set_respond(Respond::Error);

        let mut mrq = Request::command(Command::new(
            Opcode::SelectCard,
            0x0001_0000,
            ResponseKind::Short,
        ));
        assert_eq!(ch.request(&mock, &mut mrq), Err(Error::Timeout));
        assert_eq!(mrq.cmd.error, Some(Error::Timeout));
        // The probing path skips the reset.
        assert!(!mock
            .writes()
            .iter()
            .any(|(reg, _)| *reg == RegId::SoftRst));
    }

    #[test]
    fn signaled_without_latched_response_is_format_error() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        mock.set_reg(RegId::Info1, 1 << 5); // present, RESP_END clear
        mock.set_respond(Respond::SignalOnly);

        let mut mrq = Request::command(Command::new(
            Opcode::SendCsd,
            0,
            ResponseKind::Short,
        ));
        assert_eq!(ch.request(&mock, &mut mrq), Err(Error::ResponseFormat));
        assert!(!mock
            .writes()
            .iter()
            .any(|(reg, _)| *reg == RegId::SoftRst));
    }

    #[test]
    fn command_timeout_runs_recovery() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        present(&mock);
        mock.set_respond(Respond::Silent);

        let mut mrq = Request::command(Command::new(
            Opcode::SetBlockLen,
            512,
            ResponseKind::Short,
        ));
        assert_eq!(ch.request(&mock, &mut mrq), Err(Error::Timeout));
        assert!(mock
            .writes()
            .iter()
            .any(|(reg, _)| *reg == RegId::SoftRst));
    }

    #[test]
    fn framer_translates_special_encodings() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        mock.set_reg(RegId::AppCmd, 0x0040);

        assert_eq!(ch.frame(&mock, Opcode::GoIdleState, None), 0);
        assert_eq!(ch.frame(&mock, Opcode::AppSendScr, None), regs::CMD_APP_SEND_SCR);
        assert_eq!(ch.frame(&mock, Opcode::AppOpCond, None), 41 | 0x0040);
        assert_eq!(
            ch.frame(&mock, Opcode::AppSetBusWidth, None),
            6 | 0x0040
        );
        assert_eq!(ch.frame(&mock, Opcode::SwitchFunc, None), regs::CMD_SWITCH);
        assert_eq!(
            ch.frame(&mock, Opcode::IoSendOpCond, None),
            regs::CMD_IO_SEND_OP_COND
        );
        assert_eq!(
            ch.frame(&mock, Opcode::IoRwDirect, None),
            regs::CMD_IO_RW_DIRECT
        );
    }

    #[test]
    fn cmd6_with_data_frames_as_switch() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());
        let mut b0 = [0u16; 32];
        let mut sg = [&mut b0[..]];
        let data = Data::new(Direction::Read, 64, 1, &mut sg);
        assert_eq!(
            ch.frame(&mock, Opcode::AppSetBusWidth, Some(&data)),
            regs::CMD_SWITCH
        );
    }

    #[test]
    fn cmd53_framing_splits_on_direction_and_size() {
        let ch = channel();
        let mock = MockPort::with_completion(ch.completion());

        let mut small = [0u16; 128];
        let mut sg = [&mut small[..]];
        let data = Data::new(Direction::Read, 256, 1, &mut sg);
        assert_eq!(
            ch.frame(&mock, Opcode::IoRwExtended, Some(&data)),
            regs::CMD_IO_RW_EXT_SREAD
        );

        let mut big = [0u16; 512];
        let mut sg = [&mut big[..]];
        let data = Data::new(Direction::Write, 512, 2, &mut sg);
        assert_eq!(
            ch.frame(&mock, Opcode::IoRwExtended, Some(&data)),
            regs::CMD_IO_RW_EXT_MWRITE
        );

        // Framing CMD53 also switches the controller into SDIO mode.
        assert!(mock.writes().contains(&(RegId::SdioMode, regs::SDIO_MODE_ON)));
        assert!(mock
            .writes()
            .contains(&(RegId::SdioInfo1Mask, regs::SDIO_MASK_UNMASK)));
    }
}
