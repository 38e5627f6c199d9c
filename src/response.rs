//! Response register decoding
//!
//! Short (48-bit) responses occupy two response registers. Long (136-bit)
//! responses are spread over all eight, but shifted: the controller latches
//! the payload starting 8 bits into the register file, so the words must be
//! rotated left by one byte across the whole array before they can be packed
//! into the four 32-bit fields the caller expects.

use crate::port::RegisterPort;
use crate::regs::RegId;
use crate::request::{Response, ResponseKind};

const RESP_REGS: [RegId; 8] = [
    RegId::Resp0,
    RegId::Resp1,
    RegId::Resp2,
    RegId::Resp3,
    RegId::Resp4,
    RegId::Resp5,
    RegId::Resp6,
    RegId::Resp7,
];

/// Read and decode the latched response for channel `ch`.
pub(crate) fn decode_response<P: RegisterPort>(
    port: &P,
    ch: usize,
    kind: ResponseKind,
) -> Response {
    match kind {
        ResponseKind::None => Response::None,
        ResponseKind::Short => {
            let lo = port.read(ch, RegId::Resp0) as u32;
            let hi = port.read(ch, RegId::Resp1) as u32;
            Response::Short(hi << 16 | lo)
        }
        ResponseKind::Long => {
            let mut w = [0u16; 8];
            for (i, reg) in RESP_REGS.iter().enumerate() {
                w[i] = port.read(ch, *reg);
            }
            // Rotate the byte stream up by 8 bits: each word takes the top
            // byte of the word below it, and the bottom word's low byte
            // becomes padding.
            for i in (1..8).rev() {
                w[i] = (w[i] << 8) | (w[i - 1] >> 8);
            }
            w[0] <<= 8;
            let mut out = [0u32; 4];
            for (k, field) in out.iter_mut().enumerate() {
                let hi = w[7 - 2 * k] as u32;
                let lo = w[6 - 2 * k] as u32;
                *field = hi << 16 | lo;
            }
            Response::Long(out)
        }
    }
}
