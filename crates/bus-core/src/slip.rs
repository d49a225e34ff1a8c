//! SLIP byte-stuffing for the RS-232/FujiBus transport.
//!
//! Frames are bracketed by END (0xC0). A literal END inside the payload is
//! sent as ESC ESC_END, a literal ESC as ESC ESC_ESC, so the delimiter can
//! never appear inside a frame body.

use crate::error::FrameError;

/// Frame delimiter.
pub const END: u8 = 0xC0;
/// Escape introducer.
pub const ESC: u8 = 0xDB;
/// Escaped substitute for a literal END.
pub const ESC_END: u8 = 0xDC;
/// Escaped substitute for a literal ESC.
pub const ESC_ESC: u8 = 0xDD;

/// Encode a payload into a SLIP frame, including both END delimiters.
#[must_use]
pub fn encode(payload: &[u8]) -> Vec<u8> {
    // Worst case every byte escapes to two, plus the two delimiters.
    let mut out = Vec::with_capacity(payload.len() * 2 + 2);
    out.push(END);
    for &b in payload {
        match b {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            _ => out.push(b),
        }
    }
    out.push(END);
    out
}

/// Decode one SLIP frame back into its payload.
///
/// Bytes before the first END are line noise and are skipped; decoding
/// stops at the closing END. An escape introducer followed by anything
/// other than `ESC_END`/`ESC_ESC`, or a frame that ends mid-escape, is a
/// framing error.
pub fn decode(frame: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(frame.len());
    let mut bytes = frame.iter().copied().skip_while(|&b| b != END).skip(1);
    loop {
        match bytes.next() {
            None | Some(END) => return Ok(out),
            Some(ESC) => match bytes.next() {
                Some(ESC_END) => out.push(END),
                Some(ESC_ESC) => out.push(ESC),
                other => return Err(FrameError::BadEscape(other)),
            },
            Some(b) => out.push(b),
        }
    }
}
