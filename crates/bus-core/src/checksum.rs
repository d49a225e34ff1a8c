//! Checksums used by the vintage bus protocols.
//!
//! Two families cover every supported bus: an additive 8-bit checksum with
//! the carry folded back into the low byte (Atari SIO command and data
//! frames, FujiBus packet envelopes), and a plain XOR fold (AdamNet
//! payloads, SmartPort packets). Neither is cryptographic; they exist to
//! catch single-byte corruption on a short serial run.

/// Additive rotate-carry checksum.
///
/// Accumulates each byte and folds any carry out of the low 8 bits back
/// in, so the running value never exceeds 8 bits plus one pending carry.
#[must_use]
pub fn sio_checksum(buf: &[u8]) -> u8 {
    let mut chk: u16 = 0;
    for &b in buf {
        let sum = chk + u16::from(b);
        chk = (sum >> 8) + (sum & 0xFF);
    }
    chk as u8
}

/// XOR checksum of each successive byte.
#[must_use]
pub fn xor_checksum(buf: &[u8]) -> u8 {
    buf.iter().fold(0, |acc, &b| acc ^ b)
}
