//! Error types shared across the bus protocol crates.
//!
//! The taxonomy mirrors how the physical buses fail: framing errors are
//! answered with a NAK or silence, protocol errors with a native
//! "unsupported" status, device errors with a device status code. None of
//! them are fatal to a service loop.

use thiserror::Error;

/// Errors in wire-level framing: checksums, escapes, truncation.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    ChecksumMismatch { computed: u8, received: u8 },

    #[error("invalid escape sequence: {0:?}")]
    BadEscape(Option<u8>),

    #[error("frame truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("declared length {declared} exceeds protocol maximum {max}")]
    Oversized { declared: usize, max: usize },
}

/// Errors from the byte-stream transport under a bus.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("timed out waiting on the bus")]
    TimedOut,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the device slot table.
#[derive(Error, Debug)]
pub enum SlotError {
    #[error("slot table full ({capacity} slots)")]
    TableFull { capacity: usize },

    #[error("slot {0} already occupied")]
    SlotOccupied(usize),

    #[error("slot index {index} out of range (capacity {capacity})")]
    BadIndex { index: usize, capacity: usize },

    #[error("no device at slot {0}")]
    EmptySlot(usize),
}

/// Errors raised by a virtual device handling a command.
///
/// Bus service loops translate these into each protocol's native status
/// vocabulary; they never escape a service loop as a fault.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("command not supported by this device")]
    Unsupported,

    #[error("no medium mounted")]
    NotMounted,

    #[error("block {block} out of range (total {total})")]
    OutOfRange { block: u32, total: u32 },

    #[error("medium is write protected")]
    WriteProtected,

    #[error("operation exceeded the bus command timeout")]
    Timeout,

    #[error("wrong payload length: expected {expected}, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
