//! Bus-agnostic command frame model.
//!
//! Every supported bus reduces its wire format to the same shape: a device
//! id, a command byte, and two auxiliary bytes. The SIO wire form (4 bytes
//! plus an additive rotate-carry checksum) is the canonical serialization;
//! the other buses build a `CommandFrame` from their own framing and share
//! the dispatch path from there.

use crate::checksum::sio_checksum;
use crate::error::FrameError;

/// Data direction of a command's payload phase, fixed per
/// (protocol, command) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// No payload phase (status-only commands).
    None,
    /// Device sends a payload to the host.
    Read,
    /// Host sends a payload to the device.
    Write,
}

/// The logical command set shared by every bus protocol.
///
/// Each bus maps its native command bytes onto this set before dispatch
/// (SIO 'R'/'W'/'S', AdamNet control nibbles, IEC secondaries, SmartPort
/// command codes all land here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalCommand {
    Status,
    Read,
    Write,
    Open,
    Close,
    Control,
}

impl LogicalCommand {
    /// Payload direction of the command's data phase.
    #[must_use]
    pub fn direction(self) -> Direction {
        match self {
            Self::Status | Self::Read | Self::Control => Direction::Read,
            Self::Write | Self::Open => Direction::Write,
            Self::Close => Direction::None,
        }
    }
}

/// One parsed command frame: device id, command, and auxiliary parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Bus address of the target device.
    pub device_id: u8,
    /// Protocol-native command byte.
    pub command: u8,
    /// First auxiliary byte (low half of `aux()`).
    pub aux1: u8,
    /// Second auxiliary byte (high half of `aux()`).
    pub aux2: u8,
}

/// Wire size of a command frame including its checksum byte.
pub const WIRE_LEN: usize = 5;

impl CommandFrame {
    /// Build a frame from explicit fields.
    #[must_use]
    pub fn new(device_id: u8, command: u8, aux1: u8, aux2: u8) -> Self {
        Self {
            device_id,
            command,
            aux1,
            aux2,
        }
    }

    /// Parse a 5-byte wire frame, validating the trailing checksum.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < WIRE_LEN {
            return Err(FrameError::Truncated {
                expected: WIRE_LEN,
                got: bytes.len(),
            });
        }
        let computed = sio_checksum(&bytes[..4]);
        let received = bytes[4];
        if computed != received {
            return Err(FrameError::ChecksumMismatch { computed, received });
        }
        Ok(Self::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    }

    /// Serialize to the 5-byte wire form with trailing checksum.
    #[must_use]
    pub fn to_wire(self) -> [u8; WIRE_LEN] {
        let mut out = [self.device_id, self.command, self.aux1, self.aux2, 0];
        out[4] = sio_checksum(&out[..4]);
        out
    }

    /// The two auxiliary bytes combined, aux1 low byte.
    ///
    /// Disk commands use this as a 1-based sector number; open commands as
    /// mode/translation flags.
    #[must_use]
    pub fn aux(self) -> u16 {
        u16::from(self.aux2) << 8 | u16::from(self.aux1)
    }
}

/// Validate a payload length a command claims against the bus maximum.
///
/// Payload lengths come from command semantics, but the semantics of a few
/// commands (e.g. FujiBus data phases) involve a length field off the
/// wire; this check runs before any buffer is sized to such a claim.
pub fn check_payload_len(declared: usize, max: usize) -> Result<(), FrameError> {
    if declared > max {
        return Err(FrameError::Oversized { declared, max });
    }
    Ok(())
}
