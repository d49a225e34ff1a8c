//! The polymorphic virtual-device interface.
//!
//! One trait covers every peripheral the bridge can present: the bus
//! service loops translate their native command bytes into the shared
//! logical command set and route through these capability methods. A
//! device implements what it supports; everything else answers
//! `Unsupported`, which each bus turns into its own "invalid command"
//! status.

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::frame::CommandFrame;

/// Device classes a slot can be configured as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Disk,
    Printer,
    Clock,
    Network,
    SerialRelay,
    Cpm,
}

/// A virtual peripheral addressable on a bus.
///
/// Handlers mutate only the device's own state; a failed handler leaves
/// the device usable for the next command. `read`, `status`, and
/// `control` produce the payload the bus will frame and send; `write`,
/// `open`, and `close` consume host data and acknowledge without one.
pub trait VirtualDevice {
    /// The device class this instance presents.
    fn device_type(&self) -> DeviceType;

    /// Status request. Returns the device's protocol-visible status bytes.
    fn status(&mut self, frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        let _ = frame;
        Err(DeviceError::Unsupported)
    }

    /// Read the payload addressed by the frame (e.g. a disk block).
    fn read(&mut self, frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        let _ = frame;
        Err(DeviceError::Unsupported)
    }

    /// Write a host payload to the address in the frame.
    fn write(&mut self, frame: &CommandFrame, data: &[u8]) -> Result<(), DeviceError> {
        let _ = (frame, data);
        Err(DeviceError::Unsupported)
    }

    /// Device-specific control/special command (format, PERCOM, ...).
    fn control(&mut self, frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        let _ = frame;
        Err(DeviceError::Unsupported)
    }

    /// Open a named channel/connection on the device.
    fn open(&mut self, frame: &CommandFrame, name: &[u8]) -> Result<(), DeviceError> {
        let _ = (frame, name);
        Err(DeviceError::Unsupported)
    }

    /// Close the channel opened by `open`.
    fn close(&mut self, frame: &CommandFrame) -> Result<(), DeviceError> {
        let _ = frame;
        Err(DeviceError::Unsupported)
    }

    /// Expected host payload length for a write-direction command.
    ///
    /// Lengths are fixed by command semantics (a disk write is one sector,
    /// sized by the mounted medium), never by a host-supplied field.
    fn write_len(&self, frame: &CommandFrame) -> usize {
        let _ = frame;
        0
    }

    /// Cooperative idle tick, run while the bus has no command pending.
    ///
    /// Devices fed asynchronously (network relays) drain their ingestion
    /// buffers here; the default does nothing.
    fn idle(&mut self) {}
}
