//! Shared core of the peripheral-bus bridge.
//!
//! Every supported vintage bus (SIO, AdamNet, IEC, SmartPort,
//! RS-232/FujiBus) reduces to the same cycle: detect a command, parse and
//! validate a frame, dispatch to a virtual device, frame the reply. This
//! crate holds the pieces that cycle shares: the checksum and escape
//! codecs, the command-frame model, the device trait and slot table, the
//! transport abstraction, and the boot configuration.

mod config;
mod device;
mod error;
mod frame;
mod slot;
mod transport;

pub mod checksum;
pub mod slip;

pub use config::{BootConfig, SlotAssignment};
pub use device::{DeviceType, VirtualDevice};
pub use error::{DeviceError, FrameError, SlotError, TransportError};
pub use frame::{CommandFrame, Direction, LogicalCommand, WIRE_LEN, check_payload_len};
pub use slot::{DeviceSlot, DeviceSlotTable};
pub use transport::{ControlLine, ScriptedTransport, Transport};
