//! Concrete virtual peripherals.
//!
//! Every device here implements the bus-agnostic
//! [`VirtualDevice`](bus_core::VirtualDevice) trait; the bus crates
//! address them through the slot table without knowing which class they
//! are talking to.

mod boot;
mod clock;
mod disk;
mod printer;
mod relay;

pub use boot::{BootError, assemble};
pub use clock::{ClockDevice, ClockTime, FixedTime, TimeSource};
pub use disk::{DiskDevice, is_read_only};
pub use printer::PrinterDevice;
pub use relay::{RelayDevice, RelayFeeder};
