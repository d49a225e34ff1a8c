//! Serial relay: a device fed asynchronously from the network side.
//!
//! The network ingestion path (TCP modem, printer spooler) runs outside
//! the bus-service loop and may push bytes at any time. The two sides
//! meet only at a bounded, mutex-guarded buffer: the network side pushes
//! through [`RelayFeeder`], the bus side drains during its idle tick and
//! serves the staged bytes on read commands. The bus loop never blocks
//! on the network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bus_core::{CommandFrame, DeviceError, DeviceType, VirtualDevice};
use log::warn;

/// Default ingestion buffer bound: pushes beyond this drop the oldest
/// bytes, matching a serial line's behavior when nobody is reading.
const DEFAULT_CAPACITY: usize = 4096;

/// Handle the network side uses to feed the relay.
#[derive(Clone)]
pub struct RelayFeeder {
    inbox: Arc<Mutex<VecDeque<u8>>>,
    capacity: usize,
}

impl RelayFeeder {
    /// Push received bytes toward the bus side. Never blocks; overflow
    /// discards from the front.
    pub fn push(&self, bytes: &[u8]) {
        let Ok(mut inbox) = self.inbox.lock() else {
            // A poisoned inbox means the pushing thread died mid-push;
            // dropping this batch is the safe outcome.
            warn!("relay inbox poisoned, dropping {} bytes", bytes.len());
            return;
        };
        for &b in bytes {
            if inbox.len() == self.capacity {
                inbox.pop_front();
            }
            inbox.push_back(b);
        }
    }
}

/// Serial relay device.
pub struct RelayDevice {
    inbox: Arc<Mutex<VecDeque<u8>>>,
    capacity: usize,
    /// Bytes already moved out of the shared inbox, ready to serve.
    staged: VecDeque<u8>,
    /// Bytes the host wrote, awaiting the network side.
    outbox: Vec<u8>,
}

impl RelayDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
            staged: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    /// Feeder handle for the network ingestion path.
    #[must_use]
    pub fn feeder(&self) -> RelayFeeder {
        RelayFeeder {
            inbox: Arc::clone(&self.inbox),
            capacity: self.capacity,
        }
    }

    /// Bytes the host has written, for the network side to transmit.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbox)
    }

    /// Bytes staged for the host.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.staged.len()
    }
}

impl Default for RelayDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDevice for RelayDevice {
    fn device_type(&self) -> DeviceType {
        DeviceType::SerialRelay
    }

    /// Status: pending byte count, little-endian, then two spares.
    fn status(&mut self, _frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        let pending = self.staged.len().min(0xFFFF) as u16;
        Ok(vec![(pending & 0xFF) as u8, (pending >> 8) as u8, 0, 0])
    }

    /// Read up to aux bytes of staged input.
    fn read(&mut self, frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        let want = usize::from(frame.aux()).min(self.staged.len());
        Ok(self.staged.drain(..want).collect())
    }

    fn write(&mut self, _frame: &CommandFrame, data: &[u8]) -> Result<(), DeviceError> {
        self.outbox.extend_from_slice(data);
        Ok(())
    }

    /// Drain the shared inbox opportunistically; called by the bus loop
    /// between commands, never while a frame is in flight.
    fn idle(&mut self) {
        let Ok(mut inbox) = self.inbox.lock() else {
            warn!("relay inbox poisoned, skipping idle drain");
            return;
        };
        self.staged.extend(inbox.drain(..));
    }
}
