//! Fixed-capacity device slot table and command dispatch.
//!
//! The table owns the mapping from bus address to virtual device. Index
//! and address validation live in two accessors (`check_index`,
//! `by_device_id`); every other method goes through them rather than
//! repeating bounds checks.

use log::{debug, trace};

use crate::device::{DeviceType, VirtualDevice};
use crate::error::{DeviceError, SlotError};
use crate::frame::{CommandFrame, LogicalCommand};

/// One populated slot: a bus address bound to a device instance.
pub struct DeviceSlot {
    /// Bus address the device answers to.
    pub device_id: u8,
    /// Unit/drive number within the device class (1-based).
    pub unit: u8,
    /// The device instance.
    pub device: Box<dyn VirtualDevice>,
}

/// Fixed-size table mapping slot indices to virtual devices.
///
/// Capacity is set at construction (bus-dependent, typically 4-8) and
/// never grows. The table is mutated only by configuration and
/// mount/unmount operations, which the single-threaded service loop
/// never interleaves with an in-flight dispatch.
pub struct DeviceSlotTable {
    slots: Vec<Option<DeviceSlot>>,
}

impl DeviceSlotTable {
    /// Create an empty table with the given number of slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Number of slots, occupied or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Validate a slot index. All index-taking methods go through here.
    fn check_index(&self, index: usize) -> Result<(), SlotError> {
        if index >= self.slots.len() {
            return Err(SlotError::BadIndex {
                index,
                capacity: self.slots.len(),
            });
        }
        Ok(())
    }

    /// Bind a device into a slot.
    ///
    /// Fails if the slot is occupied; reassignment requires an explicit
    /// `remove` first, which destroys the old binding.
    pub fn insert(
        &mut self,
        index: usize,
        device_id: u8,
        unit: u8,
        device: Box<dyn VirtualDevice>,
    ) -> Result<(), SlotError> {
        self.check_index(index)?;
        if self.slots[index].is_some() {
            return Err(SlotError::SlotOccupied(index));
        }
        debug!(
            "slot {index}: device {device_id:#04x} unit {unit} ({:?})",
            device.device_type()
        );
        self.slots[index] = Some(DeviceSlot {
            device_id,
            unit,
            device,
        });
        Ok(())
    }

    /// Add a device to the first free slot.
    pub fn insert_first_free(
        &mut self,
        device_id: u8,
        unit: u8,
        device: Box<dyn VirtualDevice>,
    ) -> Result<usize, SlotError> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Err(SlotError::TableFull {
                capacity: self.slots.len(),
            });
        };
        self.insert(index, device_id, unit, device)?;
        Ok(index)
    }

    /// Unbind a slot, returning the device it held.
    pub fn remove(&mut self, index: usize) -> Result<Box<dyn VirtualDevice>, SlotError> {
        self.check_index(index)?;
        self.slots[index]
            .take()
            .map(|slot| slot.device)
            .ok_or(SlotError::EmptySlot(index))
    }

    /// The slot at an index, if occupied.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&DeviceSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// The slot answering to a bus address, if any.
    pub fn by_device_id(&mut self, device_id: u8) -> Option<&mut DeviceSlot> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|slot| slot.device_id == device_id)
    }

    /// Whether any slot answers to the given bus address.
    #[must_use]
    pub fn contains_device(&self, device_id: u8) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|slot| slot.device_id == device_id)
    }

    /// Device type configured at a slot, if occupied.
    #[must_use]
    pub fn device_type(&self, index: usize) -> Option<DeviceType> {
        self.get(index).map(|slot| slot.device.device_type())
    }

    /// Run every device's idle tick. Called by service loops between
    /// commands; never blocks.
    pub fn idle_tick(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.device.idle();
        }
    }

    /// Route a command frame to the addressed device.
    ///
    /// Returns `None` when no slot answers to `frame.device_id`: on the
    /// passive multidrop buses being emulated an unknown address gets no
    /// response at all, and the host's timeout is the signal. A present
    /// device's handler result (payload or device error) is returned for
    /// the bus layer to frame in its native vocabulary.
    pub fn dispatch(
        &mut self,
        frame: &CommandFrame,
        command: LogicalCommand,
        payload: Option<&[u8]>,
    ) -> Option<Result<Vec<u8>, DeviceError>> {
        let slot = self.by_device_id(frame.device_id)?;
        trace!(
            "dispatch {command:?} to device {:#04x} (aux {:#06x})",
            frame.device_id,
            frame.aux()
        );
        let result = match command {
            LogicalCommand::Status => slot.device.status(frame),
            LogicalCommand::Read => slot.device.read(frame),
            LogicalCommand::Write => slot
                .device
                .write(frame, payload.unwrap_or_default())
                .map(|()| Vec::new()),
            LogicalCommand::Open => slot
                .device
                .open(frame, payload.unwrap_or_default())
                .map(|()| Vec::new()),
            LogicalCommand::Close => slot.device.close(frame).map(|()| Vec::new()),
            LogicalCommand::Control => slot.device.control(frame),
        };
        if let Err(err) = &result {
            debug!("device {:#04x} {command:?} failed: {err}", frame.device_id);
        }
        Some(result)
    }
}
