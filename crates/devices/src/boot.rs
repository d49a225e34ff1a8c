//! Slot table assembly from the persisted boot configuration.
//!
//! The surrounding system hands over the deserialized [`BootConfig`];
//! this module constructs the configured devices, mounts their backing
//! images, and populates a [`DeviceSlotTable`]. The time source for
//! clock slots is injected, since the core has no opinion about where
//! wall-clock time comes from.

use std::path::PathBuf;

use bus_core::{BootConfig, DeviceSlotTable, DeviceType, SlotError, VirtualDevice};
use log::{info, warn};
use media_image::{MediaError, MediaImage};
use thiserror::Error;

use crate::clock::{ClockDevice, TimeSource};
use crate::disk::DiskDevice;
use crate::printer::PrinterDevice;
use crate::relay::RelayDevice;

/// Errors assembling the slot table at boot.
#[derive(Error, Debug)]
pub enum BootError {
    #[error("slot {slot}: cannot mount {image}: {source}")]
    Mount {
        slot: usize,
        image: PathBuf,
        source: MediaError,
    },

    #[error("slot assignment rejected: {0}")]
    Slot(#[from] SlotError),

    #[error("slot {slot}: device type {device_type:?} is not constructible from configuration")]
    Unconstructible {
        slot: usize,
        device_type: DeviceType,
    },
}

/// Build the slot table the configuration describes.
///
/// Disk slots with an image path mount it (a failed mount is a boot
/// error, not a silently empty drive); disk slots without one come up
/// unmounted. Clock slots share the injected time source.
pub fn assemble<C>(
    config: &BootConfig,
    capacity: usize,
    clock: C,
) -> Result<DeviceSlotTable, BootError>
where
    C: TimeSource + Clone + 'static,
{
    let mut table = DeviceSlotTable::new(capacity);
    for assignment in &config.slots {
        let device: Box<dyn VirtualDevice> = match assignment.device_type {
            DeviceType::Disk => {
                let mut drive = DiskDevice::new();
                if let Some(path) = &assignment.image {
                    let image =
                        MediaImage::open(path, assignment.read_only).map_err(|source| {
                            BootError::Mount {
                                slot: assignment.slot,
                                image: path.clone(),
                                source,
                            }
                        })?;
                    info!(
                        "slot {}: mounted {} ({:?})",
                        assignment.slot,
                        path.display(),
                        image.media_type()
                    );
                    drive.mount(image);
                } else {
                    info!("slot {}: empty drive", assignment.slot);
                }
                Box::new(drive)
            }
            DeviceType::Printer => Box::new(PrinterDevice::new()),
            DeviceType::Clock => Box::new(ClockDevice::new(clock.clone())),
            DeviceType::SerialRelay => Box::new(RelayDevice::new()),
            // Network and CP/M devices are wired by the surrounding
            // system, which owns their sockets and processes.
            other @ (DeviceType::Network | DeviceType::Cpm) => {
                warn!("slot {}: {other:?} needs runtime wiring", assignment.slot);
                return Err(BootError::Unconstructible {
                    slot: assignment.slot,
                    device_type: other,
                });
            }
        };
        table.insert(
            assignment.slot,
            assignment.device_id,
            assignment.unit,
            device,
        )?;
    }
    Ok(table)
}
