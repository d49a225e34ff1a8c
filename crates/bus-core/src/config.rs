//! Boot-time device slot configuration.
//!
//! The surrounding system persists which device lives in which slot; at
//! boot it hands the deserialized assignments to whoever constructs the
//! devices and populates the [`DeviceSlotTable`](crate::DeviceSlotTable).
//! The storage location and transport of the JSON is the outer layer's
//! concern.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::device::DeviceType;

/// One persisted slot assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignment {
    /// Slot index in the table.
    pub slot: usize,
    /// Bus address the device answers to.
    pub device_id: u8,
    /// Unit/drive number (1-based).
    pub unit: u8,
    /// Device class to construct.
    pub device_type: DeviceType,
    /// Backing image path for disk-class devices.
    #[serde(default)]
    pub image: Option<PathBuf>,
    /// Mount read-only regardless of the image's own permissions.
    #[serde(default)]
    pub read_only: bool,
}

/// Full boot configuration: the slot table contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootConfig {
    pub slots: Vec<SlotAssignment>,
}

impl BootConfig {
    /// Parse a configuration from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize for persistence.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let config = BootConfig {
            slots: vec![
                SlotAssignment {
                    slot: 0,
                    device_id: 0x31,
                    unit: 1,
                    device_type: DeviceType::Disk,
                    image: Some(PathBuf::from("disks/boot.atr")),
                    read_only: true,
                },
                SlotAssignment {
                    slot: 1,
                    device_id: 0x40,
                    unit: 1,
                    device_type: DeviceType::Printer,
                    image: None,
                    read_only: false,
                },
            ],
        };
        let json = config.to_json().expect("serializable");
        assert_eq!(BootConfig::from_json(&json).expect("parses"), config);
    }

    #[test]
    fn optional_fields_default() {
        let json = r#"{"slots":[{"slot":0,"device_id":49,"unit":1,"device_type":"clock"}]}"#;
        let config = BootConfig::from_json(json).expect("parses");
        assert_eq!(config.slots[0].device_type, DeviceType::Clock);
        assert_eq!(config.slots[0].image, None);
        assert!(!config.slots[0].read_only);
    }
}
