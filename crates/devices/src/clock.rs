//! Virtual real-time clock.
//!
//! Answers time reads in the six-byte day/month/year/hour/minute/second
//! form the 8-bit clients expect. The time source is injected so the
//! device tests (and hosts with their own notion of time) don't depend
//! on the wall clock.

use bus_core::{CommandFrame, DeviceError, DeviceType, VirtualDevice};

/// Broken-down time as the wire format carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub day: u8,
    pub month: u8,
    /// Years since 1900 modulo 100 (two-digit year on the wire).
    pub year: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl ClockTime {
    /// Wire form: D/M/Y H:M:S.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 6] {
        [
            self.day,
            self.month,
            self.year,
            self.hour,
            self.minute,
            self.second,
        ]
    }
}

/// Source of current time, injected at construction.
pub trait TimeSource {
    fn now(&self) -> ClockTime;
}

/// A fixed time source for tests and deterministic replays.
#[derive(Clone)]
pub struct FixedTime(pub ClockTime);

impl TimeSource for FixedTime {
    fn now(&self) -> ClockTime {
        self.0
    }
}

/// Clock device.
pub struct ClockDevice<T> {
    source: T,
}

impl<T: TimeSource> ClockDevice<T> {
    pub fn new(source: T) -> Self {
        Self { source }
    }
}

impl<T: TimeSource> VirtualDevice for ClockDevice<T> {
    fn device_type(&self) -> DeviceType {
        DeviceType::Clock
    }

    fn status(&mut self, _frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        Ok(vec![0x00, 0x00, 0x00, 0x00])
    }

    /// Time read: six bytes, day first.
    fn read(&mut self, _frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        Ok(self.source.now().to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_injected_time() {
        let time = ClockTime {
            day: 28,
            month: 8,
            year: 26,
            hour: 12,
            minute: 34,
            second: 56,
        };
        let mut clock = ClockDevice::new(FixedTime(time));
        let frame = CommandFrame::new(0x45, b'R', 0, 0);
        assert_eq!(clock.read(&frame).expect("answers"), vec![28, 8, 26, 12, 34, 56]);
    }

    #[test]
    fn writes_are_unsupported() {
        let mut clock = ClockDevice::new(FixedTime(ClockTime {
            day: 1,
            month: 1,
            year: 0,
            hour: 0,
            minute: 0,
            second: 0,
        }));
        let frame = CommandFrame::new(0x45, b'W', 0, 0);
        assert!(matches!(
            clock.write(&frame, &[0; 6]),
            Err(DeviceError::Unsupported)
        ));
    }
}
