//! Virtual printer: a byte sink the host prints into.
//!
//! Rendering (fonts, paper formats, PDF/PNG output) belongs to the
//! surrounding system; this device owns the bus-visible contract: accept
//! fixed-size line buffers, expose what was printed, answer status.

use bus_core::{CommandFrame, DeviceError, DeviceType, VirtualDevice};
use log::debug;

/// Line length the classic 40-column printers transfer per write.
const LINE_LEN: usize = 40;

/// Printer device collecting host output.
#[derive(Default)]
pub struct PrinterDevice {
    /// Everything printed since the last drain.
    captured: Vec<u8>,
    /// Length of the last write, reported in status.
    last_write_len: u8,
}

impl PrinterDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand captured output to the rendering side and clear the buffer.
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.captured)
    }

    #[must_use]
    pub fn captured(&self) -> &[u8] {
        &self.captured
    }
}

impl VirtualDevice for PrinterDevice {
    fn device_type(&self) -> DeviceType {
        DeviceType::Printer
    }

    /// Status: line length, last write length, and two spare bytes.
    fn status(&mut self, _frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        Ok(vec![0x00, self.last_write_len, LINE_LEN as u8, 0x00])
    }

    fn write(&mut self, frame: &CommandFrame, data: &[u8]) -> Result<(), DeviceError> {
        // A line ends at EOL (0x9B on Atari); trailing fill is discarded.
        let line = match data.iter().position(|&b| b == 0x9B) {
            Some(eol) => &data[..=eol],
            None => data,
        };
        debug!("printer: {} bytes (device {:#04x})", line.len(), frame.device_id);
        self.captured.extend_from_slice(line);
        self.last_write_len = data.len() as u8;
        Ok(())
    }

    fn write_len(&self, _frame: &CommandFrame) -> usize {
        LINE_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_up_to_eol() {
        let mut printer = PrinterDevice::new();
        let frame = CommandFrame::new(0x40, b'W', 0, 0);
        let mut line = [b' '; LINE_LEN];
        line[..5].copy_from_slice(b"HELLO");
        line[5] = 0x9B;
        printer.write(&frame, &line).expect("sink accepts");
        assert_eq!(printer.captured(), b"HELLO\x9B");
    }

    #[test]
    fn drain_empties_the_buffer() {
        let mut printer = PrinterDevice::new();
        let frame = CommandFrame::new(0x40, b'W', 0, 0);
        printer.write(&frame, b"RAW BYTES").expect("sink accepts");
        assert_eq!(printer.drain(), b"RAW BYTES");
        assert!(printer.captured().is_empty());
    }

    #[test]
    fn status_reports_last_write() {
        let mut printer = PrinterDevice::new();
        let frame = CommandFrame::new(0x40, b'W', 0, 0);
        printer.write(&frame, &[b'A'; 17]).expect("sink accepts");
        let status = printer.status(&frame).expect("answers");
        assert_eq!(status[1], 17);
        assert_eq!(status[2], LINE_LEN as u8);
    }

    #[test]
    fn read_is_unsupported() {
        let mut printer = PrinterDevice::new();
        let frame = CommandFrame::new(0x40, b'R', 0, 0);
        assert!(matches!(printer.read(&frame), Err(DeviceError::Unsupported)));
    }
}
