//! Atari SIO bus service loop.
//!
//! The host owns the bus: it asserts the COMMAND line, sends a 5-byte
//! command frame (device, command, aux1, aux2, checksum), and releases
//! the line. The addressed peripheral ACKs ('A') or NAKs ('N') the
//! command, runs it, then reports COMPLETE ('C') or ERROR ('E') followed
//! by any data frame with a trailing additive rotate-carry checksum.
//! Write-direction commands carry a host data frame between ACK and
//! completion, also checksummed.
//!
//! Unknown device ids get no response at all; the host's timeout is the
//! signal on this passive multidrop bus.

use bus_core::{
    CommandFrame, ControlLine, DeviceSlotTable, LogicalCommand, Transport, TransportError,
    WIRE_LEN,
    checksum::sio_checksum,
};
use log::{debug, trace, warn};

const ACK: u8 = b'A';
const NAK: u8 = b'N';
const COMPLETE: u8 = b'C';
const ERROR: u8 = b'E';

/// Command bytes (high-speed variants have bit 7 set).
const CMD_STATUS: u8 = 0x53;
const CMD_STATUS_HS: u8 = 0xD3;
const CMD_READ: u8 = 0x52;
const CMD_READ_HS: u8 = 0xD2;
const CMD_WRITE: u8 = 0x57;
const CMD_WRITE_HS: u8 = 0xD7;
const CMD_PUT: u8 = 0x50;
const CMD_PUT_HS: u8 = 0xD0;
const CMD_FORMAT: u8 = 0x21;
const CMD_FORMAT_MEDIUM: u8 = 0x22;
const CMD_FORMAT_HS: u8 = 0xA1;
const CMD_FORMAT_MEDIUM_HS: u8 = 0xA2;
const CMD_PERCOM_READ: u8 = 0x4E;
const CMD_PERCOM_WRITE: u8 = 0x4F;
const CMD_HSIO_INDEX: u8 = 0x3F;

/// Default high-speed divisor index reported to the host.
const DEFAULT_HISPEED_INDEX: u8 = 0x06;

/// Consecutive command-frame checksum failures before toggling baud:
/// the host is probably talking at the other rate.
const SPEED_CHANGE_THRESHOLD: u8 = 2;

/// Per-phase receive timeout in milliseconds.
const PHASE_TIMEOUT_MS: u16 = 300;

/// Largest data frame any SIO command carries.
pub const MAX_PAYLOAD: usize = 512;

/// The PERCOM write data frame is always 12 bytes.
const PERCOM_LEN: usize = 12;

/// SIO service loop over an abstract transport.
pub struct SioBus<T> {
    transport: T,
    table: DeviceSlotTable,
    frame_error_count: u8,
    high_speed: bool,
    high_speed_index: u8,
}

impl<T: Transport> SioBus<T> {
    #[must_use]
    pub fn new(transport: T, table: DeviceSlotTable) -> Self {
        Self {
            transport,
            table,
            frame_error_count: 0,
            high_speed: false,
            high_speed_index: DEFAULT_HISPEED_INDEX,
        }
    }

    /// One cooperative service pass: handle a pending command frame if
    /// the COMMAND line is asserted, otherwise run idle work and discard
    /// stray bytes.
    pub fn service(&mut self) {
        if !self.transport.line_asserted(ControlLine::Command) {
            // Stray input outside a command window is line noise.
            while self.transport.available() > 0 {
                let _ = self.transport.read_byte(0);
            }
            self.table.idle_tick();
            return;
        }
        if let Err(err) = self.process_command() {
            // Timeout mid-frame: the host abandoned the transaction.
            trace!("command abandoned: {err}");
        }
    }

    /// Whether repeated checksum failures have switched the expected rate.
    #[must_use]
    pub fn high_speed(&self) -> bool {
        self.high_speed
    }

    #[must_use]
    pub fn table(&self) -> &DeviceSlotTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut DeviceSlotTable {
        &mut self.table
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn process_command(&mut self) -> Result<(), TransportError> {
        let mut wire = [0u8; WIRE_LEN];
        self.transport.read_exact(&mut wire, PHASE_TIMEOUT_MS)?;
        self.wait_command_release();

        let frame = match CommandFrame::from_wire(&wire) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("command frame rejected: {err}");
                self.frame_error_count += 1;
                if self.frame_error_count == SPEED_CHANGE_THRESHOLD {
                    self.frame_error_count = 0;
                    self.high_speed = !self.high_speed;
                    warn!("toggling SIO speed (high_speed={})", self.high_speed);
                }
                return Ok(());
            }
        };
        self.frame_error_count = 0;

        if !self.table.contains_device(frame.device_id) {
            trace!("no device at {:#04x}, staying silent", frame.device_id);
            return Ok(());
        }
        debug!(
            "SIO cmd {:#04x} dev {:#04x} aux {:#06x}",
            frame.command, frame.device_id, frame.aux()
        );

        match frame.command {
            CMD_STATUS | CMD_STATUS_HS => self.run_read(&frame, LogicalCommand::Status, 4),
            CMD_READ | CMD_READ_HS => {
                let dummy = self.read_reply_len(&frame);
                self.run_read(&frame, LogicalCommand::Read, dummy)
            }
            CMD_WRITE | CMD_WRITE_HS | CMD_PUT | CMD_PUT_HS => self.run_write(&frame),
            CMD_FORMAT | CMD_FORMAT_MEDIUM | CMD_FORMAT_HS | CMD_FORMAT_MEDIUM_HS => {
                let dummy = self.read_reply_len(&frame);
                self.run_read(&frame, LogicalCommand::Control, dummy)
            }
            CMD_PERCOM_READ => self.run_read(&frame, LogicalCommand::Control, PERCOM_LEN),
            CMD_PERCOM_WRITE => self.run_percom_write(&frame),
            CMD_HSIO_INDEX => {
                self.send_byte(ACK)?;
                let index = self.high_speed_index;
                self.send_data_frame(&[index], false)
            }
            other => {
                debug!("unsupported SIO command {other:#04x}");
                self.send_byte(NAK)
            }
        }
    }

    /// Sector size the device would transfer for this frame; used to
    /// size error dummy frames the way a real drive does.
    fn read_reply_len(&mut self, frame: &CommandFrame) -> usize {
        self.table
            .by_device_id(frame.device_id)
            .map(|slot| slot.device.write_len(frame))
            .filter(|&len| len > 0)
            .unwrap_or(128)
    }

    /// Read-direction command: ACK, dispatch, completion + data frame.
    fn run_read(
        &mut self,
        frame: &CommandFrame,
        logical: LogicalCommand,
        dummy_len: usize,
    ) -> Result<(), TransportError> {
        self.send_byte(ACK)?;
        match self.table.dispatch(frame, logical, None) {
            Some(Ok(data)) => self.send_data_frame(&data, false),
            Some(Err(err)) => {
                debug!("device error: {err}");
                self.send_data_frame(&vec![0u8; dummy_len], true)
            }
            // Device disappeared between the lookup and dispatch.
            None => Ok(()),
        }
    }

    /// Write-direction command: ACK, receive and verify the host's data
    /// frame, ACK/NAK it, dispatch, completion.
    fn run_write(&mut self, frame: &CommandFrame) -> Result<(), TransportError> {
        let len = self
            .table
            .by_device_id(frame.device_id)
            .map_or(0, |slot| slot.device.write_len(frame));
        if len == 0 || len > MAX_PAYLOAD {
            // Nothing mounted (or a nonsense size): refuse before the
            // host sends a frame we can't take.
            return self.send_byte(NAK);
        }
        self.send_byte(ACK)?;
        match self.receive_data_frame(len)? {
            Some(payload) => {
                self.send_byte(ACK)?;
                match self.table.dispatch(frame, LogicalCommand::Write, Some(&payload)) {
                    Some(Ok(_)) => self.send_byte(COMPLETE),
                    Some(Err(err)) => {
                        debug!("write failed: {err}");
                        self.send_byte(ERROR)
                    }
                    None => Ok(()),
                }
            }
            // Bad data-frame checksum: NAK, no device mutation.
            None => self.send_byte(NAK),
        }
    }

    /// PERCOM write: fixed 12-byte frame, accepted and dispatched as a
    /// control so the device can note (or ignore) the geometry.
    fn run_percom_write(&mut self, frame: &CommandFrame) -> Result<(), TransportError> {
        self.send_byte(ACK)?;
        match self.receive_data_frame(PERCOM_LEN)? {
            Some(_percom) => {
                self.send_byte(ACK)?;
                match self.table.dispatch(frame, LogicalCommand::Control, None) {
                    Some(Ok(_)) => self.send_byte(COMPLETE),
                    Some(Err(_)) => self.send_byte(ERROR),
                    None => Ok(()),
                }
            }
            None => self.send_byte(NAK),
        }
    }

    /// Receive a host data frame of protocol-declared length plus its
    /// checksum. Returns `None` on checksum mismatch.
    fn receive_data_frame(&mut self, len: usize) -> Result<Option<Vec<u8>>, TransportError> {
        let mut payload = vec![0u8; len];
        self.transport.read_exact(&mut payload, PHASE_TIMEOUT_MS)?;
        let received = self.transport.read_byte(PHASE_TIMEOUT_MS)?;
        let computed = sio_checksum(&payload);
        if received != computed {
            warn!("data frame checksum mismatch: {computed:#04x} != {received:#04x}");
            return Ok(None);
        }
        Ok(Some(payload))
    }

    /// Completion byte, then the data frame with trailing checksum.
    fn send_data_frame(&mut self, data: &[u8], err: bool) -> Result<(), TransportError> {
        self.send_byte(if err { ERROR } else { COMPLETE })?;
        self.transport.write_all(data)?;
        self.transport.write_all(&[sio_checksum(data)])?;
        self.transport.flush()
    }

    fn send_byte(&mut self, b: u8) -> Result<(), TransportError> {
        self.transport.write_all(&[b])?;
        self.transport.flush()
    }

    /// Wait for the host to release COMMAND after the frame. Bounded:
    /// expiry just proceeds, treating the line as stuck.
    fn wait_command_release(&mut self) {
        for _ in 0..10_000 {
            if !self.transport.line_asserted(ControlLine::Command) {
                return;
            }
        }
    }
}
