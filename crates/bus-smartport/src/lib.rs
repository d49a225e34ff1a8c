//! Apple SmartPort bus service loop.
//!
//! SmartPort devices daisy-chain off the Disk II port; at power-up the
//! host walks the chain with INIT commands, assigning each device a unit
//! number, then addresses commands to units. This loop works with the
//! logical packet contents (the 7-to-8 bit group encoding and line
//! handshake belong to the transport): a command packet carries the unit,
//! the command, a small parameter list, optional data, and an XOR
//! checksum; the reply carries a status code from the SmartPort
//! vocabulary, optional data, and the same checksum.
//!
//! Command packet: `{unit, command, param_len: u8, data_len: u16 LE,
//! params, data, checksum}`. Reply: `{unit, status, data_len: u16 LE,
//! data, checksum}`. The checksum XORs every preceding byte.

use bus_core::{
    CommandFrame, DeviceError, DeviceSlotTable, LogicalCommand, Transport, TransportError,
    checksum::xor_checksum,
};
use log::{debug, trace, warn};

/// SmartPort command codes.
const CMD_STATUS: u8 = 0x00;
const CMD_READ_BLOCK: u8 = 0x01;
const CMD_WRITE_BLOCK: u8 = 0x02;
const CMD_FORMAT: u8 = 0x03;
const CMD_CONTROL: u8 = 0x04;
const CMD_INIT: u8 = 0x05;

/// SmartPort status codes.
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_BAD_COMMAND: u8 = 0x01;
pub const STATUS_IO_ERROR: u8 = 0x27;
pub const STATUS_WRITE_PROTECTED: u8 = 0x28;
pub const STATUS_OFFLINE: u8 = 0x2F;

/// Largest data payload a SmartPort packet can carry.
pub const MAX_PAYLOAD: usize = 767;

/// Per-phase receive timeout in milliseconds.
const PHASE_TIMEOUT_MS: u16 = 300;

/// SmartPort service loop over an abstract transport.
///
/// Units are assigned in slot order at INIT time, starting at 1; unit 0
/// addresses the chain itself (status only).
pub struct SmartportBus<T> {
    transport: T,
    table: DeviceSlotTable,
    initialized: bool,
}

impl<T: Transport> SmartportBus<T> {
    #[must_use]
    pub fn new(transport: T, table: DeviceSlotTable) -> Self {
        Self {
            transport,
            table,
            initialized: false,
        }
    }

    pub fn table_mut(&mut self) -> &mut DeviceSlotTable {
        &mut self.table
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Whether the host has walked the chain with INIT.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// One cooperative service pass: handle one command packet if the
    /// host has sent one, otherwise run idle work.
    pub fn service(&mut self) {
        if self.transport.available() == 0 {
            self.table.idle_tick();
            return;
        }
        if let Err(err) = self.process_packet() {
            trace!("packet abandoned: {err}");
        }
    }

    fn process_packet(&mut self) -> Result<(), TransportError> {
        let mut header = [0u8; 5];
        self.transport.read_exact(&mut header, PHASE_TIMEOUT_MS)?;
        let unit = header[0];
        let command = header[1];
        let param_len = usize::from(header[2]);
        let data_len = usize::from(u16::from_le_bytes([header[3], header[4]]));
        if data_len > MAX_PAYLOAD {
            warn!("packet data length {data_len} over limit, dropping");
            return self.drain_and_drop(param_len + data_len + 1);
        }

        let mut params = vec![0u8; param_len];
        self.transport.read_exact(&mut params, PHASE_TIMEOUT_MS)?;
        let mut data = vec![0u8; data_len];
        self.transport.read_exact(&mut data, PHASE_TIMEOUT_MS)?;
        let received = self.transport.read_byte(PHASE_TIMEOUT_MS)?;

        let mut whole = header.to_vec();
        whole.extend_from_slice(&params);
        whole.extend_from_slice(&data);
        let computed = xor_checksum(&whole);
        if received != computed {
            warn!("packet checksum mismatch: {computed:#04x} != {received:#04x}");
            return Ok(());
        }

        debug!("SmartPort cmd {command:#04x} unit {unit}");
        match command {
            CMD_INIT => self.run_init(unit),
            CMD_STATUS if unit == 0 => self.run_chain_status(),
            _ if unit == 0 || !self.table.contains_device(unit) => {
                trace!("no unit {unit}, staying silent");
                Ok(())
            }
            // Frames carry the shared command vocabulary the devices
            // dispatch on (status/read/put/format).
            CMD_STATUS => self.run_reply(unit, b'S', LogicalCommand::Status, &params),
            CMD_READ_BLOCK => self.run_reply(unit, b'R', LogicalCommand::Read, &params),
            CMD_WRITE_BLOCK => self.run_write(unit, &params, &data),
            CMD_FORMAT => self.run_reply(unit, 0x21, LogicalCommand::Control, &params),
            CMD_CONTROL => self.run_reply(unit, 0x04, LogicalCommand::Control, &params),
            other => {
                debug!("unsupported SmartPort command {other:#04x}");
                self.send_reply(unit, STATUS_BAD_COMMAND, &[])
            }
        }
    }

    /// INIT: assign sequential unit numbers to the occupied slots and
    /// report the chain length.
    fn run_init(&mut self, _unit: u8) -> Result<(), TransportError> {
        let mut unit = 0u8;
        for index in 0..self.table.capacity() {
            if self.table.get(index).is_some() {
                unit += 1;
                self.assign_unit(index, unit);
            }
        }
        self.initialized = true;
        debug!("chain initialized with {unit} units");
        self.send_reply(0, STATUS_OK, &[unit])
    }

    fn assign_unit(&mut self, index: usize, unit: u8) {
        // Rebind the slot under its chain-assigned address.
        if let Ok(device) = self.table.remove(index) {
            // The slot was just vacated, so this insert cannot fail.
            let _ = self.table.insert(index, unit, unit, device);
        }
    }

    fn run_chain_status(&mut self) -> Result<(), TransportError> {
        let count = self.table.occupied().min(255) as u8;
        self.send_reply(0, STATUS_OK, &[count])
    }

    fn run_reply(
        &mut self,
        unit: u8,
        command: u8,
        logical: LogicalCommand,
        params: &[u8],
    ) -> Result<(), TransportError> {
        let frame = match Self::frame_for(unit, command, logical, params) {
            Ok(frame) => frame,
            Err(status) => return self.send_reply(unit, status, &[]),
        };
        match self.table.dispatch(&frame, logical, None) {
            Some(Ok(data)) => self.send_reply(unit, STATUS_OK, &data),
            Some(Err(err)) => self.send_reply(unit, map_device_err(&err), &[]),
            None => Ok(()),
        }
    }

    fn run_write(&mut self, unit: u8, params: &[u8], data: &[u8]) -> Result<(), TransportError> {
        let frame = match Self::frame_for(unit, b'P', LogicalCommand::Write, params) {
            Ok(frame) => frame,
            Err(status) => return self.send_reply(unit, status, &[]),
        };
        match self.table.dispatch(&frame, LogicalCommand::Write, Some(data)) {
            Some(Ok(_)) => self.send_reply(unit, STATUS_OK, &[]),
            Some(Err(err)) => self.send_reply(unit, map_device_err(&err), &[]),
            None => Ok(()),
        }
    }

    /// Build the dispatch frame. Block commands carry a 3-byte block
    /// number; hosts count blocks from zero, the disk capability from
    /// one.
    fn frame_for(
        unit: u8,
        command: u8,
        logical: LogicalCommand,
        params: &[u8],
    ) -> Result<CommandFrame, u8> {
        if !matches!(logical, LogicalCommand::Read | LogicalCommand::Write) {
            let aux = params.first().copied().unwrap_or(0);
            return Ok(CommandFrame::new(unit, command, aux, 0));
        }
        if params.len() < 3 {
            return Err(STATUS_BAD_COMMAND);
        }
        let block = u32::from(params[0]) | u32::from(params[1]) << 8 | u32::from(params[2]) << 16;
        let sector = block + 1;
        if sector > 0xFFFF {
            return Err(STATUS_IO_ERROR);
        }
        Ok(CommandFrame::new(
            unit,
            command,
            (sector & 0xFF) as u8,
            (sector >> 8) as u8,
        ))
    }

    fn send_reply(&mut self, unit: u8, status: u8, data: &[u8]) -> Result<(), TransportError> {
        let len = data.len().min(MAX_PAYLOAD) as u16;
        let mut reply = vec![unit, status, (len & 0xFF) as u8, (len >> 8) as u8];
        reply.extend_from_slice(&data[..usize::from(len)]);
        reply.push(xor_checksum(&reply));
        self.transport.write_all(&reply)?;
        self.transport.flush()
    }

    /// Consume the rest of an oversized packet so the stream stays in
    /// sync, then drop it without a reply.
    fn drain_and_drop(&mut self, remaining: usize) -> Result<(), TransportError> {
        for _ in 0..remaining {
            self.transport.read_byte(PHASE_TIMEOUT_MS)?;
        }
        Ok(())
    }
}

fn map_device_err(err: &DeviceError) -> u8 {
    match err {
        DeviceError::NotMounted => STATUS_OFFLINE,
        DeviceError::WriteProtected => STATUS_WRITE_PROTECTED,
        DeviceError::Unsupported => STATUS_BAD_COMMAND,
        _ => STATUS_IO_ERROR,
    }
}
