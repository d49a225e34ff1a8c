//! Coleco ADAM AdamNet bus service loop.
//!
//! Every AdamNet command is a single byte: the high nibble is a control
//! code, the low nibble the device address (0-15). Data moves in
//! length-prefixed packets with an XOR checksum: a host SEND carries a
//! big-endian length, the payload, and the checksum; the device answers
//! `0x90 | dev` (ACK) or `0xC0 | dev` (NAK). Reads are two-step: the
//! host's RECEIVE stages the block, then CLR (clear-to-send) pulls the
//! staged data packet `0xB0 | dev` off the device.
//!
//! The bus is half duplex with no dedicated direction line, so a device
//! waits for the wire to go quiet before placing a response on it.

use bus_core::{
    CommandFrame, DeviceSlotTable, LogicalCommand, Transport, TransportError,
    checksum::xor_checksum,
};
use log::{debug, trace, warn};

/// Host control codes (command-byte high nibble).
const MN_RESET: u8 = 0x0;
const MN_STATUS: u8 = 0x1;
const MN_ACK: u8 = 0x2;
const MN_CLR: u8 = 0x3;
const MN_RECEIVE: u8 = 0x4;
const MN_CANCEL: u8 = 0x5;
const MN_SEND: u8 = 0x6;
const MN_NACK: u8 = 0x7;
const MN_READY: u8 = 0xD;

/// Response code bases, ORed with the device nibble.
const RESPONSE_STATUS: u8 = 0x80;
const RESPONSE_ACK: u8 = 0x90;
const RESPONSE_DATA: u8 = 0xB0;
const RESPONSE_NAK: u8 = 0xC0;

/// Device-type byte in the status packet: block device.
const DEVICE_TYPE_BLOCK: u8 = 0x01;
/// Controller-status base; low bits carry the error code.
const STATUS_BASE: u8 = 0x40;
const STATUS_NO_MEDIA: u8 = 0x03;

/// A SEND of this length is a block-number packet (4 LE bytes).
const BLOCK_NUM_LEN: u16 = 4;
/// Magic block number the host writes to request a media format.
const FORMAT_BLOCK: u16 = 0xFACE;

/// Largest payload an AdamNet SEND may declare.
pub const MAX_PAYLOAD: usize = 1024;

/// Per-phase receive timeout in milliseconds.
const PHASE_TIMEOUT_MS: u16 = 300;

/// Per-device transfer state the one-byte commands accumulate.
#[derive(Default, Clone)]
struct TransferState {
    /// Block number set by the last block-number SEND.
    block: Option<u16>,
    /// Data staged by RECEIVE, pulled by the next CLR.
    staged: Option<Vec<u8>>,
}

/// AdamNet service loop over an abstract transport.
pub struct AdamnetBus<T> {
    transport: T,
    table: DeviceSlotTable,
    state: [TransferState; 16],
}

impl<T: Transport> AdamnetBus<T> {
    #[must_use]
    pub fn new(transport: T, table: DeviceSlotTable) -> Self {
        Self {
            transport,
            table,
            state: std::array::from_fn(|_| TransferState::default()),
        }
    }

    pub fn table_mut(&mut self) -> &mut DeviceSlotTable {
        &mut self.table
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// One cooperative service pass: handle one command byte if the host
    /// has sent one, otherwise run idle work.
    pub fn service(&mut self) {
        if self.transport.available() == 0 {
            self.table.idle_tick();
            return;
        }
        if let Err(err) = self.process_command() {
            trace!("command abandoned: {err}");
        }
    }

    fn process_command(&mut self) -> Result<(), TransportError> {
        let byte = self.transport.read_byte(PHASE_TIMEOUT_MS)?;
        let control = byte >> 4;
        let dev = byte & 0x0F;

        if !self.table.contains_device(dev) {
            trace!("no device at nibble {dev:#03x}, staying silent");
            return Ok(());
        }

        match control {
            MN_RESET => {
                debug!("reset device {dev:#03x}");
                self.state[usize::from(dev)] = TransferState::default();
                Ok(())
            }
            MN_STATUS => self.respond_status(dev),
            MN_CLR => self.respond_staged(dev),
            MN_RECEIVE => self.stage_read(dev),
            MN_SEND => self.accept_send(dev),
            MN_READY => self.respond(RESPONSE_ACK | dev),
            MN_CANCEL => {
                self.state[usize::from(dev)].staged = None;
                Ok(())
            }
            // Host-side flow control; nothing for a device to do.
            MN_ACK | MN_NACK => Ok(()),
            other => {
                debug!("unknown AdamNet control {other:#03x} for {dev:#03x}");
                Ok(())
            }
        }
    }

    /// Status packet: `0x80|dev`, then {max-length LE, device type,
    /// controller status}, then the XOR checksum of those four bytes.
    fn respond_status(&mut self, dev: u8) -> Result<(), TransportError> {
        let block_len = self.block_len(dev);
        let status = if block_len == 0 {
            STATUS_BASE | STATUS_NO_MEDIA
        } else {
            STATUS_BASE
        };
        let body = [
            (block_len & 0xFF) as u8,
            (block_len >> 8) as u8,
            DEVICE_TYPE_BLOCK,
            status,
        ];
        self.wait_for_idle();
        self.transport.write_all(&[RESPONSE_STATUS | dev])?;
        self.transport.write_all(&body)?;
        self.transport.write_all(&[xor_checksum(&body)])?;
        self.transport.flush()
    }

    /// RECEIVE: read the pending block into the staging buffer so the
    /// host's CLR can pull it. ACK if the block read, NAK otherwise.
    fn stage_read(&mut self, dev: u8) -> Result<(), TransportError> {
        let Some(frame) = self.pending_frame(dev, b'R') else {
            return self.respond(RESPONSE_NAK | dev);
        };
        match self.table.dispatch(&frame, LogicalCommand::Read, None) {
            Some(Ok(data)) => {
                self.state[usize::from(dev)].staged = Some(data);
                self.respond(RESPONSE_ACK | dev)
            }
            Some(Err(err)) => {
                debug!("stage read failed: {err}");
                self.respond(RESPONSE_NAK | dev)
            }
            None => Ok(()),
        }
    }

    /// CLR: transmit whatever RECEIVE staged as a data packet
    /// `0xB0|dev`, big-endian length, payload, XOR checksum.
    fn respond_staged(&mut self, dev: u8) -> Result<(), TransportError> {
        let Some(data) = self.state[usize::from(dev)].staged.take() else {
            trace!("CLR with nothing staged for {dev:#03x}");
            return Ok(());
        };
        let len = data.len().min(0xFFFF) as u16;
        self.wait_for_idle();
        self.transport.write_all(&[RESPONSE_DATA | dev])?;
        self.transport.write_all(&[(len >> 8) as u8, (len & 0xFF) as u8])?;
        self.transport.write_all(&data)?;
        self.transport.write_all(&[xor_checksum(&data)])?;
        self.transport.flush()
    }

    /// SEND: big-endian length, payload, XOR checksum. A 4-byte payload
    /// is a block-number packet; a block-sized one is block data.
    fn accept_send(&mut self, dev: u8) -> Result<(), TransportError> {
        let mut len_bytes = [0u8; 2];
        self.transport.read_exact(&mut len_bytes, PHASE_TIMEOUT_MS)?;
        let len = u16::from_be_bytes(len_bytes);
        if usize::from(len) > MAX_PAYLOAD {
            warn!("SEND length {len} over limit, refusing");
            return self.respond(RESPONSE_NAK | dev);
        }
        let mut payload = vec![0u8; usize::from(len)];
        self.transport.read_exact(&mut payload, PHASE_TIMEOUT_MS)?;
        let received = self.transport.read_byte(PHASE_TIMEOUT_MS)?;
        let computed = xor_checksum(&payload);
        if received != computed {
            warn!("SEND checksum mismatch: {computed:#04x} != {received:#04x}");
            return self.respond(RESPONSE_NAK | dev);
        }

        if len == BLOCK_NUM_LEN {
            return self.set_block(dev, &payload);
        }
        if usize::from(len) == self.block_len(dev) {
            return self.write_block(dev, &payload);
        }
        debug!("SEND of unexpected length {len} for {dev:#03x}");
        self.respond(RESPONSE_NAK | dev)
    }

    fn set_block(&mut self, dev: u8, payload: &[u8]) -> Result<(), TransportError> {
        let raw = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        // Media here is far below 64 MiB; upper bits are host scratch.
        let block = (raw & 0xFFFF) as u16;
        if block == FORMAT_BLOCK {
            trace!("format request for {dev:#03x}");
            let frame = CommandFrame::new(dev, 0x21, 0, 0);
            return match self.table.dispatch(&frame, LogicalCommand::Control, None) {
                Some(Ok(_)) => self.respond(RESPONSE_ACK | dev),
                Some(Err(_)) => self.respond(RESPONSE_NAK | dev),
                None => Ok(()),
            };
        }
        debug!("block {block} selected for {dev:#03x}");
        self.state[usize::from(dev)].block = Some(block);
        self.respond(RESPONSE_ACK | dev)
    }

    fn write_block(&mut self, dev: u8, payload: &[u8]) -> Result<(), TransportError> {
        let Some(frame) = self.pending_frame(dev, b'P') else {
            return self.respond(RESPONSE_NAK | dev);
        };
        match self.table.dispatch(&frame, LogicalCommand::Write, Some(payload)) {
            Some(Ok(_)) => {
                // A written block invalidates the selection; the host
                // re-sends the number before the next transfer.
                self.state[usize::from(dev)].block = None;
                self.respond(RESPONSE_ACK | dev)
            }
            Some(Err(err)) => {
                debug!("block write failed: {err}");
                self.respond(RESPONSE_NAK | dev)
            }
            None => Ok(()),
        }
    }

    /// Frame for the selected block. Hosts count blocks from zero; the
    /// disk capability counts sectors from one.
    fn pending_frame(&self, dev: u8, command: u8) -> Option<CommandFrame> {
        let block = self.state[usize::from(dev)].block?;
        let sector = u32::from(block) + 1;
        if sector > 0xFFFF {
            return None;
        }
        Some(CommandFrame::new(
            dev,
            command,
            (sector & 0xFF) as u8,
            (sector >> 8) as u8,
        ))
    }

    /// Block size of the device's mounted media, 0 when nothing answers.
    fn block_len(&mut self, dev: u8) -> usize {
        let probe = CommandFrame::new(dev, b'R', 1, 0);
        self.table
            .by_device_id(dev)
            .map_or(0, |slot| slot.device.write_len(&probe))
    }

    fn respond(&mut self, byte: u8) -> Result<(), TransportError> {
        self.wait_for_idle();
        self.transport.write_all(&[byte])?;
        self.transport.flush()
    }

    /// Let any in-flight host bytes settle before talking; the line has
    /// no direction control.
    fn wait_for_idle(&mut self) {
        while self.transport.available() > 0 {
            let _ = self.transport.read_byte(0);
        }
    }
}
