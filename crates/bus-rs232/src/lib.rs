//! RS-232/FujiBus service loop.
//!
//! Unlike the vintage buses this link has no control lines: both
//! directions carry SLIP-framed [`FujiBusPacket`] envelopes. The loop
//! accumulates received bytes, peels off complete frames, dispatches
//! them, and answers with a reply packet echoing the device and command.
//! Malformed, truncated, or mis-checksummed frames are dropped without
//! a reply; the host's timeout-and-retry handles the rest.

mod packet;

pub use packet::{FujiBusPacket, MAX_DATA, Param};

use bus_core::{CommandFrame, DeviceSlotTable, Direction, LogicalCommand, Transport, slip};
use log::{debug, trace};

/// Reply status parameter: command completed.
pub const REPLY_OK: u8 = 0x00;
/// Reply status parameter: command failed on the device.
pub const REPLY_ERROR: u8 = 0x01;

/// Receive-buffer cap; a frame larger than this can never parse.
const RX_LIMIT: usize = 4096;

/// FujiBus service loop over an abstract transport.
pub struct Rs232Bus<T> {
    transport: T,
    table: DeviceSlotTable,
    rx: Vec<u8>,
}

impl<T: Transport> Rs232Bus<T> {
    #[must_use]
    pub fn new(transport: T, table: DeviceSlotTable) -> Self {
        Self {
            transport,
            table,
            rx: Vec::new(),
        }
    }

    pub fn table_mut(&mut self) -> &mut DeviceSlotTable {
        &mut self.table
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// One cooperative service pass: pull in pending bytes, handle every
    /// complete frame, then run idle work.
    pub fn service(&mut self) {
        while self.transport.available() > 0 && self.rx.len() < RX_LIMIT {
            match self.transport.read_byte(0) {
                Ok(b) => self.rx.push(b),
                Err(_) => break,
            }
        }
        while let Some(frame) = self.next_frame() {
            match FujiBusPacket::from_serialized(&frame) {
                Ok(packet) => self.handle_packet(&packet),
                Err(err) => debug!("dropping bad frame: {err}"),
            }
        }
        if self.rx.len() >= RX_LIMIT {
            // A frame this large is noise; resynchronize.
            debug!("receive buffer overrun, discarding {} bytes", self.rx.len());
            self.rx.clear();
        }
        self.table.idle_tick();
    }

    /// Extract the next complete SLIP frame from the receive buffer.
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let start = self.rx.iter().position(|&b| b == slip::END)?;
        // Collapse empty frames from back-to-back delimiters.
        let body_start = self.rx[start + 1..]
            .iter()
            .position(|&b| b != slip::END)
            .map(|p| start + 1 + p)?;
        let end = self.rx[body_start..]
            .iter()
            .position(|&b| b == slip::END)
            .map(|p| body_start + p)?;
        let frame = self.rx[body_start - 1..=end].to_vec();
        self.rx.drain(..=end);
        Some(frame)
    }

    fn handle_packet(&mut self, packet: &FujiBusPacket) {
        if !self.table.contains_device(packet.device) {
            trace!("no device at {:#04x}, staying silent", packet.device);
            return;
        }
        debug!(
            "FujiBus cmd {:#04x} dev {:#04x} ({} params)",
            packet.command,
            packet.device,
            packet.params().len()
        );

        let logical = match packet.command {
            b'S' => LogicalCommand::Status,
            b'R' => LogicalCommand::Read,
            b'W' | b'P' => LogicalCommand::Write,
            _ => LogicalCommand::Control,
        };
        let payload = match logical.direction() {
            Direction::Write => packet.data(),
            Direction::Read | Direction::None => None,
        };
        let Some(frame) = Self::frame_for(packet) else {
            self.send_reply(packet, REPLY_ERROR, &[]);
            return;
        };
        match self.table.dispatch(&frame, logical, payload) {
            Some(Ok(data)) => self.send_reply(packet, REPLY_OK, &data),
            Some(Err(err)) => {
                debug!("device error: {err}");
                self.send_reply(packet, REPLY_ERROR, &[]);
            }
            None => {}
        }
    }

    /// Dispatch frame for a packet; the first parameter, when present,
    /// is the 1-based sector address.
    fn frame_for(packet: &FujiBusPacket) -> Option<CommandFrame> {
        let aux = match packet.param(0) {
            Some(value) if value > 0xFFFF => return None,
            Some(value) => value as u16,
            None => 0,
        };
        Some(CommandFrame::new(
            packet.device,
            packet.command,
            (aux & 0xFF) as u8,
            (aux >> 8) as u8,
        ))
    }

    fn send_reply(&mut self, request: &FujiBusPacket, status: u8, data: &[u8]) {
        let mut reply =
            FujiBusPacket::new(request.device, request.command).with_param(Param::U8(status));
        if !data.is_empty() {
            reply = reply.with_data(data.to_vec());
        }
        let wire = reply.serialize();
        if self.transport.write_all(&wire).is_err() || self.transport.flush().is_err() {
            debug!("reply transmission failed");
        }
    }
}
