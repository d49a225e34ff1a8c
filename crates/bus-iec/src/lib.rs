//! Commodore IEC serial bus service loop.
//!
//! The host (the computer) asserts ATN and sends command bytes: a
//! primary address, `0x20 | device` LISTEN or `0x40 | device` TALK
//! (with `0x3F` UNLISTEN and `0x5F` UNTALK ending the conversation),
//! usually followed by a secondary, `0x60 | channel` DATA,
//! `0xE0 | channel` CLOSE, or `0xF0 | channel` OPEN. Once ATN drops,
//! data bytes flow in whichever direction the primary established.
//! Devices not named by the primary ignore everything until the next
//! attention sequence.
//!
//! This loop works at the byte level: the bit-banged handshake lives
//! behind the transport, and EOI (the talker's last-byte signal) is
//! carried as a logical flag rather than a line timing.

use bus_core::{
    CommandFrame, ControlLine, DeviceSlotTable, LogicalCommand, Transport, TransportError,
};
use log::{debug, trace};

/// Primary command bytes (device address in the low five bits).
const PRIMARY_LISTEN: u8 = 0x20;
const PRIMARY_TALK: u8 = 0x40;
const PRIMARY_UNLISTEN: u8 = 0x3F;
const PRIMARY_UNTALK: u8 = 0x5F;

/// Secondary command bytes (channel in the low four bits).
const SECONDARY_DATA: u8 = 0x60;
const SECONDARY_CLOSE: u8 = 0xE0;
const SECONDARY_OPEN: u8 = 0xF0;

/// Per-phase receive timeout in milliseconds.
const PHASE_TIMEOUT_MS: u16 = 300;

/// What the last attention sequence made this bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Not addressed; ignore data bytes until the next ATN.
    Idle,
    /// Addressed as listener: host data bytes accumulate.
    Listener,
    /// Addressed as talker: device data goes to the host after ATN drops.
    Talker,
}

/// IEC service loop over an abstract transport.
pub struct IecBus<T> {
    transport: T,
    table: DeviceSlotTable,
    role: Role,
    /// Device named by the current LISTEN/TALK.
    device: u8,
    /// Channel named by the current secondary.
    channel: u8,
    /// Host bytes received while listening, dispatched at UNLISTEN.
    received: Vec<u8>,
    /// The received bytes are an OPEN name, not channel data.
    opening: bool,
    /// A talk transfer is armed and runs when ATN drops.
    talk_pending: bool,
    /// The last transmitted byte completed a talk transfer.
    eoi: bool,
}

impl<T: Transport> IecBus<T> {
    #[must_use]
    pub fn new(transport: T, table: DeviceSlotTable) -> Self {
        Self {
            transport,
            table,
            role: Role::Idle,
            device: 0,
            channel: 0,
            received: Vec::new(),
            opening: false,
            talk_pending: false,
            eoi: false,
        }
    }

    pub fn table_mut(&mut self) -> &mut DeviceSlotTable {
        &mut self.table
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Whether the last transmitted byte carried the end-or-identify
    /// signal, i.e. closed out a talk transfer.
    #[must_use]
    pub fn eoi_signalled(&self) -> bool {
        self.eoi
    }

    /// One cooperative service pass: consume attention bytes while ATN
    /// is asserted, then move data in whichever direction the primary
    /// set up.
    pub fn service(&mut self) {
        while self.transport.line_asserted(ControlLine::Attention)
            && self.transport.available() > 0
        {
            match self.transport.read_byte(PHASE_TIMEOUT_MS) {
                Ok(byte) => self.handle_attention(byte),
                Err(_) => return,
            }
        }
        if self.transport.line_asserted(ControlLine::Attention) {
            // ATN held with nothing sent yet; wait for the bytes.
            return;
        }
        match self.role {
            Role::Listener => self.drain_host_data(),
            Role::Talker => {
                if self.talk_pending {
                    self.talk_pending = false;
                    if let Err(err) = self.run_talk() {
                        trace!("talk abandoned: {err}");
                    }
                }
            }
            Role::Idle => {
                // Data bytes from a conversation that is not ours.
                while self.transport.available() > 0
                    && !self.transport.line_asserted(ControlLine::Attention)
                {
                    let _ = self.transport.read_byte(0);
                }
                self.table.idle_tick();
            }
        }
    }

    fn handle_attention(&mut self, byte: u8) {
        match byte {
            PRIMARY_UNLISTEN => {
                self.finish_listen();
                self.role = Role::Idle;
            }
            PRIMARY_UNTALK => {
                self.role = Role::Idle;
                self.talk_pending = false;
            }
            b if b & 0xE0 == PRIMARY_LISTEN => {
                let device = b & 0x1F;
                if self.table.contains_device(device) {
                    trace!("LISTEN {device}");
                    self.role = Role::Listener;
                    self.device = device;
                } else {
                    trace!("LISTEN {device}: not ours, ignoring until ATN");
                    self.role = Role::Idle;
                }
                self.received.clear();
                self.opening = false;
            }
            b if b & 0xE0 == PRIMARY_TALK => {
                let device = b & 0x1F;
                if self.table.contains_device(device) {
                    trace!("TALK {device}");
                    self.role = Role::Talker;
                    self.device = device;
                    self.talk_pending = true;
                } else {
                    self.role = Role::Idle;
                }
            }
            b if b & 0xF0 == SECONDARY_OPEN => {
                self.channel = b & 0x0F;
                if self.role == Role::Listener {
                    self.opening = true;
                    self.received.clear();
                }
            }
            b if b & 0xF0 == SECONDARY_CLOSE => {
                self.channel = b & 0x0F;
                if self.role != Role::Idle {
                    let frame = self.frame(b);
                    if let Some(Err(err)) =
                        self.table.dispatch(&frame, LogicalCommand::Close, None)
                    {
                        debug!("close failed: {err}");
                    }
                }
                self.role = Role::Idle;
            }
            b if b & 0xF0 == SECONDARY_DATA => {
                self.channel = b & 0x0F;
            }
            other => {
                debug!("unrecognized attention byte {other:#04x}");
            }
        }
    }

    /// Accumulate host data bytes while addressed as listener. ATN can
    /// interrupt mid-stream, so the buffer survives across passes.
    fn drain_host_data(&mut self) {
        while self.transport.available() > 0
            && !self.transport.line_asserted(ControlLine::Attention)
        {
            match self.transport.read_byte(PHASE_TIMEOUT_MS) {
                Ok(byte) => self.received.push(byte),
                Err(_) => return,
            }
        }
    }

    /// UNLISTEN closes out the listen transaction: an OPEN name becomes
    /// an open dispatch, channel data becomes a write.
    fn finish_listen(&mut self) {
        if self.role != Role::Listener {
            return;
        }
        let data = std::mem::take(&mut self.received);
        let (logical, secondary) = if self.opening {
            (LogicalCommand::Open, SECONDARY_OPEN | self.channel)
        } else if data.is_empty() {
            return;
        } else {
            (LogicalCommand::Write, SECONDARY_DATA | self.channel)
        };
        self.opening = false;
        let frame = self.frame(secondary);
        if let Some(Err(err)) = self.table.dispatch(&frame, logical, Some(&data)) {
            debug!("listen transaction failed: {err}");
        }
    }

    /// Send the device's channel data to the host, flagging EOI on the
    /// final byte.
    fn run_talk(&mut self) -> Result<(), TransportError> {
        self.eoi = false;
        let frame = self.frame(SECONDARY_DATA | self.channel);
        match self.table.dispatch(&frame, LogicalCommand::Read, None) {
            Some(Ok(data)) => {
                if !data.is_empty() {
                    self.transport.write_all(&data)?;
                    self.transport.flush()?;
                    self.eoi = true;
                }
                Ok(())
            }
            // A talker with nothing to say leaves the host to time out.
            Some(Err(err)) => {
                debug!("talk failed: {err}");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn frame(&self, secondary: u8) -> CommandFrame {
        CommandFrame::new(self.device, secondary, self.channel, 0)
    }
}
