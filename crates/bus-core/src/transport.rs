//! Abstract byte transport under a bus service loop.
//!
//! The physical layer (UART, bit-banged GPIO, TCP tunnel) is reduced to
//! timed byte I/O plus a level query on the bus's control lines. Protocol
//! logic never touches hardware registers, which is what makes every
//! service loop testable against [`ScriptedTransport`].

use std::collections::VecDeque;

use crate::error::TransportError;

/// Control lines a bus can sample.
///
/// Which lines exist depends on the bus: SIO has COMMAND and MOTOR, IEC
/// has ATN, the packet buses have none. Querying a line the transport
/// does not provide reads as deasserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    /// SIO COMMAND line: low while the host sends a command frame.
    Command,
    /// IEC ATN line: asserted while the host sends attention bytes.
    Attention,
    /// SIO MOTOR line (cassette motor control).
    Motor,
}

/// Byte-stream transport with control-line visibility.
pub trait Transport {
    /// Read one byte, waiting at most `timeout_ms`.
    fn read_byte(&mut self, timeout_ms: u16) -> Result<u8, TransportError>;

    /// Fill `buf`, waiting at most `timeout_ms` for each byte.
    fn read_exact(&mut self, buf: &mut [u8], timeout_ms: u16) -> Result<(), TransportError> {
        for slot in buf {
            *slot = self.read_byte(timeout_ms)?;
        }
        Ok(())
    }

    /// Queue bytes for transmission.
    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Push queued bytes onto the wire.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Bytes available to read without waiting.
    fn available(&self) -> usize;

    /// Current level of a control line (true = asserted).
    fn line_asserted(&self, line: ControlLine) -> bool;
}

/// In-memory transport double for protocol tests.
///
/// Input is a scripted byte queue; output is recorded for assertion.
/// The COMMAND line can be scripted to stay asserted until a given number
/// of bytes have been consumed, modeling the host holding the line low
/// for exactly the command frame.
#[derive(Default)]
pub struct ScriptedTransport {
    input: VecDeque<u8>,
    output: Vec<u8>,
    bytes_read: usize,
    command_until: usize,
    attention_until: usize,
    motor: bool,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the scripted input.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Keep COMMAND asserted until `n` more bytes have been read.
    pub fn assert_command_for(&mut self, n: usize) {
        self.command_until = self.bytes_read + n;
    }

    /// Keep ATN asserted until `n` more bytes have been read.
    pub fn assert_attention_for(&mut self, n: usize) {
        self.attention_until = self.bytes_read + n;
    }

    pub fn set_motor(&mut self, asserted: bool) {
        self.motor = asserted;
    }

    /// Everything the service loop wrote so far.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Discard recorded output (between test phases).
    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// Unconsumed scripted input remaining.
    #[must_use]
    pub fn remaining_input(&self) -> usize {
        self.input.len()
    }
}

impl Transport for ScriptedTransport {
    fn read_byte(&mut self, _timeout_ms: u16) -> Result<u8, TransportError> {
        match self.input.pop_front() {
            Some(b) => {
                self.bytes_read += 1;
                Ok(b)
            }
            None => Err(TransportError::TimedOut),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.output.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn available(&self) -> usize {
        self.input.len()
    }

    fn line_asserted(&self, line: ControlLine) -> bool {
        match line {
            ControlLine::Command => self.bytes_read < self.command_until,
            ControlLine::Attention => self.bytes_read < self.attention_until,
            ControlLine::Motor => self.motor,
        }
    }
}
