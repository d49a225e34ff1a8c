//! The FujiBus packet envelope.
//!
//! A packet is a SLIP-framed header plus a typed parameter list and an
//! optional opaque payload. The six-byte header is `{device, command,
//! length: u16 LE, checksum, descriptor}` where length covers the whole
//! unencoded packet and the checksum (additive rotate-carry) is computed
//! with its own field zeroed.
//!
//! The descriptor byte encodes the parameter list compactly: values 1-4
//! are that many u8 fields, 5-6 one or two u16 fields, 7 a single u32
//! field, 0 none. Bit 7 chains another descriptor byte directly after
//! the header, so longer lists are runs of descriptors followed by all
//! their little-endian field bytes in order.

use bus_core::checksum::sio_checksum;
use bus_core::slip;
use bus_core::{FrameError, check_payload_len};

/// Unencoded header length, descriptor included.
const HEADER_LEN: usize = 6;
/// Header offsets.
const OFF_LENGTH: usize = 2;
const OFF_CHECKSUM: usize = 4;
const OFF_DESCR: usize = 5;

/// Another descriptor byte follows this one.
const DESCR_ADDTL: u8 = 0x80;

/// Field size per descriptor value.
const FIELD_SIZE: [usize; 8] = [0, 1, 1, 1, 1, 2, 2, 4];
/// Field count per descriptor value.
const NUM_FIELDS: [usize; 8] = [0, 1, 2, 3, 4, 1, 2, 1];

/// Largest opaque payload a packet may carry.
pub const MAX_DATA: usize = 1024;

/// One typed parameter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    U8(u8),
    U16(u16),
    U32(u32),
}

impl Param {
    fn size(self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
        }
    }

    /// The field value widened to u32.
    #[must_use]
    pub fn value(self) -> u32 {
        match self {
            Self::U8(v) => u32::from(v),
            Self::U16(v) => u32::from(v),
            Self::U32(v) => v,
        }
    }
}

/// A parsed or under-construction FujiBus packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FujiBusPacket {
    pub device: u8,
    pub command: u8,
    params: Vec<Param>,
    data: Option<Vec<u8>>,
}

impl FujiBusPacket {
    #[must_use]
    pub fn new(device: u8, command: u8) -> Self {
        Self {
            device,
            command,
            params: Vec::new(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Value of the `index`th parameter, if present.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<u32> {
        self.params.get(index).map(|p| p.value())
    }

    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Serialize into a SLIP frame ready for the wire.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut descriptors = Vec::new();
        let mut fields = Vec::new();

        let mut i = 0;
        while i < self.params.len() {
            let size = self.params[i].size();
            let group_max = match size {
                1 => 4,
                2 => 2,
                _ => 1,
            };
            let mut count = 0usize;
            while i < self.params.len() && self.params[i].size() == size && count < group_max {
                let bytes = self.params[i].value().to_le_bytes();
                fields.extend_from_slice(&bytes[..size]);
                i += 1;
                count += 1;
            }
            let descr = match size {
                1 => count as u8,
                2 => 4 + count as u8,
                _ => 7,
            };
            descriptors.push(descr);
        }
        if descriptors.is_empty() {
            descriptors.push(0);
        }
        let last = descriptors.len() - 1;
        for descr in &mut descriptors[..last] {
            *descr |= DESCR_ADDTL;
        }

        let mut packet = vec![self.device, self.command, 0, 0, 0, descriptors[0]];
        packet.extend_from_slice(&descriptors[1..]);
        packet.extend_from_slice(&fields);
        if let Some(data) = &self.data {
            packet.extend_from_slice(data);
        }

        let length = packet.len() as u16;
        packet[OFF_LENGTH..OFF_LENGTH + 2].copy_from_slice(&length.to_le_bytes());
        packet[OFF_CHECKSUM] = sio_checksum(&packet);
        slip::encode(&packet)
    }

    /// Parse a SLIP frame back into a packet.
    pub fn from_serialized(input: &[u8]) -> Result<Self, FrameError> {
        let decoded = slip::decode(input)?;
        if decoded.len() < HEADER_LEN {
            return Err(FrameError::Truncated {
                expected: HEADER_LEN,
                got: decoded.len(),
            });
        }
        let declared =
            usize::from(u16::from_le_bytes([decoded[OFF_LENGTH], decoded[OFF_LENGTH + 1]]));
        if declared != decoded.len() {
            return Err(FrameError::Truncated {
                expected: declared,
                got: decoded.len(),
            });
        }
        check_payload_len(declared, HEADER_LEN + MAX_DATA)?;

        let received = decoded[OFF_CHECKSUM];
        let mut zeroed = decoded.clone();
        zeroed[OFF_CHECKSUM] = 0;
        let computed = sio_checksum(&zeroed);
        if computed != received {
            return Err(FrameError::ChecksumMismatch { computed, received });
        }

        // Walk the descriptor chain, then the field bytes it describes.
        let mut descriptors = Vec::new();
        let mut offset = OFF_DESCR;
        loop {
            let Some(&descr) = decoded.get(offset) else {
                return Err(FrameError::Truncated {
                    expected: offset + 1,
                    got: decoded.len(),
                });
            };
            offset += 1;
            descriptors.push(usize::from(descr & 0x07));
            if descr & DESCR_ADDTL == 0 {
                break;
            }
        }

        let mut params = Vec::new();
        for descr in descriptors {
            let size = FIELD_SIZE[descr];
            for _ in 0..NUM_FIELDS[descr] {
                let Some(bytes) = decoded.get(offset..offset + size) else {
                    return Err(FrameError::Truncated {
                        expected: offset + size,
                        got: decoded.len(),
                    });
                };
                let mut value = 0u32;
                for (shift, &b) in bytes.iter().enumerate() {
                    value |= u32::from(b) << (8 * shift);
                }
                params.push(match size {
                    1 => Param::U8(value as u8),
                    2 => Param::U16(value as u16),
                    _ => Param::U32(value),
                });
                offset += size;
            }
        }

        let data = if offset < decoded.len() {
            Some(decoded[offset..].to_vec())
        } else {
            None
        };

        Ok(Self {
            device: decoded[0],
            command: decoded[1],
            params,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_packet() -> FujiBusPacket {
        FujiBusPacket::new(42, 99)
            .with_param(Param::U8(0x11))
            .with_param(Param::U16(0x2233))
            .with_param(Param::U32(0x4455_6677))
    }

    #[test]
    fn serialize_produces_a_slip_frame() {
        let wire = FujiBusPacket::new(1, 2)
            .with_param(Param::U8(0x12))
            .with_param(Param::U16(0x3456))
            .serialize();
        assert_eq!(wire.first(), Some(&slip::END));
        assert_eq!(wire.last(), Some(&slip::END));
    }

    #[test]
    fn mixed_params_round_trip() {
        let wire = reference_packet().serialize();
        let parsed = FujiBusPacket::from_serialized(&wire).expect("valid packet");
        assert_eq!(parsed.device, 42);
        assert_eq!(parsed.command, 99);
        assert_eq!(parsed.param(0), Some(0x11));
        assert_eq!(parsed.param(1), Some(0x2233));
        assert_eq!(parsed.param(2), Some(0x4455_6677));
        assert!(parsed.data().is_none());
        assert_eq!(parsed, reference_packet());
    }

    #[test]
    fn payload_with_slip_specials_round_trips() {
        let payload = vec![0x00, slip::END, slip::ESC, 0xFF];
        let packet = FujiBusPacket::new(3, 4)
            .with_param(Param::U8(0xAA))
            .with_data(payload.clone());
        let wire = packet.serialize();
        // No bare delimiter inside the frame body.
        assert!(!wire[1..wire.len() - 1].contains(&slip::END));

        let parsed = FujiBusPacket::from_serialized(&wire).expect("valid packet");
        assert_eq!(parsed.param(0), Some(0xAA));
        assert_eq!(parsed.data(), Some(payload.as_slice()));
    }

    #[test]
    fn empty_packet_round_trips() {
        let wire = FujiBusPacket::new(7, 8).serialize();
        let parsed = FujiBusPacket::from_serialized(&wire).expect("valid packet");
        assert_eq!(parsed.device, 7);
        assert_eq!(parsed.command, 8);
        assert!(parsed.params().is_empty());
        assert!(parsed.data().is_none());
    }

    #[test]
    fn long_byte_runs_chain_descriptors() {
        let mut packet = FujiBusPacket::new(1, 1);
        for v in 0..6u8 {
            packet = packet.with_param(Param::U8(v));
        }
        let parsed = FujiBusPacket::from_serialized(&packet.serialize()).expect("valid packet");
        assert_eq!(parsed.params().len(), 6);
        for v in 0..6u8 {
            assert_eq!(parsed.param(usize::from(v)), Some(u32::from(v)));
        }
    }

    #[test]
    fn corrupted_byte_is_rejected() {
        let mut wire = reference_packet().serialize();
        // Flip a byte inside the frame body.
        wire[5] ^= 0xFF;
        assert!(FujiBusPacket::from_serialized(&wire).is_err());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let wire = reference_packet().serialize();
        let inner_end = wire.len() - 3;
        let mut cut = wire[..inner_end].to_vec();
        cut.push(slip::END);
        assert!(matches!(
            FujiBusPacket::from_serialized(&cut),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn declared_length_mismatch_is_rejected() {
        let mut packet = reference_packet().serialize();
        // Lie about the length field, then re-frame with a fixed checksum
        // so only the length check can fire.
        let mut decoded = slip::decode(&packet).expect("own frame");
        decoded[OFF_LENGTH] ^= 0x01;
        decoded[OFF_CHECKSUM] = 0;
        let computed = sio_checksum(&decoded);
        decoded[OFF_CHECKSUM] = computed;
        packet = slip::encode(&decoded);
        assert!(matches!(
            FujiBusPacket::from_serialized(&packet),
            Err(FrameError::Truncated { .. })
        ));
    }
}
