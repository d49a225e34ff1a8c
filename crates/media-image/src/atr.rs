//! Atari ATR image header and PERCOM geometry.
//!
//! Header layout (16 bytes):
//! ```text
//! 00-01  magic 0x0296, little-endian (sum of "NICKATARI")
//! 02-03  paragraphs (16-byte units) on disk, low 16 bits
//! 04-05  sector size (0x80 or 0x100)
//! 06     paragraphs bits 16-23
//! 07-0F  not needed here
//! ```
//! 256-byte-sector images still start with three 128-byte boot sectors,
//! so two extra sectors are recovered when converting paragraphs to a
//! sector count.

use crate::error::MediaError;
use crate::geometry::Geometry;

/// ATR magic, the byte sum of "NICKATARI".
pub const ATR_MAGIC: u16 = 0x0296;

/// Header length preceding the sector data.
pub const ATR_HEADER_LEN: u64 = 16;

/// Parsed ATR header fields the bridge cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtrHeader {
    /// Sector size in bytes (128 or 256; 512 for oddball images).
    pub sector_size: u16,
    /// Total sectors, including the three short boot sectors.
    pub total_sectors: u32,
}

impl AtrHeader {
    /// Parse the 16-byte header.
    pub fn parse(buf: &[u8]) -> Result<Self, MediaError> {
        if buf.len() < ATR_HEADER_LEN as usize {
            return Err(MediaError::BadHeader);
        }
        let magic = u16::from(buf[1]) << 8 | u16::from(buf[0]);
        if magic != ATR_MAGIC {
            return Err(MediaError::BadHeader);
        }
        let sector_size = u16::from(buf[5]) << 8 | u16::from(buf[4]);
        if !matches!(sector_size, 128 | 256 | 512) {
            return Err(MediaError::BadHeader);
        }
        let paragraphs =
            u32::from(buf[3]) << 8 | u32::from(buf[2]) | u32::from(buf[6]) << 16;
        let mut total_sectors = paragraphs * 16 / u32::from(sector_size);
        // The three 128-byte boot sectors of a 256-byte-sector disk only
        // account for 1.5 full sectors of paragraphs.
        if sector_size == 256 {
            total_sectors += 2;
        }
        Ok(Self {
            sector_size,
            total_sectors,
        })
    }

    /// Build the header for a fresh image of this shape.
    #[must_use]
    pub fn to_bytes(self) -> [u8; ATR_HEADER_LEN as usize] {
        let data_len = self.geometry().data_len();
        let paragraphs = (data_len / 16) as u32;
        let mut buf = [0u8; ATR_HEADER_LEN as usize];
        buf[0] = (ATR_MAGIC & 0xFF) as u8;
        buf[1] = (ATR_MAGIC >> 8) as u8;
        buf[2] = (paragraphs & 0xFF) as u8;
        buf[3] = (paragraphs >> 8) as u8;
        buf[4] = (self.sector_size & 0xFF) as u8;
        buf[5] = (self.sector_size >> 8) as u8;
        buf[6] = (paragraphs >> 16) as u8;
        buf
    }

    /// Geometry this header declares.
    #[must_use]
    pub fn geometry(self) -> Geometry {
        if self.sector_size == 256 {
            Geometry::BootSectored {
                sector_size: 256,
                total_blocks: self.total_sectors,
            }
        } else {
            Geometry::Uniform {
                block_size: self.sector_size,
                total_blocks: self.total_sectors,
            }
        }
    }
}

/// PERCOM block: the 12-byte drive geometry record Atari hosts read and
/// write with commands $4E/$4F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercomBlock {
    pub tracks: u8,
    pub step_rate: u8,
    pub sectors_per_track: u16,
    pub sides: u8,
    pub density: u8,
    pub sector_size: u16,
}

const DENSITY_FM: u8 = 0;
const DENSITY_MFM: u8 = 4;
const SIDES_SS: u8 = 0;
const SIDES_DS: u8 = 1;

impl PercomBlock {
    /// Derive drive geometry from a sector count and size, recognizing
    /// the standard Atari disk layouts; anything else is reported as one
    /// long track.
    #[must_use]
    pub fn derive(total_sectors: u32, sector_size: u16) -> Self {
        let mut p = Self {
            tracks: 40,
            step_rate: 1,
            sectors_per_track: 18,
            sides: SIDES_SS,
            density: DENSITY_FM,
            sector_size,
        };
        match (total_sectors, sector_size) {
            (1040, _) => {
                // 5.25" 1050 enhanced density
                p.sectors_per_track = 26;
                p.density = DENSITY_MFM;
            }
            (720, 256) => p.density = DENSITY_MFM,
            (1440, _) => {
                p.sides = SIDES_DS;
                p.density = DENSITY_MFM;
            }
            (2880, _) => {
                p.sides = SIDES_DS;
                p.tracks = 80;
                p.density = DENSITY_MFM;
            }
            (2002, 128) => p.tracks = 77,
            (2002, 256) => {
                p.tracks = 77;
                p.density = DENSITY_MFM;
            }
            (4004, 128) => p.tracks = 77,
            (4004, 256) => {
                p.sides = SIDES_DS;
                p.tracks = 77;
                p.density = DENSITY_MFM;
            }
            (5760, _) => {
                // 3.5" high density
                p.sides = SIDES_DS;
                p.tracks = 80;
                p.sectors_per_track = 36;
                p.density = 8;
            }
            (720, _) => {}
            (n, _) => {
                // Custom size: one long track.
                p.tracks = 1;
                p.sectors_per_track = n as u16;
            }
        }
        p
    }

    /// Wire form as returned to the host.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 12] {
        [
            self.tracks,
            self.step_rate,
            (self.sectors_per_track >> 8) as u8,
            (self.sectors_per_track & 0xFF) as u8,
            self.sides,
            self.density,
            (self.sector_size >> 8) as u8,
            (self.sector_size & 0xFF) as u8,
            255, // drive present
            0,
            0,
            0,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(paragraphs: u32, sector_size: u16) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0] = 0x96;
        buf[1] = 0x02;
        buf[2] = (paragraphs & 0xFF) as u8;
        buf[3] = (paragraphs >> 8) as u8;
        buf[4] = (sector_size & 0xFF) as u8;
        buf[5] = (sector_size >> 8) as u8;
        buf[6] = (paragraphs >> 16) as u8;
        buf
    }

    #[test]
    fn parses_single_density_90k() {
        // 720 x 128 bytes = 92,160 = 5,760 paragraphs.
        let hdr = AtrHeader::parse(&header_bytes(5760, 128)).expect("valid header");
        assert_eq!(hdr.sector_size, 128);
        assert_eq!(hdr.total_sectors, 720);
        assert_eq!(hdr.geometry().data_len(), 92_160);
    }

    #[test]
    fn double_density_recovers_boot_sectors() {
        // 720 sectors DD: 3*128 + 717*256 = 183,936 = 11,496 paragraphs.
        let hdr = AtrHeader::parse(&header_bytes(11_496, 256)).expect("valid header");
        assert_eq!(hdr.total_sectors, 720);
        assert_eq!(hdr.geometry().data_len(), 183_936);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = header_bytes(5760, 128);
        buf[1] = 0x03;
        assert!(matches!(AtrHeader::parse(&buf), Err(MediaError::BadHeader)));
    }

    #[test]
    fn rejects_odd_sector_size() {
        assert!(matches!(
            AtrHeader::parse(&header_bytes(5760, 200)),
            Err(MediaError::BadHeader)
        ));
    }

    #[test]
    fn header_round_trips() {
        let hdr = AtrHeader {
            sector_size: 256,
            total_sectors: 720,
        };
        assert_eq!(AtrHeader::parse(&hdr.to_bytes()).expect("valid header"), hdr);
    }

    #[test]
    fn percom_standard_layouts() {
        let sd = PercomBlock::derive(720, 128);
        assert_eq!((sd.tracks, sd.sectors_per_track, sd.sides), (40, 18, 0));
        assert_eq!(sd.density, DENSITY_FM);

        let ed = PercomBlock::derive(1040, 128);
        assert_eq!(ed.sectors_per_track, 26);
        assert_eq!(ed.density, DENSITY_MFM);

        let dsdd = PercomBlock::derive(1440, 256);
        assert_eq!(dsdd.sides, SIDES_DS);

        let custom = PercomBlock::derive(300, 128);
        assert_eq!((custom.tracks, custom.sectors_per_track), (1, 300));
    }

    #[test]
    fn percom_wire_form() {
        let bytes = PercomBlock::derive(720, 128).to_bytes();
        assert_eq!(bytes[0], 40); // tracks
        assert_eq!(bytes[3], 18); // sectors per track, low byte
        assert_eq!(bytes[7], 128); // sector size, low byte
        assert_eq!(bytes[8], 255); // drive present
    }
}
