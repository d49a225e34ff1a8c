//! Block-to-byte-offset geometry.
//!
//! Three layouts cover every supported format: uniform block grids (CP/M
//! images, D81, ProDOS), the CBM zoned layout where sectors-per-track
//! shrinks toward the disk hub, and the Atari rule that the first three
//! sectors of a 256-byte-sector disk are always 128 bytes.
//!
//! All bounds checking funnels through [`Geometry::locate`]; callers
//! never compute offsets themselves.

use crate::error::MediaError;
use crate::mediatype::MediaType;

/// One CBM speed zone: a run of tracks with a common sector count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    /// Number of tracks in the zone.
    pub tracks: u32,
    /// Sectors on each of those tracks.
    pub sectors_per_track: u32,
}

/// 1541 zone table: 21/19/18/17 sectors per track, 683 sectors total.
pub const D64_ZONES: [Zone; 4] = [
    Zone { tracks: 17, sectors_per_track: 21 },
    Zone { tracks: 7, sectors_per_track: 19 },
    Zone { tracks: 6, sectors_per_track: 18 },
    Zone { tracks: 5, sectors_per_track: 17 },
];

/// 1571 zone table: both sides, 1366 sectors total.
pub const D71_ZONES: [Zone; 8] = [
    Zone { tracks: 17, sectors_per_track: 21 },
    Zone { tracks: 7, sectors_per_track: 19 },
    Zone { tracks: 6, sectors_per_track: 18 },
    Zone { tracks: 5, sectors_per_track: 17 },
    Zone { tracks: 17, sectors_per_track: 21 },
    Zone { tracks: 7, sectors_per_track: 19 },
    Zone { tracks: 6, sectors_per_track: 18 },
    Zone { tracks: 5, sectors_per_track: 17 },
];

/// Byte position and length of one block within an image's data area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Offset from the start of the data area (header excluded).
    pub offset: u64,
    /// Block length in bytes.
    pub len: usize,
}

/// How blocks map onto the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Geometry {
    /// Every block the same size.
    Uniform { block_size: u16, total_blocks: u32 },
    /// CBM zoned layout; every sector the same size but tracks vary in
    /// sector count.
    Zoned {
        zones: &'static [Zone],
        sector_size: u16,
    },
    /// Atari layout for 256-byte-sector disks: sectors 0-2 are 128 bytes.
    BootSectored { sector_size: u16, total_blocks: u32 },
}

impl Geometry {
    /// Fixed geometry for a media type, if it has one.
    ///
    /// ATR geometry comes from the image header instead; sequential
    /// formats (XEX, CAS, ATX) have no block grid here.
    #[must_use]
    pub fn for_type(media_type: MediaType) -> Option<Self> {
        match media_type {
            MediaType::D64 => Some(Self::Zoned {
                zones: &D64_ZONES,
                sector_size: 256,
            }),
            MediaType::D71 => Some(Self::Zoned {
                zones: &D71_ZONES,
                sector_size: 256,
            }),
            MediaType::D81 => Some(Self::Uniform {
                block_size: 256,
                total_blocks: 3200,
            }),
            MediaType::Po => Some(Self::Uniform {
                block_size: 512,
                total_blocks: 280,
            }),
            MediaType::AppleDsk => Some(Self::Uniform {
                block_size: 256,
                total_blocks: 35 * 16,
            }),
            MediaType::ImgHd => Some(Self::cpm(8 * 1024 * 1024)),
            MediaType::ImgFd720 | MediaType::DskFd720Pcw => Some(Self::cpm(80 * 2 * 9 * 512)),
            MediaType::ImgFd144 => Some(Self::cpm(80 * 2 * 18 * 512)),
            MediaType::ImgFd360 => Some(Self::cpm(40 * 2 * 9 * 512)),
            MediaType::ImgFd120 => Some(Self::cpm(80 * 2 * 15 * 512)),
            MediaType::ImgFd111 => Some(Self::cpm(77 * 2 * 15 * 512)),
            MediaType::Atr
            | MediaType::Atx
            | MediaType::Xex
            | MediaType::Cas
            | MediaType::Unknown => None,
        }
    }

    /// CP/M images: uniform 512-byte sectors over the whole size.
    fn cpm(bytes: u64) -> Self {
        Self::Uniform {
            block_size: 512,
            total_blocks: (bytes / 512) as u32,
        }
    }

    /// Total number of addressable blocks.
    #[must_use]
    pub fn total_blocks(&self) -> u32 {
        match self {
            Self::Uniform { total_blocks, .. } | Self::BootSectored { total_blocks, .. } => {
                *total_blocks
            }
            Self::Zoned { zones, .. } => {
                zones.iter().map(|z| z.tracks * z.sectors_per_track).sum()
            }
        }
    }

    /// Total bytes the block grid spans.
    #[must_use]
    pub fn data_len(&self) -> u64 {
        match self {
            Self::Uniform {
                block_size,
                total_blocks,
            } => u64::from(*block_size) * u64::from(*total_blocks),
            Self::Zoned { sector_size, .. } => {
                u64::from(self.total_blocks()) * u64::from(*sector_size)
            }
            Self::BootSectored {
                sector_size,
                total_blocks,
            } => {
                // First three sectors are 128 bytes regardless.
                let full = u64::from(total_blocks.saturating_sub(3));
                3 * 128 + full * u64::from(*sector_size)
            }
        }
    }

    /// Locate a 0-based block: the single bounds check and offset
    /// computation for all block I/O.
    pub fn locate(&self, block: u32) -> Result<BlockSpan, MediaError> {
        let total = self.total_blocks();
        if block >= total {
            return Err(MediaError::OutOfRange { block, total });
        }
        let span = match self {
            Self::Uniform { block_size, .. } => BlockSpan {
                offset: u64::from(block) * u64::from(*block_size),
                len: usize::from(*block_size),
            },
            Self::Zoned { zones, sector_size } => {
                let mut remaining = block;
                let mut offset = 0u64;
                let mut span = None;
                for zone in *zones {
                    let zone_sectors = zone.tracks * zone.sectors_per_track;
                    if remaining < zone_sectors {
                        span = Some(BlockSpan {
                            offset: offset + u64::from(remaining) * u64::from(*sector_size),
                            len: usize::from(*sector_size),
                        });
                        break;
                    }
                    remaining -= zone_sectors;
                    offset += u64::from(zone_sectors) * u64::from(*sector_size);
                }
                // total_blocks() sums the same zone table, so the walk
                // always lands inside a zone for block < total.
                span.ok_or(MediaError::OutOfRange { block, total })?
            }
            Self::BootSectored { sector_size, .. } => {
                if block < 3 {
                    BlockSpan {
                        offset: u64::from(block) * 128,
                        len: 128,
                    }
                } else {
                    BlockSpan {
                        offset: 3 * 128 + u64::from(block - 3) * u64::from(*sector_size),
                        len: usize::from(*sector_size),
                    }
                }
            }
        };
        Ok(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_locate() {
        let g = Geometry::Uniform {
            block_size: 512,
            total_blocks: 1440,
        };
        assert_eq!(
            g.locate(0).expect("in range"),
            BlockSpan { offset: 0, len: 512 }
        );
        assert_eq!(g.locate(7).expect("in range").offset, 7 * 512);
        assert!(matches!(
            g.locate(1440),
            Err(MediaError::OutOfRange { block: 1440, total: 1440 })
        ));
        assert!(g.locate(1500).is_err());
    }

    #[test]
    fn d64_totals() {
        let g = Geometry::for_type(MediaType::D64).expect("block format");
        assert_eq!(g.total_blocks(), 683);
        assert_eq!(g.data_len(), 174_848);
    }

    #[test]
    fn d64_zone_boundaries() {
        let g = Geometry::for_type(MediaType::D64).expect("block format");
        // Last sector of zone 0: track 17, sector 20 -> block 356.
        let end_zone0 = 17 * 21 - 1;
        assert_eq!(
            g.locate(end_zone0).expect("in range").offset,
            u64::from(end_zone0) * 256
        );
        // First sector of zone 1 continues contiguously.
        assert_eq!(
            g.locate(17 * 21).expect("in range").offset,
            u64::from(17u32 * 21) * 256
        );
        // Directory track 18, sector 0 = block 357 at byte 0x16500.
        assert_eq!(g.locate(357).expect("in range").offset, 0x16500);
        assert!(g.locate(683).is_err());
    }

    #[test]
    fn d71_is_double_d64() {
        let g = Geometry::for_type(MediaType::D71).expect("block format");
        assert_eq!(g.total_blocks(), 1366);
        assert_eq!(g.data_len(), 2 * 174_848);
    }

    #[test]
    fn boot_sectored_first_three_short() {
        let g = Geometry::BootSectored {
            sector_size: 256,
            total_blocks: 722,
        };
        assert_eq!(g.locate(0).expect("in range"), BlockSpan { offset: 0, len: 128 });
        assert_eq!(g.locate(2).expect("in range"), BlockSpan { offset: 256, len: 128 });
        assert_eq!(
            g.locate(3).expect("in range"),
            BlockSpan { offset: 384, len: 256 }
        );
        assert_eq!(g.locate(4).expect("in range").offset, 384 + 256);
    }

    #[test]
    fn cpm_fd720_grid() {
        let g = Geometry::for_type(MediaType::ImgFd720).expect("block format");
        assert_eq!(g.total_blocks(), 1440);
        assert_eq!(g.data_len(), 737_280);
    }

    #[test]
    fn sequential_formats_have_no_grid() {
        assert_eq!(Geometry::for_type(MediaType::Xex), None);
        assert_eq!(Geometry::for_type(MediaType::Unknown), None);
    }
}
