//! Virtual disk drive backed by a media image.
//!
//! The drive's lifecycle is Unmounted -> Mounted -> Unmounted; there is
//! no error terminal state. A failed block operation reports through the
//! per-command status and the drive stays mounted, since hosts retry
//! rather than remount.

use std::io::{Read, Seek, Write};

use bus_core::{CommandFrame, DeviceError, DeviceType, VirtualDevice};
use log::debug;
use media_image::{AccessMode, MediaError, MediaImage, PercomBlock};

/// Drive status bit: enhanced (26 sector-per-track) density.
const STATUS_ENHANCED_DENSITY: u8 = 0x80;
/// Drive status bit: double sided.
const STATUS_DOUBLE_SIDED: u8 = 0x40;
/// Drive status bit: double density.
const STATUS_DOUBLE_DENSITY: u8 = 0x20;
/// Drive status bit: last operation failed on a write-protected disk.
const STATUS_WRITE_PROTECT_FAIL: u8 = 0x08;
/// Format timeout reported in status byte 2 (810-style drive).
const STATUS_FORMAT_TIMEOUT: u8 = 0xE0;

/// Control commands the drive accepts (SIO command-byte values, which
/// the other buses map onto when they reach for the same operations).
const CMD_FORMAT: u8 = 0x21;
const CMD_FORMAT_MEDIUM: u8 = 0x22;
const CMD_PERCOM_READ: u8 = 0x4E;
const CMD_PERCOM_WRITE: u8 = 0x4F;

/// A disk drive slot: optionally mounted media plus sticky status bits.
pub struct DiskDevice<S> {
    image: Option<MediaImage<S>>,
    /// Set when the last write failed against write protection; reported
    /// in the next status and then cleared.
    write_protect_fail: bool,
}

impl<S> Default for DiskDevice<S> {
    fn default() -> Self {
        Self {
            image: None,
            write_protect_fail: false,
        }
    }
}

impl<S: Read + Write + Seek> DiskDevice<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert mounted media into the drive.
    pub fn mount(&mut self, image: MediaImage<S>) {
        debug!("drive mount: {:?}", image.media_type());
        self.image = Some(image);
    }

    /// Flush and eject the media. Safe to call with nothing mounted.
    pub fn unmount(&mut self) -> Result<(), MediaError> {
        if let Some(mut image) = self.image.take() {
            image.unmount()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.image.is_some()
    }

    fn image_mut(&mut self) -> Result<&mut MediaImage<S>, DeviceError> {
        self.image.as_mut().ok_or(DeviceError::NotMounted)
    }

    /// Hosts address sectors 1-based; the image's block grid is 0-based.
    fn block_for(frame: &CommandFrame) -> Result<u32, DeviceError> {
        let sector = frame.aux();
        if sector == 0 {
            return Err(DeviceError::OutOfRange { block: 0, total: 0 });
        }
        Ok(u32::from(sector) - 1)
    }

    fn percom(&self) -> Option<PercomBlock> {
        let image = self.image.as_ref()?;
        let sector_size = image.block_len(image.total_blocks() - 1).ok()? as u16;
        Some(PercomBlock::derive(image.total_blocks(), sector_size))
    }
}

fn map_media_err(err: MediaError) -> DeviceError {
    match err {
        MediaError::OutOfRange { block, total } => DeviceError::OutOfRange { block, total },
        MediaError::WriteProtected => DeviceError::WriteProtected,
        MediaError::NotMounted => DeviceError::NotMounted,
        MediaError::BadLength { expected, got } => DeviceError::BadLength { expected, got },
        MediaError::Io(io) => DeviceError::Io(io),
        _ => DeviceError::Unsupported,
    }
}

impl<S: Read + Write + Seek> VirtualDevice for DiskDevice<S> {
    fn device_type(&self) -> DeviceType {
        DeviceType::Disk
    }

    /// Four status bytes: drive flags, inverted controller status,
    /// format timeout, unused.
    fn status(&mut self, _frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        let mut flags = 0u8;
        if let Some(image) = &self.image {
            let total = image.total_blocks();
            let sector_size = image.block_len(total - 1).map_err(map_media_err)?;
            if total == 1040 {
                flags |= STATUS_ENHANCED_DENSITY;
            }
            if sector_size == 256 {
                flags |= STATUS_DOUBLE_DENSITY;
            }
            if total == 1440 || total == 2880 {
                flags |= STATUS_DOUBLE_SIDED;
            }
        }
        if self.write_protect_fail {
            flags |= STATUS_WRITE_PROTECT_FAIL;
            self.write_protect_fail = false;
        }
        Ok(vec![flags, 0xFF, STATUS_FORMAT_TIMEOUT, 0x00])
    }

    fn read(&mut self, frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        let block = Self::block_for(frame)?;
        self.image_mut()?.read_block(block).map_err(map_media_err)
    }

    fn write(&mut self, frame: &CommandFrame, data: &[u8]) -> Result<(), DeviceError> {
        let block = Self::block_for(frame)?;
        // 'W' commands verify after writing; 'P' (put) does not.
        let verify = matches!(frame.command, 0x57 | 0xD7);
        let result = self
            .image_mut()?
            .write_block(block, data, verify)
            .map_err(map_media_err);
        if matches!(result, Err(DeviceError::WriteProtected)) {
            self.write_protect_fail = true;
        }
        result
    }

    fn control(&mut self, frame: &CommandFrame) -> Result<Vec<u8>, DeviceError> {
        match frame.command {
            CMD_FORMAT | CMD_FORMAT_MEDIUM | 0xA1 | 0xA2 => {
                let image = self.image_mut()?;
                image.format().map_err(map_media_err)?;
                // Reply is a sector-sized empty bad-sector map terminated
                // by $FFFF.
                let len = image.block_len(0).map_err(map_media_err)?;
                let mut map = vec![0u8; len];
                map[0] = 0xFF;
                map[1] = 0xFF;
                Ok(map)
            }
            CMD_PERCOM_READ => self
                .percom()
                .map(|p| p.to_bytes().to_vec())
                .ok_or(DeviceError::NotMounted),
            // Accepted for host compatibility; the image's geometry is
            // authoritative.
            CMD_PERCOM_WRITE => Ok(Vec::new()),
            _ => Err(DeviceError::Unsupported),
        }
    }

    fn write_len(&self, frame: &CommandFrame) -> usize {
        let Some(image) = &self.image else {
            return 0;
        };
        let Ok(block) = Self::block_for(frame) else {
            return 0;
        };
        image.block_len(block).unwrap_or(0)
    }

    fn open(&mut self, _frame: &CommandFrame, _name: &[u8]) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported)
    }
}

/// Whether a mounted image would accept writes (used by status displays).
pub fn is_read_only<S: Read + Write + Seek>(device: &DiskDevice<S>) -> bool {
    device
        .image
        .as_ref()
        .is_some_and(|i| i.access_mode() == AccessMode::ReadOnly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use media_image::MediaType;

    fn mounted_drive() -> DiskDevice<Cursor<Vec<u8>>> {
        let mut data = vec![0u8; 737_280];
        data[..4].copy_from_slice(b"BOOT");
        let image = MediaImage::mount(
            Cursor::new(data),
            MediaType::ImgFd720,
            737_280,
            AccessMode::ReadWrite,
        )
        .expect("mounts");
        let mut drive = DiskDevice::new();
        drive.mount(image);
        drive
    }

    #[test]
    fn read_sector_one_is_block_zero() {
        let mut drive = mounted_drive();
        let frame = CommandFrame::new(0x31, b'R', 1, 0);
        let data = drive.read(&frame).expect("mounted");
        assert_eq!(&data[..4], b"BOOT");
        assert_eq!(data.len(), 512);
    }

    #[test]
    fn sector_zero_rejected() {
        let mut drive = mounted_drive();
        let frame = CommandFrame::new(0x31, b'R', 0, 0);
        assert!(matches!(
            drive.read(&frame),
            Err(DeviceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn unmounted_drive_reports_not_mounted() {
        let mut drive: DiskDevice<Cursor<Vec<u8>>> = DiskDevice::new();
        let frame = CommandFrame::new(0x31, b'R', 1, 0);
        assert!(matches!(drive.read(&frame), Err(DeviceError::NotMounted)));
        // Status still answers with no density bits.
        let status = drive.status(&frame).expect("always answers");
        assert_eq!(status[0], 0);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut drive = mounted_drive();
        let frame = CommandFrame::new(0x31, b'W', 5, 0);
        drive.write(&frame, &[0x77; 512]).expect("writable");
        assert_eq!(drive.read(&frame).expect("mounted"), vec![0x77; 512]);
    }

    #[test]
    fn write_protect_sets_status_bit_once() {
        let mut data = vec![0u8; 737_280];
        data[..1].copy_from_slice(b"X");
        let image = MediaImage::mount(
            Cursor::new(data),
            MediaType::ImgFd720,
            737_280,
            AccessMode::ReadOnly,
        )
        .expect("mounts");
        let mut drive = DiskDevice::new();
        drive.mount(image);

        let frame = CommandFrame::new(0x31, b'P', 1, 0);
        assert!(matches!(
            drive.write(&frame, &[0; 512]),
            Err(DeviceError::WriteProtected)
        ));
        let status = drive.status(&frame).expect("answers");
        assert_ne!(status[0] & STATUS_WRITE_PROTECT_FAIL, 0);
        // Sticky bit clears after being reported.
        let status = drive.status(&frame).expect("answers");
        assert_eq!(status[0] & STATUS_WRITE_PROTECT_FAIL, 0);
    }

    #[test]
    fn status_reflects_density() {
        let mut drive = mounted_drive();
        // FD720 has 1440 x 512-byte sectors: double sided, "double density".
        let status = drive
            .status(&CommandFrame::new(0x31, b'S', 0, 0))
            .expect("answers");
        assert_ne!(status[0] & STATUS_DOUBLE_SIDED, 0);
        assert_eq!(status[2], STATUS_FORMAT_TIMEOUT);
    }

    #[test]
    fn format_returns_empty_bad_sector_map() {
        let mut drive = mounted_drive();
        let frame = CommandFrame::new(0x31, CMD_FORMAT, 0, 0);
        let map = drive.control(&frame).expect("formats");
        assert_eq!(map.len(), 512);
        assert_eq!(&map[..2], &[0xFF, 0xFF]);
    }

    #[test]
    fn percom_read_describes_geometry() {
        let mut drive = mounted_drive();
        let frame = CommandFrame::new(0x31, CMD_PERCOM_READ, 0, 0);
        let block = drive.control(&frame).expect("mounted");
        assert_eq!(block.len(), 12);
        // 1440 sectors -> double sided flag in byte 4.
        assert_eq!(block[4], 1);
    }

    #[test]
    fn write_len_tracks_sector_size() {
        let drive = mounted_drive();
        assert_eq!(drive.write_len(&CommandFrame::new(0x31, b'W', 1, 0)), 512);
        let empty: DiskDevice<Cursor<Vec<u8>>> = DiskDevice::new();
        assert_eq!(empty.write_len(&CommandFrame::new(0x31, b'W', 1, 0)), 0);
    }

    #[test]
    fn unknown_control_is_unsupported() {
        let mut drive = mounted_drive();
        assert!(matches!(
            drive.control(&CommandFrame::new(0x31, 0x99, 0, 0)),
            Err(DeviceError::Unsupported)
        ));
    }
}
