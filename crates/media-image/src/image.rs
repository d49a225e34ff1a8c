//! File-backed media image with bounds-checked block access.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, warn};

use crate::atr::{ATR_HEADER_LEN, AtrHeader};
use crate::error::MediaError;
use crate::geometry::Geometry;
use crate::mediatype::MediaType;

/// Whether the mounted medium may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// A mounted media image: backing store, geometry, and access mode.
///
/// One image exclusively owns its backing store for the lifetime of the
/// mount. The image has no error terminal state: a failed block operation
/// reports per-call and the image stays mounted, since hosts retry.
pub struct MediaImage<S> {
    store: S,
    media_type: MediaType,
    geometry: Geometry,
    /// Byte offset of the block grid within the store (ATR header).
    base_offset: u64,
    access: AccessMode,
    mounted: bool,
}

impl<S: Read + Write + Seek> MediaImage<S> {
    /// Bind a backing store as the given media type.
    ///
    /// The declared size must cover the type's block grid (plus header
    /// for ATR, whose geometry is read from the store rather than fixed
    /// by type). Sequential formats and `Unknown` are rejected.
    pub fn mount(
        mut store: S,
        media_type: MediaType,
        declared_size: u64,
        access: AccessMode,
    ) -> Result<Self, MediaError> {
        let (geometry, base_offset) = match media_type {
            MediaType::Atr => {
                store.seek(SeekFrom::Start(0))?;
                let mut header = [0u8; ATR_HEADER_LEN as usize];
                store.read_exact(&mut header)?;
                (AtrHeader::parse(&header)?.geometry(), ATR_HEADER_LEN)
            }
            other => {
                let Some(geometry) = Geometry::for_type(other) else {
                    return Err(MediaError::NotBlockAddressable(other));
                };
                (geometry, 0)
            }
        };
        let expected = base_offset + geometry.data_len();
        if declared_size < expected {
            return Err(MediaError::SizeMismatch {
                expected,
                actual: declared_size,
            });
        }
        debug!(
            "mounted {media_type:?}: {} blocks, {} data bytes, {access:?}",
            geometry.total_blocks(),
            geometry.data_len()
        );
        Ok(Self {
            store,
            media_type,
            geometry,
            base_offset,
            access,
            mounted: true,
        })
    }

    /// Read one block. Out-of-range indices fail without touching the
    /// store; short backing files surface as I/O errors, never partial
    /// reads.
    pub fn read_block(&mut self, block: u32) -> Result<Vec<u8>, MediaError> {
        self.check_mounted()?;
        let span = self.geometry.locate(block)?;
        self.store
            .seek(SeekFrom::Start(self.base_offset + span.offset))?;
        let mut buf = vec![0u8; span.len];
        self.store.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Write one block, optionally reading it back to verify.
    pub fn write_block(&mut self, block: u32, data: &[u8], verify: bool) -> Result<(), MediaError> {
        self.check_mounted()?;
        if self.access == AccessMode::ReadOnly {
            return Err(MediaError::WriteProtected);
        }
        let span = self.geometry.locate(block)?;
        if data.len() != span.len {
            return Err(MediaError::BadLength {
                expected: span.len,
                got: data.len(),
            });
        }
        self.store
            .seek(SeekFrom::Start(self.base_offset + span.offset))?;
        self.store.write_all(data)?;
        self.store.flush()?;
        if verify && self.read_block(block)? != data {
            warn!("verify failed at block {block}");
            return Err(MediaError::VerifyFailed(block));
        }
        Ok(())
    }

    /// Format the medium.
    ///
    /// Writable floppy-style images are zero-filled. Read-only mounts and
    /// fixed CP/M containers report success without touching the store;
    /// hosts issue format freely and expect it to succeed.
    pub fn format(&mut self) -> Result<(), MediaError> {
        self.check_mounted()?;
        if self.access == AccessMode::ReadOnly || self.media_type.format_is_noop() {
            debug!("format on {:?}: no-op success", self.media_type);
            return Ok(());
        }
        for block in 0..self.geometry.total_blocks() {
            let span = self.geometry.locate(block)?;
            self.store
                .seek(SeekFrom::Start(self.base_offset + span.offset))?;
            self.store.write_all(&vec![0u8; span.len])?;
        }
        self.store.flush()?;
        Ok(())
    }

    /// Flush and release the medium. Idempotent.
    pub fn unmount(&mut self) -> Result<(), MediaError> {
        if self.mounted {
            self.store.flush()?;
            self.mounted = false;
            debug!("unmounted {:?}", self.media_type);
        }
        Ok(())
    }

    fn check_mounted(&self) -> Result<(), MediaError> {
        if self.mounted {
            Ok(())
        } else {
            Err(MediaError::NotMounted)
        }
    }

    #[must_use]
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        self.access
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub fn total_blocks(&self) -> u32 {
        self.geometry.total_blocks()
    }

    /// Size in bytes of a given block (boot sectors differ on ATR).
    pub fn block_len(&self, block: u32) -> Result<usize, MediaError> {
        Ok(self.geometry.locate(block)?.len)
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}

impl MediaImage<File> {
    /// Open and mount a file, discovering the media type from its name
    /// and size.
    pub fn open(path: &Path, read_only: bool) -> Result<Self, MediaError> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;
        let size = file.metadata()?.len();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let media_type = MediaType::discover(name.as_deref().unwrap_or_default(), Some(size));
        let access = if read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::ReadWrite
        };
        Self::mount(file, media_type, size, access)
    }
}
