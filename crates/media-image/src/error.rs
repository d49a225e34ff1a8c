//! Media image error type.

use thiserror::Error;

use crate::mediatype::MediaType;

/// Failures from mounting or block I/O on a media image.
///
/// All of these are per-call: a failed read or write leaves the image
/// mounted and usable, matching hosts that simply retry the sector.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("media type {0:?} is not block addressable")]
    NotBlockAddressable(MediaType),

    #[error("bad image header")]
    BadHeader,

    #[error("image size {actual} inconsistent with geometry ({expected} bytes required)")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("block {block} out of range (total {total})")]
    OutOfRange { block: u32, total: u32 },

    #[error("medium is write protected")]
    WriteProtected,

    #[error("wrong block length: expected {expected}, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("write verify failed at block {0}")]
    VerifyFailed(u32),

    #[error("image is not mounted")]
    NotMounted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
