//! Media images backing the virtual disk devices.
//!
//! A media image is a file standing in for a physical disk, addressed in
//! fixed- or zoned-size blocks. This crate discovers the format from the
//! filename and size, maps block numbers to byte offsets through one
//! bounds-checked accessor, and performs exact-length block transfers
//! against the backing store.

mod atr;
mod error;
mod geometry;
mod image;
mod mediatype;

pub use atr::{ATR_HEADER_LEN, ATR_MAGIC, AtrHeader, PercomBlock};
pub use error::MediaError;
pub use geometry::{BlockSpan, D64_ZONES, D71_ZONES, Geometry, Zone};
pub use image::{AccessMode, MediaImage};
pub use mediatype::MediaType;
