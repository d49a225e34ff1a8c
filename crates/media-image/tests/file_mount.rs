//! File-backed mount scenarios: discovery from real paths, the FD720
//! end-to-end read path, and read-only mounts.

use std::fs;
use std::io::Write;

use media_image::{AccessMode, MediaError, MediaImage, MediaType};

/// Build an FD720-sized CP/M image on disk with a recognizable first block.
fn write_fd720(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("slice.img");
    let mut file = fs::File::create(&path).expect("create image");
    let mut first = vec![0u8; 512];
    for (i, b) in first.iter_mut().enumerate() {
        *b = i as u8;
    }
    file.write_all(&first).expect("write block 0");
    file.set_len(80 * 2 * 9 * 512).expect("extend to full size");
    path
}

#[test]
fn fd720_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_fd720(&dir);

    let mut img = MediaImage::open(&path, false).expect("discovers and mounts");
    assert_eq!(img.media_type(), MediaType::ImgFd720);
    assert_eq!(img.total_blocks(), 1440);

    // Block 0 comes back exactly as the file's first 512 bytes.
    let block0 = img.read_block(0).expect("in range");
    let on_disk = fs::read(&path).expect("readable");
    assert_eq!(block0, on_disk[..512]);

    // Beyond the 80x2x9 geometry: an error, no bytes.
    assert!(matches!(
        img.read_block(1500),
        Err(MediaError::OutOfRange { block: 1500, total: 1440 })
    ));

    img.unmount().expect("flushes");
}

#[test]
fn writes_persist_to_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_fd720(&dir);

    let mut img = MediaImage::open(&path, false).expect("mounts");
    img.write_block(3, &[0x5A; 512], true).expect("writable");
    img.unmount().expect("flushes");

    let on_disk = fs::read(&path).expect("readable");
    assert!(on_disk[3 * 512..4 * 512].iter().all(|&b| b == 0x5A));
}

#[test]
fn read_only_open_write_protects() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_fd720(&dir);

    let mut img = MediaImage::open(&path, true).expect("mounts");
    assert_eq!(img.access_mode(), AccessMode::ReadOnly);
    assert!(matches!(
        img.write_block(0, &[0; 512], false),
        Err(MediaError::WriteProtected)
    ));
}

#[test]
fn unrecognized_file_fails_to_mount() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("garbage.xyz");
    fs::write(&path, vec![0u8; 4096]).expect("create file");
    assert!(matches!(
        MediaImage::open(&path, false),
        Err(MediaError::NotBlockAddressable(MediaType::Unknown))
    ));
}
