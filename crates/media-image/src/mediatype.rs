//! Media type discovery.
//!
//! Most formats are identified by file extension alone. The CP/M `IMG`
//! and `DSK` images all share an extension and a 512-byte sector, so they
//! are told apart by exact byte size against the RomWBW drive table
//! (8 MB hard-disk slices and the classic floppy geometries).

/// Disk/media image formats the bridge can back a drive with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Atari ATR (16-byte header + sectors).
    Atr,
    /// Atari ATX (timing-annotated, copy-protected images).
    Atx,
    /// Atari executable served as a virtual boot disk.
    Xex,
    /// Atari cassette image.
    Cas,
    /// Commodore 1541 image, 683 zoned 256-byte sectors.
    D64,
    /// Commodore 1571 image, double-sided D64.
    D71,
    /// Commodore 1581 image, 3200 uniform 256-byte sectors.
    D81,
    /// Apple ProDOS-ordered image, 512-byte blocks.
    Po,
    /// Apple DOS 3.3-ordered image, 35 tracks x 16 x 256.
    AppleDsk,
    /// CP/M 8 MB hard-disk slice.
    ImgHd,
    /// CP/M 3.5" DS/DD 720K floppy.
    ImgFd720,
    /// CP/M 3.5" DS/HD 1.44M floppy.
    ImgFd144,
    /// CP/M 5.25" DS/DD 360K floppy.
    ImgFd360,
    /// CP/M 5.25" DS/HD 1.2M floppy.
    ImgFd120,
    /// CP/M 8" DS/DD 1.11M floppy.
    ImgFd111,
    /// CP/M 720K floppy, PCW256/Pro-DOS layout.
    DskFd720Pcw,
    /// No known format matched.
    Unknown,
}

/// CP/M images that share the `IMG` extension, by exact byte size.
const IMG_SIZES: [(u64, MediaType); 6] = [
    (8 * 1024 * 1024, MediaType::ImgHd),
    (80 * 2 * 9 * 512, MediaType::ImgFd720),
    (80 * 2 * 18 * 512, MediaType::ImgFd144),
    (40 * 2 * 9 * 512, MediaType::ImgFd360),
    (80 * 2 * 15 * 512, MediaType::ImgFd120),
    (77 * 2 * 15 * 512, MediaType::ImgFd111),
];

/// `DSK` images, by exact byte size.
const DSK_SIZES: [(u64, MediaType); 2] = [
    (80 * 2 * 9 * 512, MediaType::DskFd720Pcw),
    (35 * 16 * 256, MediaType::AppleDsk),
];

impl MediaType {
    /// Identify a media type from a filename and, for size-disambiguated
    /// extensions, the file size.
    ///
    /// Extensions match case-insensitively. Returns [`MediaType::Unknown`]
    /// when nothing matches, including a size-disambiguated extension with
    /// no size given or a size not in the table.
    #[must_use]
    pub fn discover(filename: &str, size: Option<u64>) -> Self {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return Self::Unknown;
        };
        match ext.to_ascii_uppercase().as_str() {
            "ATR" => Self::Atr,
            "ATX" => Self::Atx,
            "XEX" | "COM" | "BIN" => Self::Xex,
            "CAS" => Self::Cas,
            "D64" => Self::D64,
            "D71" => Self::D71,
            "D81" => Self::D81,
            "PO" => Self::Po,
            "IMG" => Self::from_size_table(&IMG_SIZES, size),
            "DSK" => Self::from_size_table(&DSK_SIZES, size),
            _ => Self::Unknown,
        }
    }

    fn from_size_table(table: &[(u64, Self)], size: Option<u64>) -> Self {
        let Some(size) = size else {
            return Self::Unknown;
        };
        table
            .iter()
            .find(|(bytes, _)| *bytes == size)
            .map_or(Self::Unknown, |(_, t)| *t)
    }

    /// Whether format commands are accepted as a harmless no-op.
    ///
    /// CP/M slices live inside a fixed container the host must not
    /// reinitialize; a host-issued format reports success and does
    /// nothing, which is intentional.
    #[must_use]
    pub fn format_is_noop(self) -> bool {
        matches!(
            self,
            Self::ImgHd
                | Self::ImgFd720
                | Self::ImgFd144
                | Self::ImgFd360
                | Self::ImgFd120
                | Self::ImgFd111
                | Self::DskFd720Pcw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_by_extension() {
        assert_eq!(MediaType::discover("image.D64", None), MediaType::D64);
        assert_eq!(MediaType::discover("image.d64", None), MediaType::D64);
        assert_eq!(MediaType::discover("boot.atr", None), MediaType::Atr);
        assert_eq!(MediaType::discover("game.XEX", None), MediaType::Xex);
        assert_eq!(MediaType::discover("loader.CoM", None), MediaType::Xex);
        assert_eq!(MediaType::discover("side2.d71", None), MediaType::D71);
        assert_eq!(MediaType::discover("big.d81", None), MediaType::D81);
        assert_eq!(MediaType::discover("hdv.po", None), MediaType::Po);
    }

    #[test]
    fn unknown_extension() {
        assert_eq!(MediaType::discover("image.XYZ", None), MediaType::Unknown);
        assert_eq!(MediaType::discover("no_extension", None), MediaType::Unknown);
    }

    #[test]
    fn img_disambiguated_by_size() {
        assert_eq!(
            MediaType::discover("x.img", Some(80 * 2 * 9 * 512)),
            MediaType::ImgFd720
        );
        assert_eq!(
            MediaType::discover("x.img", Some(8 * 1024 * 1024)),
            MediaType::ImgHd
        );
        assert_eq!(
            MediaType::discover("x.IMG", Some(80 * 2 * 18 * 512)),
            MediaType::ImgFd144
        );
        assert_eq!(
            MediaType::discover("x.img", Some(77 * 2 * 15 * 512)),
            MediaType::ImgFd111
        );
    }

    #[test]
    fn img_without_size_is_unknown() {
        assert_eq!(MediaType::discover("x.img", None), MediaType::Unknown);
        assert_eq!(MediaType::discover("x.img", Some(12345)), MediaType::Unknown);
    }

    #[test]
    fn dsk_disambiguated_by_size() {
        assert_eq!(
            MediaType::discover("x.dsk", Some(80 * 2 * 9 * 512)),
            MediaType::DskFd720Pcw
        );
        assert_eq!(
            MediaType::discover("games.dsk", Some(35 * 16 * 256)),
            MediaType::AppleDsk
        );
    }
}
