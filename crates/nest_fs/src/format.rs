//! Archive format registry and detection

use std::io::{self, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    TarLz4,
    TarBr,
    TarZst,
    Zip,
    SevenZip,
    Rar,
}

/// Recognized suffixes. Compound tar suffixes come before `.tar` so the first match wins.
pub const ARCHIVE_SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar.gz", ArchiveFormat::TarGz),
    (".tar.bz2", ArchiveFormat::TarBz2),
    (".tar.xz", ArchiveFormat::TarXz),
    (".tar.lz4", ArchiveFormat::TarLz4),
    (".tar.br", ArchiveFormat::TarBr),
    (".tar.zst", ArchiveFormat::TarZst),
    (".tar", ArchiveFormat::Tar),
    (".zip", ArchiveFormat::Zip),
    (".7z", ArchiveFormat::SevenZip),
    (".rar", ArchiveFormat::Rar),
];

/// Bytes needed by [`ArchiveFormat::sniff`] (the tar magic sits at offset 257)
pub const SNIFF_LEN: usize = 262;

/// True iff the lowercased name ends with a registered archive suffix
pub fn is_supported_archive(name: &str) -> bool {
    ArchiveFormat::from_name(name).is_some()
}

impl ArchiveFormat {
    /// Detect the format from a file name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        ARCHIVE_SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// Detect the format from leading magic bytes.
    ///
    /// Brotli streams carry no signature and are only recognized by name.
    pub fn sniff(head: &[u8]) -> Option<Self> {
        const MAGIC: &[(&[u8], ArchiveFormat)] = &[
            (b"PK\x03\x04", ArchiveFormat::Zip),
            (b"PK\x05\x06", ArchiveFormat::Zip),
            (b"7z\xBC\xAF\x27\x1C", ArchiveFormat::SevenZip),
            (b"Rar!\x1A\x07", ArchiveFormat::Rar),
            (b"\x1F\x8B", ArchiveFormat::TarGz),
            (b"BZh", ArchiveFormat::TarBz2),
            (b"\xFD7zXZ\x00", ArchiveFormat::TarXz),
            (b"\x28\xB5\x2F\xFD", ArchiveFormat::TarZst),
            (b"\x04\x22\x4D\x18", ArchiveFormat::TarLz4),
        ];

        if let Some((_, format)) = MAGIC.iter().find(|(magic, _)| head.starts_with(magic)) {
            return Some(*format);
        }

        match head.get(257..262) {
            Some(b"ustar") => Some(ArchiveFormat::Tar),
            _ => None,
        }
    }

    pub fn is_tar(&self) -> bool {
        !matches!(
            self,
            ArchiveFormat::Zip | ArchiveFormat::SevenZip | ArchiveFormat::Rar
        )
    }

    /// Wrap a raw tar stream in the decoder for this format
    pub fn tar_decoder<'a, R: Read + Send + 'a>(
        &self,
        reader: R,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(match self {
            ArchiveFormat::Tar => Box::new(reader),
            ArchiveFormat::TarGz => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            ArchiveFormat::TarBz2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
            ArchiveFormat::TarXz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
            ArchiveFormat::TarLz4 => Box::new(lz4_flex::frame::FrameDecoder::new(reader)),
            ArchiveFormat::TarBr => Box::new(brotli::Decompressor::new(reader, 4096)),
            ArchiveFormat::TarZst => Box::new(zstd::stream::read::Decoder::new(reader)?),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{:?} is not a tar stream", other),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(ArchiveFormat::from_name("test.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_name("test.7z"), Some(ArchiveFormat::SevenZip));
        assert_eq!(ArchiveFormat::from_name("a.TAR.GZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_name("a.tar.zst"), Some(ArchiveFormat::TarZst));
        assert_eq!(ArchiveFormat::from_name("a.tar"), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::from_name("a.Rar"), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::from_name("a.gz"), None);
        assert_eq!(ArchiveFormat::from_name("a.tgz"), None);
    }

    #[test]
    fn test_supported_archive_ignores_case() {
        for (suffix, _) in ARCHIVE_SUFFIXES {
            let lower = format!("name{}", suffix);
            let upper = lower.to_uppercase();
            assert!(is_supported_archive(&lower), "{}", lower);
            assert!(is_supported_archive(&upper), "{}", upper);
        }
        assert!(!is_supported_archive("readme.txt"));
        assert!(!is_supported_archive("zip"));
        assert!(!is_supported_archive(""));
    }

    #[test]
    fn test_sniff() {
        assert_eq!(ArchiveFormat::sniff(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::sniff(b"\x1F\x8B\x08"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::sniff(b"Rar!\x1A\x07\x00"), Some(ArchiveFormat::Rar));

        let mut tar_head = vec![0u8; SNIFF_LEN];
        tar_head[257..262].copy_from_slice(b"ustar");
        assert_eq!(ArchiveFormat::sniff(&tar_head), Some(ArchiveFormat::Tar));

        assert_eq!(ArchiveFormat::sniff(b"hello world"), None);
    }
}
