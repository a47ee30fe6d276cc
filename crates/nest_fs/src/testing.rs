//! Archive builders shared by unit tests

use std::io::{Cursor, Write};

/// Every tar-based suffix
pub const TAR_FAMILY: &[&str] = &[
    ".tar",
    ".tar.gz",
    ".tar.bz2",
    ".tar.xz",
    ".tar.lz4",
    ".tar.br",
    ".tar.zst",
];

pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_600_000_000);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn sevenz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = sevenz_rust::SevenZWriter::new(Cursor::new(Vec::new())).unwrap();
    for (name, data) in files {
        let mut entry = sevenz_rust::SevenZArchiveEntry::new();
        entry.name = name.to_string();
        entry.has_stream = true;
        entry.is_directory = false;
        writer
            .push_archive_entry(entry, Some(Cursor::new(data.to_vec())))
            .unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// RAR 4.x archive with stored (uncompressed) members
pub fn rar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = flate2::Crc::new();
        crc.update(bytes);
        crc.sum()
    }

    // Header CRC is the low half of the CRC32 over everything after the CRC field
    fn block(body: Vec<u8>) -> Vec<u8> {
        let mut out = (crc32(&body) as u16).to_le_bytes().to_vec();
        out.extend(body);
        out
    }

    let mut out = b"Rar!\x1a\x07\x00".to_vec();

    let mut main = vec![0x73];
    main.extend(0u16.to_le_bytes());
    main.extend(13u16.to_le_bytes());
    main.extend([0u8; 6]);
    out.extend(block(main));

    // 2020-01-01 00:00:00 in DOS format
    let dos_time: u32 = ((40 << 9) | (1 << 5) | 1) << 16;
    for (name, data) in files {
        let name = name.replace('/', "\\");
        let mut head = vec![0x74];
        head.extend(0x8000u16.to_le_bytes());
        head.extend((32 + name.len() as u16).to_le_bytes());
        head.extend((data.len() as u32).to_le_bytes());
        head.extend((data.len() as u32).to_le_bytes());
        head.push(2); // Win32 host
        head.extend(crc32(data).to_le_bytes());
        head.extend(dos_time.to_le_bytes());
        head.push(20);
        head.push(0x30); // store
        head.extend((name.len() as u16).to_le_bytes());
        head.extend(0x20u32.to_le_bytes());
        head.extend(name.as_bytes());
        out.extend(block(head));
        out.extend_from_slice(data);
    }

    let mut end = vec![0x7b];
    end.extend(0x4000u16.to_le_bytes());
    end.extend(7u16.to_le_bytes());
    out.extend(block(end));
    out
}

/// Build an archive whose format follows the suffix of `name`
pub fn archive_bytes(name: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let lower = name.to_lowercase();
    if lower.ends_with(".zip") {
        return zip_bytes(files);
    }
    if lower.ends_with(".7z") {
        return sevenz_bytes(files);
    }
    if lower.ends_with(".rar") {
        return rar_bytes(files);
    }

    let tar = tar_bytes(files);
    let suffix = TAR_FAMILY
        .iter()
        .filter(|s| lower.ends_with(*s))
        .max_by_key(|s| s.len())
        .unwrap_or_else(|| panic!("no fixture builder for {}", name));

    match *suffix {
        ".tar" => tar,
        ".tar.gz" => {
            let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(&tar).unwrap();
            enc.finish().unwrap()
        }
        ".tar.bz2" => {
            let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            enc.write_all(&tar).unwrap();
            enc.finish().unwrap()
        }
        ".tar.xz" => {
            let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
            enc.write_all(&tar).unwrap();
            enc.finish().unwrap()
        }
        ".tar.lz4" => {
            let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
            enc.write_all(&tar).unwrap();
            enc.finish().unwrap()
        }
        ".tar.br" => {
            let mut out = Vec::new();
            {
                let mut enc = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
                enc.write_all(&tar).unwrap();
            }
            out
        }
        ".tar.zst" => zstd::stream::encode_all(Cursor::new(tar), 3).unwrap(),
        other => unreachable!("{}", other),
    }
}
