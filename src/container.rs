//! Container unwrapping for zip-packed documents
//!
//! Some producers ship the XML document inside a zip archive. The archive
//! always carries the geometry document as its largest entry, so unwrapping
//! picks that entry rather than relying on entry names.

use crate::error::{Error, Result};
use std::io::{Cursor, Read};
use tracing::debug;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Whether a byte buffer looks like a zip archive
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_MAGIC)
}

/// Turn raw container bytes into the XML document text
///
/// Zip archives are unwrapped to their largest entry; anything else is
/// treated as the document itself and must be valid UTF-8.
pub fn read_container_bytes(bytes: &[u8]) -> Result<String> {
    if is_zip(bytes) {
        extract_largest_entry(bytes)
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Xml(format!("document is not valid UTF-8: {}", e)))
    }
}

fn extract_largest_entry(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    if archive.is_empty() {
        return Err(Error::Archive("archive holds no entries".to_string()));
    }

    let mut largest = 0;
    let mut largest_size = 0u64;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.size() >= largest_size {
            largest_size = entry.size();
            largest = index;
        }
    }

    let mut entry = archive.by_index(largest)?;
    debug!(
        entry = entry.name(),
        size = largest_size,
        "unwrapping zip-packed document"
    );
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| Error::Archive(format!("entry is not valid UTF-8: {}", e)))?;
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_plain_bytes_pass_through() {
        let xml = read_container_bytes(b"<HPS version=\"1\"/>").unwrap();
        assert_eq!(xml, "<HPS version=\"1\"/>");
    }

    #[test]
    fn test_zip_detection() {
        assert!(!is_zip(b"<HPS/>"));
        let archive = build_archive(&[("model.xml", "<HPS/>")]);
        assert!(is_zip(&archive));
    }

    #[test]
    fn test_extracts_largest_entry() {
        let archive = build_archive(&[
            ("meta.txt", "small"),
            ("geometry.xml", "<HPS version=\"1.0\"><Schema>plain</Schema></HPS>"),
            ("note.txt", "tiny"),
        ]);
        let xml = read_container_bytes(&archive).unwrap();
        assert!(xml.contains("<Schema>plain</Schema>"));
    }

    #[test]
    fn test_empty_archive_is_an_error() {
        let archive = build_archive(&[]);
        assert!(matches!(
            read_container_bytes(&archive),
            Err(Error::Archive(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let result = read_container_bytes(&[0x3C, 0xFF, 0xFE, 0x3E]);
        assert!(matches!(result, Err(Error::Xml(_))));
    }
}
