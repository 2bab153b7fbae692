use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to read zip entry {name}: {source}")]
    Entry {
        name: String,
        source: std::io::Error,
    },

    #[error("Extracted .txt entries exceed {limit} bytes")]
    TooLarge { limit: usize },
}

/// A `.txt` file pulled out of an uploaded archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    /// Entry name as stored in the archive
    pub name: String,
    pub content: String,
}

/// Reads every non-directory `.txt` entry, in archive order.
///
/// Contents are decoded as UTF-8, replacing invalid sequences. The inflated
/// size of all extracted entries together may not exceed `max_total` bytes.
pub fn extract_text_entries(
    bytes: &[u8],
    max_total: usize,
) -> Result<Vec<TextEntry>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::new();
    let mut remaining = max_total;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() || !file.name().ends_with(".txt") {
            continue;
        }

        // Declared sizes can lie, so the read itself is capped as well
        let too_large = ArchiveError::TooLarge { limit: max_total };
        if file.size() > remaining as u64 {
            return Err(too_large);
        }

        let name = file.name().to_string();
        let mut buffer = Vec::new();
        file.by_ref()
            .take(remaining as u64 + 1)
            .read_to_end(&mut buffer)
            .map_err(|source| ArchiveError::Entry {
                name: name.clone(),
                source,
            })?;
        if buffer.len() > remaining {
            return Err(too_large);
        }
        remaining -= buffer.len();

        entries.push(TextEntry {
            name,
            content: String::from_utf8_lossy(&buffer).into_owned(),
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const LIMIT: usize = 1024 * 1024;

    /// Builds an in-memory archive; names ending in `/` become directories.
    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_only_txt_files_in_order() {
        let bytes = build_zip(&[
            ("b.txt", "second file".as_bytes()),
            ("notes.csv", b"a,b".as_slice()),
            ("logs/", b"".as_slice()),
            ("logs/a.txt", "첫 번째".as_bytes()),
        ]);

        let entries = extract_text_entries(&bytes, LIMIT).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "logs/a.txt"]);
        assert_eq!(entries[1].content, "첫 번째");
    }

    #[test]
    fn test_no_txt_entries() {
        let bytes = build_zip(&[("image.png", [0x89u8, 0x50].as_slice())]);
        assert!(extract_text_entries(&bytes, LIMIT).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let bytes = build_zip(&[("bad.txt", [0x68u8, 0x69, 0xff].as_slice())]);
        let entries = extract_text_entries(&bytes, LIMIT).unwrap();
        assert_eq!(entries[0].content, "hi\u{fffd}");
    }

    #[test]
    fn test_inflated_size_is_capped() {
        let big = vec![b'a'; 64 * 1024];
        let bytes = build_zip(&[("big.txt", big.as_slice())]);
        assert!(bytes.len() < 4 * 1024);

        assert!(matches!(
            extract_text_entries(&bytes, 16 * 1024),
            Err(ArchiveError::TooLarge { limit: 16384 })
        ));
        assert_eq!(extract_text_entries(&bytes, big.len()).unwrap()[0].content.len(), big.len());
    }

    #[test]
    fn test_cap_covers_all_entries_together() {
        let chunk = vec![b'a'; 600];
        let bytes = build_zip(&[
            ("one.txt", chunk.as_slice()),
            ("skipped.png", chunk.as_slice()),
            ("two.txt", chunk.as_slice()),
        ]);

        assert!(extract_text_entries(&bytes, 1200).is_ok());
        assert!(matches!(
            extract_text_entries(&bytes, 1000),
            Err(ArchiveError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(matches!(
            extract_text_entries(b"definitely not a zip", LIMIT),
            Err(ArchiveError::Zip(_))
        ));
    }
}
