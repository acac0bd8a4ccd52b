//! The shared paths file and the per-kind document lengths files.
//!
//! A document's id is the byte offset of its path record in `paths.dat`, so
//! resolving an id is a single seek and string read. Lengths files start
//! with `i64 doc_count, i64 total_length` (patched when the build finishes)
//! followed by `(i32 doc_id, i32 length)` records.

use crate::index::types::{DocId, DocumentLengths, IndexConfig, IndexKind, IndexLayout};
use crate::utils::encoding::{read_i32_be, read_i64_be, read_str, write_i32_be, write_i64_be, write_str};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LENGTHS_HEADER: u64 = 16;
const LENGTHS_RECORD: u64 = 8;

/// Appends `(doc_id, length)` records and patches the totals on finish
struct LengthsWriter {
    out: BufWriter<File>,
    doc_count: u64,
    total_length: u64,
}

impl LengthsWriter {
    fn create(path: &Path, buffer_size: usize) -> io::Result<Self> {
        let mut out = BufWriter::with_capacity(buffer_size, File::create(path)?);
        write_i64_be(&mut out, 0)?;
        write_i64_be(&mut out, 0)?;
        Ok(Self {
            out,
            doc_count: 0,
            total_length: 0,
        })
    }

    fn record(&mut self, doc_id: DocId, length: u32) -> io::Result<()> {
        write_i32_be(&mut self.out, doc_id as i32)?;
        write_i32_be(&mut self.out, length as i32)?;
        self.doc_count += 1;
        self.total_length += length as u64;
        Ok(())
    }

    fn finish(self) -> io::Result<(u64, u64)> {
        let mut file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        write_i64_be(&mut file, self.doc_count as i64)?;
        write_i64_be(&mut file, self.total_length as i64)?;
        file.sync_all()?;
        Ok((self.doc_count, self.total_length))
    }
}

/// Assigns document ids during a build and records per-kind lengths
pub struct DocumentRegistry {
    paths: BufWriter<File>,
    offset: u64,
    name_lengths: LengthsWriter,
    content_lengths: LengthsWriter,
}

impl DocumentRegistry {
    pub fn create(layout: &IndexLayout, config: &IndexConfig) -> Result<Self> {
        let paths_file = layout.paths_file();
        let paths = File::create(&paths_file)
            .with_context(|| format!("Failed to create {}", paths_file.display()))?;

        let lengths = |kind: IndexKind| {
            let path = layout.lengths_file(kind);
            LengthsWriter::create(&path, config.buffer_size)
                .with_context(|| format!("Failed to create {}", path.display()))
        };

        Ok(Self {
            paths: BufWriter::with_capacity(config.buffer_size, paths),
            offset: 0,
            name_lengths: lengths(IndexKind::Name)?,
            content_lengths: lengths(IndexKind::Content)?,
        })
    }

    /// Append a path and return its document id
    pub fn register(&mut self, path: &Path) -> Result<DocId> {
        let doc_id = DocId::try_from(self.offset)
            .ok()
            .filter(|&id| id <= i32::MAX as DocId)
            .context("Paths file exceeds the addressable document id range")?;
        let written = write_str(&mut self.paths, &path.to_string_lossy())
            .with_context(|| format!("Failed to record path {}", path.display()))?;
        self.offset += written as u64;
        Ok(doc_id)
    }

    pub fn record_length(&mut self, kind: IndexKind, doc_id: DocId, length: u32) -> Result<()> {
        let writer = match kind {
            IndexKind::Name => &mut self.name_lengths,
            IndexKind::Content => &mut self.content_lengths,
        };
        writer
            .record(doc_id, length)
            .with_context(|| format!("Failed to write {} length", kind))
    }

    /// Flush everything and patch both lengths headers; returns documents registered
    pub fn finish(self) -> Result<u64> {
        let mut paths = self.paths;
        paths.flush().context("Failed to flush paths file")?;
        let (docs, _) = self
            .name_lengths
            .finish()
            .context("Failed to finish name lengths")?;
        self.content_lengths
            .finish()
            .context("Failed to finish content lengths")?;
        Ok(docs)
    }
}

/// Parse a lengths file
pub fn read_lengths(path: &Path) -> io::Result<DocumentLengths> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < LENGTHS_HEADER || (len - LENGTHS_HEADER) % LENGTHS_RECORD != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("lengths file is {} bytes", len),
        ));
    }

    let mut reader = BufReader::new(file);
    let doc_count = read_i64_be(&mut reader)?;
    let total_length = read_i64_be(&mut reader)?;
    if doc_count < 0 || total_length < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "negative totals in lengths header",
        ));
    }

    let records = (len - LENGTHS_HEADER) / LENGTHS_RECORD;
    let mut lengths = FxHashMap::default();
    lengths.reserve(records as usize);
    for _ in 0..records {
        let doc_id = read_i32_be(&mut reader)? as DocId;
        let length = read_i32_be(&mut reader)?.max(0) as u32;
        lengths.insert(doc_id, length);
    }

    Ok(DocumentLengths {
        doc_count: doc_count as u64,
        total_length: total_length as u64,
        lengths,
    })
}

/// Resolves document ids to paths by seeking in the paths file
pub struct PathResolver {
    reader: BufReader<File>,
}

impl PathResolver {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            reader: BufReader::with_capacity(4096, File::open(path)?),
        })
    }

    /// `None` when the id does not point at a readable record
    pub fn resolve(&mut self, doc_id: DocId) -> Option<PathBuf> {
        self.reader.seek(SeekFrom::Start(doc_id as u64)).ok()?;
        read_str(&mut self.reader).ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_doc_ids_are_byte_offsets() {
        let dir = TempDir::new().unwrap();
        let layout = IndexLayout::new(dir.path());
        let mut registry = DocumentRegistry::create(&layout, &IndexConfig::default()).unwrap();

        let a = registry.register(Path::new("/data/a.txt")).unwrap();
        let b = registry.register(Path::new("/data/דוח.txt")).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 2 + "/data/a.txt".len() as DocId);
        registry.finish().unwrap();

        let mut resolver = PathResolver::open(&layout.paths_file()).unwrap();
        assert_eq!(resolver.resolve(b), Some(PathBuf::from("/data/דוח.txt")));
        assert_eq!(resolver.resolve(a), Some(PathBuf::from("/data/a.txt")));
        assert_eq!(resolver.resolve(10_000), None);
    }

    #[test]
    fn test_lengths_header_patched() {
        let dir = TempDir::new().unwrap();
        let layout = IndexLayout::new(dir.path());
        let mut registry = DocumentRegistry::create(&layout, &IndexConfig::default()).unwrap();

        let a = registry.register(Path::new("a")).unwrap();
        let b = registry.register(Path::new("b")).unwrap();
        registry.record_length(IndexKind::Name, a, 1).unwrap();
        registry.record_length(IndexKind::Name, b, 2).unwrap();
        registry.record_length(IndexKind::Content, b, 6).unwrap();
        assert_eq!(registry.finish().unwrap(), 2);

        let name = read_lengths(&layout.lengths_file(IndexKind::Name)).unwrap();
        assert_eq!((name.doc_count, name.total_length), (2, 3));
        assert_eq!(name.lengths.get(&b), Some(&2));

        let content = read_lengths(&layout.lengths_file(IndexKind::Content)).unwrap();
        assert_eq!((content.doc_count, content.total_length), (1, 6));
        assert_eq!(content.lengths.get(&a), None);
    }

    #[test]
    fn test_read_lengths_rejects_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("len.dat");
        std::fs::write(&path, [0u8; 20]).unwrap();
        assert!(read_lengths(&path).is_err());
        assert!(read_lengths(&dir.path().join("missing.dat")).is_err());
    }
}
