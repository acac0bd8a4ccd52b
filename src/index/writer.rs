use crate::index::types::{DocId, IndexConfig, IndexKind, Position, MAX_TERM_CHARS};
use crate::utils::encoding::{encoded_len, write_i32_be, write_str};
use log::{debug, error};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Bytes charged for a document's first posting under a term
const DOC_OVERHEAD: u64 = 8;
/// Bytes charged per recorded position
const POSITION_COST: u64 = 4;

/// In-memory inverted index for one index kind that spills sorted blocks
/// to its temp directory whenever the memory estimate reaches the ceiling.
pub struct BlockWriter {
    kind: IndexKind,
    temp_dir: PathBuf,
    max_memory: u64,
    buffer_size: usize,
    /// term -> docId -> positions, all kept sorted
    terms: BTreeMap<String, BTreeMap<DocId, Vec<Position>>>,
    memory: u64,
    block_counter: u32,
    blocks: Vec<PathBuf>,
    failed_spills: u32,
}

impl BlockWriter {
    pub fn new(kind: IndexKind, temp_dir: &Path, config: &IndexConfig) -> Self {
        Self {
            kind,
            temp_dir: temp_dir.to_path_buf(),
            max_memory: config.max_memory(kind),
            buffer_size: config.buffer_size,
            terms: BTreeMap::new(),
            memory: 0,
            block_counter: 0,
            blocks: Vec::new(),
            failed_spills: 0,
        }
    }

    /// Record one occurrence of `term`. Empty and over-long terms are ignored.
    pub fn add_term(&mut self, term: &str, doc_id: DocId, position: Position) -> bool {
        if term.is_empty() || term.encode_utf16().count() > MAX_TERM_CHARS {
            return false;
        }

        let is_new = !self.terms.contains_key(term);
        if is_new {
            self.memory += 2 + encoded_len(term) as u64;
        }
        let docs = self.terms.entry(term.to_string()).or_default();

        let positions = docs.entry(doc_id).or_insert_with(|| {
            self.memory += DOC_OVERHEAD;
            Vec::new()
        });
        match positions.last() {
            Some(&last) if last > position => {
                let idx = positions.partition_point(|&p| p <= position);
                positions.insert(idx, position);
            }
            _ => positions.push(position),
        }
        self.memory += POSITION_COST;

        if self.memory >= self.max_memory {
            self.spill();
        }
        true
    }

    /// Write the in-memory map as the next block file.
    ///
    /// A failed write is logged and its data dropped; ingestion continues.
    pub fn spill(&mut self) {
        if self.terms.is_empty() {
            return;
        }

        let path = self
            .temp_dir
            .join(format!("block_{}.bin", self.block_counter));
        self.block_counter += 1;

        match self.write_block(&path) {
            Ok(bytes) => {
                debug!(
                    "{} index: spilled {} terms ({} bytes estimated, {} written) to {}",
                    self.kind,
                    self.terms.len(),
                    self.memory,
                    bytes,
                    path.display()
                );
                self.blocks.push(path);
            }
            Err(e) => {
                error!(
                    "{} index: failed to spill block {}: {}; {} terms dropped",
                    self.kind,
                    path.display(),
                    e,
                    self.terms.len()
                );
                let _ = fs::remove_file(&path);
                self.failed_spills += 1;
            }
        }

        self.terms.clear();
        self.memory = 0;
    }

    fn write_block(&self, path: &Path) -> io::Result<u64> {
        fs::create_dir_all(&self.temp_dir)?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, File::create(path)?);
        let mut bytes = 0u64;

        for (term, docs) in &self.terms {
            bytes += write_str(&mut writer, term)? as u64;
            write_i32_be(&mut writer, docs.len() as i32)?;
            bytes += 4;
            for (&doc_id, positions) in docs {
                write_i32_be(&mut writer, doc_id as i32)?;
                write_i32_be(&mut writer, positions.len() as i32)?;
                for &position in positions {
                    write_i32_be(&mut writer, position as i32)?;
                }
                bytes += 8 + 4 * positions.len() as u64;
            }
        }

        writer.flush()?;
        Ok(bytes)
    }

    /// Spill whatever is left and hand over the block files for merging
    pub fn finish(mut self) -> Vec<PathBuf> {
        self.spill();
        self.blocks
    }

    pub fn memory_estimate(&self) -> u64 {
        self.memory
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Blocks successfully written so far
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn failed_spills(&self) -> u32 {
        self.failed_spills
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::encoding::{read_i32_be, read_str};
    use std::io::{BufReader, Read};
    use tempfile::TempDir;

    fn writer(dir: &Path, max_memory: u64) -> BlockWriter {
        let config = IndexConfig::default().with_max_memory(max_memory);
        BlockWriter::new(IndexKind::Content, &dir.join("content-temp"), &config)
    }

    #[test]
    fn test_rejects_empty_and_long_terms() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(dir.path(), u64::MAX);

        assert!(!w.add_term("", 0, 0));
        assert!(!w.add_term(&"x".repeat(256), 0, 0));
        assert!(w.add_term(&"x".repeat(255), 0, 0));
        assert_eq!(w.term_count(), 1);
    }

    #[test]
    fn test_term_limit_counts_utf16_units() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(dir.path(), u64::MAX);

        // Each clef is one char but two UTF-16 units
        assert!(!w.add_term(&"\u{1D11E}".repeat(128), 0, 0));
        assert!(w.add_term(&"\u{1D11E}".repeat(127), 0, 0));
        assert!(w.add_term(&"\u{e9}".repeat(255), 0, 0));
        assert_eq!(w.term_count(), 2);
    }

    #[test]
    fn test_memory_estimate() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(dir.path(), u64::MAX);

        w.add_term("cat", 1, 0);
        // term (2 + 3) + doc 8 + position 4
        assert_eq!(w.memory_estimate(), 17);
        w.add_term("cat", 1, 4);
        assert_eq!(w.memory_estimate(), 21);
        w.add_term("cat", 2, 0);
        assert_eq!(w.memory_estimate(), 33);
    }

    #[test]
    fn test_spill_on_ceiling() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(dir.path(), 40);

        w.add_term("alpha", 1, 0);
        w.add_term("beta", 1, 1);
        assert_eq!(w.block_count(), 0);
        w.add_term("gamma", 1, 2);
        assert_eq!(w.block_count(), 1);
        assert_eq!(w.memory_estimate(), 0);
        assert_eq!(w.term_count(), 0);
        assert!(w.temp_dir().join("block_0.bin").exists());
    }

    #[test]
    fn test_spill_empty_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(dir.path(), u64::MAX);
        w.spill();
        assert_eq!(w.block_count(), 0);
        assert!(!w.temp_dir().exists());
    }

    #[test]
    fn test_block_record_layout() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(dir.path(), u64::MAX);
        w.add_term("mat", 7, 5);
        w.add_term("cat", 7, 3);
        w.add_term("cat", 2, 9);
        w.add_term("cat", 2, 1);

        let blocks = w.finish();
        assert_eq!(blocks.len(), 1);

        let mut r = BufReader::new(File::open(&blocks[0]).unwrap());
        assert_eq!(read_str(&mut r).unwrap(), "cat");
        assert_eq!(read_i32_be(&mut r).unwrap(), 2);
        assert_eq!(read_i32_be(&mut r).unwrap(), 2);
        assert_eq!(read_i32_be(&mut r).unwrap(), 2);
        assert_eq!(read_i32_be(&mut r).unwrap(), 1);
        assert_eq!(read_i32_be(&mut r).unwrap(), 9);
        assert_eq!(read_i32_be(&mut r).unwrap(), 7);
        assert_eq!(read_i32_be(&mut r).unwrap(), 1);
        assert_eq!(read_i32_be(&mut r).unwrap(), 3);
        assert_eq!(read_str(&mut r).unwrap(), "mat");
        assert_eq!(read_i32_be(&mut r).unwrap(), 1);

        let mut rest = Vec::new();
        r.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.len(), 12);
    }

    #[test]
    fn test_failed_spill_drops_block_and_continues() {
        let dir = TempDir::new().unwrap();
        // A regular file where the temp directory should go
        let blocker = dir.path().join("content-temp");
        fs::write(&blocker, b"not a directory").unwrap();

        let mut w = writer(dir.path(), u64::MAX);
        w.add_term("cat", 1, 0);
        w.spill();
        assert_eq!(w.failed_spills(), 1);
        assert_eq!(w.block_count(), 0);
        assert_eq!(w.term_count(), 0);

        assert!(w.add_term("dog", 1, 0));
    }
}
