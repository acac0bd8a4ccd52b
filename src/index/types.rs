use crate::utils::encoding::encoded_len;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Byte offset of the document's path record in the paths file
pub type DocId = u32;

/// Dense, zero-based page number inside a tree file
pub type PageId = i32;

/// Token position inside one document
pub type Position = u32;

/// Terms longer than this many UTF-16 code units are dropped at ingestion
pub const MAX_TERM_CHARS: usize = 255;

/// The two independent inverted indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Name,
    Content,
}

impl IndexKind {
    pub const ALL: [IndexKind; 2] = [IndexKind::Name, IndexKind::Content];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Name => "name",
            IndexKind::Content => "content",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IndexKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(IndexKind::Name),
            "content" => Ok(IndexKind::Content),
            other => anyhow::bail!("unknown index kind '{}', expected name or content", other),
        }
    }
}

/// One leaf entry: where a term's postings live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub term: String,
    pub num_docs: u32,
    pub postings_offset: u64,
}

impl IndexEntry {
    pub fn new(term: impl Into<String>, num_docs: u32, postings_offset: u64) -> Self {
        Self {
            term: term.into(),
            num_docs,
            postings_offset,
        }
    }

    /// Serialized size inside a leaf page
    pub fn size(&self) -> usize {
        2 + encoded_len(&self.term) + 4 + 8
    }
}

/// Positions of one term inside one document, ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub positions: Vec<Position>,
}

/// A term with its full posting list, docIds ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermPostings {
    pub term: String,
    pub num_docs: u32,
    pub postings: Vec<Posting>,
}

/// Directory information for a term without its postings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermInfo {
    pub term: String,
    pub num_docs: u32,
    pub postings_offset: u64,
}

impl From<&IndexEntry> for TermInfo {
    fn from(entry: &IndexEntry) -> Self {
        Self {
            term: entry.term.clone(),
            num_docs: entry.num_docs,
            postings_offset: entry.postings_offset,
        }
    }
}

/// Per-document token counts for one index kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLengths {
    pub doc_count: u64,
    pub total_length: u64,
    pub lengths: rustc_hash::FxHashMap<DocId, u32>,
}

/// Search hit resolved to a file path
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub doc_id: DocId,
    pub path: PathBuf,
    /// Phrase starts for exact search, every matched position for ranked search
    pub positions: Vec<Position>,
    /// BM25 score; zero for exact search
    pub score: f64,
}

/// Engine configuration, passed by reference into writer, merger and searcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Fixed size of every B+Tree page
    pub page_size: usize,
    /// Buffer size for sequential readers and writers
    pub buffer_size: usize,
    /// Memory ceiling of the name block writer before it spills
    pub name_max_memory: u64,
    /// Memory ceiling of the content block writer before it spills
    pub content_max_memory: u64,
    /// Non-root pages kept by each searcher
    pub cache_pages: usize,
    /// Files larger than this are indexed by name only
    pub max_file_size: u64,
    /// Directory names never descended into
    pub ignored_dirs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            page_size: 8192,
            buffer_size: 65536,
            name_max_memory: 1024 * 1024 * 1024,
            content_max_memory: 1024 * 1024 * 1024,
            cache_pages: 10,
            max_file_size: 100 * 1024 * 1024,
            ignored_dirs: vec![
                "$RECYCLE.BIN".to_string(),
                "System Volume Information".to_string(),
            ],
        }
    }
}

impl IndexConfig {
    pub fn max_memory(&self, kind: IndexKind) -> u64 {
        match kind {
            IndexKind::Name => self.name_max_memory,
            IndexKind::Content => self.content_max_memory,
        }
    }

    /// Set both memory ceilings at once
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.name_max_memory = bytes;
        self.content_max_memory = bytes;
        self
    }
}

/// File names of one index generation inside its directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: index_dir.into(),
        }
    }

    pub fn paths_file(&self) -> PathBuf {
        self.root.join("paths.dat")
    }

    pub fn meta_file(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    pub fn postings_file(&self, kind: IndexKind) -> PathBuf {
        self.root.join(format!("{}_postings.dat", kind))
    }

    pub fn tree_file(&self, kind: IndexKind) -> PathBuf {
        self.root.join(format!("{}_tree.idx", kind))
    }

    pub fn lengths_file(&self, kind: IndexKind) -> PathBuf {
        self.root.join(format!("{}_len.dat", kind))
    }

    pub fn temp_dir(&self, kind: IndexKind) -> PathBuf {
        self.root.join(format!("{}-temp", kind))
    }
}

/// Summary of one merged index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub terms: u64,
    pub root_page_id: PageId,
    pub total_pages: i32,
    pub height: i16,
    pub postings_bytes: u64,
}

/// Counters accumulated by one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub files: u64,
    pub directories: u64,
    pub content_files: u64,
    pub name_tokens: u64,
    pub content_tokens: u64,
    pub skipped: u64,
    pub name_blocks: u32,
    pub content_blocks: u32,
}

/// Index metadata stored in meta.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub roots: Vec<PathBuf>,
    pub doc_count: u64,
    pub name: TreeSummary,
    pub content: TreeSummary,
    pub stats: BuildStats,
    pub created_at: u64,
}

impl IndexMeta {
    pub fn tree(&self, kind: IndexKind) -> &TreeSummary {
        match kind {
            IndexKind::Name => &self.name,
            IndexKind::Content => &self.content,
        }
    }
}
