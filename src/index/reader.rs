use crate::index::error::IndexError;
use crate::index::page::{InternalPage, LeafPage, Page, PageType, TreeHeader, HEADER_SIZE};
use crate::index::registry::read_lengths;
use crate::index::types::*;
use crate::utils::encoding::read_i32_be;
use anyhow::{Context, Result};
use log::{debug, warn};
use lru::LruCache;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only view of one index kind: the tree file plus its postings file.
///
/// Holds its own file handles and page cache, so one searcher serves one
/// query context; open another for concurrent queries.
pub struct BPlusTreeSearcher {
    kind: IndexKind,
    tree_path: PathBuf,
    tree: File,
    postings: BufReader<File>,
    header: TreeHeader,
    page_size: usize,
    /// Never counted against or evicted from `cache`
    root: Option<Arc<Page>>,
    cache: LruCache<PageId, Arc<Page>>,
}

impl BPlusTreeSearcher {
    /// Open the `kind` index inside `layout`
    pub fn open(layout: &IndexLayout, kind: IndexKind, config: &IndexConfig) -> Result<Self> {
        Self::open_files(
            kind,
            &layout.tree_file(kind),
            &layout.postings_file(kind),
            config,
        )
    }

    pub fn open_files(
        kind: IndexKind,
        tree_path: &Path,
        postings_path: &Path,
        config: &IndexConfig,
    ) -> Result<Self> {
        let mut tree = open_index_file(tree_path)?;
        let postings = open_index_file(postings_path)?;

        let mut buf = [0u8; HEADER_SIZE];
        tree.read_exact(&mut buf).map_err(|_| {
            IndexError::corrupt(format!("{} has no complete header", tree_path.display()))
        })?;
        let header = TreeHeader::parse(&buf)?;
        if !header.is_ready() {
            return Err(IndexError::NotReady {
                path: tree_path.to_path_buf(),
            }
            .into());
        }

        let capacity = NonZeroUsize::new(config.cache_pages).unwrap_or(NonZeroUsize::MIN);
        let mut searcher = Self {
            kind,
            tree_path: tree_path.to_path_buf(),
            tree,
            postings: BufReader::with_capacity(config.buffer_size, postings),
            header,
            page_size: header.page_size as usize,
            root: None,
            cache: LruCache::new(capacity),
        };

        if header.height > 1 {
            let root = searcher.read_page(header.root_page_id, PageType::Internal)?;
            searcher.root = Some(Arc::new(root));
        }
        debug!(
            "opened {} index {}: root {}, {} pages, height {}",
            kind,
            tree_path.display(),
            header.root_page_id,
            header.total_pages,
            header.height
        );
        Ok(searcher)
    }

    pub fn header(&self) -> &TreeHeader {
        &self.header
    }

    /// Non-root pages currently held by the cache
    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    /// Full posting list of `term`, or `None` if the term is absent
    pub fn search_term(&mut self, term: &str) -> Result<Option<TermPostings>> {
        if term.is_empty() {
            return Ok(None);
        }
        let Some(entry) = self.find_entry(term)? else {
            return Ok(None);
        };
        let postings = self
            .read_postings(entry.postings_offset, entry.num_docs)
            .with_context(|| {
                format!(
                    "Failed to read {} postings of {:?} at offset {}",
                    self.kind, term, entry.postings_offset
                )
            })?;
        Ok(Some(TermPostings {
            term: entry.term,
            num_docs: entry.num_docs,
            postings,
        }))
    }

    /// Tree lookup only; the postings file is not touched
    pub fn get_term_info(&mut self, term: &str) -> Result<Option<TermInfo>> {
        if term.is_empty() {
            return Ok(None);
        }
        Ok(self.find_entry(term)?.as_ref().map(TermInfo::from))
    }

    /// Read a lengths file, falling back to empty statistics on any failure
    pub fn load_file_lengths(path: &Path) -> DocumentLengths {
        match read_lengths(path) {
            Ok(lengths) => lengths,
            Err(e) => {
                warn!(
                    "could not load document lengths from {}: {}; ranking without length statistics",
                    path.display(),
                    e
                );
                DocumentLengths::default()
            }
        }
    }

    fn find_entry(&mut self, term: &str) -> Result<Option<IndexEntry>> {
        let height = self.header.height;
        let mut page = self.root_page()?;
        for level in 1..height {
            let child = internal(&page)?.child_for(term);
            let expected = if level == height - 1 {
                PageType::Leaf
            } else {
                PageType::Internal
            };
            page = self.fetch(child, expected)?;
        }
        Ok(leaf(&page)?.find(term).cloned())
    }

    fn root_page(&mut self) -> Result<Arc<Page>> {
        if let Some(root) = &self.root {
            return Ok(Arc::clone(root));
        }
        let root = Arc::new(self.read_page(self.header.root_page_id, PageType::Leaf)?);
        self.root = Some(Arc::clone(&root));
        Ok(root)
    }

    /// Cached page fetch; a miss reads from disk and may evict the LRU page
    fn fetch(&mut self, page_id: PageId, expected: PageType) -> Result<Arc<Page>> {
        if let Some(page) = self.cache.get(&page_id) {
            if page.page_type() != expected {
                return Err(IndexError::PageTypeMismatch {
                    page_id,
                    expected: expected.name(),
                    found: page.page_type() as u8,
                }
                .into());
            }
            return Ok(Arc::clone(page));
        }
        let page = Arc::new(self.read_page(page_id, expected)?);
        self.cache.put(page_id, Arc::clone(&page));
        Ok(page)
    }

    fn read_page(&mut self, page_id: PageId, expected: PageType) -> Result<Page> {
        let bytes = self.read_page_bytes(page_id)?;
        let page = match expected {
            PageType::Internal => Page::Internal(InternalPage::parse(page_id, &bytes)?),
            PageType::Leaf => Page::Leaf(LeafPage::parse(page_id, &bytes)?),
        };
        Ok(page)
    }

    fn read_page_bytes(&mut self, page_id: PageId) -> Result<Vec<u8>> {
        if page_id < 0 || page_id >= self.header.total_pages {
            return Err(IndexError::corrupt(format!(
                "page id {} outside 0..{} in {}",
                page_id,
                self.header.total_pages,
                self.tree_path.display()
            ))
            .into());
        }

        let offset = HEADER_SIZE as u64 + page_id as u64 * self.page_size as u64;
        self.tree
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("Failed to seek to page {}", page_id))?;

        let mut buf = vec![0u8; self.page_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.tree.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!("Failed to read page {}", page_id)))
                }
            }
        }
        if filled < buf.len() {
            return Err(IndexError::ShortPageRead {
                page_id,
                read: filled,
                expected: self.page_size,
            }
            .into());
        }
        Ok(buf)
    }

    fn read_postings(&mut self, offset: u64, num_docs: u32) -> io::Result<Vec<Posting>> {
        self.postings.seek(SeekFrom::Start(offset))?;
        let mut postings = Vec::with_capacity(num_docs as usize);
        for _ in 0..num_docs {
            let doc_id = read_i32_be(&mut self.postings)? as DocId;
            let count = read_i32_be(&mut self.postings)?;
            if count < 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("negative position count for doc {}", doc_id),
                ));
            }
            let mut positions = Vec::with_capacity(count as usize);
            for _ in 0..count {
                positions.push(read_i32_be(&mut self.postings)? as Position);
            }
            postings.push(Posting { doc_id, positions });
        }
        Ok(postings)
    }

    /// Count pages by type with a sequential scan that bypasses the cache
    pub fn page_counts(&mut self) -> Result<(u32, u32)> {
        let (mut internal, mut leaves) = (0, 0);
        for page_id in 0..self.header.total_pages {
            let bytes = self.read_page_bytes(page_id)?;
            match bytes.first().copied().and_then(PageType::from_tag) {
                Some(PageType::Internal) => internal += 1,
                Some(PageType::Leaf) => leaves += 1,
                None => {
                    return Err(IndexError::corrupt(format!(
                        "page {} has unknown type tag {}",
                        page_id, bytes[0]
                    ))
                    .into())
                }
            }
        }
        Ok((internal, leaves))
    }

    /// Walk the leaf chain from the leftmost leaf, returning up to `limit` entries in term order
    pub fn leaf_entries(&mut self, limit: usize) -> Result<Vec<IndexEntry>> {
        let mut page_id = self.header.root_page_id;
        for _ in 1..self.header.height {
            let bytes = self.read_page_bytes(page_id)?;
            page_id = InternalPage::parse(page_id, &bytes)?.first_pointer;
        }

        let mut entries = Vec::new();
        let mut visited = 0;
        while page_id >= 0 && entries.len() < limit {
            visited += 1;
            if visited > self.header.total_pages {
                return Err(IndexError::corrupt("leaf chain loops").into());
            }
            let bytes = self.read_page_bytes(page_id)?;
            let leaf = LeafPage::parse(page_id, &bytes)?;
            let room = limit - entries.len();
            entries.extend(leaf.entries.into_iter().take(room));
            page_id = leaf.next_page_id;
        }
        Ok(entries)
    }
}

/// A missing tree or postings file means there is no index to search
fn open_index_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => anyhow::Error::new(IndexError::IndexUnavailable {
            path: path.to_path_buf(),
        }),
        _ => anyhow::Error::new(e).context(format!("Failed to open {}", path.display())),
    })
}

fn internal(page: &Page) -> Result<&InternalPage> {
    match page {
        Page::Internal(node) => Ok(node),
        Page::Leaf(leaf) => Err(IndexError::PageTypeMismatch {
            page_id: leaf.page_id,
            expected: PageType::Internal.name(),
            found: PageType::Leaf as u8,
        }
        .into()),
    }
}

fn leaf(page: &Page) -> Result<&LeafPage> {
    match page {
        Page::Leaf(leaf) => Ok(leaf),
        Page::Internal(node) => Err(IndexError::PageTypeMismatch {
            page_id: node.page_id,
            expected: PageType::Leaf.name(),
            found: PageType::Internal as u8,
        }
        .into()),
    }
}
