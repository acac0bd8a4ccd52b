//! K-way merge of spilled blocks into the final postings and tree files.
//!
//! The merge streams terms in order, so the postings file and the leaf
//! level of the tree are written in a single pass. Internal levels are then
//! appended bottom-up and the header is patched last; until that patch a
//! reader sees placeholder values and treats the index as not ready.

use crate::index::error::IndexError;
use crate::index::page::{InternalPage, LeafPage, TreeHeader};
use crate::index::types::{
    DocId, IndexConfig, IndexEntry, IndexKind, IndexLayout, PageId, Position, Posting, TreeSummary,
};
use crate::utils::encoding::{read_i32_be, read_str, write_i32_be};
use anyhow::Result;
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sequential reader over one block file
pub struct BlockCursor {
    path: PathBuf,
    reader: BufReader<File>,
    current: Option<(String, Vec<Posting>)>,
}

impl BlockCursor {
    /// Open a block and position it on its first term
    pub fn open(path: &Path, buffer_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut cursor = Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(buffer_size, file),
            current: None,
        };
        cursor.advance()?;
        Ok(cursor)
    }

    pub fn current_term(&self) -> Option<&str> {
        self.current.as_ref().map(|(term, _)| term.as_str())
    }

    /// Take the current term's postings and move to the next record
    pub fn take(&mut self) -> io::Result<Option<(String, Vec<Posting>)>> {
        let record = self.current.take();
        self.advance()?;
        Ok(record)
    }

    /// Load the next record; `false` once the block is exhausted
    pub fn advance(&mut self) -> io::Result<bool> {
        if self.reader.fill_buf()?.is_empty() {
            self.current = None;
            return Ok(false);
        }

        let term = read_str(&mut self.reader)?;
        let num_docs = read_count(&mut self.reader, &self.path)?;
        let mut postings = Vec::with_capacity(num_docs);
        for _ in 0..num_docs {
            let doc_id = read_i32_be(&mut self.reader)? as DocId;
            let num_positions = read_count(&mut self.reader, &self.path)?;
            let mut positions = Vec::with_capacity(num_positions);
            for _ in 0..num_positions {
                positions.push(read_i32_be(&mut self.reader)? as Position);
            }
            postings.push(Posting { doc_id, positions });
        }

        self.current = Some((term, postings));
        Ok(true)
    }
}

fn read_count<R: io::Read>(reader: &mut R, path: &Path) -> io::Result<usize> {
    let n = read_i32_be(reader)?;
    if n < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative count {} in {}", n, path.display()),
        ));
    }
    Ok(n as usize)
}

/// Heap slot: the current term of cursor `idx`, smallest term on top
#[derive(PartialEq, Eq)]
struct HeapEntry {
    term: String,
    idx: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .term
            .cmp(&self.term)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Writes leaves as entries arrive, then the internal levels
struct TreeBuilder {
    out: BufWriter<File>,
    page_size: usize,
    next_page_id: PageId,
    leaf: LeafPage,
    /// (page id, first key) of every finished page on the level being built
    level: Vec<(PageId, String)>,
}

impl TreeBuilder {
    fn create(path: &Path, config: &IndexConfig) -> io::Result<Self> {
        let mut out = BufWriter::with_capacity(config.buffer_size, File::create(path)?);
        out.write_all(&TreeHeader::placeholder(config.page_size).to_bytes())?;
        Ok(Self {
            out,
            page_size: config.page_size,
            next_page_id: 1,
            leaf: LeafPage::new(0, config.page_size),
            level: Vec::new(),
        })
    }

    fn add(&mut self, entry: IndexEntry) -> io::Result<()> {
        if !self.leaf.can_fit(&entry) {
            if self.leaf.is_empty() {
                return Err(too_large(&entry.term, self.page_size));
            }
            let page_id = self.alloc();
            let mut full = std::mem::replace(&mut self.leaf, LeafPage::new(page_id, self.page_size));
            full.next_page_id = page_id;
            self.write_leaf(full)?;
        }
        self.leaf.push(entry);
        Ok(())
    }

    fn alloc(&mut self) -> PageId {
        let id = self.next_page_id;
        self.next_page_id += 1;
        id
    }

    fn write_leaf(&mut self, leaf: LeafPage) -> io::Result<()> {
        let first_key = leaf.first_key().unwrap_or_default().to_string();
        self.out.write_all(&leaf.serialize())?;
        self.level.push((leaf.page_id, first_key));
        Ok(())
    }

    /// Flush the last leaf, build internal levels and patch the header
    fn finish(mut self) -> io::Result<(PageId, i32, i16)> {
        // The last leaf is written even when empty so an empty index is still a valid tree
        let last = std::mem::replace(&mut self.leaf, LeafPage::new(-1, self.page_size));
        self.write_leaf(last)?;

        let mut height: i16 = 1;
        let mut children = std::mem::take(&mut self.level);
        while children.len() > 1 {
            children = self.write_internal_level(children)?;
            height += 1;
        }
        let root = children[0].0;
        let total_pages = self.next_page_id;

        let mut file = self.out.into_inner().map_err(|e| e.into_error())?;
        TreeHeader::patch(&mut file, root, total_pages, height)?;
        file.sync_all()?;
        Ok((root, total_pages, height))
    }

    fn write_internal_level(&mut self, children: Vec<(PageId, String)>) -> io::Result<Vec<(PageId, String)>> {
        let mut parents = Vec::new();
        let mut iter = children.into_iter();
        let Some((first_child, first_key)) = iter.next() else {
            return Ok(parents);
        };

        let mut page = InternalPage::new(self.alloc(), first_child, self.page_size);
        let mut page_key = first_key;
        for (child, key) in iter {
            if page.can_fit(&key) {
                page.push(key, child);
                continue;
            }
            if page.keys.is_empty() {
                return Err(too_large(&key, self.page_size));
            }
            self.out.write_all(&page.serialize())?;
            parents.push((page.page_id, page_key));
            page = InternalPage::new(self.alloc(), child, self.page_size);
            page_key = key;
        }
        self.out.write_all(&page.serialize())?;
        parents.push((page.page_id, page_key));
        Ok(parents)
    }
}

fn too_large(term: &str, page_size: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("term {:?} does not fit in a {} byte page", term, page_size),
    )
}

/// Merge `blocks` into the postings and tree files of `kind`.
///
/// Any I/O failure aborts the merge with [`IndexError::MergeFailure`] and
/// leaves the block files in place. On success the blocks are deleted and
/// the temp directory is removed if it ended up empty.
pub fn merge_blocks(
    kind: IndexKind,
    blocks: &[PathBuf],
    layout: &IndexLayout,
    config: &IndexConfig,
) -> Result<TreeSummary> {
    let summary = merge_into(kind, blocks, layout, config)
        .map_err(|source| IndexError::MergeFailure { kind, source })?;

    for block in blocks {
        if let Err(e) = fs::remove_file(block) {
            debug!("could not delete block {}: {}", block.display(), e);
        }
    }
    let _ = fs::remove_dir(layout.temp_dir(kind));

    info!(
        "{} index: merged {} blocks into {} terms, {} pages, height {}",
        kind,
        blocks.len(),
        summary.terms,
        summary.total_pages,
        summary.height
    );
    Ok(summary)
}

fn merge_into(
    kind: IndexKind,
    blocks: &[PathBuf],
    layout: &IndexLayout,
    config: &IndexConfig,
) -> io::Result<TreeSummary> {
    let mut cursors = Vec::with_capacity(blocks.len());
    let mut heap = BinaryHeap::with_capacity(blocks.len());
    for path in blocks {
        let cursor = BlockCursor::open(path, config.buffer_size)?;
        if let Some(term) = cursor.current_term() {
            heap.push(HeapEntry {
                term: term.to_string(),
                idx: cursors.len(),
            });
        }
        cursors.push(cursor);
    }
    debug!("{} index: merging {} blocks", kind, cursors.len());

    let mut postings_out = BufWriter::with_capacity(
        config.buffer_size,
        File::create(layout.postings_file(kind))?,
    );
    let mut tree = TreeBuilder::create(&layout.tree_file(kind), config)?;
    let mut offset = 0u64;
    let mut terms = 0u64;

    while let Some(HeapEntry { term, idx }) = heap.pop() {
        let mut docs: BTreeMap<DocId, Vec<Position>> = BTreeMap::new();
        absorb(&mut cursors, &mut heap, idx, &mut docs)?;
        while heap.peek().is_some_and(|top| top.term == term) {
            if let Some(next) = heap.pop() {
                absorb(&mut cursors, &mut heap, next.idx, &mut docs)?;
            }
        }

        let start = offset;
        for (doc_id, positions) in docs.iter_mut() {
            positions.sort_unstable();
            write_i32_be(&mut postings_out, *doc_id as i32)?;
            write_i32_be(&mut postings_out, positions.len() as i32)?;
            for &p in positions.iter() {
                write_i32_be(&mut postings_out, p as i32)?;
            }
            offset += 8 + 4 * positions.len() as u64;
        }

        tree.add(IndexEntry::new(term, docs.len() as u32, start))?;
        terms += 1;
    }

    postings_out.flush()?;
    let (root_page_id, total_pages, height) = tree.finish()?;

    Ok(TreeSummary {
        terms,
        root_page_id,
        total_pages,
        height,
        postings_bytes: offset,
    })
}

/// Fold cursor `idx`'s current postings into `docs` and re-queue the cursor
fn absorb(
    cursors: &mut [BlockCursor],
    heap: &mut BinaryHeap<HeapEntry>,
    idx: usize,
    docs: &mut BTreeMap<DocId, Vec<Position>>,
) -> io::Result<()> {
    let cursor = &mut cursors[idx];
    if let Some((_, postings)) = cursor.take()? {
        for posting in postings {
            docs.entry(posting.doc_id)
                .or_default()
                .extend(posting.positions);
        }
    }
    if let Some(term) = cursor.current_term() {
        heap.push(HeapEntry {
            term: term.to_string(),
            idx,
        });
    }
    Ok(())
}
