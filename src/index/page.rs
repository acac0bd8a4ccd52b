//! Fixed-size B+Tree pages and the tree file header.
//!
//! A tree file is a 32-byte header followed by `total_pages` pages of
//! `page_size` bytes, page `n` starting at `32 + n * page_size`. Every page
//! begins with a type tag, a reserved byte and a big-endian u16 entry count.
//! Nothing in here does I/O except [`TreeHeader::patch`].

use crate::index::error::IndexError;
use crate::index::types::{IndexEntry, PageId};
use crate::utils::encoding::{
    encode_str, encoded_len, read_i16_be, read_i32_be, read_i64_be, read_str, read_u16_be,
};
use std::fs::File;
use std::io::{self, Cursor, Seek, SeekFrom, Write};

pub const HEADER_SIZE: usize = 32;
pub const MAGIC: &[u8; 4] = b"BPT1";
pub const FORMAT_VERSION: i16 = 1;

/// Byte offset of the root id inside the header; root, page count and height follow
const PATCH_OFFSET: u64 = 10;

/// Type tag, reserved byte, entry count, plus the leaf's next pointer
const LEAF_OVERHEAD: usize = 8;
/// Type tag, reserved byte, entry count, first pointer, as accounted by `can_fit`
const INTERNAL_OVERHEAD: usize = 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Internal = 1,
    Leaf = 2,
}

impl PageType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PageType::Internal),
            2 => Some(PageType::Leaf),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PageType::Internal => "internal",
            PageType::Leaf => "leaf",
        }
    }
}

/// Parsed tree file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    pub version: i16,
    pub page_size: i32,
    pub root_page_id: PageId,
    pub total_pages: i32,
    pub height: i16,
}

impl TreeHeader {
    /// Header written before the merge starts; root, pages and height are -1
    pub fn placeholder(page_size: usize) -> Self {
        Self {
            version: FORMAT_VERSION,
            page_size: page_size as i32,
            root_page_id: -1,
            total_pages: -1,
            height: -1,
        }
    }

    /// A tree whose header was never patched must not be searched
    pub fn is_ready(&self) -> bool {
        self.root_page_id >= 0 && self.height >= 1
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_be_bytes());
        buf[6..10].copy_from_slice(&self.page_size.to_be_bytes());
        buf[10..14].copy_from_slice(&self.root_page_id.to_be_bytes());
        buf[14..18].copy_from_slice(&self.total_pages.to_be_bytes());
        buf[18..20].copy_from_slice(&self.height.to_be_bytes());
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_SIZE {
            return Err(IndexError::corrupt(format!(
                "tree header is {} bytes, expected {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        if &bytes[0..4] != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&bytes[0..4]);
            return Err(IndexError::BadMagic { found });
        }

        let header = Self::read_fields(&mut Cursor::new(&bytes[4..HEADER_SIZE]))
            .map_err(|e| IndexError::corrupt(format!("tree header: {}", e)))?;

        if header.version != FORMAT_VERSION {
            return Err(IndexError::corrupt(format!(
                "unsupported tree version {}",
                header.version
            )));
        }
        if header.page_size <= 0 {
            return Err(IndexError::corrupt(format!(
                "invalid page size {}",
                header.page_size
            )));
        }
        Ok(header)
    }

    fn read_fields(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Self {
            version: read_i16_be(cursor)?,
            page_size: read_i32_be(cursor)?,
            root_page_id: read_i32_be(cursor)?,
            total_pages: read_i32_be(cursor)?,
            height: read_i16_be(cursor)?,
        })
    }

    /// Rewrite root id, page count and height in place
    pub fn patch(file: &mut File, root_page_id: PageId, total_pages: i32, height: i16) -> io::Result<()> {
        let mut buf = [0u8; 10];
        buf[0..4].copy_from_slice(&root_page_id.to_be_bytes());
        buf[4..8].copy_from_slice(&total_pages.to_be_bytes());
        buf[8..10].copy_from_slice(&height.to_be_bytes());
        file.seek(SeekFrom::Start(PATCH_OFFSET))?;
        file.write_all(&buf)?;
        file.flush()
    }
}

/// Leaf page: sorted term entries plus a link to the next leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPage {
    pub page_id: PageId,
    pub next_page_id: PageId,
    pub entries: Vec<IndexEntry>,
    page_size: usize,
    used: usize,
}

impl LeafPage {
    pub fn new(page_id: PageId, page_size: usize) -> Self {
        Self {
            page_id,
            next_page_id: -1,
            entries: Vec::new(),
            page_size,
            used: LEAF_OVERHEAD,
        }
    }

    pub fn can_fit(&self, entry: &IndexEntry) -> bool {
        self.used + entry.size() <= self.page_size
    }

    /// Append an entry; the caller checks [`LeafPage::can_fit`] first
    pub fn push(&mut self, entry: IndexEntry) {
        self.used += entry.size();
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|e| e.term.as_str())
    }

    pub fn find(&self, term: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.term == term)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.page_size);
        buf.push(PageType::Leaf as u8);
        buf.push(0);
        buf.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.next_page_id.to_be_bytes());
        for entry in &self.entries {
            put_str(&mut buf, &entry.term);
            buf.extend_from_slice(&(entry.num_docs as i32).to_be_bytes());
            buf.extend_from_slice(&(entry.postings_offset as i64).to_be_bytes());
        }
        finish_page(buf, self.page_size)
    }

    pub fn parse(page_id: PageId, bytes: &[u8]) -> Result<Self, IndexError> {
        let count = check_tag(page_id, bytes, PageType::Leaf)?;
        let mut cursor = Cursor::new(&bytes[4..]);
        let corrupt = |e: io::Error| IndexError::corrupt(format!("leaf page {}: {}", page_id, e));

        let next_page_id = read_i32_be(&mut cursor).map_err(corrupt)?;
        let mut page = LeafPage::new(page_id, bytes.len());
        page.next_page_id = next_page_id;
        for _ in 0..count {
            let term = read_str(&mut cursor).map_err(corrupt)?;
            let num_docs = read_i32_be(&mut cursor).map_err(corrupt)?;
            let offset = read_i64_be(&mut cursor).map_err(corrupt)?;
            if num_docs < 0 || offset < 0 {
                return Err(IndexError::corrupt(format!(
                    "leaf page {}: negative field for term {:?}",
                    page_id, term
                )));
            }
            page.push(IndexEntry::new(term, num_docs as u32, offset as u64));
        }
        Ok(page)
    }
}

/// Internal page: `first_pointer` followed by (separator key, child) pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalPage {
    pub page_id: PageId,
    pub first_pointer: PageId,
    pub keys: Vec<String>,
    pub children: Vec<PageId>,
    page_size: usize,
    used: usize,
}

impl InternalPage {
    pub fn new(page_id: PageId, first_pointer: PageId, page_size: usize) -> Self {
        Self {
            page_id,
            first_pointer,
            keys: Vec::new(),
            children: Vec::new(),
            page_size,
            used: INTERNAL_OVERHEAD,
        }
    }

    fn key_size(key: &str) -> usize {
        2 + encoded_len(key) + 4
    }

    pub fn can_fit(&self, key: &str) -> bool {
        self.used + Self::key_size(key) <= self.page_size
    }

    /// Append a separator; the caller checks [`InternalPage::can_fit`] first
    pub fn push(&mut self, key: String, child: PageId) {
        self.used += Self::key_size(&key);
        self.keys.push(key);
        self.children.push(child);
    }

    /// Child whose key range contains `term`.
    ///
    /// Below the first key routes to `first_pointer`; otherwise to the child
    /// of the last separator that is `<= term`.
    pub fn child_for(&self, term: &str) -> PageId {
        let idx = self.keys.partition_point(|key| key.as_str() <= term);
        if idx == 0 {
            self.first_pointer
        } else {
            self.children[idx - 1]
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.page_size);
        buf.push(PageType::Internal as u8);
        buf.push(0);
        buf.extend_from_slice(&(self.keys.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.first_pointer.to_be_bytes());
        for (key, child) in self.keys.iter().zip(&self.children) {
            put_str(&mut buf, key);
            buf.extend_from_slice(&child.to_be_bytes());
        }
        finish_page(buf, self.page_size)
    }

    pub fn parse(page_id: PageId, bytes: &[u8]) -> Result<Self, IndexError> {
        let count = check_tag(page_id, bytes, PageType::Internal)?;
        let mut cursor = Cursor::new(&bytes[4..]);
        let corrupt =
            |e: io::Error| IndexError::corrupt(format!("internal page {}: {}", page_id, e));

        let first_pointer = read_i32_be(&mut cursor).map_err(corrupt)?;
        let mut page = InternalPage::new(page_id, first_pointer, bytes.len());
        for _ in 0..count {
            let key = read_str(&mut cursor).map_err(corrupt)?;
            let child = read_i32_be(&mut cursor).map_err(corrupt)?;
            page.push(key, child);
        }
        Ok(page)
    }
}

/// A page read back from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Internal(InternalPage),
    Leaf(LeafPage),
}

impl Page {
    /// Parse by inspecting the type tag
    pub fn parse(page_id: PageId, bytes: &[u8]) -> Result<Self, IndexError> {
        match bytes.first().copied().and_then(PageType::from_tag) {
            Some(PageType::Internal) => InternalPage::parse(page_id, bytes).map(Page::Internal),
            Some(PageType::Leaf) => LeafPage::parse(page_id, bytes).map(Page::Leaf),
            None => Err(IndexError::corrupt(format!(
                "page {} has unknown type tag {:?}",
                page_id,
                bytes.first()
            ))),
        }
    }

    pub fn page_type(&self) -> PageType {
        match self {
            Page::Internal(_) => PageType::Internal,
            Page::Leaf(_) => PageType::Leaf,
        }
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(encoded_len(s) as u16).to_be_bytes());
    encode_str(s, buf);
}

fn finish_page(mut buf: Vec<u8>, page_size: usize) -> Vec<u8> {
    assert!(
        buf.len() <= page_size,
        "page body of {} bytes exceeds page size {}",
        buf.len(),
        page_size
    );
    buf.resize(page_size, 0);
    buf
}

/// Validate the type tag and return the entry count
fn check_tag(page_id: PageId, bytes: &[u8], expected: PageType) -> Result<u16, IndexError> {
    if bytes.len() < 8 {
        return Err(IndexError::corrupt(format!(
            "page {} is only {} bytes",
            page_id,
            bytes.len()
        )));
    }
    if bytes[0] != expected as u8 {
        return Err(IndexError::PageTypeMismatch {
            page_id,
            expected: expected.name(),
            found: bytes[0],
        });
    }
    let mut cursor = Cursor::new(&bytes[2..4]);
    read_u16_be(&mut cursor).map_err(|e| IndexError::corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(page_size: usize, terms: &[&str]) -> LeafPage {
        let mut leaf = LeafPage::new(3, page_size);
        for (i, term) in terms.iter().enumerate() {
            let entry = IndexEntry::new(*term, i as u32 + 1, i as u64 * 100);
            assert!(leaf.can_fit(&entry));
            leaf.push(entry);
        }
        leaf
    }

    #[test]
    fn test_leaf_serialize_parse() {
        let mut leaf = leaf_with(256, &["apple", "banana", "כלב"]);
        leaf.next_page_id = 4;

        let bytes = leaf.serialize();
        assert_eq!(bytes.len(), 256);
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[2..4], &[0, 3]);

        let parsed = LeafPage::parse(3, &bytes).unwrap();
        assert_eq!(parsed.next_page_id, 4);
        assert_eq!(parsed.entries, leaf.entries);
        assert_eq!(parsed.find("banana").unwrap().num_docs, 2);
        assert!(parsed.find("cherry").is_none());
    }

    #[test]
    fn test_internal_serialize_parse() {
        let mut page = InternalPage::new(9, 0, 128);
        page.push("dog".to_string(), 1);
        page.push("mouse".to_string(), 2);

        let bytes = page.serialize();
        assert_eq!(bytes.len(), 128);
        assert_eq!(bytes[0], 1);

        let parsed = InternalPage::parse(9, &bytes).unwrap();
        assert_eq!(parsed.first_pointer, 0);
        assert_eq!(parsed.keys, vec!["dog", "mouse"]);
        assert_eq!(parsed.children, vec![1, 2]);
    }

    #[test]
    fn test_leaf_can_fit_boundary() {
        // 8 + 3 * (2 + 1 + 4 + 8) = 53
        let leaf = leaf_with(53, &["a", "b", "c"]);
        assert!(!leaf.can_fit(&IndexEntry::new("d", 1, 0)));
        assert_eq!(leaf.serialize().len(), 53);

        let fresh = LeafPage::new(0, 53);
        assert!(fresh.can_fit(&IndexEntry::new("d", 1, 0)));
    }

    #[test]
    fn test_internal_can_fit_counts_first_pointer() {
        // 12 + 2 * (2 + 1 + 4) = 26
        let mut page = InternalPage::new(0, 0, 26);
        assert!(page.can_fit("a"));
        page.push("a".to_string(), 1);
        assert!(page.can_fit("b"));
        page.push("b".to_string(), 2);
        assert!(!page.can_fit("c"));
    }

    #[test]
    #[should_panic(expected = "exceeds page size")]
    fn test_serialize_overfull_page_panics() {
        let mut leaf = LeafPage::new(0, 16);
        leaf.push(IndexEntry::new("overflowing", 1, 0));
        leaf.serialize();
    }

    #[test]
    fn test_child_for_routing() {
        let mut page = InternalPage::new(0, 10, 4096);
        page.push("dog".to_string(), 11);
        page.push("mouse".to_string(), 12);

        assert_eq!(page.child_for("ant"), 10);
        assert_eq!(page.child_for("dog"), 11);
        assert_eq!(page.child_for("elk"), 11);
        assert_eq!(page.child_for("mouse"), 12);
        assert_eq!(page.child_for("zebra"), 12);

        let empty = InternalPage::new(0, 7, 4096);
        assert_eq!(empty.child_for("anything"), 7);
    }

    #[test]
    fn test_parse_rejects_wrong_type() {
        let leaf = leaf_with(64, &["a"]);
        let err = InternalPage::parse(5, &leaf.serialize()).unwrap_err();
        assert!(matches!(
            err,
            IndexError::PageTypeMismatch { page_id: 5, found: 2, .. }
        ));
        assert!(Page::parse(5, &[9u8; 64]).is_err());
    }

    #[test]
    fn test_page_dispatch() {
        let leaf = leaf_with(64, &["a"]);
        let page = Page::parse(3, &leaf.serialize()).unwrap();
        assert_eq!(page.page_type(), PageType::Leaf);
    }

    #[test]
    fn test_header_layout() {
        let header = TreeHeader {
            version: 1,
            page_size: 8192,
            root_page_id: 7,
            total_pages: 8,
            height: 2,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"BPT1");
        assert_eq!(&bytes[10..14], &[0, 0, 0, 7]);
        assert_eq!(&bytes[18..20], &[0, 2]);
        assert!(bytes[20..].iter().all(|&b| b == 0));
        assert_eq!(TreeHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_placeholder_not_ready() {
        let header = TreeHeader::parse(&TreeHeader::placeholder(4096).to_bytes()).unwrap();
        assert!(!header.is_ready());
        assert_eq!(header.page_size, 4096);
    }

    #[test]
    fn test_header_bad_magic() {
        let mut bytes = TreeHeader::placeholder(4096).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            TreeHeader::parse(&bytes),
            Err(IndexError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_header_patch() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tree.idx");
        std::fs::write(&path, TreeHeader::placeholder(512).to_bytes()).unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        TreeHeader::patch(&mut file, 4, 5, 2).unwrap();
        drop(file);

        let header = TreeHeader::parse(&std::fs::read(&path).unwrap()).unwrap();
        assert!(header.is_ready());
        assert_eq!((header.root_page_id, header.total_pages, header.height), (4, 5, 2));
        assert_eq!(header.page_size, 512);
    }
}
