use crate::index::types::{IndexKind, PageId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the on-disk index structures.
///
/// Returned wrapped in `anyhow::Error`; use `downcast_ref::<IndexError>()`
/// to tell a corrupt file from a missing or half-built one.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("corrupt index: {what}")]
    CorruptFormat { what: String },

    #[error("bad magic in tree header: expected BPT1, found {found:?}")]
    BadMagic { found: [u8; 4] },

    #[error("page {page_id}: expected {expected} page, found type tag {found}")]
    PageTypeMismatch {
        page_id: PageId,
        expected: &'static str,
        found: u8,
    },

    #[error("page {page_id}: short read ({read} of {expected} bytes)")]
    ShortPageRead {
        page_id: PageId,
        read: usize,
        expected: usize,
    },

    #[error("index at {path} is not ready (header not patched)")]
    NotReady { path: PathBuf },

    #[error("no index at {path}")]
    IndexUnavailable { path: PathBuf },

    #[error("merge of the {kind} index failed")]
    MergeFailure {
        kind: IndexKind,
        #[source]
        source: io::Error,
    },
}

impl IndexError {
    pub fn corrupt(what: impl Into<String>) -> Self {
        IndexError::CorruptFormat { what: what.into() }
    }
}
