//! BM25 ranking over one index kind.
//!
//! Statistics come from that kind's lengths file. When the file was missing
//! the engine still ranks: the average length falls back to 1.0 and the
//! document count is never taken below a term's document frequency, so idf
//! stays positive.

use crate::index::types::{DocId, DocumentLengths};
use rustc_hash::FxHashMap;

pub const K1: f64 = 1.5;
pub const B: f64 = 0.75;

/// One query term's contribution inputs for a document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermStats {
    /// Occurrences of the term in the document
    pub tf: u32,
    /// Documents containing the term
    pub df: u32,
}

#[derive(Debug, Clone)]
pub struct RankingEngine {
    doc_count: u64,
    avg_doc_length: f64,
    lengths: FxHashMap<DocId, u32>,
}

impl RankingEngine {
    pub fn new(stats: DocumentLengths) -> Self {
        let avg_doc_length = if stats.doc_count == 0 || stats.total_length == 0 {
            1.0
        } else {
            stats.total_length as f64 / stats.doc_count as f64
        };
        Self {
            doc_count: stats.doc_count,
            avg_doc_length,
            lengths: stats.lengths,
        }
    }

    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    /// Token count of a document; unknown documents count as length 0
    pub fn doc_length(&self, doc_id: DocId) -> u32 {
        self.lengths.get(&doc_id).copied().unwrap_or(0)
    }

    pub fn idf(&self, df: u32) -> f64 {
        let n = self.doc_count.max(df as u64) as f64;
        let df = df as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Contribution of a single term; zero when `tf` or `df` is zero
    pub fn term_score(&self, tf: u32, df: u32, doc_len: u32) -> f64 {
        if tf == 0 || df == 0 {
            return 0.0;
        }
        let tf = tf as f64;
        let length_ratio = doc_len as f64 / self.avg_doc_length;
        let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * length_ratio));
        self.idf(df) * norm
    }

    /// Sum of every query term's contribution to `doc_id`
    pub fn compute_bm25_score_for_document(&self, doc_id: DocId, terms: &[TermStats]) -> f64 {
        let doc_len = self.doc_length(doc_id);
        terms
            .iter()
            .map(|t| self.term_score(t.tf, t.df, doc_len))
            .sum()
    }
}
