use crate::index::error::IndexError;
use crate::index::reader::BPlusTreeSearcher;
use crate::index::registry::PathResolver;
use crate::index::types::*;
use crate::query::phrase::{find_exact_sequence, intersect_postings};
use crate::query::scorer::{RankingEngine, TermStats};
use crate::utils::analyze;
use anyhow::Result;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Exact and ranked retrieval over one index kind
pub struct IndexSearcher {
    kind: IndexKind,
    tree: BPlusTreeSearcher,
    paths: Option<PathResolver>,
    lengths_file: std::path::PathBuf,
    ranking: Option<RankingEngine>,
}

impl IndexSearcher {
    pub fn open(layout: &IndexLayout, kind: IndexKind, config: &IndexConfig) -> Result<Self> {
        let tree = BPlusTreeSearcher::open(layout, kind, config)?;
        let paths = match PathResolver::open(&layout.paths_file()) {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                warn!(
                    "paths file {} unavailable ({}); results cannot be resolved",
                    layout.paths_file().display(),
                    e
                );
                None
            }
        };
        Ok(Self {
            kind,
            tree,
            paths,
            lengths_file: layout.lengths_file(kind),
            ranking: None,
        })
    }

    pub fn search_term(&mut self, term: &str) -> Result<Option<TermPostings>> {
        self.tree.search_term(term)
    }

    pub fn get_term_info(&mut self, term: &str) -> Result<Option<TermInfo>> {
        self.tree.get_term_info(term)
    }

    /// Documents containing the query terms as one contiguous run.
    /// Positions are the phrase start positions.
    pub fn search_exact(&mut self, query: &str) -> Result<Vec<SearchMatch>> {
        let terms = analyze(query);
        let hits: Vec<(DocId, Vec<Position>)> = match terms.as_slice() {
            [] => Vec::new(),
            [term] => match self.tree.search_term(term)? {
                Some(found) => found
                    .postings
                    .into_iter()
                    .map(|p| (p.doc_id, p.positions))
                    .collect(),
                None => Vec::new(),
            },
            _ => {
                let mut lists = Vec::with_capacity(terms.len());
                for term in &terms {
                    match self.tree.search_term(term)? {
                        Some(found) => lists.push(found.postings),
                        None => {
                            debug!("{} index: {:?} not found, no phrase match", self.kind, term);
                            return Ok(Vec::new());
                        }
                    }
                }
                let slices: Vec<&[Posting]> = lists.iter().map(Vec::as_slice).collect();
                intersect_postings(&slices)
                    .into_iter()
                    .filter_map(|(doc_id, positions)| {
                        let starts = find_exact_sequence(&positions);
                        (!starts.is_empty()).then_some((doc_id, starts))
                    })
                    .collect()
            }
        };

        Ok(hits
            .into_iter()
            .filter_map(|(doc_id, positions)| self.resolve(doc_id, positions, 0.0))
            .collect())
    }

    /// Documents containing any query term, best BM25 score first.
    /// Positions are every matched position in the document.
    pub fn search_ranked(&mut self, query: &str) -> Result<Vec<SearchMatch>> {
        let mut terms = analyze(query);
        let mut seen = rustc_hash::FxHashSet::default();
        terms.retain(|t| seen.insert(t.clone()));

        // doc -> (per-term stats, union of positions)
        let mut candidates: FxHashMap<DocId, (Vec<TermStats>, Vec<Position>)> = FxHashMap::default();
        for term in &terms {
            let Some(found) = self.tree.search_term(term)? else {
                continue;
            };
            let df = found.num_docs;
            for posting in found.postings {
                let (stats, positions) = candidates.entry(posting.doc_id).or_default();
                stats.push(TermStats {
                    tf: posting.positions.len() as u32,
                    df,
                });
                positions.extend(posting.positions);
            }
        }

        let ranking = self.ranking();
        let mut scored: Vec<(DocId, f64, Vec<Position>)> = candidates
            .into_iter()
            .map(|(doc_id, (stats, mut positions))| {
                positions.sort_unstable();
                positions.dedup();
                let score = ranking.compute_bm25_score_for_document(doc_id, &stats);
                (doc_id, score, positions)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .filter_map(|(doc_id, score, positions)| self.resolve(doc_id, positions, score))
            .collect())
    }

    fn ranking(&mut self) -> &RankingEngine {
        let lengths_file = &self.lengths_file;
        self.ranking
            .get_or_insert_with(|| RankingEngine::new(BPlusTreeSearcher::load_file_lengths(lengths_file)))
    }

    /// Stale or unreadable doc ids are dropped
    fn resolve(&mut self, doc_id: DocId, positions: Vec<Position>, score: f64) -> Option<SearchMatch> {
        let path = self.paths.as_mut()?.resolve(doc_id)?;
        Some(SearchMatch {
            doc_id,
            path,
            positions,
            score,
        })
    }
}

/// Both index kinds of one index directory
pub struct QueryEngine {
    name: IndexSearcher,
    content: IndexSearcher,
}

impl QueryEngine {
    /// Open both indexes; a directory without an index is reported as unavailable
    pub fn open(index_dir: &Path, config: &IndexConfig) -> Result<Self> {
        let layout = IndexLayout::new(index_dir);
        if !index_dir.is_dir() {
            return Err(IndexError::IndexUnavailable {
                path: index_dir.to_path_buf(),
            }
            .into());
        }
        Ok(Self {
            name: IndexSearcher::open(&layout, IndexKind::Name, config)?,
            content: IndexSearcher::open(&layout, IndexKind::Content, config)?,
        })
    }

    pub fn searcher(&mut self, kind: IndexKind) -> &mut IndexSearcher {
        match kind {
            IndexKind::Name => &mut self.name,
            IndexKind::Content => &mut self.content,
        }
    }

    pub fn search_exact(&mut self, kind: IndexKind, query: &str) -> Result<Vec<SearchMatch>> {
        self.searcher(kind).search_exact(query)
    }

    pub fn search_ranked(&mut self, kind: IndexKind, query: &str) -> Result<Vec<SearchMatch>> {
        self.searcher(kind).search_ranked(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build::build_index;
    use std::fs;
    use tempfile::TempDir;

    fn index(files: &[(&str, &str)]) -> (TempDir, QueryEngine) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        for (name, content) in files {
            fs::write(src.join(name), content).unwrap();
        }
        let index_dir = dir.path().join("index");
        let config = IndexConfig::default();
        build_index(&[src], &index_dir, &config, false, true).unwrap();
        let engine = QueryEngine::open(&index_dir, &config).unwrap();
        (dir, engine)
    }

    fn names(matches: &[SearchMatch]) -> Vec<String> {
        matches
            .iter()
            .map(|m| m.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_exact_single_term() {
        let (_dir, mut engine) = index(&[("a.txt", "cat dog cat"), ("b.txt", "dog")]);
        let hits = engine.search_exact(IndexKind::Content, "CAT").unwrap();
        assert_eq!(names(&hits), vec!["a.txt"]);
        assert_eq!(hits[0].positions, vec![0, 2]);
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn test_exact_phrase_missing_term() {
        let (_dir, mut engine) = index(&[("a.txt", "cat dog")]);
        assert!(engine.search_exact(IndexKind::Content, "cat bird").unwrap().is_empty());
        assert!(engine.search_exact(IndexKind::Content, "dog cat").unwrap().is_empty());
        assert!(engine.search_exact(IndexKind::Content, "!!!").unwrap().is_empty());
    }

    #[test]
    fn test_ranked_orders_by_score() {
        let (_dir, mut engine) = index(&[
            ("one.txt", "rust is fast"),
            ("two.txt", "rust rust rust is fast"),
            ("three.txt", "nothing relevant here at all"),
        ]);
        let hits = engine.search_ranked(IndexKind::Content, "rust").unwrap();
        assert_eq!(names(&hits), vec!["two.txt", "one.txt"]);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_ranked_skips_absent_terms() {
        let (_dir, mut engine) = index(&[("a.txt", "alpha beta")]);
        let hits = engine.search_ranked(IndexKind::Content, "alpha zzz").unwrap();
        assert_eq!(names(&hits), vec!["a.txt"]);
        assert!(engine.search_ranked(IndexKind::Content, "zzz").unwrap().is_empty());
    }

    #[test]
    fn test_name_index_uses_stem() {
        let (_dir, mut engine) = index(&[("Quarterly-Report.txt", "")]);
        let hits = engine.search_exact(IndexKind::Name, "quarterly report").unwrap();
        assert_eq!(names(&hits), vec!["Quarterly-Report.txt"]);
        assert!(engine.search_exact(IndexKind::Name, "txt").unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_index_dir() {
        let dir = TempDir::new().unwrap();
        let err = QueryEngine::open(&dir.path().join("none"), &IndexConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::IndexUnavailable { .. })
        ));
    }
}
