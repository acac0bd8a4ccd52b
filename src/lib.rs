//! # fsdex - Disk-Backed File Search
//!
//! fsdex indexes a file system twice: once over file and directory names,
//! once over the text content of supported files. Each index is a postings
//! file addressed through a paged B+Tree, built with bounded memory by
//! spilling sorted blocks and merging them.
//!
//! ## Architecture
//!
//! - [`index`] - Block writer, k-way merger, page format, B+Tree searcher
//! - [`query`] - Exact phrase search and BM25 ranking
//! - [`output`] - Result formatting
//! - [`utils`] - String codec, text analysis, extraction, configuration
//!
//! ## Quick Start
//!
//! ```ignore
//! use fsdex::index::{build_index, IndexConfig, IndexKind};
//! use fsdex::query::QueryEngine;
//! use std::path::{Path, PathBuf};
//!
//! let config = IndexConfig::default();
//! build_index(&[PathBuf::from("/data")], Path::new("/tmp/idx"), &config, false, true).unwrap();
//!
//! let mut engine = QueryEngine::open(Path::new("/tmp/idx"), &config).unwrap();
//! for hit in engine.search_ranked(IndexKind::Content, "quarterly report").unwrap() {
//!     println!("{} {:.3}", hit.path.display(), hit.score);
//! }
//! ```

pub mod index;
pub mod output;
pub mod query;
pub mod utils;
