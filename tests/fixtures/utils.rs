//! Corpus and index helpers shared by the integration tests

#![allow(dead_code)]

use fsdex::index::{build_index, IndexConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write `(relative path, content)` pairs under a fresh temp directory
pub fn create_corpus(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

/// `files` text files of `tokens_per_file` pseudo-random words from a small vocabulary
pub fn generated_corpus(files: usize, tokens_per_file: usize) -> TempDir {
    const VOCAB: &[&str] = &[
        "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india",
        "juliet", "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo",
        "sierra", "tango", "uniform", "victor", "whiskey", "xray", "yankee", "zulu", "שלום",
        "naïve", "café", "straße",
    ];

    let dir = TempDir::new().unwrap();
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    for f in 0..files {
        let mut words = Vec::with_capacity(tokens_per_file);
        for i in 0..tokens_per_file {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            // Every file also gets its own word so not every term spans all documents
            if i % 50 == 0 {
                words.push(format!("file{}token", f));
            } else {
                words.push(VOCAB[(state >> 33) as usize % VOCAB.len()].to_string());
            }
        }
        fs::write(dir.path().join(format!("doc{:02}.txt", f)), words.join(" ")).unwrap();
    }
    dir
}

/// Build an index over `root` into a new temp directory
pub fn build(root: &Path, config: &IndexConfig) -> (TempDir, PathBuf) {
    let out = TempDir::new().unwrap();
    let index_dir = out.path().join("index");
    build_index(&[root.to_path_buf()], &index_dir, config, false, true).unwrap();
    (out, index_dir)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
