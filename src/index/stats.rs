use crate::index::build::read_meta;
use crate::index::reader::BPlusTreeSearcher;
use crate::index::types::*;
use crate::query::scorer::RankingEngine;
use anyhow::Result;
use std::path::Path;

/// Display index statistics
pub fn show_stats(index_dir: &Path, config: &IndexConfig) -> Result<()> {
    let layout = IndexLayout::new(index_dir);
    let meta = read_meta(&layout)?;

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Index location:   {}", index_dir.display());
    println!("Index version:    {}", meta.version);
    for root in &meta.roots {
        println!("Root:             {}", root.display());
    }
    println!("Documents:        {}", meta.doc_count);
    println!("  files:          {}", meta.stats.files);
    println!("  directories:    {}", meta.stats.directories);
    println!("  with content:   {}", meta.stats.content_files);
    println!("  unreadable:     {}", meta.stats.skipped);

    for kind in IndexKind::ALL {
        println!();
        println!("{} index", kind);
        println!("  terms:          {}", meta.tree(kind).terms);
        println!("  blocks spilled: {}", match kind {
            IndexKind::Name => meta.stats.name_blocks,
            IndexKind::Content => meta.stats.content_blocks,
        });

        match BPlusTreeSearcher::open(&layout, kind, config) {
            Ok(searcher) => {
                let header = searcher.header();
                println!("  page size:      {}", header.page_size);
                println!("  pages:          {}", header.total_pages);
                println!("  tree height:    {}", header.height);
                println!("  root page:      {}", header.root_page_id);
            }
            Err(e) => println!("  tree:           unavailable ({})", e),
        }

        let lengths = BPlusTreeSearcher::load_file_lengths(&layout.lengths_file(kind));
        let documents = lengths.doc_count;
        println!("  documents:      {}", documents);
        if documents > 0 {
            let ranking = RankingEngine::new(lengths);
            println!("  avg length:     {:.2} tokens", ranking.avg_doc_length());
        }

        let files = [
            layout.tree_file(kind),
            layout.postings_file(kind),
            layout.lengths_file(kind),
        ];
        let size: u64 = files
            .iter()
            .filter_map(|f| f.metadata().ok())
            .map(|m| m.len())
            .sum();
        println!("  on disk:        {}", format_size(size));
    }

    if let Ok(size) = dir_size(index_dir) {
        println!();
        println!("Index size:       {}", format_size(size));
    }
    println!("Created:          {}", format_timestamp(meta.created_at));

    Ok(())
}

/// Print page counts and the first `limit` leaf entries of one index
pub fn inspect(index_dir: &Path, kind: IndexKind, limit: usize, config: &IndexConfig) -> Result<()> {
    let layout = IndexLayout::new(index_dir);
    let mut searcher = BPlusTreeSearcher::open(&layout, kind, config)?;
    let (internal, leaves) = searcher.page_counts()?;
    let header = *searcher.header();

    println!("{} tree: {}", kind, layout.tree_file(kind).display());
    println!(
        "height {}, root {}, {} internal pages, {} leaf pages",
        header.height, header.root_page_id, internal, leaves
    );
    println!();
    println!("{:<40} {:>10} {:>14}", "term", "docs", "offset");

    let entries = searcher.leaf_entries(limit)?;
    for entry in &entries {
        println!(
            "{:<40} {:>10} {:>14}",
            entry.term, entry.num_docs, entry.postings_offset
        );
    }
    if entries.len() == limit {
        println!("... (limited to {} entries)", limit);
    }
    Ok(())
}

/// Calculate directory size recursively
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_timestamp(ts: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    format!("{:?}", UNIX_EPOCH + Duration::from_secs(ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
