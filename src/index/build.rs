use crate::index::merger::merge_blocks;
use crate::index::registry::DocumentRegistry;
use crate::index::types::*;
use crate::index::writer::BlockWriter;
use crate::utils::progress::{document_counter, spinner, ProgressBar};
use crate::utils::{analyze, extract_text, is_supported_file, name_stem, remove_index, ExtractionError};
use anyhow::{Context, Result};
use ignore::{DirEntry, WalkBuilder};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Feeds every walked path into the registry and both block writers
struct Ingestor<'a> {
    config: &'a IndexConfig,
    registry: DocumentRegistry,
    name: BlockWriter,
    content: BlockWriter,
    stats: BuildStats,
}

impl<'a> Ingestor<'a> {
    fn new(layout: &IndexLayout, config: &'a IndexConfig) -> Result<Self> {
        Ok(Self {
            config,
            registry: DocumentRegistry::create(layout, config)?,
            name: BlockWriter::new(IndexKind::Name, &layout.temp_dir(IndexKind::Name), config),
            content: BlockWriter::new(IndexKind::Content, &layout.temp_dir(IndexKind::Content), config),
            stats: BuildStats::default(),
        })
    }

    /// Register one file or directory; only shared-structure failures are errors
    fn add(&mut self, path: &Path, is_dir: bool) -> Result<()> {
        let doc_id = self.registry.register(path)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name_terms = analyze(name_stem(&file_name));
        for (position, term) in name_terms.iter().enumerate() {
            self.name.add_term(term, doc_id, position as Position);
        }
        self.registry
            .record_length(IndexKind::Name, doc_id, name_terms.len() as u32)?;
        self.stats.name_tokens += name_terms.len() as u64;

        if is_dir {
            self.stats.directories += 1;
            return Ok(());
        }
        self.stats.files += 1;

        if !is_supported_file(path) {
            return Ok(());
        }
        match extract_text(path, self.config.max_file_size) {
            Ok(text) => {
                let terms = analyze(&text);
                for (position, term) in terms.iter().enumerate() {
                    self.content.add_term(term, doc_id, position as Position);
                }
                self.registry
                    .record_length(IndexKind::Content, doc_id, terms.len() as u32)?;
                self.stats.content_files += 1;
                self.stats.content_tokens += terms.len() as u64;
            }
            Err(e @ ExtractionError::TooLarge { .. }) | Err(e @ ExtractionError::Binary(_)) => {
                debug!("{}; indexed by name only", e);
                self.stats.skipped += 1;
            }
            Err(e) => {
                warn!("{}", e);
                self.stats.skipped += 1;
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<(BuildStats, u64, Vec<PathBuf>, Vec<PathBuf>)> {
        let mut stats = self.stats;
        let name_failed = self.name.failed_spills();
        let content_failed = self.content.failed_spills();
        let name_blocks = self.name.finish();
        let content_blocks = self.content.finish();
        stats.name_blocks = name_blocks.len() as u32;
        stats.content_blocks = content_blocks.len() as u32;
        if name_failed + content_failed > 0 {
            warn!(
                "{} name and {} content blocks were lost to spill failures",
                name_failed, content_failed
            );
        }
        let docs = self.registry.finish()?;
        Ok((stats, docs, name_blocks, content_blocks))
    }
}

fn walker(root: &Path, config: &IndexConfig, index_dir: &Path) -> ignore::Walk {
    let ignored = config.ignored_dirs.clone();
    let index_dir = index_dir.to_path_buf();
    WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry: &DirEntry| {
            let name = entry.file_name().to_string_lossy();
            entry.path() != index_dir && !ignored.iter().any(|dir| dir.as_str() == name.as_ref())
        })
        .build()
}

/// Build both indexes over `roots` into `index_dir`
pub fn build_index(
    roots: &[PathBuf],
    index_dir: &Path,
    config: &IndexConfig,
    force: bool,
    silent: bool,
) -> Result<IndexMeta> {
    let layout = IndexLayout::new(index_dir);
    if layout.meta_file().exists() {
        if !force {
            anyhow::bail!(
                "An index already exists at {} (use --force to rebuild)",
                index_dir.display()
            );
        }
        remove_index(index_dir).context("Failed to remove existing index")?;
    }
    fs::create_dir_all(index_dir)
        .with_context(|| format!("Failed to create {}", index_dir.display()))?;
    let index_dir = index_dir.canonicalize().context("Invalid index path")?;
    let layout = IndexLayout::new(&index_dir);

    let roots = roots
        .iter()
        .map(|root| {
            root.canonicalize()
                .with_context(|| format!("Invalid path: {}", root.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let started = Instant::now();
    let mut ingestor = Ingestor::new(&layout, config)?;
    let counter = document_counter(silent);

    for root in &roots {
        if !silent {
            println!("Indexing: {}", root.display());
        }
        for entry in walker(root, config, &index_dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to access: {}", e);
                    ingestor.stats.skipped += 1;
                    continue;
                }
            };
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            ingestor.add(entry.path(), is_dir)?;
            if let Some(pb) = &counter {
                pb.inc(1);
            }
        }
    }

    let (stats, doc_count, name_blocks, content_blocks) = ingestor.finish()?;
    finish_progress(counter, format!("{} documents", doc_count));
    info!(
        "ingested {} documents in {:?} ({} name blocks, {} content blocks)",
        doc_count,
        started.elapsed(),
        name_blocks.len(),
        content_blocks.len()
    );

    let merging = spinner("Merging blocks and building trees...", silent);
    let started = Instant::now();
    let (name, content) = rayon::join(
        || merge_blocks(IndexKind::Name, &name_blocks, &layout, config),
        || merge_blocks(IndexKind::Content, &content_blocks, &layout, config),
    );
    let (name, content) = (name?, content?);
    finish_progress(merging, "Index complete".to_string());
    info!("merged both indexes in {:?}", started.elapsed());

    let meta = IndexMeta {
        version: 1,
        roots,
        doc_count,
        name,
        content,
        stats,
        created_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };
    write_meta(&layout, &meta)?;

    if !silent {
        println!("Index stored at: {}", index_dir.display());
        if meta.stats.skipped > 0 {
            println!("({} entries could not be read)", meta.stats.skipped);
        }
    }
    Ok(meta)
}

fn finish_progress(pb: Option<ProgressBar>, message: String) {
    if let Some(pb) = pb {
        pb.finish_with_message(message);
    }
}

pub fn write_meta(layout: &IndexLayout, meta: &IndexMeta) -> Result<()> {
    let json = serde_json::to_string_pretty(meta).context("Failed to serialize index metadata")?;
    fs::write(layout.meta_file(), json).context("Failed to write meta.json")
}

pub fn read_meta(layout: &IndexLayout) -> Result<IndexMeta> {
    let path = layout.meta_file();
    let json = fs::read_to_string(&path)
        .with_context(|| format!("No index metadata at {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::registry::read_lengths;
    use tempfile::TempDir;

    fn corpus() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs/old.reports")).unwrap();
        fs::write(dir.path().join("docs/annual-report.txt"), "revenue grew this year").unwrap();
        fs::write(dir.path().join("docs/photo.jpg"), [0xFFu8, 0xD8, 0xFF]).unwrap();
        fs::write(dir.path().join(".hidden.md"), "secret notes").unwrap();
        dir
    }

    #[test]
    fn test_build_counts_files_and_directories() {
        let src = corpus();
        let out = TempDir::new().unwrap();
        let meta = build_index(
            &[src.path().to_path_buf()],
            &out.path().join("index"),
            &IndexConfig::default(),
            false,
            true,
        )
        .unwrap();

        // root, docs, docs/old.reports
        assert_eq!(meta.stats.directories, 3);
        assert_eq!(meta.stats.files, 3);
        assert_eq!(meta.stats.content_files, 2);
        assert_eq!(meta.doc_count, 6);
        assert!(meta.content.terms >= 5);

        let layout = IndexLayout::new(out.path().join("index"));
        let content = read_lengths(&layout.lengths_file(IndexKind::Content)).unwrap();
        assert_eq!(content.doc_count, 2);
        assert_eq!(content.total_length, 4 + 2);
        assert!(!layout.temp_dir(IndexKind::Name).exists());

        let stored = read_meta(&layout).unwrap();
        assert_eq!(stored.doc_count, 6);
        assert_eq!(stored.name.terms, meta.name.terms);
    }

    #[test]
    fn test_build_refuses_existing_index_without_force() {
        let src = corpus();
        let out = TempDir::new().unwrap();
        let index_dir = out.path().join("index");
        let config = IndexConfig::default();
        let roots = [src.path().to_path_buf()];

        build_index(&roots, &index_dir, &config, false, true).unwrap();
        assert!(build_index(&roots, &index_dir, &config, false, true).is_err());
        assert!(build_index(&roots, &index_dir, &config, true, true).is_ok());
    }

    #[test]
    fn test_build_skips_index_dir_and_ignored_names() {
        let src = corpus();
        fs::create_dir_all(src.path().join("$RECYCLE.BIN")).unwrap();
        fs::write(src.path().join("$RECYCLE.BIN/junk.txt"), "junk").unwrap();
        let index_dir = src.path().join("index");

        let meta = build_index(
            &[src.path().to_path_buf()],
            &index_dir,
            &IndexConfig::default(),
            false,
            true,
        )
        .unwrap();
        assert_eq!(meta.doc_count, 6);
    }

    #[test]
    fn test_build_rejects_missing_root() {
        let out = TempDir::new().unwrap();
        let result = build_index(
            &[out.path().join("does-not-exist")],
            &out.path().join("index"),
            &IndexConfig::default(),
            false,
            true,
        );
        assert!(result.is_err());
    }
}
