use anyhow::Result;
use clap::{Parser, Subcommand};
use fsdex::index::{self, IndexError, IndexKind};
use fsdex::output;
use fsdex::query::QueryEngine;
use fsdex::utils::{self, AppConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fsdex")]
#[command(about = "Disk-backed full-text search over file names and file contents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Index directory (defaults to the configured or app-data location)
    #[arg(short, long, global = true)]
    index_dir: Option<PathBuf>,

    /// Configuration file (defaults to config.json in the app-data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index over one or more roots
    Index {
        /// Directories to index
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Replace an existing index
        #[arg(short, long)]
        force: bool,

        /// No progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Search file names or contents
    Search {
        /// Query words
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,

        /// Search file names instead of contents
        #[arg(long, conflicts_with = "content")]
        name: bool,

        /// Search file contents (default)
        #[arg(long)]
        content: bool,

        /// BM25 ranking over any of the words instead of an exact phrase
        #[arg(short, long)]
        ranked: bool,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
    /// Show index statistics
    Stats,
    /// List tree pages and leaf entries of one index
    Inspect {
        /// Index to inspect: name or content
        kind: IndexKind,

        /// Maximum number of entries
        #[arg(short = 'n', long, default_value_t = 100)]
        limit: usize,
    },
    /// Remove the index
    Remove,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let app_config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let index_dir = app_config.resolve_index_dir(cli.index_dir.as_deref())?;
    let config = &app_config.index;

    match cli.command {
        Commands::Index { roots, force, quiet } => {
            let meta = index::build_index(&roots, &index_dir, config, force, quiet)?;
            if !quiet {
                println!(
                    "{} documents, {} name terms, {} content terms",
                    meta.doc_count, meta.name.terms, meta.content.terms
                );
            }
        }
        Commands::Search {
            query,
            name,
            content: _,
            ranked,
            limit,
            no_color,
        } => {
            let kind = if name { IndexKind::Name } else { IndexKind::Content };
            let query = query.join(" ");

            let mut engine = match QueryEngine::open(&index_dir, config) {
                Ok(engine) => engine,
                Err(e) if is_missing_index(&e) => {
                    eprintln!("No index at {}. Run `fsdex index <ROOTS>` first.", index_dir.display());
                    std::process::exit(2);
                }
                Err(e) => return Err(e),
            };
            let mut matches = if ranked {
                engine.search_ranked(kind, &query)?
            } else {
                engine.search_exact(kind, &query)?
            };
            matches.truncate(limit);
            output::print_matches(&matches, ranked, !no_color)?;
        }
        Commands::Stats => {
            index::stats::show_stats(&index_dir, config)?;
        }
        Commands::Inspect { kind, limit } => {
            index::stats::inspect(&index_dir, kind, limit, config)?;
        }
        Commands::Remove => {
            if utils::remove_index(&index_dir)? {
                println!("Removed index: {}", index_dir.display());
            } else {
                println!("No index at: {}", index_dir.display());
            }
        }
    }

    Ok(())
}

fn is_missing_index(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::IndexUnavailable { .. } | IndexError::NotReady { .. })
    )
}
