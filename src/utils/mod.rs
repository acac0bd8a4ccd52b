//! Utility functions shared by the builder and the searchers.
//!
//! ## Modules
//!
//! - [`app_data`] - Application data directory and `config.json` handling
//! - [`encoding`] - Big-endian integers and length-prefixed strings
//! - [`extract`] - Plain-text extraction for the content index
//! - [`progress`] - Progress bars (no-op without the `progress` feature)
//! - [`tokenizer`] - Tokenization and term normalization
//!
//! ```no_run
//! use fsdex::utils::analyze;
//!
//! let terms = analyze("The cat, sat on THE mat.");
//! // Returns: ["the", "cat", "sat", "on", "the", "mat"]
//! ```

pub mod app_data;
pub mod encoding;
pub mod extract;
pub mod progress;
pub mod tokenizer;

pub use app_data::*;
pub use extract::{extract_text, is_supported_file, ExtractionError};
pub use tokenizer::*;
