pub mod build;
pub mod error;
pub mod merger;
pub mod page;
pub mod reader;
pub mod registry;
pub mod stats;
pub mod types;
pub mod writer;

pub use build::build_index;
pub use error::IndexError;
pub use reader::BPlusTreeSearcher;
pub use registry::PathResolver;
pub use types::*;
pub use writer::BlockWriter;
