pub mod executor;
pub mod phrase;
pub mod scorer;

pub use executor::{IndexSearcher, QueryEngine};
pub use phrase::{find_exact_sequence, intersect_postings};
pub use scorer::{RankingEngine, TermStats};
