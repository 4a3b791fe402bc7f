//! docchat-text
//!
//! Tantivy-based keyword ranking. A `KeywordRanker` is built in RAM over
//! exactly the chunks a retrieval is allowed to see.
pub mod tantivy_utils;
pub mod index;

pub use index::KeywordRanker;
