//! Hybrid keyword + semantic retrieval with cross-encoder reranking.
pub mod cache;
pub mod fusion;
pub mod retriever;

pub use cache::RankerCache;
pub use retriever::{HybridRetriever, HybridSearch, Retriever, SemanticRetriever};
