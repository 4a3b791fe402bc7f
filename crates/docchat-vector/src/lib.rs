//! Chunk storage: a LanceDB-backed [`LanceChunkStore`] and an in-process
//! [`MemoryChunkStore`], both implementing `docchat_core::traits::ChunkStore`.
pub mod memory;
pub mod schema;
pub mod store;
pub mod table;

pub use memory::MemoryChunkStore;
pub use store::LanceChunkStore;
