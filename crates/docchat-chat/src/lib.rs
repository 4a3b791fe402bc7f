//! The chat pipeline: retrieval orchestration, source selection and the
//! outbound event stream.
pub mod orchestrator;
pub mod pipeline;
pub mod selection;

pub use orchestrator::{RetrievalOrchestrator, RetrievalOutcome};
pub use pipeline::{encode_ndjson, ChatPipeline, KNOWLEDGE_BASE_EMPTY, NO_RELEVANT_INFORMATION};
pub use selection::{display_label, filter_by_threshold, source_record, DEFAULT_THRESHOLD};
