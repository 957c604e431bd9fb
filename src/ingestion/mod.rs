//! Ingestion: checkpointing, summary caching, the batched debate pipeline,
//! and the full-replace metadata pipeline.

pub mod cache;
pub mod checkpoint;
pub mod metadata;
pub mod pipeline;

pub use cache::{content_hash, JsonFileCache, MemoryCache, SummaryStore};
pub use checkpoint::CheckpointTracker;
pub use metadata::{MetadataLoader, MetadataPipeline};
pub use pipeline::{DebatePipeline, PipelineReport};
