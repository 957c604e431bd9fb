//! Ingestion and retrieval for transcribed parliamentary debates.
//!
//! ```text
//! Debate markup ──► parser::DebateLoader ──► DebateRow batches
//!                                    │
//!                                    ├─► transforms::StatementSummarizer (LLM, cached)
//!                                    ├─► transforms::EmbeddingFormatter
//!                                    └─► transforms::ChunkingTransform
//!
//! Chunk rows ──► embeddings::EmbeddingProvider ──► stores::SqliteDebateStore
//!             └─► ingestion::CheckpointTracker (resume state)
//!
//! Metadata files ──► ingestion::MetadataPipeline ──► people / votes / policies
//!
//! Stored chunks ──► retrieval::DebateRetriever (vector + bm25, filters,
//!                   people directory, voting records)
//! ```

pub mod config;
pub mod embeddings;
pub mod ingestion;
pub mod parser;
pub mod records;
pub mod retrieval;
pub mod stores;
pub mod tokenizer;
pub mod transforms;
pub mod types;

pub use config::Settings;
pub use records::{ChunkSpan, DebateRow, StanceLabel};
pub use retrieval::DebateRetriever;
pub use stores::{DebateStore, SearchFilters, SqliteDebateStore};
pub use tokenizer::TokenCounter;
pub use types::RagError;
