//! Batch transforms applied between parsing and persistence.
//!
//! The pipeline holds an ordered list of transforms; each takes the whole
//! batch and returns a new one. Transforms may rewrite fields (summarizer,
//! formatter) or change the row count (chunking explodes one utterance into
//! several chunk rows).

pub mod chunking;
pub mod formatter;
pub mod summarizer;

use async_trait::async_trait;

use crate::records::DebateRow;
use crate::types::RagError;

pub use chunking::ChunkingTransform;
pub use formatter::EmbeddingFormatter;
pub use summarizer::StatementSummarizer;

/// One step of the ingestion transform chain.
#[async_trait]
pub trait BatchTransform: Send + Sync {
    /// Short name used in pipeline logs.
    fn name(&self) -> &'static str;

    /// Consumes a batch of rows and produces the transformed batch.
    async fn apply(&self, rows: Vec<DebateRow>) -> Result<Vec<DebateRow>, RagError>;
}
