//! The batched, resumable debate ingestion pipeline.
//!
//! Per batch: load and parse files, drop rows from already-checkpointed
//! documents, run the transform chain, embed chunk texts in fixed
//! sub-batches, persist, and only then mark the batch's files processed. A
//! failed batch aborts the run; re-running resumes from the checkpoint.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::embeddings::EmbeddingProvider;
use crate::ingestion::cache::SummaryStore;
use crate::ingestion::checkpoint::CheckpointTracker;
use crate::parser::DebateLoader;
use crate::records::DebateRow;
use crate::stores::DebateStore;
use crate::transforms::BatchTransform;
use crate::types::RagError;

/// Totals for one pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub batches_run: usize,
    pub files_processed: usize,
    pub chunks_inserted: usize,
}

pub struct DebatePipeline {
    loader: DebateLoader,
    transforms: Vec<Box<dyn BatchTransform>>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DebateStore>,
    checkpoint: CheckpointTracker,
    summary_cache: Arc<dyn SummaryStore>,
    batch_size: usize,
    embed_batch_size: usize,
    max_batches: Option<usize>,
}

impl DebatePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        loader: DebateLoader,
        transforms: Vec<Box<dyn BatchTransform>>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn DebateStore>,
        checkpoint: CheckpointTracker,
        summary_cache: Arc<dyn SummaryStore>,
        batch_size: usize,
        embed_batch_size: usize,
        max_batches: Option<usize>,
    ) -> Self {
        Self {
            loader,
            transforms,
            embedder,
            store,
            checkpoint,
            summary_cache,
            batch_size: batch_size.max(1),
            embed_batch_size: embed_batch_size.max(1),
            max_batches,
        }
    }

    /// Runs the pipeline to completion (or `max_batches`).
    pub async fn run(&self) -> Result<PipelineReport, RagError> {
        self.checkpoint.load().await?;

        let total_files = self.loader.file_count();
        info!(total_files, batch_size = self.batch_size, "starting ingestion run");

        let mut report = PipelineReport::default();
        let mut batch_number = 0usize;
        loop {
            if let Some(max) = self.max_batches {
                if batch_number >= max {
                    info!(batch_number, "reached batch limit");
                    break;
                }
            }
            let files = self.loader.batch_files(batch_number, self.batch_size);
            if files.is_empty() {
                break;
            }

            match self.process_batch(batch_number, files, &mut report).await {
                Ok(()) => {}
                Err(err) => {
                    error!(batch = batch_number, %err, "batch failed, aborting run");
                    return Err(err);
                }
            }
            batch_number += 1;
        }

        info!(
            batches = report.batches_run,
            files = report.files_processed,
            chunks = report.chunks_inserted,
            "ingestion run complete"
        );
        Ok(report)
    }

    async fn process_batch(
        &self,
        batch_number: usize,
        files: &[String],
        report: &mut PipelineReport,
    ) -> Result<(), RagError> {
        let mut pending: Vec<String> = Vec::new();
        for file in files {
            if !self.checkpoint.contains(file).await {
                pending.push(file.clone());
            }
        }
        if pending.is_empty() {
            info!(batch = batch_number, "batch already processed, skipping");
            return Ok(());
        }

        let mut rows = self.loader.load_batch(batch_number, self.batch_size)?;
        let pending_set: HashSet<&str> = pending.iter().map(String::as_str).collect();
        rows.retain(|row| {
            source_file_name(&row.source_path)
                .map(|name| pending_set.contains(name))
                .unwrap_or(false)
        });
        info!(
            batch = batch_number,
            files = pending.len(),
            utterances = rows.len(),
            "processing batch"
        );

        for transform in &self.transforms {
            rows = transform.apply(rows).await?;
        }

        self.embed_rows(&mut rows).await?;

        let inserted = self
            .store
            .insert_debate_rows(rows, self.embedder.model_name())
            .await?;

        // Checkpoint strictly after persistence.
        report.batches_run += 1;
        report.files_processed += pending.len();
        report.chunks_inserted += inserted;
        self.checkpoint.mark_processed(pending).await?;
        Ok(())
    }

    /// Embeds every chunk's embedding text in fixed-size sub-batches,
    /// writing the vectors back onto the rows in order.
    async fn embed_rows(&self, rows: &mut [DebateRow]) -> Result<(), RagError> {
        let mut start = 0;
        while start < rows.len() {
            let end = (start + self.embed_batch_size).min(rows.len());
            let texts: Vec<String> = rows[start..end]
                .iter()
                .map(|row| Ok(row.chunk()?.embedding_text.clone()))
                .collect::<Result<_, RagError>>()?;
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} vectors, got {}",
                    texts.len(),
                    vectors.len()
                )));
            }
            for (row, vector) in rows[start..end].iter_mut().zip(vectors) {
                row.embedding = Some(vector);
            }
            start = end;
        }
        Ok(())
    }

    /// Clears the checkpoint, the summary cache, and all persisted debate
    /// rows, so the next run starts from scratch.
    pub async fn reset(&self) -> Result<(), RagError> {
        self.checkpoint.clear().await?;
        self.summary_cache.clear().await?;
        self.store.reset().await?;
        info!("pipeline state reset");
        Ok(())
    }
}

fn source_file_name(source_path: &str) -> Option<&str> {
    Path::new(source_path).file_name()?.to_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_strip_directories() {
        assert_eq!(
            source_file_name("/data/debates/debates2025-09-16a.xml"),
            Some("debates2025-09-16a.xml")
        );
        assert_eq!(source_file_name("debates2025-09-16a.xml"), Some("debates2025-09-16a.xml"));
    }
}
