use std::env;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing_subscriber::FmtSubscriber;

use debatesmith::embeddings::{EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
use debatesmith::ingestion::{
    CheckpointTracker, DebatePipeline, JsonFileCache, MetadataPipeline, SummaryStore,
};
use debatesmith::parser::DebateLoader;
use debatesmith::stores::SearchFilters;
use debatesmith::transforms::{
    BatchTransform, ChunkingTransform, EmbeddingFormatter, StatementSummarizer,
};
use debatesmith::{
    DebateRetriever, DebateStore, RagError, Settings, SqliteDebateStore, TokenCounter,
};

/// End-to-end run: ingest debate files, load metadata, backfill parties,
/// then answer a sample query.
///
/// Set `EMBEDDINGS_BASE_URL` to embed against a real endpoint; without it a
/// deterministic mock embedder is used so the demo runs offline.
#[tokio::main]
async fn main() -> Result<(), RagError> {
    init_tracing();
    let _ = dotenvy::dotenv();
    let settings = Settings::from_env()?;

    let start_date = match &settings.start_date {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|err| RagError::Config(format!("INGEST_START_DATE: {err}")))?,
        ),
        None => None,
    };

    let embedder: Arc<dyn EmbeddingProvider> = match env::var("EMBEDDINGS_BASE_URL") {
        Ok(url) => Arc::new(HttpEmbeddingProvider::new(
            url,
            settings.api_key.clone(),
            settings.embedding_model_name.clone(),
            settings.embedding_dimensions,
            settings.max_seq_length,
        )),
        Err(_) => Arc::new(MockEmbeddingProvider::with_dimensions(
            settings.embedding_dimensions,
        )),
    };

    let store = Arc::new(
        SqliteDebateStore::open(&settings.database_path, embedder.dimensions()).await?,
    );

    let counter = TokenCounter::new()?;
    let summary_cache = Arc::new(JsonFileCache::new(&settings.summary_cache_path));
    summary_cache.load().await?;

    let mut transforms: Vec<Box<dyn BatchTransform>> = Vec::new();
    // The summarizer needs a chat endpoint; skip it when no key is set.
    if settings.api_key.is_some() {
        transforms.push(Box::new(StatementSummarizer::new(
            settings.api_base_url.clone(),
            settings.api_key.clone(),
            settings.summarizer_model.clone(),
            counter.clone(),
            settings.summary_token_threshold,
            settings.summary_target_tokens,
            settings.summary_max_concurrent,
            summary_cache.clone() as Arc<dyn SummaryStore>,
        )));
    }
    transforms.push(Box::new(EmbeddingFormatter::new(
        counter.clone(),
        settings.max_seq_length,
    )));
    transforms.push(Box::new(ChunkingTransform::new(
        counter,
        settings.max_seq_length,
        settings.chunk_size,
        settings.chunk_overlap,
    )));

    let loader = DebateLoader::new(&settings.debates_dir, start_date)?;
    println!(
        "Found {} debate files in {}",
        loader.file_count(),
        settings.debates_dir.display()
    );

    let pipeline = DebatePipeline::new(
        loader,
        transforms,
        embedder.clone(),
        store.clone(),
        CheckpointTracker::new(&settings.checkpoint_path),
        summary_cache,
        settings.batch_size,
        settings.embed_batch_size,
        settings.max_batches,
    );

    let start = Instant::now();
    let report = pipeline.run().await?;
    println!(
        "Ingested {} files in {} batches ({} chunks) in {:.1}s",
        report.files_processed,
        report.batches_run,
        report.chunks_inserted,
        start.elapsed().as_secs_f64()
    );

    if settings.metadata_dir.join("people.json").exists() {
        MetadataPipeline::new(&settings.metadata_dir, store.clone())
            .run()
            .await?;
        println!("Metadata loaded from {}", settings.metadata_dir.display());
    } else {
        println!(
            "No people.json under {}, skipping metadata",
            settings.metadata_dir.display()
        );
    }

    let counts = store.counts().await?;
    println!(
        "Database now holds {} utterances / {} chunks / {} embeddings",
        counts.utterances, counts.chunks, counts.embeddings
    );

    let retriever = DebateRetriever::new(
        store,
        embedder,
        settings.top_k,
        settings.min_similarity,
    );
    let query = env::var("DEMO_QUERY").unwrap_or_else(|_| "public spending".to_string());
    let results = retriever.fetch(&query, SearchFilters::default(), None).await?;

    println!("\nTop results for '{query}':");
    for (rank, result) in results.iter().take(5).enumerate() {
        let speaker = result.speaker.name.as_deref().unwrap_or("(unattributed)");
        let snippet: String = result.text.chars().take(160).collect();
        println!("{}. [{}] {speaker}: {snippet}", rank + 1, result.date);
    }

    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_env_filter("info").finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
