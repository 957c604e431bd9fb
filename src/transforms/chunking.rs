//! Splits over-length utterances into overlapping chunks, exploding the
//! batch so each output row carries exactly one chunk span.
//!
//! Chunks split at sentence boundaries; every chunk is re-paired with the
//! full context block from the formatter so sibling chunks embed against
//! identical context.

use async_trait::async_trait;
use tracing::info;

use crate::records::{ChunkSpan, DebateRow};
use crate::tokenizer::TokenCounter;
use crate::transforms::BatchTransform;
use crate::types::RagError;

/// Separator the formatter writes between content and context. The chunker
/// splits on this exact literal.
pub const CONTEXT_SEPARATOR: &str = "---\nCONTEXT:";

/// Tokens held back from the content budget to absorb joiner/boundary drift
/// between per-sentence counts and the final chunk count.
const BUDGET_MARGIN: i64 = 10;

pub struct ChunkingTransform {
    counter: TokenCounter,
    max_seq_length: usize,
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingTransform {
    pub fn new(
        counter: TokenCounter,
        max_seq_length: usize,
        chunk_size: usize,
        overlap: usize,
    ) -> Self {
        Self {
            counter,
            max_seq_length,
            chunk_size,
            overlap,
        }
    }

    /// Splits formatted text into `(context, content)`. Context keeps the
    /// separator prefix; it is empty when no context block is present.
    fn split_context(formatted: &str) -> (String, String) {
        match formatted.split_once(CONTEXT_SEPARATOR) {
            Some((content, context)) => (
                format!("{CONTEXT_SEPARATOR}{context}"),
                content.trim().to_string(),
            ),
            None => (String::new(), formatted.to_string()),
        }
    }

    /// Sentence boundaries: end punctuation, then whitespace, then an
    /// uppercase letter. Good enough for transcribed speech; abbreviations
    /// mid-sentence rarely precede a capitalized word.
    fn split_sentences(text: &str) -> Vec<&str> {
        let bytes = text.as_bytes();
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < bytes.len() {
            if matches!(bytes[i], b'.' | b'!' | b'?') {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j > i + 1 && j < bytes.len() && bytes[j].is_ascii_uppercase() {
                    let sentence = text[start..=i].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = j;
                    i = j;
                    continue;
                }
            }
            i += 1;
        }
        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
        sentences
    }

    /// Greedy sentence accumulation with trailing-sentence overlap.
    fn create_chunks(&self, content: &str, effective_chunk_size: i64) -> Vec<String> {
        let sentences = Self::split_sentences(content);
        if sentences.is_empty() {
            return vec![content.to_string()];
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens: i64 = 0;

        for sentence in sentences {
            let sentence_tokens = self.counter.count(sentence) as i64;

            if current_tokens + sentence_tokens > effective_chunk_size && !current.is_empty() {
                chunks.push(current.join(" "));

                // Carry trailing sentences forward, up to `overlap` tokens.
                let mut overlap_sentences: Vec<&str> = Vec::new();
                let mut overlap_tokens: i64 = 0;
                for kept in current.iter().rev() {
                    let kept_tokens = self.counter.count(kept) as i64;
                    if overlap_tokens + kept_tokens <= self.overlap as i64 {
                        overlap_sentences.insert(0, kept);
                        overlap_tokens += kept_tokens;
                    } else {
                        break;
                    }
                }
                current = overlap_sentences;
                current_tokens = overlap_tokens;
            }

            current.push(sentence);
            current_tokens += sentence_tokens;
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        chunks
    }

    /// Proportional char offsets over the original text: chunk `i` of `n`
    /// spans `[i*L/n, (i+1)*L/n)`, last chunk extended to `L`. An explicit
    /// approximation, kept because stored spans are consumed with exactly
    /// this arithmetic.
    fn char_offsets(chunk_count: usize, original_len: usize) -> Vec<(usize, usize)> {
        (0..chunk_count)
            .map(|i| {
                let start = if chunk_count > 1 {
                    (i * original_len) / chunk_count
                } else {
                    0
                };
                let end = if i < chunk_count - 1 {
                    ((i + 1) * original_len) / chunk_count
                } else {
                    original_len
                };
                (start, end)
            })
            .collect()
    }

    fn chunk_embedding_text(chunk_text: &str, context: &str) -> String {
        if context.is_empty() {
            chunk_text.to_string()
        } else {
            format!("{chunk_text}\n\n{context}")
        }
    }
}

#[async_trait]
impl BatchTransform for ChunkingTransform {
    fn name(&self) -> &'static str {
        "chunking"
    }

    async fn apply(&self, rows: Vec<DebateRow>) -> Result<Vec<DebateRow>, RagError> {
        let utterances = rows.len();
        let mut out: Vec<DebateRow> = Vec::with_capacity(rows.len());
        let mut split_count = 0usize;

        for row in rows {
            let (context, content) = Self::split_context(&row.utterance);
            let original_len = row.original_utterance.chars().count();

            if row.token_count <= self.max_seq_length {
                let mut single = row.clone();
                single.chunk = Some(ChunkSpan {
                    chunk_index: 0,
                    chunk_text: row.original_utterance.clone(),
                    embedding_text: row.utterance.clone(),
                    start_char: 0,
                    end_char: original_len,
                });
                out.push(single);
                continue;
            }

            let context_tokens = self.counter.count(&context) as i64;
            let available = self.max_seq_length as i64 - context_tokens - BUDGET_MARGIN;
            let effective_chunk_size = (self.chunk_size as i64).min(available);

            let chunks = self.create_chunks(&content, effective_chunk_size);
            let offsets = Self::char_offsets(chunks.len(), original_len);
            for (chunk_index, (chunk_text, (start_char, end_char))) in
                chunks.into_iter().zip(offsets).enumerate()
            {
                let mut chunk_row = row.clone();
                chunk_row.chunk = Some(ChunkSpan {
                    chunk_index,
                    embedding_text: Self::chunk_embedding_text(&chunk_text, &context),
                    chunk_text,
                    start_char,
                    end_char,
                });
                out.push(chunk_row);
            }
            split_count += 1;
        }

        info!(
            utterances,
            chunks = out.len(),
            split = split_count,
            "chunked batch"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::EmbeddingFormatter;
    use chrono::NaiveDate;

    fn counter() -> TokenCounter {
        TokenCounter::new().unwrap()
    }

    fn long_speech(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                format!(
                    "Point number {i} concerns the fiscal outlook, the borrowing forecast, \
                     and the departmental spending envelope for the coming year."
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn format_and_chunk(
        utterance: String,
        max_seq_length: usize,
        chunk_size: usize,
        overlap: usize,
    ) -> Vec<DebateRow> {
        let row = DebateRow {
            date: NaiveDate::from_ymd_opt(2025, 9, 16).unwrap(),
            speaker_name: Some("Bob Minister".into()),
            utterance: utterance.clone(),
            original_utterance: utterance,
            topic_heading: Some("Fiscal Policy".into()),
            ..DebateRow::default()
        };
        let formatted = EmbeddingFormatter::new(counter(), max_seq_length)
            .apply(vec![row])
            .await
            .unwrap();
        ChunkingTransform::new(counter(), max_seq_length, chunk_size, overlap)
            .apply(formatted)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn short_utterances_become_a_single_full_span_chunk() {
        let rows = format_and_chunk("A brief remark. Nothing more.".into(), 512, 400, 100).await;
        assert_eq!(rows.len(), 1);
        let chunk = rows[0].chunk().unwrap();
        assert_eq!(chunk.chunk_index, 0);
        assert_eq!(chunk.chunk_text, rows[0].original_utterance);
        assert_eq!(chunk.start_char, 0);
        assert_eq!(chunk.end_char, rows[0].original_utterance.chars().count());
        assert_eq!(chunk.embedding_text, rows[0].utterance);
    }

    #[tokio::test]
    async fn long_utterances_split_with_shared_context_and_covering_offsets() {
        // Roughly 1200 tokens of content against a 512-token budget.
        let rows = format_and_chunk(long_speech(50), 512, 400, 100).await;
        assert!(rows.len() >= 2, "expected multiple chunks, got {}", rows.len());

        let total_len = rows[0].original_utterance.chars().count();
        let mut expected_start = 0;
        for (i, row) in rows.iter().enumerate() {
            let chunk = row.chunk().unwrap();
            assert_eq!(chunk.chunk_index, i);
            // Offsets tile [0, len) with no gaps.
            assert_eq!(chunk.start_char, expected_start);
            assert!(chunk.end_char > chunk.start_char);
            expected_start = chunk.end_char;
            // Every sibling carries the identical context block.
            assert!(chunk.embedding_text.contains("---\nCONTEXT:"));
            assert!(chunk.embedding_text.contains("Topic: Fiscal Policy"));
            assert!(chunk
                .embedding_text
                .starts_with(chunk.chunk_text.as_str()));
        }
        assert_eq!(expected_start, total_len);
    }

    #[tokio::test]
    async fn consecutive_chunks_overlap_by_trailing_sentences() {
        let rows = format_and_chunk(long_speech(50), 512, 400, 100).await;
        assert!(rows.len() >= 2);
        let first = &rows[0].chunk().unwrap().chunk_text;
        let second = &rows[1].chunk().unwrap().chunk_text;

        // The second chunk starts with the tail sentences of the first.
        let last_sentence = ChunkingTransform::split_sentences(first)
            .last()
            .unwrap()
            .to_string();
        assert!(second.contains(&last_sentence));
    }

    #[tokio::test]
    async fn degenerate_text_without_sentence_breaks_is_one_chunk() {
        // No uppercase-after-punctuation anywhere, so no split points.
        let blob = "word ".repeat(800).trim().to_string();
        let rows = format_and_chunk(blob, 256, 200, 50).await;
        // One chunk per accumulation pass over a single "sentence".
        assert_eq!(rows.len(), 1);
        let chunk = rows[0].chunk().unwrap();
        assert_eq!(chunk.start_char, 0);
        assert_eq!(chunk.end_char, rows[0].original_utterance.chars().count());
    }

    #[test]
    fn sentence_split_requires_capital_after_punctuation() {
        let sentences = ChunkingTransform::split_sentences(
            "The hon. member asked about rates. Rates will fall. but not yet",
        );
        assert_eq!(
            sentences,
            vec!["The hon. member asked about rates.", "Rates will fall. but not yet"]
        );
    }
}
