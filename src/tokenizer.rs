//! Token counting against the embedding model's tokenizer.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::types::RagError;

/// Shared token counter used by the formatter, summarizer, and chunker.
///
/// Construction loads the BPE ranks once; clones share the same encoder.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Result<Self, RagError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|err| RagError::Config(format!("failed to load tokenizer: {err}")))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Number of tokens in `text`. Empty text counts as zero.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_scale_with_text_length() {
        let counter = TokenCounter::new().unwrap();
        assert_eq!(counter.count(""), 0);
        let short = counter.count("A brief remark.");
        let long = counter.count("A considerably longer remark about parliamentary procedure and the order paper.");
        assert!(short > 0);
        assert!(long > short);
    }
}
