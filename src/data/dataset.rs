// ============================================================
// Layer 4 — Tokenizing Dataset
// ============================================================
// Wraps the corpus and turns example `i` into three sequences
// of exactly `max_len` token ids:
//
//   input_ids      ← document, truncated / padded to max_len
//   attention_mask ← 1 for real tokens, 0 for padding
//   labels         ← summary ids, truncated / padded to max_len
//
// Encoding happens on every access and is never cached.
//
// Truncation and padding are configured on a private copy of
// the tokenizer, so the caller's tokenizer is left untouched.
//
// The training loop reads the dataset through `batches()`, not
// through Burn's DataLoader: a tokenisation failure must end the
// run with its error, and Dataset::get can only answer None.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::domain::example::Example;

/// One fully tokenised and padded training sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedExample {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub labels:         Vec<u32>,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("index {index} out of range for dataset of {len} examples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot tokenise {field} of example {index}: {message}")]
    Tokenization { index: usize, field: &'static str, message: String },

    #[error("example {index} encoded to {actual} tokens, expected {expected}")]
    LengthMismatch { index: usize, actual: usize, expected: usize },
}

pub struct SummaryDataset {
    examples:  Arc<Vec<Example>>,
    tokenizer: Arc<Tokenizer>,
    max_len:   usize,
}

impl SummaryDataset {
    /// Build a dataset over `examples`.
    ///
    /// `pad_token` must exist in the tokenizer's vocabulary.
    pub fn new(
        examples:  Vec<Example>,
        tokenizer: &Tokenizer,
        max_len:   usize,
        pad_token: &str,
    ) -> Result<Self> {
        let pad_id = tokenizer
            .token_to_id(pad_token)
            .ok_or_else(|| anyhow::anyhow!("Pad token '{pad_token}' is not in the vocabulary"))?;

        let mut tokenizer = tokenizer.clone();
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_len,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Cannot configure truncation: {e}"))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy:  PaddingStrategy::Fixed(max_len),
            pad_id,
            pad_token: pad_token.to_string(),
            ..Default::default()
        }));

        Ok(Self {
            examples:  Arc::new(examples),
            tokenizer: Arc::new(tokenizer),
            max_len,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Tokenise example `index`.
    pub fn encode(&self, index: usize) -> Result<EncodedExample, DatasetError> {
        let example = self.examples.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;

        let inputs  = self.encode_text(index, "document", &example.document)?;
        let targets = self.encode_text(index, "summary", &example.summary)?;

        let encoded = EncodedExample {
            input_ids:      inputs.get_ids().to_vec(),
            attention_mask: inputs.get_attention_mask().to_vec(),
            labels:         targets.get_ids().to_vec(),
        };

        for actual in [
            encoded.input_ids.len(),
            encoded.attention_mask.len(),
            encoded.labels.len(),
        ] {
            if actual != self.max_len {
                return Err(DatasetError::LengthMismatch { index, actual, expected: self.max_len });
            }
        }
        Ok(encoded)
    }

    /// Encode examples in order, `batch_size` at a time.
    /// The last batch may be shorter. Errors are yielded, not skipped.
    pub fn batches(
        &self,
        batch_size: usize,
    ) -> impl Iterator<Item = Result<Vec<EncodedExample>, DatasetError>> + '_ {
        let batch_size = batch_size.max(1);
        (0..self.len())
            .step_by(batch_size)
            .map(move |start| {
                let end = (start + batch_size).min(self.len());
                (start..end).map(|i| self.encode(i)).collect()
            })
    }

    /// Number of batches `batches(batch_size)` yields.
    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.len().div_ceil(batch_size.max(1))
    }

    fn encode_text(
        &self,
        index: usize,
        field: &'static str,
        text:  &str,
    ) -> Result<tokenizers::Encoding, DatasetError> {
        self.tokenizer
            .encode(text, true)
            .map_err(|e| DatasetError::Tokenization { index, field, message: e.to_string() })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infra::tokenizer_store::TokenizerStore;

    pub(crate) const PAD: &str = "<pad>";

    /// A small word-level tokenizer built from `texts`.
    pub(crate) fn word_tokenizer(texts: &[&str]) -> (tempfile::TempDir, Tokenizer) {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let tokenizer = store.load_or_build(&texts, 100).unwrap();
        (dir, tokenizer)
    }

    fn corpus() -> Vec<Example> {
        vec![
            Example::new("the meeting moved to thursday morning at nine", "meeting thursday"),
            Example::new("hello world", "hello"),
            Example::new("", ""),
        ]
    }

    #[test]
    fn test_every_sequence_has_max_len() {
        let (_dir, tok) = word_tokenizer(&[
            "the meeting moved to thursday morning at nine",
            "hello world",
        ]);
        let ds = SummaryDataset::new(corpus(), &tok, 4, PAD).unwrap();

        assert_eq!(ds.len(), 3);
        for i in 0..ds.len() {
            let e = ds.encode(i).unwrap();
            assert_eq!(e.input_ids.len(), 4);
            assert_eq!(e.attention_mask.len(), 4);
            assert_eq!(e.labels.len(), 4);
        }
    }

    #[test]
    fn test_mask_marks_padding() {
        let (_dir, tok) = word_tokenizer(&["hello world"]);
        let ds = SummaryDataset::new(vec![Example::new("hello world", "hello")], &tok, 5, PAD).unwrap();
        let e  = ds.encode(0).unwrap();
        let pad_id = tok.token_to_id(PAD).unwrap();

        assert_eq!(e.attention_mask, vec![1, 1, 0, 0, 0]);
        assert_eq!(&e.input_ids[2..], &[pad_id, pad_id, pad_id]);
        assert_eq!(&e.labels[1..], &[pad_id, pad_id, pad_id, pad_id]);
    }

    #[test]
    fn test_out_of_range_index() {
        let (_dir, tok) = word_tokenizer(&["hello world"]);
        let ds = SummaryDataset::new(corpus(), &tok, 4, PAD).unwrap();

        assert!(matches!(
            ds.encode(3),
            Err(DatasetError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_decode_then_encode_recovers_ids() {
        let (_dir, tok) = word_tokenizer(&["hello world"]);
        let ds = SummaryDataset::new(vec![Example::new("hello world", "world")], &tok, 6, PAD).unwrap();
        let e  = ds.encode(0).unwrap();

        let text = tok.decode(&e.input_ids, true).unwrap();
        assert_eq!(text, "hello world");

        let again = SummaryDataset::new(vec![Example::new(text, "world")], &tok, 6, PAD)
            .unwrap()
            .encode(0)
            .unwrap();
        assert_eq!(again.input_ids, e.input_ids);
    }

    #[test]
    fn test_batches_keep_order_and_remainder() {
        let (_dir, tok) = word_tokenizer(&["hello world"]);
        let ds = SummaryDataset::new(corpus(), &tok, 4, PAD).unwrap();

        let sizes: Vec<usize> = ds.batches(2).map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(ds.batch_count(2), 2);
    }

    #[test]
    fn test_unknown_pad_token_is_rejected() {
        let (_dir, tok) = word_tokenizer(&["hello"]);
        assert!(SummaryDataset::new(corpus(), &tok, 4, "[PAD]").is_err());
    }
}
