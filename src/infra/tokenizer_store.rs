// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads the pretrained tokenizer that belongs to the model
// being fine-tuned (`tokenizer.json` in HuggingFace format).
//
// For smoke runs without a pretrained model, a word-level
// tokenizer can be built from the corpus instead. It uses the
// BART special-token layout so the rest of the pipeline does
// not care which one it got:
//
//   <s> = 0   <pad> = 1   </s> = 2   <unk> = 3
//
// The word-level tokenizer is written as JSON and loaded back
// through Tokenizer::from_file, which avoids the trainer type
// plumbing of the tokenizers crate entirely.

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::Tokenizer;

const SPECIAL_TOKENS: [&str; 4] = ["<s>", "<pad>", "</s>", "<unk>"];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Load existing tokenizer or build a word-level one from texts
    pub fn load_or_build(
        &self,
        texts:      &[String],
        vocab_size: usize,
    ) -> Result<Tokenizer> {
        if self.exists() {
            tracing::info!("Loading tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building word-level tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    /// Load a previously saved tokenizer from JSON file
    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!(
                "Cannot load tokenizer from '{}': {}", path.display(), e
            ))
    }

    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Step 1: Count pre-tokens exactly as the Whitespace
        //            pre-tokenizer will split them ──────────────────────────────
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for piece in pre_tokenize(&text.to_lowercase()) {
                *freq.entry(piece).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties broken alphabetically so the
        // same corpus always yields the same ids.
        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

        // ── Step 2: Vocabulary, specials first ────────────────────────────────
        let mut vocab = serde_json::Map::new();
        for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
            vocab.insert(token.to_string(), serde_json::json!(id));
        }
        for (word, _) in &words {
            if !vocab.contains_key(word) {
                let id = vocab.len();
                vocab.insert(word.clone(), serde_json::json!(id));
            }
        }

        let vocab_len = vocab.len();
        let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
            .iter()
            .enumerate()
            .map(|(id, token)| serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        // ── Step 3: Write tokenizer JSON in HuggingFace format ────────────────
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "<unk>"
            }
        });

        let tok_path = self.path();
        std::fs::write(&tok_path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| "Cannot write tokenizer JSON")?;

        tracing::info!(
            "Tokenizer built with {} entries, saved to '{}'",
            vocab_len,
            tok_path.display()
        );

        Tokenizer::from_file(&tok_path)
            .map_err(|e| anyhow::anyhow!("Cannot reload tokenizer: {e}"))
    }
}

/// Split like the `Whitespace` pre-tokenizer: runs of word
/// characters and runs of other non-space characters.
fn pre_tokenize(text: &str) -> Vec<String> {
    let mut pieces  = Vec::new();
    for word in text.split_whitespace() {
        let mut current = String::new();
        let mut current_is_word = None;
        for c in word.chars() {
            let is_word = c.is_alphanumeric() || c == '_';
            if current_is_word.is_some_and(|w| w != is_word) {
                pieces.push(std::mem::take(&mut current));
            }
            current.push(c);
            current_is_word = Some(is_word);
        }
        if !current.is_empty() {
            pieces.push(current);
        }
    }
    pieces
}
