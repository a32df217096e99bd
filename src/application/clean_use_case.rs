// ============================================================
// Layer 2 — CleanUseCase
// ============================================================
// Turns a raw email export into the training corpus:
//
//   Step 1: Read the raw CSV                 (csv crate)
//   Step 2: Clean the body column            (Layer 4 - data)
//   Step 3: Count model tokens per body      (Layer 4 - data)
//   Step 4: Write every column + `count`     (csv crate)
//
// All other columns (subject, sender, summary, ...) pass through
// untouched. The first malformed row aborts the run.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::data::{loader::column_index, preprocessor::EmailCleaner};
use crate::infra::tokenizer_store::TokenizerStore;

#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub input:         PathBuf,
    pub output:        PathBuf,
    pub body_column:   String,
    /// Directory holding the tokenizer.json used for counting
    pub tokenizer_dir: PathBuf,
}

pub struct CleanUseCase {
    config: CleanConfig,
}

impl CleanUseCase {
    pub fn new(config: CleanConfig) -> Self {
        Self { config }
    }

    /// Returns the number of rows written.
    pub fn execute(&self) -> Result<usize> {
        let cfg = &self.config;

        let tokenizer = TokenizerStore::new(&cfg.tokenizer_dir).load()?;
        let cleaner   = EmailCleaner::new();

        // ── Step 1: Read ──────────────────────────────────────────────────────
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&cfg.input)
            .with_context(|| format!("Cannot open '{}'", cfg.input.display()))?;
        let headers  = reader.headers()?.clone();
        let body_idx = column_index(&headers, &cfg.body_column)?;

        let mut writer = csv::Writer::from_path(&cfg.output)
            .with_context(|| format!("Cannot create '{}'", cfg.output.display()))?;
        let mut out_headers = headers.clone();
        out_headers.push_field("count");
        writer.write_record(&out_headers)?;

        let mut rows = 0usize;
        for (row, record) in reader.records().enumerate() {
            let line   = row + 2;
            let record = record
                .with_context(|| format!("Malformed CSV record at line {line}"))?;

            // ── Steps 2–3: Clean and count ────────────────────────────────────
            let body  = cleaner.clean(record.get(body_idx).unwrap_or_default());
            let count = cleaner.count_tokens(&tokenizer, &body)?;

            // ── Step 4: Write ─────────────────────────────────────────────────
            let mut out: csv::StringRecord = record
                .iter()
                .enumerate()
                .map(|(i, field)| if i == body_idx { body.as_str() } else { field })
                .collect();
            out.push_field(&count.to_string());
            writer.write_record(&out)?;
            rows += 1;
        }
        writer.flush()?;

        tracing::info!("Cleaned {} emails into '{}'", rows, cfg.output.display());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup(csv_text: &str) -> (tempfile::TempDir, CleanConfig) {
        let dir = tempfile::tempdir().unwrap();
        TokenizerStore::new(dir.path())
            .load_or_build(&["hello world bye".to_string()], 50)
            .unwrap();

        let input = dir.path().join("raw.csv");
        fs::write(&input, csv_text).unwrap();

        let config = CleanConfig {
            input,
            output:        dir.path().join("clean.csv"),
            body_column:   "body".to_string(),
            tokenizer_dir: dir.path().to_path_buf(),
        };
        (dir, config)
    }

    #[test]
    fn test_cleans_body_and_appends_count() {
        let (_dir, cfg) = setup(
            "subject,body,resume\n\
             Hi,\"Hello\n\nWorld https://x.com/a\nBye\",greeting\n",
        );

        let rows = CleanUseCase::new(cfg.clone()).execute().unwrap();
        assert_eq!(rows, 1);

        let mut reader = csv::Reader::from_path(&cfg.output).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["subject", "body", "resume", "count"]);

        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "Hi");
        assert_eq!(&record[1], "Hello World  Bye");
        assert_eq!(&record[2], "greeting");
        assert_eq!(&record[3], "3");
    }

    #[test]
    fn test_missing_body_column_fails() {
        let (_dir, cfg) = setup("subject,text\nHi,hello\n");
        assert!(CleanUseCase::new(cfg).execute().is_err());
    }

    #[test]
    fn test_malformed_row_fails() {
        let (_dir, cfg) = setup("subject,body\nHi,hello,extra\n");
        assert!(CleanUseCase::new(cfg).execute().is_err());
    }
}
