// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Loads (document, summary) pairs from a CSV file using the
// csv crate.
//
// The corpus produced by the `clean` command has a header row
// and one email per row. Only two columns matter here:
//
//   body,resume,count
//   "Bonjour, la réunion ...","Réunion déplacée à jeudi",112
//
// Column names are configurable; any other columns are
// ignored. A row missing either column is a data error and
// aborts the load, so the training set never silently shrinks.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::domain::example::Example;
use crate::domain::traits::CorpusSource;

pub struct CsvCorpusLoader {
    /// Path to the CSV file
    path: PathBuf,
    /// Header of the column holding the document text
    document_column: String,
    /// Header of the column holding the reference summary
    summary_column: String,
}

impl CsvCorpusLoader {
    pub fn new(
        path:            impl Into<PathBuf>,
        document_column: impl Into<String>,
        summary_column:  impl Into<String>,
    ) -> Self {
        Self {
            path:            path.into(),
            document_column: document_column.into(),
            summary_column:  summary_column.into(),
        }
    }
}

impl CorpusSource for CsvCorpusLoader {
    fn load_all(&self) -> Result<Vec<Example>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Cannot open corpus '{}'", self.path.display()))?;

        let headers = reader.headers()?.clone();
        let doc_idx = column_index(&headers, &self.document_column)?;
        let sum_idx = column_index(&headers, &self.summary_column)?;

        let mut examples = Vec::new();
        for (row, record) in reader.records().enumerate() {
            // +2: one for the header, one for 1-based line numbers
            let line   = row + 2;
            let record = record
                .with_context(|| format!("Malformed CSV record at line {line}"))?;

            let (Some(document), Some(summary)) = (record.get(doc_idx), record.get(sum_idx)) else {
                bail!(
                    "Line {line} of '{}' is missing '{}' or '{}'",
                    self.path.display(),
                    self.document_column,
                    self.summary_column,
                );
            };
            examples.push(Example::new(document, summary));
        }

        tracing::info!(
            "Loaded {} examples from '{}'",
            examples.len(),
            self.path.display()
        );
        Ok(examples)
    }
}

/// Find the position of a named column in the header row.
pub(crate) fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .with_context(|| {
            let available: Vec<&str> = headers.iter().collect();
            format!("Column '{name}' not found; available columns: {available:?}")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_named_columns() {
        let file = write_csv("body,resume,count\n\"hello, world\",greeting,3\nsecond mail,short,2\n");
        let loader = CsvCorpusLoader::new(file.path(), "body", "resume");
        let examples = loader.load_all().unwrap();

        assert_eq!(
            examples,
            vec![
                Example::new("hello, world", "greeting"),
                Example::new("second mail", "short"),
            ]
        );
    }

    #[test]
    fn test_column_order_does_not_matter() {
        let file = write_csv("resume,body\nsum,doc\n");
        let examples = CsvCorpusLoader::new(file.path(), "body", "resume")
            .load_all()
            .unwrap();
        assert_eq!(examples, vec![Example::new("doc", "sum")]);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let file = write_csv("body,count\ntext,1\n");
        let err = CsvCorpusLoader::new(file.path(), "body", "resume")
            .load_all()
            .unwrap_err();
        assert!(err.to_string().contains("resume"));
    }

    #[test]
    fn test_short_row_is_an_error() {
        let file = write_csv("body,resume\ncomplete,row\nonly-body\n");
        let err = CsvCorpusLoader::new(file.path(), "body", "resume")
            .load_all()
            .unwrap_err();
        assert!(err.to_string().contains("Line 3"));
    }
}
