// ============================================================
// Layer 3 — Example Domain Type
// ============================================================
// One (document, summary) pair from the training corpus.
// The document is a cleaned email body; the summary is the
// reference text the model learns to produce.
//
// Examples are immutable once loaded. Each epoch reads every
// example again, so the corpus is shared by reference and
// never mutated.

use serde::{Deserialize, Serialize};

/// A single summarisation pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// The source text (email body)
    pub document: String,

    /// The reference summary for `document`
    pub summary: String,
}

impl Example {
    pub fn new(document: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            summary:  summary.into(),
        }
    }
}
