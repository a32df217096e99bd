// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between layers:
//
//   CorpusSource → anything that yields (document, summary)
//                  examples. CsvCorpusLoader is the one used
//                  by `train`; tests use in-memory corpora.
//
//   ParamFlags   → freeze / unfreeze / query a model component.
//                  TrainableSet implements it; the unfreezing
//                  policy is written against the trait only.

use anyhow::Result;

use crate::domain::component::ComponentPath;
use crate::domain::example::Example;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Any component that can load the summarisation corpus.
pub trait CorpusSource {
    fn load_all(&self) -> Result<Vec<Example>>;
}

impl CorpusSource for Vec<Example> {
    fn load_all(&self) -> Result<Vec<Example>> {
        Ok(self.clone())
    }
}

// ─── ParamFlags ───────────────────────────────────────────────────────────────
/// Trainability flags keyed by component.
pub trait ParamFlags {
    fn freeze(&mut self, path: ComponentPath);

    fn unfreeze(&mut self, path: ComponentPath);

    fn is_trainable(&self, path: &ComponentPath) -> bool;
}
