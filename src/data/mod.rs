// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from CSV files to device-ready tensor batches.
//
//   raw email CSV
//       │
//       ▼
//   EmailCleaner      → strips links and noise, counts tokens
//       │                (`clean` command, writes corpus CSV)
//       ▼
//   CsvCorpusLoader   → reads (document, summary) pairs
//       │
//       ▼
//   split_train_val   → seeded shuffle + 85/15 split
//       │
//       ▼
//   SummaryDataset    → tokenises one example per access
//       │
//       ▼
//   SummaryBatcher    → stacks examples into [batch, L] tensors
//       │
//       ▼
//   training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the corpus CSV
pub mod loader;

/// Cleans raw email bodies
pub mod preprocessor;

/// Fixed-length tokenisation of (document, summary) pairs
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
