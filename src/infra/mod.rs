// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence that several layers depend on:
//
//   checkpoint.rs      — model directory I/O
//                        CompactRecorder weights, the model
//                        architecture config, the final
//                        trainable set and the run's
//                        TrainConfig as JSON
//
//   tokenizer_store.rs — loads the model's tokenizer.json, or
//                        builds a word-level one from the
//                        corpus for random-init smoke runs
//
//   metrics.rs         — per-epoch loss / ROUGE / trainable
//                        parameter counts appended to a CSV
//
// Reference: Burn Book §5 (Checkpointing)

/// Model weights and run metadata
pub mod checkpoint;

/// Tokenizer loading (and building for smoke runs)
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;
