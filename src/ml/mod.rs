// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model, optimizer and training code lives here. The data
// layer only touches Burn to build tensors; everything that
// computes gradients or updates weights is in this layer.
//
//   model.rs     — BART-shaped encoder/decoder summariser
//                  • shared token embedding (tied output head)
//                  • learned positional embeddings
//                  • post-norm transformer layers
//                  • token-level cross-entropy
//
//   registry.rs  — ComponentPath → parameter ids
//
//   unfreeze.rs  — gradual layer-unfreezing policy
//
//   optim.rs     — optimizer bound to trainable params,
//                  global gradient-norm clipping, step LR
//
//   scoring.rs   — ROUGE-1 / ROUGE-2 / ROUGE-L
//
//   trainer.rs   — the train / eval / reschedule loop
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Lewis et al. (2020) BART

/// Seq2seq summarisation model
pub mod model;

/// Parameter ids per model component
pub mod registry;

/// Which layers become trainable, and when
pub mod unfreeze;

/// Optimizer binding, clipping and learning-rate schedule
pub mod optim;

/// ROUGE metrics for generated summaries
pub mod scoring;

/// Full training loop with validation and gradual unfreezing
pub mod trainer;
