// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one command each.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing (that's Layer 1)
//   - Only workflow coordination, plus the one place where a
//     concrete Burn backend is picked
//
// Reference: Clean Architecture pattern

// The fine-tuning workflow
pub mod train_use_case;

// Raw email export → training corpus
pub mod clean_use_case;
