// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts
// of the system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits

// A (document, summary) training pair
pub mod example;

// Addresses of freezable model components
pub mod component;

// The explicit set of trainable components
pub mod trainable;

// Core abstractions (traits) that other layers implement
pub mod traits;
