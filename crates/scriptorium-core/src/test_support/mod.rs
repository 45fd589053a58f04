//! Deterministic test doubles shared across the workspace.
//!
//! These mocks trade realism for predictability: same input always produces
//! the same output, nothing touches the network or filesystem, and call
//! counts are observable so tests can assert on interaction patterns, not
//! just final state.

mod mocks;

pub use mocks::{MockEmbeddingProvider, MockFileStore, MockTagger};
