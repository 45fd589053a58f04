//! Shared types, error taxonomy and storage-seam traits for the scriptorium
//! template registry.
//!
//! Downstream crates depend on this one rather than on each other directly:
//! `scriptorium-storage` implements [`traits::FileStore`] over the local
//! filesystem, `scriptorium-embed` implements [`traits::EmbeddingProvider`]
//! and [`traits::Tagger`], and `scriptorium-templates`/`scriptorium-api`
//! compose those implementations through the trait objects defined here.
//! This keeps the dependency graph a DAG and lets every layer be tested
//! against the mocks in [`test_support`] instead of real I/O.

pub mod entry;
pub mod error;
pub mod kind;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use entry::{IndexEntry, Manifest};
pub use error::{Error, Result};
pub use kind::Kind;
pub use traits::{EmbeddingProvider, FileStore, Tagger};
