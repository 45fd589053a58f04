//! Frontmatter parsing, the template-processing state machine and the
//! reindex pipeline for the scriptorium registry.
//!
//! This crate sits above `scriptorium-storage`: it reads candidate
//! templates from the real filesystem and writes them into a
//! [`scriptorium_storage::Transaction`]'s bound stores.

pub mod frontmatter;
pub mod processor;
pub mod reindex;

pub use processor::{publish, PublishInput};
pub use reindex::reindex;
