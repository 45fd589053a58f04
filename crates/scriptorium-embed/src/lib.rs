//! Deterministic embedding and keyword tagging for the scriptorium registry.
//!
//! Both [`HashEmbedder`] and [`KeywordTagger`] are pure, dependency-free
//! stand-ins for the fine-tuned sentence-transformer and its downloaded
//! keyword vocabulary that the production tagging pipeline uses; see each
//! type's docs for why.

mod embedder;
mod tagger;
mod taxonomy;

pub use embedder::{HashEmbedder, DIMENSIONS};
pub use tagger::KeywordTagger;
pub use taxonomy::{Facet, TaxonomyTerm};
