use async_trait::async_trait;

use crate::error::Result;

/// A flat, content-addressable-by-path byte store over a root.
///
/// Implementations are responsible for POSIX path normalization
/// (forward slashes, no `..` segments) regardless of host OS, and for
/// reporting a [`crate::Error::NotFound`] distinct from permission errors
/// on [`FileStore::load`].
///
/// This is the one seam the spec calls out as admitting alternate backends
/// (object stores) by substituting the blob primitives; only a local
/// filesystem implementation is required today.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write bytes atomically, creating parent directories as needed.
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read bytes back. Fails with [`crate::Error::NotFound`] if absent.
    async fn load(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove a file, or a directory subtree when `recursive` is set.
    async fn delete(&self, key: &str, recursive: bool) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn is_dir(&self, key: &str) -> Result<bool>;

    /// Glob supporting `**` and `*`; results are normalized to forward
    /// slashes relative to the store root.
    async fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    /// Best-effort modification time, used by the reindex pipeline's
    /// manifest-freshness check. Implementations that cannot report mtimes
    /// should return `None` rather than fabricate a value.
    async fn mtime(&self, key: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>>;
}

/// Deterministic `encode([text]) -> f32[N][384]`, producing L2-normalized
/// vectors. Batched; callers decide chunking.
///
/// The backing model, tokenizer and inference runtime are external
/// concerns; this trait is the pure-function seam the rest of the system
/// is tested against.
pub trait EmbeddingProvider: Send + Sync {
    const DIMENSIONS: usize = 384;

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Facet-constrained nearest-neighbor lookup over a fixed keyword taxonomy.
///
/// `extract_tags` returns, for each input id, the tag names that passed
/// their facet's top-k/min-similarity rule, ordered by descending best
/// score. Ids with no passing tags map to an empty list.
pub trait Tagger: Send + Sync {
    fn extract_tags(
        &self,
        ids: &[String],
        texts: &[String],
    ) -> Result<std::collections::HashMap<String, Vec<String>>>;
}
