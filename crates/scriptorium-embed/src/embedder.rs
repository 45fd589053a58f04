use scriptorium_core::{EmbeddingProvider, Result};

/// Output dimensionality shared by every entry's embedding, the tagging
/// taxonomy's embeddings, and search queries.
pub const DIMENSIONS: usize = 384;

/// A bag-of-words, hashing-trick embedder.
///
/// The real system behind this registry embeds text with a fine-tuned
/// sentence-transformer; running that model (and its tokenizer, ONNX
/// runtime, and weight download) is out of scope here. This stands in for
/// it: deterministic, pure, dependency-free, and stable across runs and
/// platforms, which is the property everything downstream (content
/// addressing, search, tagging) actually needs.
///
/// Each lowercased word token is hashed into one of [`DIMENSIONS`] buckets
/// with a sign derived from a second hash, folded additively (a standard
/// feature-hashing scheme), then the resulting vector is L2-normalized.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        HashEmbedder
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % DIMENSIONS as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashEmbedder {
    const DIMENSIONS: usize = DIMENSIONS;

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_embeds_identically() {
        let embedder = HashEmbedder::new();
        let a = embedder.encode(&["rust async runtime".to_string()]).unwrap();
        let b = embedder.encode(&["rust async runtime".to_string()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_text_embeds_differently() {
        let embedder = HashEmbedder::new();
        let out = embedder
            .encode(&["web scraping pipeline".to_string(), "database migration tool".to_string()])
            .unwrap();
        assert_ne!(out[0], out[1]);
    }

    #[test]
    fn vectors_are_unit_norm() {
        let embedder = HashEmbedder::new();
        let out = embedder.encode(&["a fairly long sentence about tagging".to_string()]).unwrap();
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_text_yields_zero_vector_without_panicking() {
        let embedder = HashEmbedder::new();
        let out = embedder.encode(&[String::new()]).unwrap();
        assert_eq!(out[0], vec![0.0; DIMENSIONS]);
    }

    #[test]
    fn dimensions_match_declared_constant() {
        let embedder = HashEmbedder::new();
        let out = embedder.encode(&["x".to_string()]).unwrap();
        assert_eq!(out[0].len(), HashEmbedder::DIMENSIONS);
    }
}
