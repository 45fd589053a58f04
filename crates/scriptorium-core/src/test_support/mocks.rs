use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::traits::{EmbeddingProvider, FileStore, Tagger};

/// Deterministic stand-in for a real sentence-embedding model.
///
/// Produces an L2-normalized 384-dim vector per input text by hashing the
/// text into a seed and filling the vector from a simple linear congruential
/// sequence. Same text always yields the same vector; different texts yield
/// different (though not semantically meaningful) vectors. `calls` tracks
/// how many times `encode` was invoked, for asserting batching behavior.
#[derive(Default)]
pub struct MockEmbeddingProvider {
    calls: Mutex<usize>,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn seed(text: &str) -> u64 {
        let mut h: u64 = 1469598103934665603; // FNV offset basis
        for b in text.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(1099511628211);
        }
        h
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        *self.calls.lock().unwrap() += 1;
        Ok(texts
            .iter()
            .map(|t| {
                let mut state = Self::seed(t);
                let mut v: Vec<f32> = (0..Self::DIMENSIONS)
                    .map(|_| {
                        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                        ((state >> 33) as f32 / u32::MAX as f32) - 0.5
                    })
                    .collect();
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in v.iter_mut() {
                        *x /= norm;
                    }
                }
                v
            })
            .collect())
    }
}

/// Tagger double with a configurable per-id override map, falling back to
/// an empty tag list for unconfigured ids.
#[derive(Default)]
pub struct MockTagger {
    overrides: Mutex<HashMap<String, Vec<String>>>,
}

impl MockTagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tags(&self, id: impl Into<String>, tags: Vec<String>) {
        self.overrides.lock().unwrap().insert(id.into(), tags);
    }
}

impl Tagger for MockTagger {
    fn extract_tags(
        &self,
        ids: &[String],
        _texts: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        let overrides = self.overrides.lock().unwrap();
        Ok(ids
            .iter()
            .map(|id| (id.clone(), overrides.get(id).cloned().unwrap_or_default()))
            .collect())
    }
}

#[derive(Default)]
struct MockFileStoreState {
    files: HashMap<String, Vec<u8>>,
    mtimes: HashMap<String, i64>,
    clock: i64,
    simulate_errors: Option<String>,
}

/// In-memory [`FileStore`] double. Directories are implicit: any key sharing
/// a `/`-delimited prefix with a stored file is treated as an existing
/// directory.
#[derive(Default)]
pub struct MockFileStore {
    state: Arc<Mutex<MockFileStoreState>>,
}

impl MockFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_simulate_errors(&self, message: impl Into<String>) {
        self.state.lock().unwrap().simulate_errors = Some(message.into());
    }

    pub fn clear_simulated_errors(&self) {
        self.state.lock().unwrap().simulate_errors = None;
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    fn check_simulated_error(&self) -> Result<()> {
        if let Some(msg) = self.state.lock().unwrap().simulate_errors.clone() {
            return Err(Error::io(
                "<mock>",
                std::io::Error::other(msg),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for MockFileStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.check_simulated_error()?;
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let tick = state.clock;
        state.files.insert(key.to_string(), bytes.to_vec());
        state.mtimes.insert(key.to_string(), tick);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        self.check_simulated_error()?;
        self.state
            .lock()
            .unwrap()
            .files
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key))
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<()> {
        self.check_simulated_error()?;
        let mut state = self.state.lock().unwrap();
        if recursive {
            let prefix = format!("{key}/");
            state.files.retain(|k, _| k != key && !k.starts_with(&prefix));
            state.mtimes.retain(|k, _| k != key && !k.starts_with(&prefix));
        } else {
            state.files.remove(key);
            state.mtimes.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        let prefix = format!("{key}/");
        Ok(state.files.contains_key(key) || state.files.keys().any(|k| k.starts_with(&prefix)))
    }

    async fn is_dir(&self, key: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        let prefix = format!("{key}/");
        Ok(!state.files.contains_key(key) && state.files.keys().any(|k| k.starts_with(&prefix)))
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let matcher = glob_match_simple(pattern);
        let mut matches: Vec<String> = state
            .files
            .keys()
            .filter(|k| matcher(k))
            .cloned()
            .collect();
        matches.sort();
        Ok(matches)
    }

    async fn mtime(&self, key: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .mtimes
            .get(key)
            .and_then(|tick| chrono::DateTime::from_timestamp(*tick, 0)))
    }
}

/// Minimal `*`/`**` glob matcher sufficient for the mock's in-memory keys,
/// operating on `/`-delimited path segments so `**` can match zero whole
/// segments (e.g. `dir/**/*` must match `dir/file` directly, not just
/// `dir/sub/file`) the same way the `glob` crate does for
/// [`crate::traits::FileStore::glob`]'s real filesystem implementation.
fn glob_match_simple(pattern: &str) -> impl Fn(&str) -> bool {
    let pattern_segments: Vec<String> = pattern.split('/').map(str::to_string).collect();
    move |candidate: &str| {
        let candidate_segments: Vec<&str> = candidate.split('/').collect();
        match_segments(&pattern_segments, &candidate_segments)
    }
}

fn match_segments(pattern: &[String], candidate: &[&str]) -> bool {
    match pattern.first() {
        None => candidate.is_empty(),
        Some(seg) if seg == "**" => {
            for i in 0..=candidate.len() {
                if match_segments(&pattern[1..], &candidate[i..]) {
                    return true;
                }
            }
            false
        }
        Some(seg) => {
            !candidate.is_empty()
                && segment_matches(seg, candidate[0])
                && match_segments(&pattern[1..], &candidate[1..])
        }
    }
}

/// `*` within one path segment matches any run of characters (no `/`, since
/// segments are already split on it).
fn segment_matches(pattern: &str, candidate: &str) -> bool {
    fn do_match(pattern: &[u8], candidate: &[u8]) -> bool {
        match pattern.first() {
            None => candidate.is_empty(),
            Some(b'*') => (0..=candidate.len()).any(|i| do_match(&pattern[1..], &candidate[i..])),
            Some(p) => !candidate.is_empty() && *p == candidate[0] && do_match(&pattern[1..], &candidate[1..]),
        }
    }
    do_match(pattern.as_bytes(), candidate.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_provider_is_deterministic_and_unit_norm() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.encode(&["hello".to_string()]).unwrap();
        let b = provider.encode(&["hello".to_string()]).unwrap();
        assert_eq!(a, b);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
        assert_eq!(provider.call_count(), 2);
    }

    #[test]
    fn tagger_falls_back_to_empty() {
        let tagger = MockTagger::new();
        tagger.set_tags("a", vec!["x".into()]);
        let out = tagger
            .extract_tags(&["a".into(), "b".into()], &["ta".into(), "tb".into()])
            .unwrap();
        assert_eq!(out["a"], vec!["x".to_string()]);
        assert_eq!(out["b"], Vec::<String>::new());
    }

    #[tokio::test]
    async fn file_store_save_load_delete_roundtrip() {
        let store = MockFileStore::new();
        store.save("roles/a/ROLE.md", b"hi").await.unwrap();
        assert!(store.exists("roles/a/ROLE.md").await.unwrap());
        assert!(store.is_dir("roles/a").await.unwrap());
        let loaded = store.load("roles/a/ROLE.md").await.unwrap();
        assert_eq!(loaded, b"hi");
        store.delete("roles/a", true).await.unwrap();
        assert!(!store.exists("roles/a/ROLE.md").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_glob_supports_double_star() {
        let store = MockFileStore::new();
        store.save("roles/a/ROLE.md", b"1").await.unwrap();
        store.save("roles/b/ROLE.md", b"2").await.unwrap();
        store.save("skills/c/SKILL.md", b"3").await.unwrap();
        let mut matches = store.glob("roles/**/ROLE.md").await.unwrap();
        matches.sort();
        assert_eq!(matches, vec!["roles/a/ROLE.md", "roles/b/ROLE.md"]);
    }

    #[tokio::test]
    async fn file_store_mtime_advances_with_each_save() {
        let store = MockFileStore::new();
        store.save("roles/a/ROLE.md", b"1").await.unwrap();
        let first = store.mtime("roles/a/ROLE.md").await.unwrap().unwrap();
        store.save("roles/a/.manifest.json", b"{}").await.unwrap();
        let second = store.mtime("roles/a/.manifest.json").await.unwrap().unwrap();
        assert!(second > first);
        assert!(store.mtime("roles/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_error_injection() {
        let store = MockFileStore::new();
        store.set_simulate_errors("disk full");
        assert!(store.save("x", b"y").await.is_err());
    }
}
