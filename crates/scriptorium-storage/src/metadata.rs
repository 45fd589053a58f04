use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use scriptorium_core::{Error, FileStore, IndexEntry, Kind, Result};
use serde::{Deserialize, Serialize};

/// One search hit: the stored entry plus its computed distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: IndexEntry,
    /// Cosine distance, rounded to 3 decimals. 0 = identical, 2 = opposite.
    pub score: f32,
}

/// A column projection of a row, used by `get_one`/`get_many`/`search` when
/// a caller asks for a subset of fields. `None` (no filter) returns every
/// field as a `serde_json::Value` object built from the full entry.
pub fn project(entry: &IndexEntry, columns: Option<&[String]>, score: Option<f32>) -> serde_json::Value {
    let mut full = serde_json::to_value(entry).expect("IndexEntry always serializes");
    if let Some(score) = score {
        full["score"] = serde_json::json!(round3(score));
    }
    match columns {
        None => full,
        Some(cols) => {
            let mut out = serde_json::Map::new();
            for col in cols {
                if let Some(v) = full.get(col) {
                    out.insert(col.clone(), v.clone());
                }
            }
            serde_json::Value::Object(out)
        }
    }
}

fn round3(x: f32) -> f32 {
    (x * 1000.0).round() / 1000.0
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    // Vectors are already unit-norm from the Embedder, so the dot product
    // alone gives cosine similarity; this still computes norms defensively
    // in case a caller hands in an un-normalized query vector.
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    1.0 - (dot / (norm_a * norm_b))
}

/// In-memory tabular + vector index over [`IndexEntry`] rows, one table per
/// kind. Bootstrapped from and flushed to columnar files on a [`FileStore`];
/// brute-force cosine scans are acceptable at the corpus sizes this engine
/// targets (at most ~10^4 rows per kind).
pub struct MetadataEngine {
    tables: RwLock<HashMap<Kind, Vec<IndexEntry>>>,
}

impl Default for MetadataEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataEngine {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        for kind in Kind::ALL {
            tables.insert(kind, Vec::new());
        }
        MetadataEngine {
            tables: RwLock::new(tables),
        }
    }

    /// Load persisted columnar files for each kind, tolerating a missing
    /// file (treated as an empty table) and failing with
    /// [`Error::SchemaMismatch`] if a file exists but doesn't parse as a
    /// list of entries.
    pub async fn bootstrap(
        &self,
        file_store: &dyn FileStore,
        index_path: impl Fn(Kind) -> String,
    ) -> Result<()> {
        for kind in Kind::ALL {
            let path = index_path(kind);
            match file_store.load(&path).await {
                Ok(bytes) => {
                    let rows: Vec<IndexEntry> = serde_json::from_slice(&bytes).map_err(|e| {
                        Error::SchemaMismatch {
                            table: kind.plural().to_string(),
                            detail: e.to_string(),
                        }
                    })?;
                    self.tables.write().insert(kind, rows);
                }
                Err(Error::NotFound(_)) => {
                    self.tables.write().insert(kind, Vec::new());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Flush every table to its columnar file through the FileStore.
    pub async fn close(
        &self,
        file_store: &dyn FileStore,
        index_path: impl Fn(Kind) -> String,
    ) -> Result<()> {
        for kind in Kind::ALL {
            let rows = self.tables.read().get(&kind).cloned().unwrap_or_default();
            let bytes = serde_json::to_vec_pretty(&rows).expect("rows always serialize");
            file_store.save(&index_path(kind), &bytes).await?;
        }
        Ok(())
    }

    pub fn exists(&self, kind: Kind, name: &str) -> bool {
        self.tables
            .read()
            .get(&kind)
            .map(|rows| rows.iter().any(|r| r.name.as_deref() == Some(name)))
            .unwrap_or(false)
    }

    pub fn get_one(&self, kind: Kind, name: &str) -> Option<IndexEntry> {
        self.tables
            .read()
            .get(&kind)?
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .cloned()
    }

    pub fn get_many(&self, kind: Kind, names: Option<&[String]>) -> Vec<IndexEntry> {
        let tables = self.tables.read();
        let rows = tables.get(&kind).cloned().unwrap_or_default();
        match names {
            None => rows,
            Some(names) => rows
                .into_iter()
                .filter(|r| r.name.as_deref().is_some_and(|n| names.iter().any(|x| x == n)))
                .collect(),
        }
    }

    /// Ordered by ascending cosine distance, ties broken by name ascending;
    /// filtered by `score <= max_cosine_distance` and truncated to `limit`.
    pub fn search(
        &self,
        kind: Kind,
        query: &[f32],
        limit: usize,
        max_cosine_distance: f32,
    ) -> Vec<ScoredEntry> {
        let tables = self.tables.read();
        let rows = tables.get(&kind).cloned().unwrap_or_default();
        let mut scored: Vec<ScoredEntry> = rows
            .into_iter()
            .filter_map(|entry| {
                let embedding = entry.embedding.as_ref()?;
                let score = round3(cosine_distance(embedding, query));
                (score <= max_cosine_distance).then_some(ScoredEntry { entry, score })
            })
            .collect();
        scored.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.name.cmp(&b.entry.name))
        });
        scored.truncate(limit);
        scored
    }

    /// Insert-or-replace by `name` within a kind's table.
    pub fn upsert(&self, kind: Kind, rows: Vec<IndexEntry>) {
        let mut tables = self.tables.write();
        let table = tables.entry(kind).or_default();
        for row in rows {
            if let Some(existing) = table
                .iter_mut()
                .find(|r| r.name == row.name)
            {
                *existing = row;
            } else {
                table.push(row);
            }
        }
    }

    /// Delete every row whose name is in `names`.
    pub fn remove(&self, kind: Kind, names: &[String]) {
        let mut tables = self.tables.write();
        if let Some(table) = tables.get_mut(&kind) {
            table.retain(|r| !r.name.as_deref().is_some_and(|n| names.iter().any(|x| x == n)));
        }
    }

    /// Replace a kind's entire table atomically. Used by the reindex
    /// pipeline so readers never observe a partial truncate+upsert.
    pub fn replace_table(&self, kind: Kind, rows: Vec<IndexEntry>) {
        self.tables.write().insert(kind, rows);
    }

    pub fn truncate_tables(&self) {
        let mut tables = self.tables.write();
        for kind in Kind::ALL {
            tables.insert(kind, Vec::new());
        }
    }
}

pub type SharedMetadataEngine = Arc<MetadataEngine>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(name: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            name: Some(name.to_string()),
            description: Some(format!("{name} description")),
            uuid: Some("abc".to_string()),
            etag: Some("etag".to_string()),
            files: vec![format!("roles/{name}/ROLE.md")],
            tags: vec![],
            embedding: Some(embedding),
            kind: Some(Kind::Role),
            date_created: Utc::now(),
        }
    }

    #[test]
    fn upsert_replaces_by_name() {
        let engine = MetadataEngine::new();
        engine.upsert(Kind::Role, vec![entry("a", vec![1.0, 0.0])]);
        engine.upsert(Kind::Role, vec![entry("a", vec![0.0, 1.0])]);
        let rows = engine.get_many(Kind::Role, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].embedding, Some(vec![0.0, 1.0]));
    }

    #[test]
    fn remove_deletes_named_rows_only() {
        let engine = MetadataEngine::new();
        engine.upsert(Kind::Role, vec![entry("a", vec![1.0]), entry("b", vec![1.0])]);
        engine.remove(Kind::Role, &["a".to_string()]);
        let rows = engine.get_many(Kind::Role, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name.as_deref(), Some("b"));
    }

    #[test]
    fn search_orders_by_score_then_name_and_applies_threshold() {
        let engine = MetadataEngine::new();
        engine.upsert(
            Kind::Role,
            vec![
                entry("far", vec![0.0, 1.0]),
                entry("near_b", vec![1.0, 0.0]),
                entry("near_a", vec![1.0, 0.0]),
            ],
        );
        let results = engine.search(Kind::Role, &[1.0, 0.0], 10, 0.9);
        let names: Vec<_> = results.iter().map(|r| r.entry.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["near_a", "near_b"]);
    }

    #[test]
    fn search_truncates_to_limit() {
        let engine = MetadataEngine::new();
        engine.upsert(
            Kind::Role,
            vec![entry("a", vec![1.0, 0.0]), entry("b", vec![1.0, 0.0])],
        );
        let results = engine.search(Kind::Role, &[1.0, 0.0], 1, 1.0);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn replace_table_is_atomic_swap() {
        let engine = MetadataEngine::new();
        engine.upsert(Kind::Role, vec![entry("old", vec![1.0])]);
        engine.replace_table(Kind::Role, vec![entry("new", vec![1.0])]);
        let rows = engine.get_many(Kind::Role, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name.as_deref(), Some("new"));
    }
}
