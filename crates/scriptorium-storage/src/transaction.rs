use std::collections::BTreeMap;

use futures::future::BoxFuture;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use scriptorium_core::{Error, FileStore, IndexEntry, Kind, Result};
use tracing::{debug, warn};

use crate::metadata::MetadataEngine;

pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

enum LogEntry {
    Restore(String, Vec<u8>),
    Delete(String),
}

enum StagedOp {
    Upsert(IndexEntry),
    Delete(IndexEntry),
}

/// Binds a [`FileStore`] and a [`MetadataEngine`] for the lifetime of one
/// all-or-nothing commit.
///
/// Rather than stores holding a mutable back-reference to "the current
/// transaction" (easy to leak across scopes, awkward with borrowing), the
/// transaction borrows both stores for its scope and is the only thing that
/// knows it is in flight. File writes issued through [`Transaction::save`]
/// and [`Transaction::delete`] append to an inverse-operation log; metadata
/// mutations issued through [`Transaction::index`]/[`Transaction::deindex`]
/// are staged in memory and never touch the engine's tables until commit.
pub struct Transaction<'a> {
    file_store: &'a dyn FileStore,
    engine: &'a MetadataEngine,
    log: Mutex<Vec<LogEntry>>,
    hashes: Mutex<BTreeMap<String, String>>,
    staged: Mutex<Vec<StagedOp>>,
}

impl<'a> Transaction<'a> {
    pub fn new(file_store: &'a dyn FileStore, engine: &'a MetadataEngine) -> Self {
        Transaction {
            file_store,
            engine,
            log: Mutex::new(Vec::new()),
            hashes: Mutex::new(BTreeMap::new()),
            staged: Mutex::new(Vec::new()),
        }
    }

    /// Write bytes through the bound FileStore, recording the inverse
    /// operation and the content hash.
    pub async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if self.file_store.exists(key).await? {
            let prior = self.file_store.load(key).await?;
            self.log.lock().push(LogEntry::Restore(key.to_string(), prior));
        } else {
            self.log.lock().push(LogEntry::Delete(key.to_string()));
        }
        self.file_store.save(key, bytes).await?;
        self.hashes.lock().insert(key.to_string(), md5_hex(bytes));
        Ok(())
    }

    /// Delete through the bound FileStore. Only non-recursive, existing-file
    /// deletes participate in the rollback log, matching the source's
    /// behavior: a recursive directory delete's constituent files are
    /// expected to have already been deleted (and logged) individually.
    pub async fn delete(&self, key: &str, recursive: bool) -> Result<()> {
        if !recursive && self.file_store.exists(key).await? {
            let prior = self.file_store.load(key).await?;
            self.hashes.lock().insert(key.to_string(), md5_hex(&prior));
            self.log.lock().push(LogEntry::Restore(key.to_string(), prior));
        }
        self.file_store.delete(key, recursive).await
    }

    /// Stage an upsert. Tables are not touched until commit.
    pub fn index(&self, entry: IndexEntry) {
        self.staged.lock().push(StagedOp::Upsert(entry));
    }

    /// Stage a removal. Tables are not touched until commit.
    pub fn deindex(&self, entry: IndexEntry) {
        self.staged.lock().push(StagedOp::Delete(entry));
    }

    /// Apply the inverse-operation log in reverse order, restoring the
    /// FileStore to its pre-scope byte-wise state.
    pub async fn rollback(&self) -> Result<()> {
        let mut log = self.log.lock();
        warn!("rolling back transaction, {} log entries to undo", log.len());
        while let Some(entry) = log.pop() {
            match entry {
                LogEntry::Restore(key, bytes) => {
                    self.file_store.save(&key, &bytes).await?;
                }
                LogEntry::Delete(key) => {
                    self.file_store.delete(&key, false).await?;
                }
            }
        }
        Ok(())
    }

    /// Process staged metadata mutations and commit them to the engine.
    /// Derives the transaction id, assigns it to any staged entry whose
    /// `uuid` is unset, writes manifest sidecars for upserts (through
    /// `save`, so they participate in rollback), then applies upsert+remove
    /// to the engine in one critical section.
    async fn finalize(&self) -> Result<String> {
        let hashes = self.hashes.lock().clone();
        let tx_id = md5_hex(canonical_json(&hashes).as_bytes());

        let mut staged = self.staged.lock();
        let ops: Vec<StagedOp> = std::mem::take(&mut *staged);
        drop(staged);

        let mut kind: Option<Kind> = None;
        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for op in ops {
            let (mut entry, is_upsert) = match op {
                StagedOp::Upsert(e) => (e, true),
                StagedOp::Delete(e) => (e, false),
            };
            if entry.uuid.is_none() {
                entry.uuid = Some(tx_id.clone());
            }
            let entry_kind = entry
                .kind
                .ok_or_else(|| Error::invalid_input("staged entry has no kind"))?;
            match kind {
                None => kind = Some(entry_kind),
                Some(k) if k == entry_kind => {}
                Some(_) => {
                    return Err(Error::invalid_input(
                        "a single transaction cannot stage entries of more than one kind",
                    ))
                }
            }
            if is_upsert {
                upserts.push(entry);
            } else {
                deletes.push(entry);
            }
        }

        let Some(kind) = kind else {
            return Ok(tx_id);
        };

        for entry in &upserts {
            if let Some(root) = entry.files.first() {
                let manifest_path = manifest_path_for(root);
                let manifest_bytes = serde_json::to_vec_pretty(&entry.to_manifest())
                    .expect("manifest always serializes");
                self.save(&manifest_path, &manifest_bytes).await.map_err(|e| {
                    Error::transaction_aborted(
                        format!("failed to write manifest {manifest_path} during commit"),
                        e,
                    )
                })?;
            }
        }

        debug!("committing transaction {tx_id} ({} upserts, {} deletes)", upserts.len(), deletes.len());
        self.engine.upsert(kind, upserts);
        let delete_names: Vec<String> = deletes.into_iter().filter_map(|e| e.name).collect();
        self.engine.remove(kind, &delete_names);

        Ok(tx_id)
    }
}

/// Path of the manifest sidecar for a root file's storage path, e.g.
/// `roles/foo/ROLE.md` -> `roles/foo/.manifest.json`.
fn manifest_path_for(root_file_key: &str) -> String {
    match root_file_key.rsplit_once('/') {
        Some((parent, _)) => format!("{parent}/.manifest.json"),
        None => ".manifest.json".to_string(),
    }
}

/// Deterministic, sorted-key JSON rendering of a hash map. `BTreeMap`
/// already iterates in key order, and `serde_json` preserves map iteration
/// order, so this is just a serialize call — but it's named so the
/// determinism requirement reads as intentional, not incidental.
fn canonical_json(hashes: &BTreeMap<String, String>) -> String {
    serde_json::to_string(hashes).expect("string map always serializes")
}

/// Run `body` inside a transaction over `file_store`/`engine`. On success,
/// commits staged metadata and file writes; on any error from `body` or
/// from the commit phase, rolls back file changes and propagates the
/// error.
///
/// `body` takes a borrowed `&Transaction` and returns a boxed future (wrap
/// the call site in `Box::pin(async move { ... })`) since Rust has no
/// equivalent to an async `with` block that could otherwise tie the
/// closure's lifetime to a transaction value scoped entirely inside this
/// function.
pub async fn run_transaction<'a, F, T>(
    file_store: &'a dyn FileStore,
    engine: &'a MetadataEngine,
    body: F,
) -> Result<T>
where
    F: for<'t> FnOnce(&'t Transaction<'a>) -> BoxFuture<'t, Result<T>>,
{
    let tx = Transaction::new(file_store, engine);
    let result = body(&tx).await;
    match result {
        Ok(value) => match tx.finalize().await {
            Ok(_) => Ok(value),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        },
        Err(e) => {
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scriptorium_core::test_support::MockFileStore;

    fn partial_entry(name: &str, kind: Kind, root_bytes: &[u8]) -> IndexEntry {
        IndexEntry {
            name: Some(name.to_string()),
            description: Some(format!("{name} description")),
            uuid: None,
            etag: Some(md5_hex(root_bytes)),
            files: vec![format!("{}/{}/{}", kind.plural(), name, kind.root_file())],
            tags: vec![],
            embedding: Some(vec![1.0, 0.0]),
            kind: Some(kind),
            date_created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn commit_writes_files_and_indexes_entry() {
        let store = MockFileStore::new();
        let engine = MetadataEngine::new();
        let entry = partial_entry("web_scraper", Kind::Skill, b"root contents");

        let tx_id = run_transaction(&store, &engine, |tx| {
            let entry = entry.clone();
            Box::pin(async move {
                tx.save("skills/web_scraper/SKILL.md", b"root contents").await?;
                tx.index(entry);
                Ok(())
            })
        })
        .await;
        assert!(tx_id.is_ok());

        assert!(engine.exists(Kind::Skill, "web_scraper"));
        let stored = engine.get_one(Kind::Skill, "web_scraper").unwrap();
        assert!(stored.uuid.is_some());
        assert!(store
            .exists("skills/web_scraper/.manifest.json")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn identical_republish_yields_same_transaction_id() {
        let store = MockFileStore::new();
        let engine = MetadataEngine::new();

        let mut ids = Vec::new();
        for _ in 0..2 {
            let entry = partial_entry("web_scraper", Kind::Skill, b"same content");
            let id = run_transaction(&store, &engine, |tx| {
                let entry = entry.clone();
                Box::pin(async move {
                    tx.save("skills/web_scraper/SKILL.md", b"same content").await?;
                    tx.index(entry);
                    Ok::<(), Error>(())
                })
            })
            .await;
            assert!(id.is_ok());
            ids.push(engine.get_one(Kind::Skill, "web_scraper").unwrap().uuid.unwrap());
        }
        assert_eq!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn failure_after_file_writes_rolls_back_bytes() {
        let store = MockFileStore::new();
        let engine = MetadataEngine::new();
        store.save("skills/existing/SKILL.md", b"original").await.unwrap();

        let result: Result<()> = run_transaction(&store, &engine, |tx| {
            Box::pin(async move {
                tx.save("skills/existing/SKILL.md", b"overwritten").await?;
                Err(Error::invalid_input("boom"))
            })
        })
        .await;

        assert!(result.is_err());
        let bytes = store.load("skills/existing/SKILL.md").await.unwrap();
        assert_eq!(bytes, b"original");
    }

    #[tokio::test]
    async fn mixed_kind_staging_is_rejected() {
        let store = MockFileStore::new();
        let engine = MetadataEngine::new();
        let role = partial_entry("a", Kind::Role, b"role");
        let skill = partial_entry("b", Kind::Skill, b"skill");

        let result: Result<()> = run_transaction(&store, &engine, |tx| {
            let role = role.clone();
            let skill = skill.clone();
            Box::pin(async move {
                tx.index(role);
                tx.index(skill);
                Ok(())
            })
        })
        .await;
        assert!(result.is_err());
        assert!(!engine.exists(Kind::Role, "a"));
    }
}
