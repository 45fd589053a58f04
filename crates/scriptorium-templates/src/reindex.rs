use std::collections::HashMap;

use chrono::Utc;
use scriptorium_core::{Error, FileStore, IndexEntry, Kind, Result};
use tracing::{debug, info};

use crate::frontmatter;

const QUEUE_CAPACITY: usize = 128;
const BATCH_SIZE: usize = 32;

/// One entry discovered by the producer, carrying enough state for the
/// consumer to decide whether it still needs embedding/tagging and where to
/// write a refreshed manifest.
struct Discovered {
    entry: IndexEntry,
    manifest_path: Option<String>,
}

/// Scan `root` on `file_store` for every `ROLE.md`/`SKILL.md`, re-embedding
/// and re-tagging anything whose manifest is stale or missing, and return
/// the full rebuilt entry list per kind. The caller is expected to truncate
/// and upsert each kind's table from the result in one write session, per
/// the atomicity guarantee reindexing promises readers.
pub async fn reindex(
    root: &str,
    kinds: &[Kind],
    file_store: &dyn FileStore,
    embed: impl Fn(&[String]) -> Result<Vec<Vec<f32>>>,
    tag: impl Fn(&[String], &[String]) -> Result<HashMap<String, Vec<String>>>,
) -> Result<HashMap<Kind, Vec<IndexEntry>>> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Discovered>(QUEUE_CAPACITY);

    let produce = {
        let file_store_ptr: &dyn FileStore = file_store;
        produce(root, kinds, file_store_ptr, tx)
    };

    let mut out: HashMap<Kind, Vec<IndexEntry>> = kinds.iter().map(|k| (*k, Vec::new())).collect();
    let consume = async {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        loop {
            let recv = rx.recv().await;
            match recv {
                Some(item) => {
                    batch.push(item);
                    if batch.len() >= BATCH_SIZE {
                        process_batch(
                            std::mem::take(&mut batch),
                            file_store,
                            &embed,
                            &tag,
                            &mut out,
                        )
                        .await?;
                    }
                }
                None => {
                    if !batch.is_empty() {
                        process_batch(
                            std::mem::take(&mut batch),
                            file_store,
                            &embed,
                            &tag,
                            &mut out,
                        )
                        .await?;
                    }
                    break;
                }
            }
        }
        Ok::<(), Error>(())
    };

    let (produce_result, consume_result) = tokio::join!(produce, consume);
    produce_result?;
    consume_result?;
    info!(
        "reindex complete under {root:?}: {}",
        out.iter().map(|(k, v)| format!("{k}={}", v.len())).collect::<Vec<_>>().join(", ")
    );
    Ok(out)
}

/// Join a glob suffix onto a (possibly empty) root prefix without ever
/// emitting a leading slash — the stores' keys never have one.
fn join_under(root: &str, suffix: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        suffix.to_string()
    } else {
        format!("{trimmed}/{suffix}")
    }
}

async fn produce(
    root: &str,
    kinds: &[Kind],
    file_store: &dyn FileStore,
    tx: tokio::sync::mpsc::Sender<Discovered>,
) -> Result<()> {
    for kind in kinds {
        let pattern = join_under(root, &format!("**/{}", kind.root_file()));
        let root_files = file_store.glob(&pattern).await?;
        for root_key in root_files {
            let discovered = discover_one(*kind, &root_key, file_store).await?;
            if tx.send(discovered).await.is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn discover_one(kind: Kind, root_key: &str, file_store: &dyn FileStore) -> Result<Discovered> {
    let parent = root_key.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
    let manifest_path = join_under(parent, ".manifest.json");

    let manifest_mtime = file_store.mtime(&manifest_path).await?;
    let root_mtime = file_store.mtime(root_key).await?;

    if let (Some(manifest_mtime), Some(root_mtime)) = (manifest_mtime, root_mtime) {
        if manifest_mtime >= root_mtime {
            if let Ok(bytes) = file_store.load(&manifest_path).await {
                if let Ok(manifest) = serde_json::from_slice::<scriptorium_core::Manifest>(&bytes) {
                    debug!("{root_key}: manifest fresh, skipping reparse");
                    return Ok(Discovered {
                        entry: manifest.into_entry(),
                        manifest_path: None,
                    });
                }
            }
        }
    }

    debug!("{root_key}: manifest stale or missing, reparsing from source");
    let root_bytes = file_store.load(root_key).await?;
    let root_text = String::from_utf8_lossy(&root_bytes).into_owned();
    let (fm, _body) = frontmatter::split(&root_text);
    let fm = fm.unwrap_or_default();

    let name = fm.name.ok_or_else(|| Error::missing_metadata(format!("{root_key} has no name")))?;
    let description = fm
        .description
        .ok_or_else(|| Error::missing_metadata(format!("{root_key} has no description")))?;
    let canonical_description = IndexEntry::canonical_description(&name, &description);

    let sibling_pattern = join_under(parent, "**/*");
    let siblings = file_store.glob(&sibling_pattern).await?;
    let mut files = vec![root_key.to_string()];
    for sibling in siblings {
        if sibling != root_key
            && !sibling.ends_with(".manifest.json")
            && !file_store.is_dir(&sibling).await?
        {
            files.push(sibling);
        }
    }

    let entry = IndexEntry {
        name: Some(name),
        description: Some(canonical_description),
        uuid: Some(IndexEntry::fresh_uuid()),
        etag: Some(scriptorium_storage_md5(&root_bytes)),
        files,
        tags: fm.tags,
        embedding: None,
        kind: Some(kind),
        date_created: Utc::now(),
    };

    Ok(Discovered {
        entry,
        manifest_path: Some(manifest_path),
    })
}

fn scriptorium_storage_md5(bytes: &[u8]) -> String {
    scriptorium_storage::md5_hex(bytes)
}

async fn process_batch(
    batch: Vec<Discovered>,
    file_store: &dyn FileStore,
    embed: &impl Fn(&[String]) -> Result<Vec<Vec<f32>>>,
    tag: &impl Fn(&[String], &[String]) -> Result<HashMap<String, Vec<String>>>,
    out: &mut HashMap<Kind, Vec<IndexEntry>>,
) -> Result<()> {
    let names: Vec<String> = batch.iter().map(|d| d.entry.name.clone().unwrap_or_default()).collect();
    let texts: Vec<String> = batch.iter().map(|d| d.entry.description.clone().unwrap_or_default()).collect();

    let embeddings = embed(&texts)?;
    let tags_by_name = tag(&names, &texts)?;

    let mut embed_iter = embeddings.into_iter();
    for mut discovered in batch {
        discovered.entry.embedding = embed_iter.next();
        if discovered.entry.tags.is_empty() {
            if let Some(name) = &discovered.entry.name {
                if let Some(tags) = tags_by_name.get(name) {
                    discovered.entry.tags = tags.clone();
                }
            }
        }
        if let Some(manifest_path) = &discovered.manifest_path {
            let bytes = serde_json::to_vec_pretty(&discovered.entry.to_manifest())
                .expect("manifest always serializes");
            file_store.save(manifest_path, &bytes).await?;
        }
        let kind = discovered.entry.kind.expect("discovered entries always carry a kind");
        out.entry(kind).or_default().push(discovered.entry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_core::test_support::MockFileStore;

    fn stub_embed(texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
    }

    fn stub_tag(ids: &[String], _texts: &[String]) -> Result<HashMap<String, Vec<String>>> {
        Ok(ids.iter().map(|id| (id.clone(), vec!["auto".to_string()])).collect())
    }

    #[tokio::test]
    async fn discovers_roots_and_attaches_embedding_and_tags() {
        let store = MockFileStore::new();
        store
            .save("roles/writer/ROLE.md", b"---\nname: writer\ndescription: writes prose\n---\nbody\n")
            .await
            .unwrap();

        let result = reindex("", &[Kind::Role], &store, stub_embed, stub_tag).await.unwrap();
        let roles = &result[&Kind::Role];
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name.as_deref(), Some("writer"));
        assert!(roles[0].embedding.is_some());
        assert_eq!(roles[0].tags, vec!["auto".to_string()]);
        assert!(store.exists("roles/writer/.manifest.json").await.unwrap());
    }

    #[tokio::test]
    async fn fresh_manifest_short_circuits_tagging_but_still_embeds() {
        let store = MockFileStore::new();
        store
            .save("roles/writer/ROLE.md", b"---\nname: writer\ndescription: writes prose\n---\nbody\n")
            .await
            .unwrap();
        let manifest_entry = IndexEntry {
            name: Some("writer".to_string()),
            description: Some("writer - writes prose".to_string()),
            uuid: Some("fixed-uuid".to_string()),
            etag: Some("etag".to_string()),
            files: vec!["roles/writer/ROLE.md".to_string()],
            tags: vec!["manual".to_string()],
            embedding: None,
            kind: Some(Kind::Role),
            date_created: chrono::Utc::now(),
        };
        let manifest_bytes = serde_json::to_vec(&manifest_entry.to_manifest()).unwrap();
        store.save("roles/writer/.manifest.json", &manifest_bytes).await.unwrap();

        let result = reindex("", &[Kind::Role], &store, stub_embed, stub_tag).await.unwrap();
        let roles = &result[&Kind::Role];
        assert_eq!(roles[0].uuid.as_deref(), Some("fixed-uuid"));
        assert_eq!(roles[0].tags, vec!["manual".to_string()]);
    }

    #[tokio::test]
    async fn no_matching_files_yields_empty_table() {
        let store = MockFileStore::new();
        let result = reindex("", &[Kind::Role, Kind::Skill], &store, stub_embed, stub_tag)
            .await
            .unwrap();
        assert!(result[&Kind::Role].is_empty());
        assert!(result[&Kind::Skill].is_empty());
    }
}
