use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scriptorium_config::RegistryConfig;
use scriptorium_core::{EmbeddingProvider, Error, FileStore, IndexEntry, Kind, Result, Tagger};
use scriptorium_storage::{project, run_transaction, MetadataEngine};
use scriptorium_templates::{frontmatter, publish, reindex, PublishInput};
use tracing::info;

use crate::library::{self, LoadedFile};

/// A thin, stateless facade over the storage, metadata and
/// template-processing layers: the entire surface RPC/CLI/TUI collaborators
/// drive the registry through.
///
/// `Api` is cheap to clone (everything behind it is already an `Arc`), so a
/// caller can hand a copy to each connection/request without re-wiring the
/// underlying stores.
#[derive(Clone)]
pub struct Api {
    file_store: Arc<dyn FileStore>,
    engine: Arc<MetadataEngine>,
    embedder: Arc<dyn EmbeddingProvider>,
    tagger: Arc<dyn Tagger>,
    config: RegistryConfig,
}

impl Api {
    pub fn new(
        file_store: Arc<dyn FileStore>,
        engine: Arc<MetadataEngine>,
        embedder: Arc<dyn EmbeddingProvider>,
        tagger: Arc<dyn Tagger>,
        config: RegistryConfig,
    ) -> Self {
        Api {
            file_store,
            engine,
            embedder,
            tagger,
            config,
        }
    }

    fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut rows = self.embedder.encode(&[text.to_string()])?;
        rows.pop()
            .ok_or_else(|| Error::invalid_input("embedder returned no rows for one input"))
    }

    /// Pass-through to a `get_many` read over `kind`'s table.
    pub fn list_templates(&self, kind: Kind, columns: Option<&[String]>) -> Vec<serde_json::Value> {
        self.engine
            .get_many(kind, None)
            .iter()
            .map(|entry| project(entry, columns, None))
            .collect()
    }

    /// Embed `query` as a single text, then delegate to the metastore's
    /// vector search. `limit`/`max_cosine_distance` default from config.
    pub fn search_templates(
        &self,
        query: &str,
        kind: Kind,
        columns: Option<&[String]>,
        limit: Option<usize>,
        max_cosine_distance: Option<f32>,
    ) -> Result<Vec<serde_json::Value>> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("search query must not be empty"));
        }
        let limit = limit.unwrap_or(self.config.meta_store.similarity_search.max_results);
        let max_cosine_distance = max_cosine_distance
            .unwrap_or(self.config.meta_store.similarity_search.max_cosine_distance);
        let query_vector = self.encode_one(query)?;
        let hits = self.engine.search(kind, &query_vector, limit, max_cosine_distance);
        Ok(hits
            .iter()
            .map(|hit| project(&hit.entry, columns, Some(hit.score)))
            .collect())
    }

    /// Verify existence via the metastore, then return the root file's raw
    /// bytes from the FileStore.
    pub async fn get_definition(&self, name: &str, kind: Kind) -> Result<Vec<u8>> {
        if !self.engine.exists(kind, name) {
            return Err(Error::not_found(format!("{kind} '{name}'")));
        }
        let path = format!("{}/{}/{}", kind.plural(), name, kind.root_file());
        self.file_store.load(&path).await
    }

    /// Library skills short-circuit before the metastore is ever consulted.
    async fn load_skill_files(&self, name: &str) -> Result<HashMap<String, LoadedFile>> {
        if let Some(files) = library::get(name) {
            return Ok(files.clone());
        }
        let entry = self
            .engine
            .get_one(Kind::Skill, name)
            .ok_or_else(|| Error::not_found(format!("skill '{name}'")))?;
        let prefix = format!("skills/{name}/");
        let mut out = HashMap::new();
        for storage_path in &entry.files {
            let relative_path = storage_path
                .strip_prefix(&prefix)
                .unwrap_or(storage_path)
                .to_string();
            let basename = relative_path
                .rsplit('/')
                .next()
                .unwrap_or(&relative_path)
                .to_string();
            let bytes = self.file_store.load(storage_path).await?;
            out.insert(basename, LoadedFile { relative_path, bytes });
        }
        Ok(out)
    }

    /// `{filename -> bytes}` for every file belonging to a skill. Checks the
    /// built-in catalog first; falls back to a registry lookup.
    pub async fn get_skill_files(&self, name: &str) -> Result<HashMap<String, Vec<u8>>> {
        let files = self.load_skill_files(name).await?;
        Ok(files.into_iter().map(|(basename, f)| (basename, f.bytes)).collect())
    }

    /// Write a skill's files into `local_dir`, injecting `metadata.version`
    /// into SKILL.md for registry-backed skills (library skills are
    /// installed byte-for-byte, since they carry no content-addressed
    /// uuid). Returns the absolute path to the written SKILL.md.
    pub async fn install_skill(&self, name: &str, local_dir: &Path) -> Result<PathBuf> {
        if !local_dir.is_absolute() {
            return Err(Error::invalid_input(format!(
                "{} must be an absolute path",
                local_dir.display()
            )));
        }
        if !local_dir.exists() {
            return Err(Error::invalid_input(format!("{} does not exist", local_dir.display())));
        }

        let version = if library::contains(name) {
            None
        } else {
            Some(self.get_skill_version(name)?)
        };
        let files = self.load_skill_files(name).await?;

        let mut skill_md_path = None;
        for (basename, file) in &files {
            let dest = local_dir.join(&file.relative_path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            let bytes = if basename == "SKILL.md" {
                match &version {
                    Some(v) => {
                        let text = String::from_utf8_lossy(&file.bytes);
                        frontmatter::with_metadata_version(&text, v).into_bytes()
                    }
                    None => file.bytes.clone(),
                }
            } else {
                file.bytes.clone()
            };
            std::fs::write(&dest, &bytes).map_err(|e| Error::io(&dest, e))?;
            if basename == "SKILL.md" {
                skill_md_path = Some(dest);
            }
        }
        info!("installed skill '{name}' into {}", local_dir.display());
        skill_md_path.ok_or_else(|| Error::not_found(format!("SKILL.md for skill '{name}'")))
    }

    /// Open a Transaction over the bound stores and run the Template
    /// Processor.
    pub async fn publish_template(
        &self,
        path: &Path,
        kind: Kind,
        input: PublishInput,
    ) -> Result<IndexEntry> {
        let path = path.to_path_buf();
        let embedder = Arc::clone(&self.embedder);
        run_transaction(self.file_store.as_ref(), &self.engine, |tx| {
            Box::pin(async move {
                publish(tx, &path, kind, input, move |text| {
                    let mut rows = embedder.encode(&[text.to_string()])?;
                    rows.pop().ok_or_else(|| Error::invalid_input("embedder returned no rows"))
                })
                .await
            })
        })
        .await
    }

    /// Open a Transaction, verify existence, delete every file under
    /// `<kind>/<name>/**` plus the directory itself, and deindex the entry.
    pub async fn delete_template(&self, name: &str, kind: Kind) -> Result<()> {
        let entry = self
            .engine
            .get_one(kind, name)
            .ok_or_else(|| Error::not_found(format!("{kind} '{name}'")))?;
        let prefix = format!("{}/{}", kind.plural(), name);
        let pattern = format!("{prefix}/**/*");
        let candidates = self.file_store.glob(&pattern).await?;
        let mut files = Vec::new();
        for candidate in candidates {
            if !self.file_store.is_dir(&candidate).await? {
                files.push(candidate);
            }
        }

        run_transaction(self.file_store.as_ref(), &self.engine, |tx| {
            let entry = entry.clone();
            let files = files.clone();
            let prefix = prefix.clone();
            Box::pin(async move {
                for file in files {
                    tx.delete(&file, false).await?;
                }
                tx.delete(&prefix, true).await?;
                tx.deindex(entry);
                Ok(())
            })
        })
        .await?;
        info!("deleted {kind} '{name}'");
        Ok(())
    }

    /// Read-only metastore lookup of a skill's current uuid.
    pub fn get_skill_version(&self, name: &str) -> Result<String> {
        self.engine
            .get_one(Kind::Skill, name)
            .and_then(|entry| entry.uuid)
            .ok_or_else(|| Error::not_found(format!("skill '{name}'")))
    }

    /// Rescan `root` on the bound FileStore for every file of each kind in
    /// `kinds`, re-embedding and re-tagging anything whose manifest is stale
    /// or missing, then swap each kind's table for the rebuilt rows. Picks
    /// up edits made directly against the FileStore outside of
    /// `publish_template`/`delete_template`.
    pub async fn reindex(&self, root: &str, kinds: &[Kind]) -> Result<()> {
        let embedder = Arc::clone(&self.embedder);
        let tagger = Arc::clone(&self.tagger);
        let tables = reindex::reindex(
            root,
            kinds,
            self.file_store.as_ref(),
            |texts| embedder.encode(texts),
            |ids, texts| tagger.extract_tags(ids, texts),
        )
        .await?;
        for (kind, rows) in tables {
            self.engine.replace_table(kind, rows);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_core::test_support::MockFileStore;

    fn test_api(file_store: Arc<MockFileStore>, engine: Arc<MetadataEngine>) -> Api {
        Api::new(
            file_store,
            engine,
            Arc::new(scriptorium_embed::HashEmbedder),
            Arc::new(scriptorium_embed::KeywordTagger::new()),
            RegistryConfig::default().normalize(),
        )
    }

    fn write_skill(dir: &Path) {
        std::fs::write(
            dir.join("SKILL.md"),
            "---\nname: web_scraper\ndescription: scrapes pages\n---\n\n# Web Scraper\n",
        )
        .unwrap();
        std::fs::write(dir.join("run.py"), "print('x')").unwrap();
    }

    #[tokio::test]
    async fn publish_then_list_returns_one_row() {
        let source_dir = tempfile::tempdir().unwrap();
        write_skill(source_dir.path());

        let file_store = Arc::new(MockFileStore::new());
        let engine = Arc::new(MetadataEngine::new());
        let api = test_api(file_store, engine);

        api.publish_template(source_dir.path(), Kind::Skill, PublishInput::default())
            .await
            .unwrap();

        let rows = api.list_templates(
            Kind::Skill,
            Some(&["name".to_string(), "description".to_string()]),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "web_scraper");
        assert_eq!(rows[0]["description"], "web_scraper - scrapes pages");
    }

    #[tokio::test]
    async fn republish_keeps_uuid_stable_and_install_injects_version() {
        let source_dir = tempfile::tempdir().unwrap();
        write_skill(source_dir.path());

        let file_store = Arc::new(MockFileStore::new());
        let engine = Arc::new(MetadataEngine::new());
        let api = test_api(file_store, engine);

        let first = api
            .publish_template(source_dir.path(), Kind::Skill, PublishInput::default())
            .await
            .unwrap();
        let second = api
            .publish_template(source_dir.path(), Kind::Skill, PublishInput::default())
            .await
            .unwrap();
        assert_eq!(first.uuid, second.uuid);
        assert_eq!(api.get_skill_version("web_scraper").unwrap(), first.uuid.unwrap());

        let install_dir = tempfile::tempdir().unwrap();
        let skill_md = api.install_skill("web_scraper", install_dir.path()).await.unwrap();
        let installed = std::fs::read_to_string(&skill_md).unwrap();
        assert!(installed.contains(&format!("version: {}", first.uuid.unwrap())));
        assert!(install_dir.path().join("run.py").exists());
    }

    #[tokio::test]
    async fn get_skill_files_short_circuits_on_library_catalog() {
        let file_store = Arc::new(MockFileStore::new());
        let engine = Arc::new(MetadataEngine::new());
        let api = test_api(file_store, engine);

        let files = api.get_skill_files("frontmatter-version").await.unwrap();
        assert!(files.contains_key("SKILL.md"));
        assert!(files.contains_key("get_version.py"));
    }

    #[tokio::test]
    async fn search_rejects_empty_query() {
        let file_store = Arc::new(MockFileStore::new());
        let engine = Arc::new(MetadataEngine::new());
        let api = test_api(file_store, engine);
        let result = api.search_templates("  ", Kind::Role, None, None, None);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn reindex_after_manual_edit_picks_up_new_description() {
        let source_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            source_dir.path().join("ROLE.md"),
            "---\nname: editor\ndescription: edits prose\n---\n\n# Editor\n",
        )
        .unwrap();

        let file_store = Arc::new(MockFileStore::new());
        let engine = Arc::new(MetadataEngine::new());
        let api = test_api(Arc::clone(&file_store), Arc::clone(&engine));

        let first = api
            .publish_template(source_dir.path(), Kind::Role, PublishInput::default())
            .await
            .unwrap();

        file_store
            .save(
                "roles/editor/ROLE.md",
                b"---\nname: editor\ndescription: edits technical prose\n---\n\n# Editor\n",
            )
            .await
            .unwrap();

        api.reindex("", &[Kind::Role]).await.unwrap();

        let rows = api.list_templates(Kind::Role, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["description"], "editor - edits technical prose");
        assert_ne!(rows[0]["uuid"], serde_json::json!(first.uuid));
    }

    #[tokio::test]
    async fn delete_removes_files_and_deindexes() {
        let source_dir = tempfile::tempdir().unwrap();
        write_skill(source_dir.path());

        let file_store = Arc::new(MockFileStore::new());
        let engine = Arc::new(MetadataEngine::new());
        let api = test_api(file_store, engine);

        api.publish_template(source_dir.path(), Kind::Skill, PublishInput::default())
            .await
            .unwrap();
        api.delete_template("web_scraper", Kind::Skill).await.unwrap();

        assert!(api.get_definition("web_scraper", Kind::Skill).await.is_err());
        assert!(api.list_templates(Kind::Skill, None).is_empty());
    }
}
