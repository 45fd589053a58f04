use std::path::{Path, PathBuf};

use chrono::Utc;
use scriptorium_core::{Error, IndexEntry, Kind, Result};
use scriptorium_storage::Transaction;
use tracing::info;

use crate::frontmatter;

/// What a caller supplies about a template to be published; any field left
/// unset is filled in from the root file's frontmatter.
#[derive(Debug, Clone, Default)]
pub struct PublishInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Validate that `path` is a root file, or a directory containing one, for
/// `kind`. Returns the directory to enumerate files from and the root
/// file's own path.
fn validate(path: &Path, kind: Kind) -> Result<(PathBuf, PathBuf)> {
    if !path.exists() {
        return Err(Error::invalid_input(format!("path does not exist: {}", path.display())));
    }
    if path.is_dir() {
        let root_file = path.join(kind.root_file());
        if !root_file.exists() {
            return Err(Error::invalid_input(format!(
                "{} does not contain a {}",
                path.display(),
                kind.root_file()
            )));
        }
        Ok((path.to_path_buf(), root_file))
    } else {
        let basename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if basename != kind.root_file() {
            return Err(Error::invalid_input(format!(
                "expected a file named {}, got {}",
                kind.root_file(),
                basename
            )));
        }
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok((parent, path.to_path_buf()))
    }
}

/// Enumerate the files that belong to a template rooted at `dir`, with the
/// root file always first. Directories are skipped; any `.persona/` path
/// segment is stripped from the relative path before it becomes a storage
/// key, mirroring how the source collapses that legacy nesting.
fn enumerate_files(dir: &Path, root_file: &Path) -> Result<Vec<PathBuf>> {
    let mut files = vec![root_file.to_path_buf()];
    let mut rest = Vec::new();
    collect_files(dir, &mut rest)?;
    for f in rest {
        if f != root_file && f.file_name().and_then(|n| n.to_str()) != Some(".manifest.json") {
            files.push(f);
        }
    }
    Ok(files)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::io(dir, e))?;
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn storage_path(kind: Kind, name: &str, dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(dir).unwrap_or(file);
    let relative = relative.to_string_lossy().replace('\\', "/");
    let cleaned = relative
        .split('/')
        .filter(|seg| *seg != ".persona")
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}/{}", kind.plural(), name, cleaned)
}

/// Run the template-processing state machine: validate, parse and merge
/// frontmatter, canonicalize the description, embed it, enumerate files,
/// materialize them (rewriting the root file's frontmatter), compute the
/// etag, and stage the resulting entry for commit.
///
/// Must run inside a [`Transaction`] scope; the caller commits by returning
/// `Ok` from that scope's body.
pub async fn publish(
    tx: &Transaction<'_>,
    source_path: &Path,
    kind: Kind,
    input: PublishInput,
    embed: impl FnOnce(&str) -> Result<Vec<f32>>,
) -> Result<IndexEntry> {
    let (dir, root_file_path) = validate(source_path, kind)?;

    let root_bytes = std::fs::read(&root_file_path).map_err(|e| Error::io(&root_file_path, e))?;
    let root_text = String::from_utf8_lossy(&root_bytes).into_owned();
    let (fm, body) = frontmatter::split(&root_text);
    let fm = fm.unwrap_or_default();

    let name = input.name.or(fm.name.clone()).ok_or_else(|| {
        Error::missing_metadata("template has no name in frontmatter or request")
    })?;
    let raw_description = input.description.or(fm.description.clone()).ok_or_else(|| {
        Error::missing_metadata("template has no description in frontmatter or request")
    })?;
    let tags = if !input.tags.is_empty() {
        input.tags
    } else {
        fm.tags.clone()
    };

    let canonical_description = IndexEntry::canonical_description(&name, &raw_description);
    let embedding = embed(&canonical_description)?;

    let files = enumerate_files(&dir, &root_file_path)?;
    let storage_paths: Vec<String> = files.iter().map(|f| storage_path(kind, &name, &dir, f)).collect();

    let mut etag = String::new();
    for (file, storage_key) in files.iter().zip(&storage_paths) {
        let bytes = std::fs::read(file).map_err(|e| Error::io(file, e))?;
        let bytes = if file == &root_file_path {
            let mut new_fm = fm.clone();
            new_fm.name = Some(name.clone());
            new_fm.description = Some(canonical_description.clone());
            if !tags.is_empty() {
                new_fm.tags = tags.clone();
            }
            let rewritten = frontmatter::render(&new_fm, &body);
            rewritten.into_bytes()
        } else {
            bytes
        };
        if file == &root_file_path {
            etag = scriptorium_storage::md5_hex(&bytes);
        }
        tx.save(storage_key, &bytes).await?;
    }

    let entry = IndexEntry {
        name: Some(name),
        description: Some(canonical_description),
        uuid: None,
        etag: Some(etag),
        files: storage_paths,
        tags,
        embedding: Some(embedding),
        kind: Some(kind),
        date_created: Utc::now(),
    }
    .dedup_tags();

    tx.index(entry.clone());
    info!("published {kind} '{}' with {} file(s)", entry.name.as_deref().unwrap_or(""), entry.files.len());
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_core::test_support::MockFileStore;
    use scriptorium_storage::{run_transaction, MetadataEngine};
    use std::io::Write;

    fn write_skill(dir: &Path, ancillary: &[(&str, &str)]) {
        let mut f = std::fs::File::create(dir.join("SKILL.md")).unwrap();
        writeln!(f, "---\nname: web_scraper\ndescription: scrapes pages\n---\n\n# Web Scraper\n").unwrap();
        for (name, contents) in ancillary {
            std::fs::write(dir.join(name), contents).unwrap();
        }
    }

    #[tokio::test]
    async fn publish_fills_name_and_description_from_frontmatter() {
        let source_dir = tempfile::tempdir().unwrap();
        write_skill(source_dir.path(), &[("run.py", "print('x')")]);

        let file_store = MockFileStore::new();
        let engine = MetadataEngine::new();

        let entry = run_transaction(&file_store, &engine, |tx| {
            let source_dir = source_dir.path().to_path_buf();
            Box::pin(async move {
                publish(tx, &source_dir, Kind::Skill, PublishInput::default(), |text| {
                    Ok(vec![text.len() as f32, 0.0])
                })
                .await
            })
        })
        .await
        .unwrap();

        assert_eq!(entry.name.as_deref(), Some("web_scraper"));
        assert_eq!(entry.description.as_deref(), Some("web_scraper - scrapes pages"));
        assert_eq!(entry.files[0], "skills/web_scraper/SKILL.md");
        assert!(entry.files.contains(&"skills/web_scraper/run.py".to_string()));
    }

    #[tokio::test]
    async fn publish_rejects_directory_without_root_file() {
        let source_dir = tempfile::tempdir().unwrap();
        let file_store = MockFileStore::new();
        let engine = MetadataEngine::new();

        let result = run_transaction(&file_store, &engine, |tx| {
            let source_dir = source_dir.path().to_path_buf();
            Box::pin(async move {
                publish(tx, &source_dir, Kind::Skill, PublishInput::default(), |_| Ok(vec![0.0]))
                    .await
            })
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn publish_fails_when_description_missing_everywhere() {
        let source_dir = tempfile::tempdir().unwrap();
        std::fs::write(source_dir.path().join("SKILL.md"), "---\nname: x\n---\nbody\n").unwrap();

        let file_store = MockFileStore::new();
        let engine = MetadataEngine::new();
        let result = run_transaction(&file_store, &engine, |tx| {
            let source_dir = source_dir.path().to_path_buf();
            Box::pin(async move {
                publish(tx, &source_dir, Kind::Skill, PublishInput::default(), |_| Ok(vec![0.0]))
                    .await
            })
        })
        .await;
        assert!(matches!(result, Err(Error::MissingMetadata(_))));
    }
}
