use std::path::{Path, PathBuf};

use async_trait::async_trait;
use scriptorium_core::{Error, FileStore, Result};

/// A [`FileStore`] over the local filesystem, rooted at a fixed prefix.
///
/// Keys are POSIX paths (forward slashes) relative to the root regardless
/// of host OS; callers never see the native path separator.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a normalized storage key onto the root, rejecting `..` segments.
    fn join(&self, key: &str) -> Result<PathBuf> {
        if key.split('/').any(|seg| seg == "..") {
            return Err(Error::invalid_input(format!(
                "storage key must not contain '..' segments: {key}"
            )));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.join(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::io(&path, e))
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.join(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(key)
            } else {
                Error::io(&path, e)
            }
        })
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<()> {
        let path = self.join(key)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io(&path, e)),
        };
        if metadata.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(&path)
                    .await
                    .map_err(|e| Error::io(&path, e))
            } else {
                tokio::fs::remove_dir(&path)
                    .await
                    .map_err(|e| Error::io(&path, e))
            }
        } else {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| Error::io(&path, e))
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.join(key)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    async fn is_dir(&self, key: &str) -> Result<bool> {
        let path = self.join(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(m) => Ok(m.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let full_pattern = self.root.join(pattern);
        let full_pattern = full_pattern.to_string_lossy().into_owned();
        let root = self.root.clone();
        let to_key = move |p: PathBuf| -> String {
            p.strip_prefix(&root)
                .unwrap_or(&p)
                .to_string_lossy()
                .replace('\\', "/")
        };
        let entries = glob::glob(&full_pattern)
            .map_err(|e| Error::invalid_input(format!("bad glob pattern {pattern}: {e}")))?;
        let mut out = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => out.push(to_key(path)),
                Err(e) => {
                    return Err(Error::io(
                        e.path().to_path_buf(),
                        std::io::Error::other(e.to_string()),
                    ))
                }
            }
        }
        out.sort();
        Ok(out)
    }

    async fn mtime(&self, key: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let path = self.join(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(m) => Ok(m.modified().ok().map(chrono::DateTime::<chrono::Utc>::from)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}
