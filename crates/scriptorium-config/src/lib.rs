//! Typed, layered configuration for the template registry.
//!
//! Values are resolved in a single pass, lowest to highest precedence:
//! built-in defaults, then an optional config file, then environment
//! variables prefixed `SCRIPTORIUM_` (double underscore nests, e.g.
//! `SCRIPTORIUM_META_STORE__INDEX_FOLDER`), then explicit programmatic
//! overrides supplied by the caller. Each later source only replaces a
//! field the earlier ones also set; nothing is order-dependent beyond that
//! precedence chain.

use std::path::{Path, PathBuf};

use config::{Config as RawConfig, Environment, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),

    #[error("{field} is not set and has no default")]
    MissingField { field: &'static str },

    #[error("failed to serialize defaults: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileStoreBackend {
    Local,
}

impl Default for FileStoreBackend {
    fn default() -> Self {
        FileStoreBackend::Local
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FileStoreConfig {
    #[serde(rename = "type")]
    pub kind: FileStoreBackend,
    /// Root prefix for blob storage. Inherits the top-level `root` when unset.
    pub root: Option<String>,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        FileStoreConfig {
            kind: FileStoreBackend::Local,
            root: None,
        }
    }
}

impl FileStoreConfig {
    pub fn roles_dir(&self) -> Result<PathBuf> {
        self.root()
            .map(|r| r.join("roles"))
    }

    pub fn skills_dir(&self) -> Result<PathBuf> {
        self.root().map(|r| r.join("skills"))
    }

    fn root(&self) -> Result<PathBuf> {
        self.root
            .as_ref()
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingField { field: "file_store.root" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MetaStoreBackend {
    /// The in-memory, columnar-file-backed engine. The only backend today;
    /// named explicitly so a future backend can be selected the same way
    /// `file_store.type` selects among blob backends.
    Columnar,
}

impl Default for MetaStoreBackend {
    fn default() -> Self {
        MetaStoreBackend::Columnar
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SimilaritySearchConfig {
    pub max_results: usize,
    pub max_cosine_distance: f32,
}

impl Default for SimilaritySearchConfig {
    fn default() -> Self {
        SimilaritySearchConfig {
            max_results: 3,
            max_cosine_distance: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MetaStoreConfig {
    #[serde(rename = "type")]
    pub kind: MetaStoreBackend,
    /// Root prefix for columnar index files. Inherits the top-level `root`
    /// when unset.
    pub root: Option<String>,
    pub index_folder: String,
    pub similarity_search: SimilaritySearchConfig,
}

impl Default for MetaStoreConfig {
    fn default() -> Self {
        MetaStoreConfig {
            kind: MetaStoreBackend::Columnar,
            root: None,
            index_folder: "index".to_string(),
            similarity_search: SimilaritySearchConfig::default(),
        }
    }
}

impl MetaStoreConfig {
    pub fn index_path(&self) -> Result<PathBuf> {
        Ok(self.root()?.join(&self.index_folder))
    }

    pub fn roles_index_path(&self) -> Result<PathBuf> {
        Ok(self.index_path()?.join("roles.json"))
    }

    pub fn skills_index_path(&self) -> Result<PathBuf> {
        Ok(self.index_path()?.join("skills.json"))
    }

    fn root(&self) -> Result<PathBuf> {
        self.root
            .as_ref()
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingField { field: "meta_store.root" })
    }
}

/// Top-level, fully-resolved configuration for a registry instance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RegistryConfig {
    pub root: String,
    pub file_store: FileStoreConfig,
    pub meta_store: MetaStoreConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            root: default_root(),
            file_store: FileStoreConfig::default(),
            meta_store: MetaStoreConfig::default(),
        }
    }
}

fn default_root() -> String {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("scriptorium")
        .to_string_lossy()
        .into_owned()
}

impl RegistryConfig {
    /// Propagate the top-level `root` into sub-configs whose own `root` was
    /// left unset. Explicit sub-config roots always win.
    pub fn normalize(mut self) -> Self {
        if self.file_store.root.is_none() {
            self.file_store.root = Some(self.root.clone());
        }
        if self.meta_store.root.is_none() {
            self.meta_store.root = Some(self.root.clone());
        }
        self
    }

    pub fn root_normalized(&self) -> PathBuf {
        shellexpand_home(&self.root)
    }
}

fn shellexpand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Explicit, highest-precedence overrides, typically supplied by a caller
/// that already parsed its own flags or API parameters. Every field is
/// optional; `None` leaves the lower-precedence value untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<String>,
    pub file_store_root: Option<String>,
    pub meta_store_root: Option<String>,
    pub max_results: Option<usize>,
    pub max_cosine_distance: Option<f32>,
}

impl ConfigOverrides {
    fn apply(&self, mut config: RegistryConfig) -> RegistryConfig {
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(root) = &self.file_store_root {
            config.file_store.root = Some(root.clone());
        }
        if let Some(root) = &self.meta_store_root {
            config.meta_store.root = Some(root.clone());
        }
        if let Some(n) = self.max_results {
            config.meta_store.similarity_search.max_results = n;
        }
        if let Some(d) = self.max_cosine_distance {
            config.meta_store.similarity_search.max_cosine_distance = d;
        }
        config
    }
}

pub const ENV_PREFIX: &str = "SCRIPTORIUM";

/// Builds a [`RegistryConfig`] by layering defaults, an optional config
/// file, environment variables and explicit overrides, in that order.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(file_path: Option<&Path>, overrides: ConfigOverrides) -> Result<RegistryConfig> {
        let defaults_yaml = serde_yaml::to_string(&RegistryConfig::default())?;

        let mut builder =
            RawConfig::builder().add_source(File::from_str(&defaults_yaml, FileFormat::Yaml));

        if let Some(path) = file_path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder.build()?;
        let config: RegistryConfig = raw.try_deserialize()?;
        Ok(overrides.apply(config).normalize())
    }

    /// Load from defaults and environment alone, skipping any file.
    pub fn load_default_and_env() -> Result<RegistryConfig> {
        Self::load(None, ConfigOverrides::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_normalize_propagates_root() {
        let config = RegistryConfig::default().normalize();
        assert_eq!(config.file_store.root.as_deref(), Some(config.root.as_str()));
        assert_eq!(config.meta_store.root.as_deref(), Some(config.root.as_str()));
    }

    #[test]
    fn explicit_sub_root_is_not_overwritten_by_normalize() {
        let mut config = RegistryConfig::default();
        config.file_store.root = Some("/custom/files".to_string());
        let config = config.normalize();
        assert_eq!(config.file_store.root.as_deref(), Some("/custom/files"));
        assert_eq!(config.meta_store.root.as_deref(), Some(config.root.as_str()));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let overrides = ConfigOverrides {
            root: Some("/override/root".into()),
            max_results: Some(7),
            ..Default::default()
        };
        let config = ConfigLoader::load(None, overrides).unwrap();
        assert_eq!(config.root, "/override/root");
        assert_eq!(config.meta_store.similarity_search.max_results, 7);
        // root propagation still ran after overrides were applied
        assert_eq!(config.file_store.root.as_deref(), Some("/override/root"));
    }

    #[test]
    #[serial_test::serial]
    fn env_vars_override_defaults_and_file() {
        std::env::set_var("SCRIPTORIUM_ROOT", "/from/env");
        std::env::set_var("SCRIPTORIUM_META_STORE__INDEX_FOLDER", "env-index");
        let config = ConfigLoader::load_default_and_env().unwrap();
        std::env::remove_var("SCRIPTORIUM_ROOT");
        std::env::remove_var("SCRIPTORIUM_META_STORE__INDEX_FOLDER");
        assert_eq!(config.root, "/from/env");
        assert_eq!(config.meta_store.index_folder, "env-index");
    }

    #[test]
    fn file_store_dirs_join_root() {
        let mut config = RegistryConfig::default();
        config.file_store.root = Some("/data".into());
        assert_eq!(config.file_store.roles_dir().unwrap(), PathBuf::from("/data/roles"));
        assert_eq!(config.file_store.skills_dir().unwrap(), PathBuf::from("/data/skills"));
    }

    #[test]
    fn meta_store_index_paths_join_root_and_folder() {
        let mut config = RegistryConfig::default();
        config.meta_store.root = Some("/data".into());
        assert_eq!(
            config.meta_store.roles_index_path().unwrap(),
            PathBuf::from("/data/index/roles.json")
        );
    }
}
