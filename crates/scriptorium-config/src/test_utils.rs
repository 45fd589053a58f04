//! Test helpers for constructing and round-tripping [`RegistryConfig`] values.

use std::io::Write;

use tempfile::{NamedTempFile, TempDir};

use crate::RegistryConfig;

/// Builder for hand-assembling a [`RegistryConfig`] in tests without going
/// through [`crate::ConfigLoader`].
pub struct TestConfigBuilder {
    config: RegistryConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
        }
    }

    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.config.root = root.into();
        self
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.config.meta_store.similarity_search.max_results = n;
        self
    }

    pub fn max_cosine_distance(mut self, d: f32) -> Self {
        self.config.meta_store.similarity_search.max_cosine_distance = d;
        self
    }

    pub fn build(self) -> RegistryConfig {
        self.config.normalize()
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`RegistryConfig`] rooted at a fresh temporary directory, with the
/// directory kept alive for the test's duration.
pub struct TempRootConfig {
    pub dir: TempDir,
    pub config: RegistryConfig,
}

pub fn temp_root_config() -> TempRootConfig {
    let dir = TempDir::new().expect("failed to create temp dir for config root");
    let config = TestConfigBuilder::new()
        .root(dir.path().to_string_lossy().to_string())
        .build();
    TempRootConfig { dir, config }
}

/// Write a [`RegistryConfig`] to a temp YAML file and return its path.
pub fn write_temp_yaml(config: &RegistryConfig) -> (NamedTempFile, std::path::PathBuf) {
    let mut file = NamedTempFile::new().expect("failed to create temp config file");
    let yaml = serde_yaml::to_string(config).expect("config always serializes");
    file.write_all(yaml.as_bytes()).expect("failed to write temp config file");
    let path = file.path().to_path_buf();
    (file, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_root_config_normalizes_sub_roots() {
        let temp = temp_root_config();
        assert_eq!(
            temp.config.file_store.root.as_deref(),
            Some(temp.dir.path().to_string_lossy().as_ref())
        );
    }

    #[test]
    fn write_temp_yaml_round_trips() {
        let config = TestConfigBuilder::new().max_results(9).build();
        let (_file, path) = write_temp_yaml(&config);
        let loaded = crate::ConfigLoader::load(Some(&path), crate::ConfigOverrides::default()).unwrap();
        assert_eq!(loaded.meta_store.similarity_search.max_results, 9);
    }
}
