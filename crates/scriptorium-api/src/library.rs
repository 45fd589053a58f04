//! The built-in skill catalog shipped inside the binary.
//!
//! Library skills are bundled under `library/<skill-name>/...` at compile
//! time and loaded into a process-wide immutable map the first time
//! anything asks for one. They short-circuit registry lookups in
//! [`crate::facade::Api::get_skill_files`] and [`crate::facade::Api::install_skill`]
//! before the metastore is ever consulted, matching the external
//! GitHub-archive-backed catalog this stands in for.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "library/"]
struct BuiltInSkills;

/// One file belonging to a skill: its path relative to the skill's own
/// directory (used to recreate subdirectories on install) plus its bytes.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

/// `basename -> file` for one skill's constituent files, keyed the same way
/// a registry-stored skill's files are (collisions between same-named files
/// in different subdirectories are not expected within one skill bundle).
pub type SkillFiles = HashMap<String, LoadedFile>;

static CATALOG: Lazy<HashMap<String, SkillFiles>> = Lazy::new(load_catalog);

fn load_catalog() -> HashMap<String, SkillFiles> {
    let mut catalog: HashMap<String, SkillFiles> = HashMap::new();
    for path in BuiltInSkills::iter() {
        let Some((skill_name, rest)) = path.split_once('/') else {
            continue;
        };
        let Some(file) = BuiltInSkills::get(&path) else {
            continue;
        };
        let basename = rest.rsplit('/').next().unwrap_or(rest).to_string();
        catalog.entry(skill_name.to_string()).or_default().insert(
            basename,
            LoadedFile {
                relative_path: rest.to_string(),
                bytes: file.data.into_owned(),
            },
        );
    }
    catalog
}

/// Look up a built-in skill's files by name.
pub fn get(name: &str) -> Option<&'static SkillFiles> {
    CATALOG.get(name)
}

/// Whether `name` names a built-in skill.
pub fn contains(name: &str) -> bool {
    CATALOG.contains_key(name)
}
