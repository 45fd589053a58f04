use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::Kind;

/// The canonical metadata record for a template.
///
/// An `IndexEntry` is built progressively: a caller may supply a partial
/// entry (only `tags`/`name`/`description` overrides, say) which the
/// template processor then fills in from frontmatter, embedding and
/// tagging. Because of that, every field except `files`, `tags` and
/// `date_created` is optional on the in-flight value; [`IndexEntry::finalize`]
/// enforces the invariants required before an entry may be staged.
///
/// Values are cheap to clone; an `IndexEntry` is a plain value object and
/// copies may be freely made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: Option<String>,
    pub description: Option<String>,
    pub uuid: Option<String>,
    pub etag: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(rename = "type")]
    pub kind: Option<Kind>,
    pub date_created: DateTime<Utc>,
}

impl IndexEntry {
    /// A freshly generated 32-hex-character id, used where the spec calls
    /// for a random (not content-addressed) identifier: the reindex
    /// pipeline's cache-miss path.
    pub fn fresh_uuid() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// A fresh, empty entry to be filled in by the template processor or
    /// reindex pipeline.
    pub fn partial() -> Self {
        IndexEntry {
            name: None,
            description: None,
            uuid: None,
            etag: None,
            files: Vec::new(),
            tags: Vec::new(),
            embedding: None,
            kind: None,
            date_created: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// `name ?? fm.name`, `description ?? fm.description`, `tags ?? fm.tags`.
    /// Values already present on `self` win; `fm_tags` only applies when
    /// `self.tags` is empty.
    pub fn merge_frontmatter(
        mut self,
        fm_name: Option<String>,
        fm_description: Option<String>,
        fm_tags: Vec<String>,
    ) -> Self {
        self.name = self.name.or(fm_name);
        self.description = self.description.or(fm_description);
        if self.tags.is_empty() {
            self.tags = fm_tags;
        }
        self
    }

    /// Canonical embedding/display form: `"<name> - <description>"`.
    pub fn canonical_description(name: &str, description: &str) -> String {
        format!("{name} - {description}")
    }

    /// Deduplicate tags, preserving first-seen order.
    pub fn dedup_tags(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.tags.retain(|t| seen.insert(t.clone()));
        self
    }

    /// Serializable view of this entry without the embedding vector, used
    /// for `.manifest.json` sidecars.
    pub fn to_manifest(&self) -> Manifest {
        Manifest {
            name: self.name.clone(),
            description: self.description.clone(),
            uuid: self.uuid.clone(),
            etag: self.etag.clone(),
            files: self.files.clone(),
            tags: self.tags.clone(),
            kind: self.kind,
            date_created: self.date_created,
        }
    }
}

/// Serialized form of an [`IndexEntry`] minus its embedding vector, stored
/// at `<template_dir>/.manifest.json`. Consumers must ignore unknown keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub uuid: Option<String>,
    pub etag: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub kind: Option<Kind>,
    pub date_created: DateTime<Utc>,
}

impl Manifest {
    /// Rehydrate an [`IndexEntry`] from a manifest. The embedding is left
    /// unset; callers that load from a fresh manifest are expected to
    /// already have a valid embedding on record in the metadata store, or
    /// to re-embed if one is required.
    pub fn into_entry(self) -> IndexEntry {
        IndexEntry {
            name: self.name,
            description: self.description,
            uuid: self.uuid,
            etag: self.etag,
            files: self.files,
            tags: self.tags,
            embedding: None,
            kind: self.kind,
            date_created: self.date_created,
        }
    }
}
