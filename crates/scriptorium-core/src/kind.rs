use std::fmt;

/// Discriminates the two template flavors the registry understands.
///
/// A role is a single-file prompt definition (`ROLE.md`); a skill is a
/// directory bundle with one canonical entry file (`SKILL.md`) plus any
/// number of ancillary files. The processing algorithm is identical across
/// both; only the root filename and the table name differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Role,
    Skill,
}

impl Kind {
    /// The file that must exist at the root of every template of this kind.
    pub const fn root_file(self) -> &'static str {
        match self {
            Kind::Role => "ROLE.md",
            Kind::Skill => "SKILL.md",
        }
    }

    /// Pluralized discriminator used for table names and storage path segments.
    pub const fn plural(self) -> &'static str {
        match self {
            Kind::Role => "roles",
            Kind::Skill => "skills",
        }
    }

    /// Parse a pluralized discriminator back into a [`Kind`].
    pub fn from_plural(s: &str) -> Option<Self> {
        match s {
            "roles" => Some(Kind::Role),
            "skills" => Some(Kind::Skill),
            _ => None,
        }
    }

    /// All kinds, in a stable order. Useful for bootstrap/reindex loops that
    /// must touch every table.
    pub const ALL: [Kind; 2] = [Kind::Role, Kind::Skill];
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}
