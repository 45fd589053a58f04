use serde::{Deserialize, Serialize};

/// The frontmatter fields a root file is recognized to carry. Unknown keys
/// in the YAML block are preserved verbatim in `extra` so materialization
/// never drops author-supplied data it doesn't understand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontmatter {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// Split a root file's text into its frontmatter (if any) and body.
///
/// Recognizes the conventional `---\n<yaml>\n---\n<body>` delimiter; text
/// without a leading `---` line has no frontmatter and is returned whole as
/// the body.
pub fn split(text: &str) -> (Option<Frontmatter>, String) {
    let Some(rest) = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n")) else {
        return (None, text.to_string());
    };
    let Some(end) = find_closing_delimiter(rest) else {
        return (None, text.to_string());
    };
    let yaml = &rest[..end.yaml_end];
    let body = &rest[end.body_start..];
    match serde_yaml::from_str::<Frontmatter>(yaml) {
        Ok(fm) => (Some(fm), body.to_string()),
        Err(_) => (None, text.to_string()),
    }
}

struct ClosingDelimiter {
    yaml_end: usize,
    body_start: usize,
}

fn find_closing_delimiter(rest: &str) -> Option<ClosingDelimiter> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            return Some(ClosingDelimiter {
                yaml_end: offset,
                body_start: offset + line.len(),
            });
        }
        offset += line.len();
    }
    None
}

/// Render a root file from frontmatter and body, always emitting `name`
/// then `description` then `tags` (when non-empty) first so canonicalized
/// fields are easy to spot on disk, followed by any preserved extra keys.
pub fn render(fm: &Frontmatter, body: &str) -> String {
    let mut out = String::from("---\n");
    if let Some(name) = &fm.name {
        out.push_str(&format!("name: {}\n", yaml_scalar(name)));
    }
    if let Some(description) = &fm.description {
        out.push_str(&format!("description: {}\n", yaml_scalar(description)));
    }
    if !fm.tags.is_empty() {
        let tags_yaml = serde_yaml::to_string(&fm.tags).expect("tag list always serializes");
        out.push_str("tags:\n");
        for line in tags_yaml.lines() {
            out.push_str(line);
            out.push('\n');
        }
    }
    if !fm.extra.is_empty() {
        let extra_yaml = serde_yaml::to_string(&fm.extra).expect("extra mapping always serializes");
        out.push_str(&extra_yaml);
    }
    out.push_str("---\n");
    out.push_str(body);
    out
}

fn yaml_scalar(s: &str) -> String {
    if s.contains(':') || s.contains('#') || s.starts_with(['"', '\'', ' ']) || s.is_empty() {
        serde_yaml::to_string(s).expect("string always serializes").trim_end().to_string()
    } else {
        s.to_string()
    }
}

/// Inject `metadata.version` into a SKILL.md's frontmatter, creating the
/// `metadata` mapping if absent. No-op on content with no frontmatter block
/// (callers are expected to validate that first).
pub fn with_metadata_version(text: &str, version: &str) -> String {
    let (fm, body) = split(text);
    let mut fm = fm.unwrap_or_default();
    let metadata_key = serde_yaml::Value::String("metadata".to_string());
    let mut metadata = match fm.extra.get(&metadata_key) {
        Some(serde_yaml::Value::Mapping(m)) => m.clone(),
        _ => serde_yaml::Mapping::new(),
    };
    metadata.insert(
        serde_yaml::Value::String("version".to_string()),
        serde_yaml::Value::String(version.to_string()),
    );
    fm.extra.insert(metadata_key, serde_yaml::Value::Mapping(metadata));
    render(&fm, &body)
}
