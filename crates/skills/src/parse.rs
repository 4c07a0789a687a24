//! `SKILL.md` metadata extraction.
//!
//! Parsing never fails: a manifest without a header, or with a header that
//! lacks `name`, still yields a usable name (first `#` heading, then the
//! directory name) so half-written skills stay discoverable.

use std::{collections::BTreeMap, path::Path};

use {
    serde::Serialize,
    serde_yaml::{Mapping, Value},
};

/// Manifest file name marking a directory as a skill.
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Metadata extracted from a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkillManifest {
    pub name: String,
    pub description: String,
    /// Header keys other than `name`/`description` with scalar values
    /// rendered as text, keyed and ordered by key name. Nested values are
    /// kept as an empty string.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Header/body split of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Sections<'a> {
    header: Option<Vec<&'a str>>,
    body: Vec<&'a str>,
}

/// Parse manifest text. `fallback_name` is used when neither the header nor
/// a heading provides a name (normally the skill directory's base name).
pub fn parse_manifest(content: &str, fallback_name: &str) -> SkillManifest {
    let sections = split_sections(content);
    let header = sections
        .header
        .as_deref()
        .map(parse_header)
        .unwrap_or_default();

    let mut extra = BTreeMap::new();
    let mut name = None;
    let mut description = None;
    for (key, value) in header {
        match key.as_str() {
            "name" if name.is_none() => name = non_empty(value),
            "description" if description.is_none() => description = non_empty(value),
            "name" | "description" => {},
            _ => {
                extra.entry(key).or_insert_with(|| value.trim().to_string());
            },
        }
    }

    let name = name
        .or_else(|| first_heading(&sections.body))
        .unwrap_or_else(|| fallback_name.to_string());

    SkillManifest {
        name,
        description: description.unwrap_or_default(),
        extra,
    }
}

/// Parse the manifest inside `skill_dir`, using the directory's base name as
/// the fallback name.
pub fn parse_manifest_in(content: &str, skill_dir: &Path) -> SkillManifest {
    parse_manifest(content, &dir_display_name(skill_dir))
}

/// Base name of a directory, or `"skill"` when it has none.
pub fn dir_display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "skill".to_string())
}

/// First body line that is not a heading, a horizontal rule, or blank.
/// Display-only: never used for grouping or equality.
pub fn fallback_description(content: &str) -> Option<String> {
    let sections = split_sections(content);
    sections
        .body
        .iter()
        .map(|line| line.trim())
        .find(|t| {
            !t.is_empty()
                && !t.starts_with('#')
                && !t.chars().all(|c| matches!(c, '-' | '=' | '*' | '_'))
        })
        .map(str::to_string)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn is_open_marker(line: &str) -> bool {
    line.trim_end() == "---"
}

fn is_close_marker(line: &str) -> bool {
    matches!(line.trim_end(), "---" | "...")
}

/// Split off a leading `---` ... `---` header. Leading blank lines and a BOM
/// are tolerated; an unterminated header means there is no header.
fn split_sections(content: &str) -> Sections<'_> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let lines: Vec<&str> = content.lines().collect();
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());

    if start < lines.len() && is_open_marker(lines[start]) {
        if let Some(offset) = lines[start + 1..].iter().position(|l| is_close_marker(l)) {
            let close = start + 1 + offset;
            return Sections {
                header: Some(lines[start + 1..close].to_vec()),
                body: lines[close + 1..].to_vec(),
            };
        }
    }

    Sections {
        header: None,
        body: lines,
    }
}

/// Top-level header pairs. The header is read as YAML; text that is not a
/// YAML mapping falls back to a line scan so a sloppy header still names
/// its skill.
fn parse_header(lines: &[&str]) -> Vec<(String, String)> {
    match serde_yaml::from_str::<Mapping>(&lines.join("\n")) {
        Ok(mapping) => mapping
            .iter()
            .filter_map(|(key, value)| {
                Some((scalar_text(key)?, scalar_text(value).unwrap_or_default()))
            })
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "manifest header is not valid YAML, scanning lines");
            scan_header(lines)
        },
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Line-oriented `key: value` scan. Supports quoted values and `>`/`|`
/// block scalars whose continuation lines are indented.
fn scan_header(lines: &[&str]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if line.starts_with([' ', '\t']) || line.trim_start().starts_with('#') {
            continue;
        }
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            continue;
        }
        let rest = rest.trim();

        let value = match rest {
            ">" | ">-" | ">+" | "|" | "|-" | "|+" => {
                let mut parts = Vec::new();
                while i < lines.len()
                    && (lines[i].starts_with([' ', '\t']) || lines[i].trim().is_empty())
                {
                    parts.push(lines[i].trim());
                    i += 1;
                }
                while parts.last().is_some_and(|p| p.is_empty()) {
                    parts.pop();
                }
                if rest.starts_with('>') {
                    parts
                        .iter()
                        .filter(|p| !p.is_empty())
                        .copied()
                        .collect::<Vec<_>>()
                        .join(" ")
                } else {
                    parts.join("\n")
                }
            },
            _ => unquote(rest).to_string(),
        };
        pairs.push((key.to_string(), value));
    }
    pairs
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Text of the first level-one heading outside fenced code blocks.
fn first_heading(body: &[&str]) -> Option<String> {
    let mut in_fence = false;
    for line in body {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || !line.starts_with('#') || line.starts_with("##") {
            continue;
        }
        let text = line[1..].trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    None
}
