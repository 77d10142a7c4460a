//! Discovery and parsing of versioned `.http` migration scripts.
//!
//! A script is named `V<version>__<description>.http` and holds one HTTP
//! request: a `METHOD path` line, optional `Name: value` headers, a blank
//! line, then the body.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::MigrationError;
use crate::log::log_warn;
use crate::transport::{Method, SearchRequest};

pub const SCRIPT_PREFIX: &str = "V";
pub const SCRIPT_SEPARATOR: &str = "__";
pub const SCRIPT_SUFFIX: &str = ".http";
pub const PLACEHOLDER_PREFIX: &str = "${";
pub const PLACEHOLDER_SUFFIX: &str = "}";

/// Dotted numeric version. Trailing zero segments are insignificant, so
/// `1`, `1.0` and `1_0_0` compare equal.
#[derive(Debug, Clone)]
pub struct ScriptVersion {
    text: String,
    segments: Vec<u64>,
}

impl ScriptVersion {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("version cannot be empty".to_string());
        }

        let mut segments = raw
            .split(['.', '_'])
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|_| format!("version segment '{segment}' is not a number"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        while segments.len() > 1 && segments.last() == Some(&0) {
            segments.pop();
        }

        Ok(Self {
            text: raw.replace('_', "."),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for ScriptVersion {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for ScriptVersion {}

impl Hash for ScriptVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl PartialOrd for ScriptVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScriptVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for idx in 0..len {
            let left = self.segments.get(idx).copied().unwrap_or(0);
            let right = other.segments.get(idx).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for ScriptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: ScriptVersion,
    pub description: String,
    pub file_name: String,
    /// SHA-256 of the raw file content, before placeholder substitution.
    pub checksum: String,
    pub content: String,
}

impl MigrationScript {
    pub fn from_content(file_name: &str, content: String) -> Result<Self, MigrationError> {
        let (version, description) = parse_file_name(file_name)
            .ok_or_else(|| script_error(file_name, "file name must look like V<version>__<description>.http"))?
            .map_err(|message| script_error(file_name, &message))?;

        Ok(Self {
            version,
            description,
            file_name: file_name.to_string(),
            checksum: checksum(&content),
            content,
        })
    }

    /// Substitute placeholders and parse the script into a request.
    pub fn to_request(
        &self,
        placeholders: &BTreeMap<String, String>,
    ) -> Result<SearchRequest, MigrationError> {
        let rendered = substitute_placeholders(&self.content, placeholders);
        parse_request(&rendered).map_err(|message| script_error(&self.file_name, &message))
    }
}

/// Resolve a location identifier to a directory.
///
/// `file:` paths are used verbatim; `classpath:` and bare paths are resolved
/// against `scripts_root`.
pub fn resolve_location(location: &str, scripts_root: &Path) -> PathBuf {
    let location = location.trim();
    if let Some(path) = location.strip_prefix("file:") {
        return PathBuf::from(path);
    }
    let relative = location.strip_prefix("classpath:").unwrap_or(location);
    scripts_root.join(relative.trim_start_matches('/'))
}

/// Load every script from `locations`, sorted by ascending version.
pub fn discover_scripts(
    locations: &[String],
    scripts_root: &Path,
) -> Result<Vec<MigrationScript>, MigrationError> {
    let mut by_version: BTreeMap<ScriptVersion, MigrationScript> = BTreeMap::new();

    for location in locations {
        let dir = resolve_location(location, scripts_root);
        if !dir.is_dir() {
            log_warn(
                "migration_session",
                "location_missing",
                json!({ "location": location, "path": dir.display().to_string() }),
            );
            continue;
        }

        let entries = fs::read_dir(&dir).map_err(|source| MigrationError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MigrationError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !is_script_name(file_name) {
                continue;
            }

            let content = fs::read_to_string(&path).map_err(|source| MigrationError::Io {
                path: path.clone(),
                source,
            })?;
            let script = MigrationScript::from_content(file_name, content)?;

            if let Some(existing) = by_version.get(&script.version) {
                return Err(MigrationError::DuplicateVersion {
                    version: script.version.to_string(),
                    first: existing.file_name.clone(),
                    second: script.file_name,
                });
            }
            by_version.insert(script.version.clone(), script);
        }
    }

    Ok(by_version.into_values().collect())
}

/// Replace `${name}` tokens in one left-to-right pass. Substituted values are
/// emitted as-is and never rescanned; unknown tokens stay verbatim.
pub fn substitute_placeholders(content: &str, placeholders: &BTreeMap<String, String>) -> String {
    let mut rendered = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        rendered.push_str(&rest[..start]);
        let after_prefix = &rest[start + PLACEHOLDER_PREFIX.len()..];
        let Some(end) = after_prefix.find(PLACEHOLDER_SUFFIX) else {
            rendered.push_str(&rest[start..]);
            return rendered;
        };
        let name = &after_prefix[..end];
        let token_len = PLACEHOLDER_PREFIX.len() + end + PLACEHOLDER_SUFFIX.len();
        match placeholders.get(name) {
            Some(value) => rendered.push_str(value),
            None => rendered.push_str(&rest[start..start + token_len]),
        }
        rest = &rest[start + token_len..];
    }
    rendered.push_str(rest);
    rendered
}

/// Parse a rendered script body into a request.
pub fn parse_request(content: &str) -> Result<SearchRequest, String> {
    let mut lines = content.lines();

    let request_line = loop {
        let Some(line) = lines.next() else {
            return Err("script does not contain a request line".to_string());
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }
        break trimmed;
    };

    let mut parts = request_line.split_whitespace();
    let method_text = parts.next().unwrap_or_default();
    let method = Method::parse(method_text)
        .ok_or_else(|| format!("unsupported HTTP method '{method_text}'"))?;
    let path = parts
        .next()
        .ok_or_else(|| "request line must be '<METHOD> <path>'".to_string())?;
    if parts.next().is_some() {
        return Err("request line must be '<METHOD> <path>'".to_string());
    }

    let mut request = SearchRequest::new(method, normalize_path(path));

    for line in lines.by_ref() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        let (name, value) = trimmed
            .split_once(':')
            .ok_or_else(|| format!("malformed header line '{trimmed}'"))?;
        request
            .headers
            .push((name.trim().to_string(), value.trim().to_string()));
    }

    let body = lines.collect::<Vec<_>>().join("\n");
    let body = body.trim();
    if !body.is_empty() {
        request.body = Some(body.to_string());
    }

    Ok(request)
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn is_script_name(file_name: &str) -> bool {
    file_name.starts_with(SCRIPT_PREFIX) && file_name.ends_with(SCRIPT_SUFFIX)
}

/// `None` when the name is not a script at all, `Some(Err)` when it looks
/// like one but is malformed.
fn parse_file_name(file_name: &str) -> Option<Result<(ScriptVersion, String), String>> {
    let stem = file_name
        .strip_prefix(SCRIPT_PREFIX)?
        .strip_suffix(SCRIPT_SUFFIX)?;

    let Some((version, description)) = stem.split_once(SCRIPT_SEPARATOR) else {
        return Some(Err(format!(
            "missing '{SCRIPT_SEPARATOR}' between version and description"
        )));
    };

    Some(ScriptVersion::parse(version).map(|version| (version, description.replace('_', " "))))
}

fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn script_error(script: &str, message: &str) -> MigrationError {
    MigrationError::Script {
        script: script.to_string(),
        message: message.to_string(),
    }
}
