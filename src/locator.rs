use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::DatasetKey;
use crate::error::CatalogError;

/// Glob-style dataset pattern: a directory wildcard with an optional
/// `/V<n>` version suffix. A leading `metadata/` segment is accepted
/// and stripped.
#[derive(Debug, Clone)]
pub struct DatasetPattern {
    directory: Regex,
    version: Option<String>,
    raw: String,
}

impl DatasetPattern {
    pub fn matches_directory(&self, name: &str) -> bool {
        self.directory.is_match(name)
    }

    pub fn matches_version(&self, name: &str) -> bool {
        match &self.version {
            Some(version) => version == name,
            None => name.starts_with('V'),
        }
    }
}

impl std::fmt::Display for DatasetPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for DatasetPattern {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let stripped = trimmed.strip_prefix("metadata/").unwrap_or(trimmed);
        if stripped.is_empty() {
            return Err(CatalogError::InvalidPattern(value.to_string()));
        }
        let (directory, version) = match stripped.split_once('/') {
            Some((directory, version)) => {
                if !version.starts_with('V') || version.contains('/') {
                    return Err(CatalogError::InvalidPattern(value.to_string()));
                }
                (directory, Some(version.to_string()))
            }
            None => (stripped, None),
        };
        if directory.is_empty() {
            return Err(CatalogError::InvalidPattern(value.to_string()));
        }
        Ok(Self {
            directory: glob_to_regex(directory)?,
            version,
            raw: trimmed.to_string(),
        })
    }
}

/// `*` matches any run of characters, `?` a single character; anything
/// else is literal.
fn glob_to_regex(glob: &str) -> Result<Regex, CatalogError> {
    let mut pattern = String::from("^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|err| CatalogError::InvalidPattern(err.to_string()))
}

/// One located dataset document within the metadata tree.
#[derive(Debug, Clone, Serialize)]
pub struct LocatorMatch {
    pub path: PathBuf,
    pub relative_path: String,
    pub directory: String,
    pub version: String,
    pub document: Value,
}

/// A candidate version directory produced by pure traversal, before any
/// document is opened.
#[derive(Debug, Clone)]
struct Candidate {
    version_dir: PathBuf,
    directory: String,
    version: String,
}

/// Outcome of classifying one JSON document found under a candidate
/// directory.
#[derive(Debug)]
pub enum Classification {
    Dataset(Value),
    Skipped { reason: String },
}

/// Search the metadata tree for dataset documents matching a pattern.
/// Documents that fail to parse or are not `type: "dataset"` are
/// skipped with a log line, never an error.
pub fn find_datasets(
    metadata_root: &Path,
    pattern: &DatasetPattern,
) -> Result<BTreeMap<DatasetKey, LocatorMatch>, CatalogError> {
    if !metadata_root.is_dir() {
        return Err(CatalogError::MetadataRootNotFound(
            metadata_root.to_path_buf(),
        ));
    }

    let mut results = BTreeMap::new();
    for candidate in enumerate_candidates(metadata_root, pattern)? {
        let Some((path, document)) = first_dataset_document(&candidate.version_dir)? else {
            debug!(
                directory = %candidate.directory,
                version = %candidate.version,
                "no dataset document in candidate",
            );
            continue;
        };
        let key = DatasetKey::new(&candidate.directory, &candidate.version);
        let relative_path = path
            .strip_prefix(metadata_root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        results.insert(
            key,
            LocatorMatch {
                path,
                relative_path,
                directory: candidate.directory,
                version: candidate.version,
                document,
            },
        );
    }
    Ok(results)
}

/// Pure traversal: which version directories does the pattern select.
fn enumerate_candidates(
    metadata_root: &Path,
    pattern: &DatasetPattern,
) -> Result<Vec<Candidate>, CatalogError> {
    let mut candidates = Vec::new();
    for dataset_dir in sorted_dirs(metadata_root)? {
        let directory = dir_name(&dataset_dir)?;
        if !pattern.matches_directory(&directory) {
            continue;
        }
        for version_dir in sorted_dirs(&dataset_dir)? {
            let version = dir_name(&version_dir)?;
            if !pattern.matches_version(&version) {
                continue;
            }
            candidates.push(Candidate {
                version_dir,
                directory: directory.clone(),
                version,
            });
        }
    }
    Ok(candidates)
}

/// Walk a version directory and return the first document classified as
/// a dataset, in sorted path order.
fn first_dataset_document(version_dir: &Path) -> Result<Option<(PathBuf, Value)>, CatalogError> {
    let mut stack = vec![version_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut subdirs = Vec::new();
        for path in sorted_children(&dir)? {
            if path.is_dir() {
                subdirs.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                match classify_document(&path) {
                    Classification::Dataset(document) => return Ok(Some((path, document))),
                    Classification::Skipped { reason } => {
                        debug!(path = %path.display(), reason, "skipped document");
                    }
                }
            }
        }
        // Depth-first, earliest-sorted subdirectory first.
        subdirs.reverse();
        stack.extend(subdirs);
    }
    Ok(None)
}

/// Classify one JSON file. Unparseable content is a skip with a reason,
/// not a failure.
pub fn classify_document(path: &Path) -> Classification {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable document");
            return Classification::Skipped {
                reason: format!("unreadable: {err}"),
            };
        }
    };
    let document: Value = match serde_json::from_str(&content) {
        Ok(document) => document,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unparseable document");
            return Classification::Skipped {
                reason: format!("invalid JSON: {err}"),
            };
        }
    };
    match document.get("type").and_then(Value::as_str) {
        Some(kind) if kind.eq_ignore_ascii_case("dataset") => Classification::Dataset(document),
        Some(kind) => Classification::Skipped {
            reason: format!("type is {kind:?}"),
        },
        None => Classification::Skipped {
            reason: "no type field".to_string(),
        },
    }
}

/// Caller decision gating the children rewrite of each located dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderMode {
    Auto,
    Skip,
    Confirm,
}

impl FromStr for ReorderMode {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "auto" => Ok(ReorderMode::Auto),
            "skip" => Ok(ReorderMode::Skip),
            "confirm" => Ok(ReorderMode::Confirm),
            _ => Err(CatalogError::InvalidPattern(format!(
                "unknown reorder mode: {value}"
            ))),
        }
    }
}

/// Rewrite a document's `children` array into the canonical order:
/// `source`, then `code`, then file entries in original order, then
/// `sub-*` entries (numeric identifiers by value, others
/// lexicographically), then everything else in original order.
/// Returns whether the order changed. Idempotent.
pub fn reorder_children(document: &mut Value) -> bool {
    let Some(children) = document.get_mut("children").and_then(Value::as_array_mut) else {
        return false;
    };

    let mut source = Vec::new();
    let mut code = Vec::new();
    let mut files = Vec::new();
    let mut subs = Vec::new();
    let mut rest = Vec::new();

    for child in children.iter().cloned() {
        let name = child_name(&child);
        if name == "source" {
            source.push(child);
        } else if name == "code" {
            code.push(child);
        } else if child.get("type").and_then(Value::as_str) == Some("file") {
            files.push(child);
        } else if name.starts_with("sub-") {
            subs.push(child);
        } else {
            rest.push(child);
        }
    }

    subs.sort_by_key(|child| sub_sort_key(&child_name(child)));

    let mut reordered = Vec::with_capacity(
        source.len() + code.len() + files.len() + subs.len() + rest.len(),
    );
    reordered.extend(source);
    reordered.extend(code);
    reordered.extend(files);
    reordered.extend(subs);
    reordered.extend(rest);

    let changed = *children != reordered;
    *children = reordered;
    changed
}

fn child_name(child: &Value) -> String {
    match child {
        Value::String(name) => name.clone(),
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// Numeric `sub-<n>` identifiers sort by value ahead of non-numeric
/// ones, which sort lexicographically.
fn sub_sort_key(name: &str) -> (u8, u64, String) {
    let identifier = name.strip_prefix("sub-").unwrap_or(name);
    match identifier.parse::<u64>() {
        Ok(number) => (0, number, String::new()),
        Err(_) => (1, 0, identifier.to_string()),
    }
}

/// Reorder a dataset document on disk. All-or-nothing: any parse or
/// serialize failure leaves the file untouched. Returns whether the
/// file was rewritten.
pub fn reorder_children_in_place(path: &Path) -> Result<bool, CatalogError> {
    let content = fs::read_to_string(path).map_err(|err| CatalogError::Reorder {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let mut document: Value =
        serde_json::from_str(&content).map_err(|err| CatalogError::Reorder {
            path: path.to_path_buf(),
            reason: format!("invalid JSON: {err}"),
        })?;
    if !reorder_children(&mut document) {
        return Ok(false);
    }
    let serialized =
        serde_json::to_string_pretty(&document).map_err(|err| CatalogError::Reorder {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    fs::write(path, serialized).map_err(|err| CatalogError::Reorder {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(true)
}

#[derive(Debug, Clone, Serialize)]
pub struct SizeUpdateSummary {
    pub updated: usize,
    pub skipped: usize,
}

/// Parse the tab-separated size table (`<PN id>\t<name>\t<GB>`), header
/// line first. Rows with an unparseable size are skipped with a warning.
pub fn load_size_table(path: &Path) -> Result<BTreeMap<String, f64>, CatalogError> {
    let content = fs::read_to_string(path)
        .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;
    let mut table = BTreeMap::new();
    for line in content.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 3 {
            return Err(CatalogError::SizeTable(line.to_string()));
        }
        let pn_id = parts[0].trim().to_string();
        match parts[2].trim().parse::<f64>() {
            Ok(size_gb) => {
                table.insert(pn_id, size_gb);
            }
            Err(_) => {
                warn!(pn_id, raw = parts[2], "unparseable size, row skipped");
            }
        }
    }
    Ok(table)
}

/// Append `(total size: <n>GB)` to the description of every dataset
/// document whose directory carries a PublicnEUro id present in the
/// size table. Descriptions already carrying a size note are left
/// alone, as are the PN000003 tool sub-datasets (fsl/spm).
pub fn update_descriptions_with_sizes(
    metadata_root: &Path,
    size_table: &BTreeMap<String, f64>,
) -> Result<SizeUpdateSummary, CatalogError> {
    if !metadata_root.is_dir() {
        return Err(CatalogError::MetadataRootNotFound(
            metadata_root.to_path_buf(),
        ));
    }
    let pn_id_pattern = Regex::new(r"PN\d{6}")
        .map_err(|err| CatalogError::InvalidPattern(err.to_string()))?;

    let mut updated = 0;
    let mut skipped = 0;
    for dataset_dir in sorted_dirs(metadata_root)? {
        let directory = dir_name(&dataset_dir)?;
        if !directory.starts_with("PN") {
            continue;
        }
        if is_tool_subdataset(&directory) {
            debug!(directory, "tool sub-dataset, skipped");
            skipped += 1;
            continue;
        }
        let Some(pn_id) = pn_id_pattern
            .find(&directory)
            .map(|found| found.as_str().to_string())
        else {
            skipped += 1;
            continue;
        };
        let Some(size_gb) = size_table.get(&pn_id).copied() else {
            debug!(pn_id, "no size table entry");
            skipped += 1;
            continue;
        };
        for version_dir in sorted_dirs(&dataset_dir)? {
            let version = dir_name(&version_dir)?;
            if !version.starts_with('V') {
                continue;
            }
            let Some((path, mut document)) = first_dataset_document(&version_dir)? else {
                skipped += 1;
                continue;
            };
            if append_size_note(&mut document, size_gb) {
                let serialized = serde_json::to_string_pretty(&document)
                    .map_err(|err| CatalogError::Serialize(err.to_string()))?;
                fs::write(&path, serialized).map_err(|err| {
                    CatalogError::Filesystem(format!("{}: {err}", path.display()))
                })?;
                updated += 1;
            } else {
                skipped += 1;
            }
        }
    }
    Ok(SizeUpdateSummary { updated, skipped })
}

/// PN000003 ships fsl/spm tool snapshots as sub-datasets; they carry no
/// size entry of their own.
fn is_tool_subdataset(directory: &str) -> bool {
    let lower = directory.to_lowercase();
    lower.contains("pn000003") && (lower.contains("fsl") || lower.contains("spm"))
}

fn append_size_note(document: &mut Value, size_gb: f64) -> bool {
    let Some(description) = document.get("description").and_then(Value::as_str) else {
        return false;
    };
    if description.to_lowercase().contains("(total size:") {
        return false;
    }
    let noted = format!("{description} (total size: {size_gb}GB)");
    document["description"] = Value::String(noted);
    true
}

fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let reader = fs::read_dir(dir)
        .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", dir.display())))?;
    let mut children = Vec::new();
    for entry in reader {
        let entry =
            entry.map_err(|err| CatalogError::Filesystem(format!("{}: {err}", dir.display())))?;
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    Ok(sorted_children(dir)?
        .into_iter()
        .filter(|path| path.is_dir())
        .collect())
}

fn dir_name(path: &Path) -> Result<String, CatalogError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CatalogError::Filesystem(format!("non-utf8 directory name: {}", path.display()))
        })
}
