use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CatalogError;
use crate::record::{DatasetRecord, MetadataSource, MetadataSources};
use crate::scan::FileEntry;

/// Attribution attached to every appended file line.
#[derive(Debug, Clone)]
pub struct SourceAttribution {
    pub source_name: String,
    pub agent_name: String,
}

/// Catalog file item: one JSONL line per inventoried file, linked to its
/// dataset by id and version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFileItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub dataset_id: String,
    pub dataset_version: String,
    pub path: String,
    pub contentbytesize: u64,
    pub metadata_sources: MetadataSources,
}

/// Write the dataset record as the first (and only) line of a fresh
/// JSONL file. The write goes through a temp file in the same directory.
pub fn write_dataset_record(record: &DatasetRecord, path: &Path) -> Result<(), CatalogError> {
    let line =
        serde_json::to_string(record).map_err(|err| CatalogError::Serialize(err.to_string()))?;
    write_atomic(path, format!("{line}\n").as_bytes())
}

/// Append one `type: "file"` line per inventory entry to an existing
/// dataset JSONL. Appending never touches the dataset line already in
/// the file. Paths are normalized to forward slashes.
pub fn append_file_entries(
    path: &Path,
    record: &DatasetRecord,
    entries: &[FileEntry],
    attribution: &SourceAttribution,
) -> Result<usize, CatalogError> {
    let dataset_id = record
        .dataset_id
        .as_deref()
        .ok_or_else(|| CatalogError::Serialize("dataset record has no dataset_id".to_string()))?
        .trim()
        .to_string();
    let dataset_version = record
        .dataset_version
        .as_ref()
        .ok_or_else(|| {
            CatalogError::Serialize("dataset record has no dataset_version".to_string())
        })?
        .to_string();

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;

    for entry in entries {
        let item = CatalogFileItem {
            item_type: "file".to_string(),
            dataset_id: dataset_id.clone(),
            dataset_version: dataset_version.clone(),
            path: entry.path.replace('\\', "/"),
            contentbytesize: entry.contentbytesize,
            metadata_sources: MetadataSources {
                sources: vec![MetadataSource {
                    source_name: attribution.source_name.clone(),
                    source_version: dataset_version.clone(),
                    agent_name: attribution.agent_name.clone(),
                }],
            },
        };
        let line = serde_json::to_string(&item)
            .map_err(|err| CatalogError::Serialize(err.to_string()))?;
        writeln!(file, "{line}")
            .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;
    }
    Ok(entries.len())
}

/// Parse the dataset record back out of an emitted JSONL's first line.
pub fn read_dataset_record(path: &Path) -> Result<DatasetRecord, CatalogError> {
    let content = fs::read_to_string(path)
        .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;
    let first = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| CatalogError::MalformedJsonl {
            path: path.to_path_buf(),
            reason: "empty file".to_string(),
        })?;
    serde_json::from_str(first).map_err(|err| CatalogError::MalformedJsonl {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkPartsOutcome {
    pub file_lines: usize,
    pub linked: usize,
}

/// Cross-link an emitted catalog JSONL: add `hasPart` (sorted file
/// paths) to the dataset line and `isPartOf` to every file line, both
/// only where absent. Stray whitespace in `dataset_id` is trimmed.
pub fn link_parts(path: &Path) -> Result<LinkPartsOutcome, CatalogError> {
    let content = fs::read_to_string(path)
        .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let first = lines.next().ok_or_else(|| CatalogError::MalformedJsonl {
        path: path.to_path_buf(),
        reason: "empty file".to_string(),
    })?;
    let mut dataset: Value =
        serde_json::from_str(first).map_err(|err| CatalogError::MalformedJsonl {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    if dataset.get("type").and_then(Value::as_str) != Some("dataset") {
        return Err(CatalogError::MalformedJsonl {
            path: path.to_path_buf(),
            reason: "first line is not a dataset record".to_string(),
        });
    }

    trim_dataset_id(&mut dataset);
    let dataset_id = dataset
        .get("dataset_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut file_items = Vec::new();
    let mut file_paths = Vec::new();
    for line in lines {
        let mut item: Value =
            serde_json::from_str(line).map_err(|err| CatalogError::MalformedJsonl {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        if item.get("type").and_then(Value::as_str) == Some("file") {
            if let Some(file_path) = item.get("path").and_then(Value::as_str) {
                file_paths.push(file_path.to_string());
            }
            trim_dataset_id(&mut item);
        }
        file_items.push(item);
    }

    if dataset.get("hasPart").is_none() {
        file_paths.sort();
        dataset["hasPart"] = Value::Array(file_paths.into_iter().map(Value::String).collect());
    }

    let mut linked = 0;
    for item in &mut file_items {
        if item.get("type").and_then(Value::as_str) == Some("file")
            && item.get("isPartOf").is_none()
        {
            item["isPartOf"] = Value::String(dataset_id.clone());
            linked += 1;
        }
    }

    let mut buffer = String::new();
    buffer.push_str(
        &serde_json::to_string(&dataset).map_err(|err| CatalogError::Serialize(err.to_string()))?,
    );
    buffer.push('\n');
    for item in &file_items {
        buffer.push_str(
            &serde_json::to_string(item).map_err(|err| CatalogError::Serialize(err.to_string()))?,
        );
        buffer.push('\n');
    }
    write_atomic(path, buffer.as_bytes())?;

    Ok(LinkPartsOutcome {
        file_lines: file_items.len(),
        linked,
    })
}

fn trim_dataset_id(value: &mut Value) {
    if let Some(id) = value.get("dataset_id").and_then(Value::as_str) {
        let trimmed = id.trim().to_string();
        value["dataset_id"] = Value::String(trimmed);
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), CatalogError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".pn-cat")
        .tempfile_in(parent)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DatasetVersion;

    fn sample_record() -> DatasetRecord {
        let mut record = DatasetRecord::new();
        record.name = Some("Visual Cortex".to_string());
        record.dataset_id = Some("PN000011 Visual Cortex".to_string());
        record.dataset_version = Some("1".parse::<DatasetVersion>().unwrap());
        record
    }

    #[test]
    fn dataset_line_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dataset.jsonl");
        let record = sample_record();
        write_dataset_record(&record, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["type"], "dataset");
        assert_eq!(parsed["dataset_id"], "PN000011 Visual Cortex");
        assert_eq!(parsed["dataset_version"], "V1");
    }

    #[test]
    fn appending_preserves_dataset_line() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dataset.jsonl");
        let record = sample_record();
        write_dataset_record(&record, &path).unwrap();

        let entries = vec![
            FileEntry {
                path: "sub-01\\anat\\sub-01_T1w.nii.gz".to_string(),
                contentbytesize: 7,
            },
            FileEntry {
                path: "README".to_string(),
                contentbytesize: 3,
            },
        ];
        let attribution = SourceAttribution {
            source_name: "PublicnEUro".to_string(),
            agent_name: "Pipeline".to_string(),
        };
        append_file_entries(&path, &record, &entries, &attribution).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let dataset: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(dataset["type"], "dataset");

        let file_item: CatalogFileItem = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(file_item.path, "sub-01/anat/sub-01_T1w.nii.gz");
        assert_eq!(file_item.dataset_version, "V1");
        assert_eq!(file_item.metadata_sources.sources.len(), 1);
        assert_eq!(
            file_item.metadata_sources.sources[0].source_version,
            "V1"
        );
    }

    #[test]
    fn link_parts_adds_haspart_and_ispartof() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dataset.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"type\":\"dataset\",\"dataset_id\":\"PN000011 Visual Cortex \"}\n",
                "{\"type\":\"file\",\"dataset_id\":\"PN000011 Visual Cortex \",\"path\":\"b.json\"}\n",
                "{\"type\":\"file\",\"dataset_id\":\"PN000011 Visual Cortex \",\"path\":\"a.json\"}\n",
            ),
        )
        .unwrap();

        let outcome = link_parts(&path).unwrap();
        assert_eq!(outcome.file_lines, 2);
        assert_eq!(outcome.linked, 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0]["hasPart"], serde_json::json!(["a.json", "b.json"]));
        assert_eq!(lines[0]["dataset_id"], "PN000011 Visual Cortex");
        assert_eq!(lines[1]["isPartOf"], "PN000011 Visual Cortex");
        assert_eq!(lines[2]["isPartOf"], "PN000011 Visual Cortex");
    }

    #[test]
    fn link_parts_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dataset.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"type\":\"dataset\",\"dataset_id\":\"PN000011 X\"}\n",
                "{\"type\":\"file\",\"dataset_id\":\"PN000011 X\",\"path\":\"a.json\"}\n",
            ),
        )
        .unwrap();

        link_parts(&path).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        let outcome = link_parts(&path).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(outcome.linked, 0);
    }

    #[test]
    fn link_parts_rejects_non_dataset_first_line() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dataset.jsonl");
        fs::write(&path, "{\"type\":\"file\",\"path\":\"a.json\"}\n").unwrap();
        let err = link_parts(&path).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedJsonl { .. }));
    }
}
