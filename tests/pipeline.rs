use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Value, json};

use pn_catalog_manager::app::App;
use pn_catalog_manager::config::{Config, ConfigLoader};
use pn_catalog_manager::datalad::{CatalogTool, ToolOutcome};
use pn_catalog_manager::error::CatalogError;
use pn_catalog_manager::jsonl::{self, SourceAttribution};
use pn_catalog_manager::locator::{DatasetPattern, ReorderMode};
use pn_catalog_manager::output::JsonOutput;
use pn_catalog_manager::record::DatasetRecord;
use pn_catalog_manager::scan::scan_dataset_dir;

struct RecordingTool {
    validate_ok: bool,
    added: Mutex<Vec<PathBuf>>,
}

impl CatalogTool for RecordingTool {
    fn validate(&self, _metadata: &Path) -> Result<ToolOutcome, CatalogError> {
        Ok(ToolOutcome {
            ok: self.validate_ok,
            detail: (!self.validate_ok).then(|| "schema mismatch".to_string()),
        })
    }

    fn add(&self, _catalog: &Path, metadata: &Path) -> Result<(), CatalogError> {
        self.added.lock().unwrap().push(metadata.to_path_buf());
        Ok(())
    }

    fn version(&self) -> Option<String> {
        Some("datalad 1.1.0 (mock)".to_string())
    }
}

fn sample_record() -> DatasetRecord {
    let mut record = DatasetRecord::new();
    record.name = Some("Visual Cortex".to_string());
    record.dataset_id = Some("PN000011 Visual Cortex".to_string());
    record.dataset_version = Some("1".parse().unwrap());
    record
}

fn populate_data_dir(root: &Path) {
    fs::create_dir_all(root.join("sub-01/anat")).unwrap();
    fs::write(root.join("dataset_description.json"), b"{}").unwrap();
    fs::write(root.join("sub-01/anat/sub-01_T1w.nii.gz"), b"volume").unwrap();
    fs::create_dir_all(root.join("code")).unwrap();
    fs::write(root.join("code/analysis.json"), b"{}").unwrap();
    fs::write(root.join("notes.txt"), b"not payload").unwrap();
}

#[test]
fn scanner_never_emits_code_segments() {
    let temp = tempfile::tempdir().unwrap();
    populate_data_dir(temp.path());

    let entries = scan_dataset_dir(temp.path()).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(
        entries
            .iter()
            .all(|entry| entry.path.split('/').all(|segment| segment != "code"))
    );
}

#[test]
fn jsonl_round_trip_preserves_identity() {
    let temp = tempfile::tempdir().unwrap();
    let jsonl_path = temp.path().join("dataset.jsonl");
    let record = sample_record();
    jsonl::write_dataset_record(&record, &jsonl_path).unwrap();

    let reparsed = jsonl::read_dataset_record(&jsonl_path).unwrap();
    assert_eq!(reparsed.record_type, "dataset");
    assert_eq!(reparsed.dataset_id, record.dataset_id);
    assert_eq!(reparsed.dataset_version, record.dataset_version);
}

#[test]
fn append_then_link_parts_cross_links_every_file() {
    let temp = tempfile::tempdir().unwrap();
    let jsonl_path = temp.path().join("dataset.jsonl");
    let data_dir = temp.path().join("data");
    populate_data_dir(&data_dir);

    let record = sample_record();
    jsonl::write_dataset_record(&record, &jsonl_path).unwrap();
    let entries = scan_dataset_dir(&data_dir).unwrap();
    let attribution = SourceAttribution {
        source_name: "PublicnEUro".to_string(),
        agent_name: "Pipeline".to_string(),
    };
    let appended = jsonl::append_file_entries(&jsonl_path, &record, &entries, &attribution).unwrap();
    assert_eq!(appended, 2);

    let outcome = jsonl::link_parts(&jsonl_path).unwrap();
    assert_eq!(outcome.linked, 2);

    let content = fs::read_to_string(&jsonl_path).unwrap();
    let lines: Vec<Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines[0]["type"], "dataset");
    assert_eq!(
        lines[0]["hasPart"],
        json!(["dataset_description.json", "sub-01/anat/sub-01_T1w.nii.gz"])
    );
    for line in &lines[1..] {
        assert_eq!(line["isPartOf"], "PN000011 Visual Cortex");
    }
}

#[test]
fn find_reorders_in_auto_mode() {
    let temp = tempfile::tempdir().unwrap();
    let metadata_root = temp.path().join("metadata");
    let doc_path = metadata_root.join("PN000011 Visual Cortex/V1/set/dataset.json");
    fs::create_dir_all(doc_path.parent().unwrap()).unwrap();
    let document = json!({
        "type": "dataset",
        "children": [
            {"name": "sub-02", "type": "directory"},
            {"name": "source", "type": "directory"},
        ],
    });
    fs::write(&doc_path, serde_json::to_string(&document).unwrap()).unwrap();

    let config = ConfigLoader::resolve_config(Config::default()).unwrap();
    let app = App::new(
        config,
        RecordingTool {
            validate_ok: true,
            added: Mutex::new(Vec::new()),
        },
    );

    let pattern: DatasetPattern = "PN000011*/V1".parse().unwrap();
    let result = app
        .find(
            &metadata_root,
            &pattern,
            ReorderMode::Auto,
            &mut |_| unreachable!("auto mode never asks"),
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(result.found.len(), 1);
    assert_eq!(result.reordered, 1);
    assert!(result.found[0].reordered);

    let rewritten: Value = serde_json::from_str(&fs::read_to_string(&doc_path).unwrap()).unwrap();
    assert_eq!(rewritten["children"][0]["name"], "source");
}

#[test]
fn find_continues_when_one_rewrite_fails() {
    let temp = tempfile::tempdir().unwrap();
    let metadata_root = temp.path().join("metadata");
    let first = metadata_root.join("PN000011 Alpha/V1/set/dataset.json");
    let second = metadata_root.join("PN000012 Beta/V1/set/dataset.json");
    let document = json!({
        "type": "dataset",
        "children": [
            {"name": "sub-02", "type": "directory"},
            {"name": "source", "type": "directory"},
        ],
    });
    for path in [&first, &second] {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(&document).unwrap()).unwrap();
    }

    let config = ConfigLoader::resolve_config(Config::default()).unwrap();
    let app = App::new(
        config,
        RecordingTool {
            validate_ok: true,
            added: Mutex::new(Vec::new()),
        },
    );

    // The confirm hook corrupts the first document before approving its
    // rewrite, so that rewrite fails while the second still succeeds.
    let pattern: DatasetPattern = "PN00001*/V1".parse().unwrap();
    let corrupt = first.clone();
    let result = app
        .find(
            &metadata_root,
            &pattern,
            ReorderMode::Confirm,
            &mut |key| {
                if key.as_str().starts_with("PN000011") {
                    fs::write(&corrupt, "{broken").unwrap();
                }
                true
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.found.len(), 2);
    assert_eq!(result.reordered, 1);
    assert!(!result.found[0].reordered);
    assert!(result.found[1].reordered);

    assert_eq!(fs::read_to_string(&first).unwrap(), "{broken");
    let rewritten: Value = serde_json::from_str(&fs::read_to_string(&second).unwrap()).unwrap();
    assert_eq!(rewritten["children"][0]["name"], "source");
}
