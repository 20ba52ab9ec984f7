use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::config::ResolvedConfig;
use crate::datalad::CatalogTool;
use crate::domain::DatasetKey;
use crate::error::CatalogError;
use crate::jsonl;
use crate::locator::{self, DatasetPattern, ReorderMode};
use crate::record::{DatasetRecord, ValidationReport};
use crate::scan;
use crate::workbook::{self, ValidationMode};
use crate::xml;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Which decision gates the children rewrite of each located dataset.
/// `Confirm` asks the callback per dataset; the interactive prompt
/// lives in the CLI, not here.
pub type ConfirmFn<'a> = &'a mut dyn FnMut(&DatasetKey) -> bool;

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub xml_path: Option<String>,
    pub jsonl_path: Option<String>,
    pub complaints: ValidationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub entries: usize,
    pub total_bytes: u64,
    pub list_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachResult {
    pub appended: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindResult {
    pub found: Vec<FoundDataset>,
    pub reordered: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FoundDataset {
    pub key: DatasetKey,
    pub relative_path: String,
    pub version: String,
    pub reordered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub xml_path: String,
    pub jsonl_path: String,
    pub file_entries: usize,
    pub tool_validated: bool,
    pub found: Vec<FoundDataset>,
    pub reordered: usize,
}

/// Emitter selection for the export operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTarget {
    Xml,
    Jsonl,
    Both,
}

pub struct App<T: CatalogTool> {
    config: ResolvedConfig,
    tool: T,
}

impl<T: CatalogTool> App<T> {
    pub fn new(config: ResolvedConfig, tool: T) -> Self {
        Self { config, tool }
    }

    /// Normalize a workbook and emit the selected documents next to it
    /// (`<stem>.xml`, `<stem>.jsonl`).
    pub fn export(
        &self,
        workbook_path: &Path,
        mode: ValidationMode,
        target: ExportTarget,
        sink: &dyn ProgressSink,
    ) -> Result<ExportResult, CatalogError> {
        sink.event(ProgressEvent {
            message: format!("phase=Normalize; reading {}", workbook_path.display()),
            elapsed: None,
        });
        let book = workbook::read_workbook(workbook_path)?;
        let (record, report) = workbook::normalize(&book, mode)?;

        let xml_path = matches!(target, ExportTarget::Xml | ExportTarget::Both)
            .then(|| self.emit_xml(&record, workbook_path, sink))
            .transpose()?;
        let jsonl_path = matches!(target, ExportTarget::Jsonl | ExportTarget::Both)
            .then(|| self.emit_jsonl(&record, workbook_path, sink))
            .transpose()?;

        Ok(ExportResult {
            xml_path: xml_path.map(display_string),
            jsonl_path: jsonl_path.map(display_string),
            complaints: report,
        })
    }

    /// Inventory a dataset directory, optionally persisting the list.
    pub fn scan(
        &self,
        data_dir: &Path,
        list_path: Option<&Path>,
        sink: &dyn ProgressSink,
    ) -> Result<ScanResult, CatalogError> {
        sink.event(ProgressEvent {
            message: format!("phase=Scan; walking {}", data_dir.display()),
            elapsed: None,
        });
        let entries = scan::scan_dataset_dir(data_dir)?;
        if let Some(path) = list_path {
            scan::write_file_list(&entries, path)?;
        }
        Ok(ScanResult {
            entries: entries.len(),
            total_bytes: entries.iter().map(|entry| entry.contentbytesize).sum(),
            list_path: list_path.map(|path| display_string(path.to_path_buf())),
        })
    }

    /// Scan a data directory and append its file entries to an emitted
    /// dataset JSONL.
    pub fn attach_files(
        &self,
        jsonl_path: &Path,
        data_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<AttachResult, CatalogError> {
        let record = jsonl::read_dataset_record(jsonl_path)?;
        sink.event(ProgressEvent {
            message: format!("phase=Scan; walking {}", data_dir.display()),
            elapsed: None,
        });
        let entries = scan::scan_dataset_dir(data_dir)?;
        sink.event(ProgressEvent {
            message: format!("phase=Emit; appending {} file entries", entries.len()),
            elapsed: None,
        });
        let appended =
            jsonl::append_file_entries(jsonl_path, &record, &entries, &self.config.attribution)?;
        Ok(AttachResult { appended })
    }

    /// Locate datasets in the metadata tree and reorder their children
    /// per the caller's decision. A failed rewrite leaves that document
    /// untouched and does not stop the remaining matches.
    pub fn find(
        &self,
        metadata_root: &Path,
        pattern: &DatasetPattern,
        mode: ReorderMode,
        confirm: ConfirmFn<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<FindResult, CatalogError> {
        sink.event(ProgressEvent {
            message: format!("phase=Locate; pattern {pattern}"),
            elapsed: None,
        });
        let matches = locator::find_datasets(metadata_root, pattern)?;

        let mut found = Vec::new();
        let mut reordered = 0;
        for (key, located) in matches {
            let wanted = match mode {
                ReorderMode::Auto => true,
                ReorderMode::Skip => false,
                ReorderMode::Confirm => confirm(&key),
            };
            let changed = if wanted {
                match locator::reorder_children_in_place(&located.path) {
                    Ok(changed) => changed,
                    Err(err) => {
                        warn!(key = %key, error = %err, "reorder failed, document left as-is");
                        false
                    }
                }
            } else {
                false
            };
            if changed {
                reordered += 1;
            }
            found.push(FoundDataset {
                key,
                relative_path: located.relative_path,
                version: located.version,
                reordered: changed,
            });
        }
        Ok(FindResult { found, reordered })
    }

    /// The whole pipeline: normalize, emit both documents, attach the
    /// file inventory, hand the JSONL to the catalog tool, then locate
    /// the imported dataset and reorder its children. Tool validation
    /// failures warn and continue; import failures are fatal.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &self,
        workbook_path: &Path,
        data_dir: &Path,
        catalog_dir: &Path,
        metadata_root: &Path,
        pattern: &DatasetPattern,
        mode: ReorderMode,
        confirm: ConfirmFn<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessResult, CatalogError> {
        sink.event(ProgressEvent {
            message: format!("phase=Normalize; reading {}", workbook_path.display()),
            elapsed: None,
        });
        let book = workbook::read_workbook(workbook_path)?;
        let (record, report) = workbook::normalize(&book, ValidationMode::Strict)?;
        debug_assert!(report.is_clean());

        let xml_path = self.emit_xml(&record, workbook_path, sink)?;
        let jsonl_path = self.emit_jsonl(&record, workbook_path, sink)?;

        sink.event(ProgressEvent {
            message: format!("phase=Scan; walking {}", data_dir.display()),
            elapsed: None,
        });
        let entries = scan::scan_dataset_dir(data_dir)?;
        let file_entries =
            jsonl::append_file_entries(&jsonl_path, &record, &entries, &self.config.attribution)?;

        sink.event(ProgressEvent {
            message: "phase=Import; validating metadata".to_string(),
            elapsed: None,
        });
        let validation = self.tool.validate(&jsonl_path)?;
        if !validation.ok {
            warn!(
                detail = validation.detail.as_deref().unwrap_or("unknown"),
                "catalog validation failed, continuing with import",
            );
        }

        sink.event(ProgressEvent {
            message: format!("phase=Import; adding to {}", catalog_dir.display()),
            elapsed: None,
        });
        self.tool.add(catalog_dir, &jsonl_path)?;

        let find_result = self.find(metadata_root, pattern, mode, confirm, sink)?;
        if find_result.found.is_empty() {
            warn!(%pattern, "no dataset found in catalog after import");
        }

        Ok(ProcessResult {
            xml_path: display_string(xml_path),
            jsonl_path: display_string(jsonl_path),
            file_entries,
            tool_validated: validation.ok,
            found: find_result.found,
            reordered: find_result.reordered,
        })
    }

    fn emit_xml(
        &self,
        record: &DatasetRecord,
        workbook_path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, CatalogError> {
        let path = workbook_path.with_extension("xml");
        sink.event(ProgressEvent {
            message: format!("phase=Emit; writing {}", path.display()),
            elapsed: None,
        });
        xml::write_doi_batch(record, &self.config.xml, &path)?;
        Ok(path)
    }

    fn emit_jsonl(
        &self,
        record: &DatasetRecord,
        workbook_path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, CatalogError> {
        let path = workbook_path.with_extension("jsonl");
        sink.event(ProgressEvent {
            message: format!("phase=Emit; writing {}", path.display()),
            elapsed: None,
        });
        jsonl::write_dataset_record(record, &path)?;
        Ok(path)
    }
}

fn display_string(path: PathBuf) -> String {
    path.to_string_lossy().replace('\\', "/")
}
