use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("invalid dataset version: {0}")]
    InvalidVersion(String),

    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid BIDS dataset type (expected raw or derivatives): {0}")]
    InvalidBidsDatasetType(String),

    #[error("invalid dataset pattern: {0}")]
    InvalidPattern(String),

    #[error("failed to read workbook at {0}")]
    WorkbookRead(PathBuf),

    #[error("workbook parse failed: {0}")]
    WorkbookParse(String),

    #[error("missing sheet: {0}")]
    MissingSheet(String),

    #[error("metadata validation failed in section {section}: {complaints}")]
    Validation { section: String, complaints: String },

    #[error("metadata directory not found: {0}")]
    MetadataRootNotFound(PathBuf),

    #[error("dataset not found in catalog: {0}")]
    DatasetNotFound(String),

    #[error("failed to serialize record: {0}")]
    Serialize(String),

    #[error("XML write failed: {0}")]
    XmlWrite(String),

    #[error("reorder aborted for {path}: {reason}")]
    Reorder { path: PathBuf, reason: String },

    #[error("malformed catalog JSONL {path}: {reason}")]
    MalformedJsonl { path: PathBuf, reason: String },

    #[error("malformed size table entry: {0}")]
    SizeTable(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("catalog tool failed: {0}")]
    ToolFailed(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
