use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;

/// Extensions recognized as dataset payload: BIDS sidecars and tabular
/// data, EEG/MEG/iEEG formats, imaging volumes, archives and logs.
const RECOGNIZED_EXTENSIONS: &[&str] = &[
    ".json", ".tsv", ".tsv.gz", ".nii", ".nii.gz", ".edf", ".vhdr", ".vmrk", ".eeg", ".set",
    ".fdt", ".bdf", ".zip", ".log", ".pcd", ".tsa", ".tst", ".tsm", ".tsp", ".wfb",
];

/// BIDS-standard plain text files carried without an extension.
const RECOGNIZED_BARE_NAMES: &[&str] = &["README", "CHANGES", "LICENSE", "CITATION"];

/// Directories whose contents never count as payload.
const EXCLUDED_DIR: &str = "code";

/// Source-data trees are not inventoried file by file; their immediate
/// subdirectories become stub entries with a recursive byte sum.
const SOURCE_DIRS: &[&str] = &["sourcedata", "source"];

/// One inventoried file (or source-data directory stub): root-relative
/// forward-slash path plus its size in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub contentbytesize: u64,
}

/// Walk a dataset directory and inventory every recognized payload file.
/// Unreadable directories are fatal; nothing is silently skipped.
pub fn scan_dataset_dir(root: &Path) -> Result<Vec<FileEntry>, CatalogError> {
    let mut entries = Vec::new();
    walk(root, root, &mut entries)?;
    Ok(entries)
}

fn walk(dir: &Path, root: &Path, entries: &mut Vec<FileEntry>) -> Result<(), CatalogError> {
    for path in sorted_children(dir)? {
        let name = file_name(&path)?;
        if path.is_dir() {
            if name == EXCLUDED_DIR {
                debug!(path = %path.display(), "skipping code directory");
                continue;
            }
            if SOURCE_DIRS.contains(&name.as_str()) {
                source_stubs(&path, root, entries)?;
                continue;
            }
            walk(&path, root, entries)?;
        } else if is_recognized(&name) {
            let size = fs::metadata(&path)
                .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?
                .len();
            entries.push(FileEntry {
                path: relative_path(&path, root)?,
                contentbytesize: size,
            });
        }
    }
    Ok(())
}

/// Each immediate subdirectory of a source-data tree becomes one stub
/// entry whose size is the recursive sum of its contents.
fn source_stubs(
    source_dir: &Path,
    root: &Path,
    entries: &mut Vec<FileEntry>,
) -> Result<(), CatalogError> {
    for path in sorted_children(source_dir)? {
        if path.is_dir() {
            entries.push(FileEntry {
                path: relative_path(&path, root)?,
                contentbytesize: dir_size(&path)?,
            });
        }
    }
    Ok(())
}

fn dir_size(dir: &Path) -> Result<u64, CatalogError> {
    let mut total = 0;
    for path in sorted_children(dir)? {
        if path.is_dir() {
            total += dir_size(&path)?;
        } else {
            total += fs::metadata(&path)
                .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?
                .len();
        }
    }
    Ok(total)
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

fn is_recognized(name: &str) -> bool {
    RECOGNIZED_BARE_NAMES.contains(&name)
        || RECOGNIZED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

fn file_name(path: &Path) -> Result<String, CatalogError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CatalogError::Filesystem(format!("non-utf8 file name: {}", path.display()))
        })
}

/// Root-relative path with forward slashes only.
fn relative_path(path: &Path, root: &Path) -> Result<String, CatalogError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        CatalogError::Filesystem(format!("path escapes scan root: {}", path.display()))
    })?;
    let relative = Utf8PathBuf::from_path_buf(relative.to_path_buf())
        .map_err(|_| CatalogError::Filesystem(format!("non-utf8 path: {}", path.display())))?;
    let segments: Vec<&str> = relative.components().map(|c| c.as_str()).collect();
    Ok(segments.join("/"))
}

/// Persist an inventory as newline-delimited JSON.
pub fn write_file_list(entries: &[FileEntry], path: &Path) -> Result<(), CatalogError> {
    let mut file = fs::File::create(path)
        .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|err| CatalogError::Serialize(err.to_string()))?;
        writeln!(file, "{line}")
            .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;
    }
    Ok(())
}
