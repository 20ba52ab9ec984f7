use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::error::CatalogError;

/// Outcome of a tool invocation that the pipeline treats as advisory.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub ok: bool,
    pub detail: Option<String>,
}

/// External catalog import tool. The pipeline hands it the emitted
/// JSONL; schema compliance is the tool's concern, not ours.
pub trait CatalogTool {
    /// Validate a metadata file. Failures are reported, never fatal.
    fn validate(&self, metadata: &Path) -> Result<ToolOutcome, CatalogError>;

    /// Import a metadata file into a catalog. Failures are fatal.
    fn add(&self, catalog: &Path, metadata: &Path) -> Result<(), CatalogError>;

    fn version(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub enum ToolStatus {
    Ready,
    Missing { message: String },
}

/// Drives the `datalad` executable found on PATH (or at an explicit
/// path from the config file).
#[derive(Clone)]
pub struct SystemDataladClient {
    datalad: Option<PathBuf>,
}

impl SystemDataladClient {
    pub fn new(program: &str) -> Self {
        let datalad = if program.contains(std::path::MAIN_SEPARATOR) {
            let path = PathBuf::from(program);
            path.exists().then_some(path)
        } else {
            find_in_path(program)
        };
        Self { datalad }
    }

    pub fn tool_status(&self) -> ToolStatus {
        match &self.datalad {
            Some(_) => ToolStatus::Ready,
            None => ToolStatus::Missing {
                message: "missing datalad (catalog import tool)".to_string(),
            },
        }
    }

    fn require_datalad(&self) -> Result<&PathBuf, CatalogError> {
        self.datalad
            .as_ref()
            .ok_or_else(|| CatalogError::MissingTool("datalad".to_string()))
    }

    fn run_cmd(&self, args: &[String]) -> Result<(), CatalogError> {
        let program = self.require_datalad()?;
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| CatalogError::ToolFailed(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {} {}", program.display(), args.join(" "))
        } else {
            stderr
        };
        Err(CatalogError::ToolFailed(message))
    }
}

impl CatalogTool for SystemDataladClient {
    fn validate(&self, metadata: &Path) -> Result<ToolOutcome, CatalogError> {
        let args = vec![
            "catalog-validate".to_string(),
            "--metadata".to_string(),
            metadata.to_string_lossy().to_string(),
        ];
        match self.run_cmd(&args) {
            Ok(()) => Ok(ToolOutcome {
                ok: true,
                detail: None,
            }),
            Err(CatalogError::MissingTool(tool)) => Err(CatalogError::MissingTool(tool)),
            Err(err) => Ok(ToolOutcome {
                ok: false,
                detail: Some(err.to_string()),
            }),
        }
    }

    fn add(&self, catalog: &Path, metadata: &Path) -> Result<(), CatalogError> {
        let args = vec![
            "catalog-add".to_string(),
            "--catalog".to_string(),
            catalog.to_string_lossy().to_string(),
            "--metadata".to_string(),
            metadata.to_string_lossy().to_string(),
        ];
        self.run_cmd(&args)
    }

    fn version(&self) -> Option<String> {
        let program = self.datalad.as_ref()?;
        let output = Command::new(program).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() { None } else { Some(stdout) }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
