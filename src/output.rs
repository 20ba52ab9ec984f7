use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    AttachResult, ExportResult, FindResult, ProcessResult, ProgressEvent, ProgressSink, ScanResult,
};
use crate::jsonl::LinkPartsOutcome;
use crate::locator::SizeUpdateSummary;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_export(result: &ExportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_scan(result: &ScanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_attach(result: &AttachResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_link_parts(result: &LinkPartsOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_find(result: &FindResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_sizes(result: &SizeUpdateSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_process(result: &ProcessResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
