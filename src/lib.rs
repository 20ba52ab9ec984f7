pub mod app;
pub mod config;
pub mod datalad;
pub mod domain;
pub mod error;
pub mod jsonl;
pub mod locator;
pub mod output;
pub mod record;
pub mod scan;
pub mod workbook;
pub mod xml;
