use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use pn_catalog_manager::app::{App, ExportTarget};
use pn_catalog_manager::config::ConfigLoader;
use pn_catalog_manager::datalad::SystemDataladClient;
use pn_catalog_manager::error::CatalogError;
use pn_catalog_manager::jsonl;
use pn_catalog_manager::locator::{self, DatasetPattern, ReorderMode};
use pn_catalog_manager::output::JsonOutput;
use pn_catalog_manager::workbook::ValidationMode;

#[derive(Parser)]
#[command(name = "pn-cat")]
#[command(about = "PublicnEUro dataset catalog toolkit: spreadsheet metadata to DOI XML, catalog JSONL and metadata-tree upkeep")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Normalize a metadata workbook and emit XML and/or JSONL")]
    Export(ExportArgs),
    #[command(about = "Inventory a dataset directory")]
    Scan(ScanArgs),
    #[command(about = "Append a data directory's file inventory to an emitted JSONL")]
    AttachFiles(AttachArgs),
    #[command(about = "Cross-link hasPart/isPartOf in an emitted JSONL")]
    LinkParts(LinkPartsArgs),
    #[command(about = "Locate datasets in the metadata tree, optionally reordering children")]
    Find(FindArgs),
    #[command(about = "Append total sizes to dataset descriptions from a TSV table")]
    UpdateSizes(UpdateSizesArgs),
    #[command(about = "Run the full pipeline: workbook to catalog import and reorder")]
    Process(ProcessArgs),
}

#[derive(Args)]
struct ExportArgs {
    workbook: PathBuf,

    #[arg(long, value_parser = ["xml", "jsonl", "both"], default_value = "both")]
    format: String,

    #[arg(long)]
    lenient: bool,
}

#[derive(Args)]
struct ScanArgs {
    data_dir: PathBuf,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct AttachArgs {
    jsonl: PathBuf,
    data_dir: PathBuf,
}

#[derive(Args)]
struct LinkPartsArgs {
    jsonl: PathBuf,
}

#[derive(Args)]
struct FindArgs {
    metadata_root: PathBuf,
    pattern: String,

    #[arg(long, value_parser = ["auto", "skip", "confirm"], default_value = "skip")]
    reorder: String,
}

#[derive(Args)]
struct UpdateSizesArgs {
    metadata_root: PathBuf,
    size_table: PathBuf,
}

#[derive(Args)]
struct ProcessArgs {
    workbook: PathBuf,
    data_dir: PathBuf,
    pattern: String,

    #[arg(long, default_value = "../DataCatalogue")]
    catalog: PathBuf,

    #[arg(long, default_value = "metadata")]
    metadata_root: PathBuf,

    #[arg(long, value_parser = ["auto", "skip", "confirm"], default_value = "auto")]
    reorder: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(catalog) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(catalog));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::MetadataRootNotFound(_)
        | CatalogError::DatasetNotFound(_)
        | CatalogError::WorkbookRead(_)
        | CatalogError::MissingSheet(_)
        | CatalogError::InvalidPattern(_)
        | CatalogError::ConfigRead(_) => 2,
        CatalogError::MissingTool(_) | CatalogError::ToolFailed(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let tool = SystemDataladClient::new(&config.catalog_tool);
    let app = App::new(config, tool);

    match cli.command {
        Commands::Export(args) => {
            let mode = if args.lenient {
                ValidationMode::Lenient
            } else {
                ValidationMode::Strict
            };
            let target = parse_target(&args.format);
            let result = app.export(&args.workbook, mode, target, &JsonOutput)?;
            JsonOutput::print_export(&result).into_diagnostic()?;
        }
        Commands::Scan(args) => {
            let result = app.scan(&args.data_dir, args.output.as_deref(), &JsonOutput)?;
            JsonOutput::print_scan(&result).into_diagnostic()?;
        }
        Commands::AttachFiles(args) => {
            let result = app.attach_files(&args.jsonl, &args.data_dir, &JsonOutput)?;
            JsonOutput::print_attach(&result).into_diagnostic()?;
        }
        Commands::LinkParts(args) => {
            let result = jsonl::link_parts(&args.jsonl)?;
            JsonOutput::print_link_parts(&result).into_diagnostic()?;
        }
        Commands::Find(args) => {
            let pattern: DatasetPattern = args.pattern.parse()?;
            let mode: ReorderMode = args.reorder.parse()?;
            let result = app.find(
                &args.metadata_root,
                &pattern,
                mode,
                &mut prompt_confirm,
                &JsonOutput,
            )?;
            JsonOutput::print_find(&result).into_diagnostic()?;
        }
        Commands::UpdateSizes(args) => {
            let table = locator::load_size_table(&args.size_table)?;
            let result = locator::update_descriptions_with_sizes(&args.metadata_root, &table)?;
            JsonOutput::print_sizes(&result).into_diagnostic()?;
        }
        Commands::Process(args) => {
            let pattern: DatasetPattern = args.pattern.parse()?;
            let mode: ReorderMode = args.reorder.parse()?;
            let result = app.process(
                &args.workbook,
                &args.data_dir,
                &args.catalog,
                &args.metadata_root,
                &pattern,
                mode,
                &mut prompt_confirm,
                &JsonOutput,
            )?;
            JsonOutput::print_process(&result).into_diagnostic()?;
        }
    }
    Ok(())
}

fn parse_target(raw: &str) -> ExportTarget {
    match raw {
        "xml" => ExportTarget::Xml,
        "jsonl" => ExportTarget::Jsonl,
        _ => ExportTarget::Both,
    }
}

fn prompt_confirm(key: &pn_catalog_manager::domain::DatasetKey) -> bool {
    eprint!("reorder children of {key}? [y/N] ");
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
