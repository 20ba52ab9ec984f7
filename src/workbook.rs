use std::collections::BTreeMap;
use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook};
use tracing::debug;

use crate::domain::{BidsDatasetType, DatasetVersion, Doi, parse_keywords, parse_token_list};
use crate::error::CatalogError;
use crate::record::{
    Author, DatasetRecord, DisplayBlock, Funding, License, MetadataSource, MetadataSources,
    Publication, Section, ValidationReport,
};

pub const SHEET_DATASET_INFO: &str = "dataset_info";
pub const SHEET_PARTICIPANTS: &str = "participants_info";
pub const SHEET_DUA: &str = "DUA";
pub const SHEET_AUTHORS: &str = "authors";
pub const SHEET_FUNDING: &str = "funding";
pub const SHEET_PUBLICATIONS: &str = "publications";
pub const SHEET_CURATORS: &str = "dataset curators";

const DOWNLOAD_URL_BASE: &str = "https://datacatalog.publicneuro.eu/dataset/";
const LICENSE_NAME: &str = "Data User Agreement";

/// DUA text lives in two fixed cells of the DUA sheet: terms in A2,
/// restrictions in A3.
const DUA_TERMS_CELL: (usize, usize) = (1, 0);
const DUA_RESTRICTIONS_CELL: (usize, usize) = (2, 0);

/// Tabular sheets (authors, funding, publications, curators) carry two
/// header rows before the data.
const TABULAR_HEADER_ROWS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Fail on any missing required field.
    Strict,
    /// Return the best-effort record alongside the report.
    Lenient,
}

/// An in-memory spreadsheet: sheet name to rows of trimmed string cells.
/// Built from an `.xlsx` file via [`read_workbook`], or directly in tests.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: BTreeMap<String, Sheet>,
}

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn from_rows(rows: Vec<Vec<&str>>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    /// A trimmed, non-empty cell, or `None` when absent or blank.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        let value = self.rows.get(row)?.get(col)?.trim();
        (!value.is_empty()).then_some(value)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Key/value rows: column 0 is the key (newlines stripped, comment
    /// rows starting with `#` skipped), column 1 the value. Blank values
    /// are dropped entirely.
    fn key_values(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (index, _) in self.rows.iter().enumerate() {
            let Some(raw_key) = self.cell(index, 0) else {
                continue;
            };
            if raw_key.starts_with('#') {
                continue;
            }
            let key = raw_key.replace('\n', " ").trim().to_string();
            if let Some(value) = self.cell(index, 1) {
                map.insert(key, value.to_string());
            }
        }
        map
    }
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sheet(&mut self, name: &str, sheet: Sheet) {
        self.sheets.insert(name.to_string(), sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }
}

/// Read every sheet of an `.xlsx` file into string cells. Missing files
/// and unreadable workbooks are fatal.
pub fn read_workbook(path: &Path) -> Result<Workbook, CatalogError> {
    let mut xlsx: Xlsx<_> =
        open_workbook(path).map_err(|_| CatalogError::WorkbookRead(path.to_path_buf()))?;

    let mut workbook = Workbook::new();
    for name in xlsx.sheet_names().to_owned() {
        let range = xlsx
            .worksheet_range(&name)
            .map_err(|err| CatalogError::WorkbookParse(format!("sheet {name}: {err}")))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        workbook.insert_sheet(&name, Sheet { rows });
    }
    Ok(workbook)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.trim().to_string(),
        Data::Float(value) => float_to_string(*value),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => float_to_string(value.as_f64()),
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        Data::Error(err) => {
            debug!(?err, "cell error treated as blank");
            String::new()
        }
    }
}

/// Excel stores integers as floats; render `1.0` as `1` so versions and
/// participant counts round-trip.
fn float_to_string(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Normalize a workbook into a [`DatasetRecord`] plus a
/// [`ValidationReport`]. In strict mode any complaint is fatal; in
/// lenient mode the best-effort record is returned alongside the report.
pub fn normalize(
    workbook: &Workbook,
    mode: ValidationMode,
) -> Result<(DatasetRecord, ValidationReport), CatalogError> {
    let mut report = ValidationReport::new();
    let mut record = DatasetRecord::new();

    let info = dataset_info(workbook, &mut report);
    let pn_id = info.get("PN ID").cloned();
    let title = info.get("title").cloned();

    record.name = title.clone();
    record.description = info.get("description").cloned();
    if let (Some(pn_id), Some(title)) = (&pn_id, &title) {
        record.dataset_id = Some(format!("{pn_id} {title}"));
    }

    if let Some(raw) = info.get("dataset version") {
        match raw.parse::<DatasetVersion>() {
            Ok(version) => record.dataset_version = Some(version),
            Err(err) => report.add(Section::DatasetInfo, err.to_string()),
        }
    }
    if let Some(raw) = info.get("DOI") {
        match raw.parse::<Doi>() {
            Ok(doi) => record.doi = Some(doi),
            Err(err) => report.add(Section::DatasetInfo, err.to_string()),
        }
    }
    if let Some(raw) = info.get("keywords") {
        record.keywords = parse_keywords(raw);
    }
    if record.keywords.is_empty() {
        report.add(Section::DatasetInfo, "missing field: keywords");
    }

    if let (Some(pn_id), Some(title), Some(version)) = (&pn_id, &title, &record.dataset_version) {
        let url = format!("{DOWNLOAD_URL_BASE}{pn_id} {title}/{version}");
        record.download_url = Some(url.replace(' ', "%20"));
    }

    record.license = Some(License {
        name: LICENSE_NAME.to_string(),
    });
    record.authors = authors(workbook, &mut report);
    record.funding = funding(workbook, &mut report);
    record.publications = publications(workbook, &mut report);
    record.metadata_sources = curators(workbook, record.dataset_version.as_ref());

    let mut display = Vec::new();
    if let Some(block) = dataset_metadata_block(&info, &mut report) {
        display.push(block);
    }
    if let Some(block) = participants_block(workbook, &mut report) {
        display.push(block);
    }
    if let Some(block) = dua_block(workbook, &mut report) {
        display.push(block);
    }
    record.additional_display = display;

    if mode == ValidationMode::Strict && !report.is_clean() {
        let (section, complaints) = report
            .sections()
            .next()
            .map(|(section, complaints)| (section, complaints.join("; ")))
            .unwrap_or((Section::DatasetInfo, String::new()));
        return Err(CatalogError::Validation {
            section: section.to_string(),
            complaints,
        });
    }

    Ok((record, report))
}

fn dataset_info(workbook: &Workbook, report: &mut ValidationReport) -> BTreeMap<String, String> {
    let Some(sheet) = workbook.sheet(SHEET_DATASET_INFO) else {
        report.add(Section::DatasetInfo, "missing sheet: dataset_info");
        return BTreeMap::new();
    };
    let info = sheet.key_values();
    for field in ["PN ID", "title", "description", "dataset version", "DOI"] {
        if !info.contains_key(field) {
            report.add(Section::DatasetInfo, format!("missing field: {field}"));
        }
    }
    info
}

fn dataset_metadata_block(
    info: &BTreeMap<String, String>,
    report: &mut ValidationReport,
) -> Option<DisplayBlock> {
    let mut block = DisplayBlock::new("Dataset Metadata");
    if let Some(raw) = info.get("BIDS version") {
        block.insert_list("bids_version", vec![raw.clone()]);
    }
    if let Some(raw) = info.get("BIDS Dataset type") {
        match raw.parse::<BidsDatasetType>() {
            Ok(dataset_type) => {
                block.insert_list("bids_datasettype", vec![dataset_type.to_string()]);
            }
            Err(err) => report.add(Section::DatasetInfo, err.to_string()),
        }
    }
    if let Some(raw) = info.get("BIDS data type") {
        block.insert_list("bids_datatypes", parse_token_list(raw));
    }
    for key in [
        "NCBI Species Taxonomy",
        "Disease Ontology Name",
        "Disease Ontology ID",
        "SNOMED ID",
        "SNOMED label",
        "Cognitive Atlas concept(s)",
        "Cognitive Atlas task(s)",
    ] {
        if let Some(raw) = info.get(key) {
            block.insert_list(key, parse_token_list(raw));
        }
    }
    (!block.is_empty()).then_some(block)
}

fn participants_block(
    workbook: &Workbook,
    report: &mut ValidationReport,
) -> Option<DisplayBlock> {
    let Some(sheet) = workbook.sheet(SHEET_PARTICIPANTS) else {
        report.add(Section::Participants, "missing sheet: participants_info");
        return None;
    };
    let info = sheet.key_values();
    if !info.contains_key("Number of subjects") {
        report.add(Section::Participants, "missing field: Number of subjects");
    }

    let mut block = DisplayBlock::new("Participants");
    let fields = [
        ("total_number", "Number of subjects"),
        ("age_range", "Age range [min max]"),
        ("number_of_healthy", "Number of Healthy Controls"),
        ("number_of_patients", "Number of Patients"),
        ("number_of_biological_males", "Number of biological males"),
        (
            "number_of_biological_females",
            "Number of biological females",
        ),
    ];
    for (target, source) in fields {
        if let Some(value) = info.get(source) {
            // The age range cell reads `min max`; render it `min, max`.
            let value = if target == "age_range" {
                value.replace(' ', ", ")
            } else {
                value.clone()
            };
            block.insert_list(target, vec![value]);
        }
    }
    (!block.is_empty()).then_some(block)
}

fn dua_block(workbook: &Workbook, report: &mut ValidationReport) -> Option<DisplayBlock> {
    let Some(sheet) = workbook.sheet(SHEET_DUA) else {
        report.add(Section::Dua, "missing sheet: DUA");
        return None;
    };
    let terms = sheet.cell(DUA_TERMS_CELL.0, DUA_TERMS_CELL.1);
    let restrictions = sheet.cell(DUA_RESTRICTIONS_CELL.0, DUA_RESTRICTIONS_CELL.1);
    if terms.is_none() && restrictions.is_none() {
        report.add(Section::Dua, "missing DUA text");
        return None;
    }

    let mut block = DisplayBlock::new("DUA");
    if let Some(terms) = terms {
        block.insert_list("Terms", vec![terms.to_string()]);
    }
    if let Some(restrictions) = restrictions {
        block.insert_list("Restrictions", vec![restrictions.to_string()]);
    }
    Some(block)
}

fn authors(workbook: &Workbook, report: &mut ValidationReport) -> Vec<Author> {
    let Some(sheet) = workbook.sheet(SHEET_AUTHORS) else {
        report.add(Section::Authors, "missing sheet: authors");
        return Vec::new();
    };
    let authors: Vec<Author> = data_rows(sheet)
        .filter_map(|(index, _)| sheet.cell(index, 0))
        .map(Author::from_full_name)
        .collect();
    if authors.is_empty() {
        report.add(Section::Authors, "no authors listed");
    }
    authors
}

fn funding(workbook: &Workbook, report: &mut ValidationReport) -> Vec<Funding> {
    let Some(sheet) = workbook.sheet(SHEET_FUNDING) else {
        report.add(Section::Funding, "missing sheet: funding");
        return Vec::new();
    };
    data_rows(sheet)
        .filter_map(|(index, _)| {
            sheet.cell(index, 0).map(|name| Funding {
                name: name.to_string(),
                identifier: sheet.cell(index, 1).map(str::to_string),
            })
        })
        .collect()
}

fn publications(workbook: &Workbook, report: &mut ValidationReport) -> Vec<Publication> {
    let Some(sheet) = workbook.sheet(SHEET_PUBLICATIONS) else {
        report.add(Section::Publications, "missing sheet: publications");
        return Vec::new();
    };
    data_rows(sheet)
        .filter_map(|(index, _)| {
            sheet.cell(index, 0).map(|title| Publication {
                publication_type: "academic publication".to_string(),
                title: title.to_string(),
                date_published: sheet.cell(index, 1).map(str::to_string),
                doi: sheet.cell(index, 3).map(str::to_string),
                authors: sheet
                    .cell(index, 2)
                    .map(publication_author)
                    .into_iter()
                    .collect(),
            })
        })
        .collect()
}

/// Citation-style author cells may end in "et al."; drop that tail from
/// the family name.
fn publication_author(full_name: &str) -> Author {
    if full_name.contains("et al.") {
        let words: Vec<&str> = full_name.split_whitespace().collect();
        if words.len() > 3 {
            return Author {
                given_name: words[0].to_string(),
                family_name: words[1..words.len() - 2].join(" "),
            };
        }
    }
    Author::from_full_name(full_name)
}

fn curators(workbook: &Workbook, version: Option<&DatasetVersion>) -> Option<MetadataSources> {
    let sheet = workbook.sheet(SHEET_CURATORS)?;
    let source_version = version.map(ToString::to_string).unwrap_or_default();
    let sources: Vec<MetadataSource> = data_rows(sheet)
        .filter_map(|(index, _)| {
            sheet.cell(index, 0).map(|agent| MetadataSource {
                source_name: sheet.cell(index, 1).unwrap_or_default().to_string(),
                source_version: source_version.clone(),
                agent_name: agent.to_string(),
            })
        })
        .collect();
    (!sources.is_empty()).then_some(MetadataSources { sources })
}

fn data_rows(sheet: &Sheet) -> impl Iterator<Item = (usize, &Vec<String>)> {
    sheet
        .rows()
        .iter()
        .enumerate()
        .skip(TABULAR_HEADER_ROWS)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sample_workbook() -> Workbook {
        let mut workbook = Workbook::new();
        workbook.insert_sheet(
            SHEET_DATASET_INFO,
            Sheet::from_rows(vec![
                vec!["# Metadata record", ""],
                vec!["PN ID", "PN000011"],
                vec!["title", "Visual Cortex"],
                vec!["description", "A 7T fMRI study."],
                vec!["keywords", "fMRI, visual cortex, 7T"],
                vec!["dataset version", "1"],
                vec!["DOI", "https://doi.org/10.70883/VMIF5895"],
                vec!["BIDS version", "1.8.0"],
                vec!["BIDS Dataset type", "raw"],
                vec!["BIDS data type", "anat func"],
            ]),
        );
        workbook.insert_sheet(
            SHEET_PARTICIPANTS,
            Sheet::from_rows(vec![
                vec!["Group level information", ""],
                vec!["Number of subjects", "24"],
                vec!["Age range [min max]", "18 45"],
                vec!["Number of Healthy Controls", "24"],
            ]),
        );
        workbook.insert_sheet(
            SHEET_DUA,
            Sheet::from_rows(vec![
                vec!["Data Use Agreement"],
                vec!["You may use these data for research."],
                vec!["No reidentification attempts."],
            ]),
        );
        workbook.insert_sheet(
            SHEET_AUTHORS,
            Sheet::from_rows(vec![
                vec!["# authors"],
                vec!["full name"],
                vec!["Cyril Pernet"],
                vec!["Gitte Moos Knudsen"],
            ]),
        );
        workbook.insert_sheet(
            SHEET_FUNDING,
            Sheet::from_rows(vec![
                vec!["# funding"],
                vec!["funder", "grant"],
                vec!["Lundbeck Foundation", "R279-2018-1145"],
            ]),
        );
        workbook.insert_sheet(
            SHEET_PUBLICATIONS,
            Sheet::from_rows(vec![
                vec!["# publications"],
                vec!["title", "year", "authors", "doi"],
                vec![
                    "A fine paper",
                    "2023",
                    "Cyril Pernet et al. 2023",
                    "10.1000/xyz",
                ],
            ]),
        );
        workbook
    }

    #[test]
    fn normalize_complete_workbook() {
        let (record, report) = normalize(&sample_workbook(), ValidationMode::Strict).unwrap();
        assert!(report.is_clean());
        assert_eq!(record.dataset_id.as_deref(), Some("PN000011 Visual Cortex"));
        assert_eq!(
            record.dataset_version.as_ref().map(|v| v.as_str()),
            Some("V1")
        );
        assert_eq!(
            record.keywords,
            vec!["fMRI", "visual cortex", "7T"]
        );
        assert_eq!(record.authors.len(), 2);
        assert_eq!(
            record.download_url.as_deref(),
            Some("https://datacatalog.publicneuro.eu/dataset/PN000011%20Visual%20Cortex/V1")
        );
        let metadata = &record.additional_display[0];
        assert_eq!(metadata.name, "Dataset Metadata");
        assert_eq!(
            metadata.content["bids_datatypes"],
            serde_json::json!(["anat", "func"])
        );
    }

    #[test]
    fn missing_authors_is_lenient_by_default() {
        let mut workbook = sample_workbook();
        workbook.sheets.remove(SHEET_AUTHORS);
        let (record, report) = normalize(&workbook, ValidationMode::Lenient).unwrap();
        assert!(record.authors.is_empty());
        assert_eq!(report.section(Section::Authors).len(), 1);
    }

    #[test]
    fn missing_authors_fails_strict() {
        let mut workbook = sample_workbook();
        workbook.sheets.remove(SHEET_AUTHORS);
        let err = normalize(&workbook, ValidationMode::Strict).unwrap_err();
        assert_matches!(err, CatalogError::Validation { .. });
    }

    #[test]
    fn invalid_bids_dataset_type_is_reported() {
        let mut workbook = sample_workbook();
        workbook.insert_sheet(
            SHEET_DATASET_INFO,
            Sheet::from_rows(vec![
                vec!["PN ID", "PN000011"],
                vec!["title", "Visual Cortex"],
                vec!["description", "A study."],
                vec!["keywords", "fMRI"],
                vec!["dataset version", "1"],
                vec!["DOI", "VMIF5895"],
                vec!["BIDS Dataset type", "processed"],
            ]),
        );
        let (record, report) = normalize(&workbook, ValidationMode::Lenient).unwrap();
        assert!(!report.section(Section::DatasetInfo).is_empty());
        // The invalid value is dropped, not emitted.
        let block = record
            .additional_display
            .iter()
            .find(|block| block.name == "Dataset Metadata");
        assert!(
            block.is_none_or(|block| !block.content.contains_key("bids_datasettype"))
        );
    }

    #[test]
    fn doubled_version_prefix_normalizes() {
        let mut workbook = sample_workbook();
        workbook.insert_sheet(
            SHEET_DATASET_INFO,
            Sheet::from_rows(vec![
                vec!["PN ID", "PN000011"],
                vec!["title", "Visual Cortex"],
                vec!["description", "A study."],
                vec!["keywords", "fMRI"],
                vec!["dataset version", "VV1"],
                vec!["DOI", "VMIF5895"],
            ]),
        );
        let (record, _) = normalize(&workbook, ValidationMode::Lenient).unwrap();
        assert_eq!(
            record.dataset_version.as_ref().map(|v| v.as_str()),
            Some("V1")
        );
    }

    #[test]
    fn dua_cells_are_fixed() {
        let (record, _) = normalize(&sample_workbook(), ValidationMode::Lenient).unwrap();
        let dua = record
            .additional_display
            .iter()
            .find(|block| block.name == "DUA")
            .unwrap();
        assert_eq!(
            dua.content["Terms"],
            serde_json::json!(["You may use these data for research."])
        );
        assert_eq!(
            dua.content["Restrictions"],
            serde_json::json!(["No reidentification attempts."])
        );
    }
}
