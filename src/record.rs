use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{DatasetVersion, Doi};

/// One dataset's normalized metadata, produced by the workbook
/// normalizer and consumed immutably by both emitters. Blank fields are
/// dropped from serialization rather than emitted as empty values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetRecord {
    #[serde(rename = "type", default = "dataset_type")]
    pub record_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_version: Option<DatasetVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<Doi>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funding: Vec<Funding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publications: Vec<Publication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_sources: Option<MetadataSources>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_display: Vec<DisplayBlock>,
}

fn dataset_type() -> String {
    "dataset".to_string()
}

impl DatasetRecord {
    pub fn new() -> Self {
        Self {
            record_type: dataset_type(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "givenName")]
    pub given_name: String,
    #[serde(rename = "familyName")]
    pub family_name: String,
}

impl Author {
    /// Split a full name on the first space: given name first, the rest
    /// is the family name.
    pub fn from_full_name(full_name: &str) -> Self {
        let trimmed = full_name.trim();
        match trimmed.split_once(' ') {
            Some((given, family)) => Self {
                given_name: given.to_string(),
                family_name: family.trim().to_string(),
            },
            None => Self {
                given_name: trimmed.to_string(),
                family_name: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funding {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(rename = "type")]
    pub publication_type: String,
    pub title: String,
    #[serde(rename = "datePublished", skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSources {
    pub sources: Vec<MetadataSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSource {
    pub source_name: String,
    pub source_version: String,
    pub agent_name: String,
}

/// A named block inside `additional_display` (dataset metadata,
/// participants counts, DUA text).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayBlock {
    pub name: String,
    pub content: Map<String, Value>,
}

impl DisplayBlock {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            content: Map::new(),
        }
    }

    pub fn insert_list(&mut self, key: &str, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        self.content.insert(
            key.to_string(),
            Value::Array(values.into_iter().map(Value::String).collect()),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Spreadsheet sections the validator reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    DatasetInfo,
    Participants,
    Dua,
    Authors,
    Funding,
    Publications,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::DatasetInfo => "dataset_info",
            Section::Participants => "participants",
            Section::Dua => "dua",
            Section::Authors => "authors",
            Section::Funding => "funding",
            Section::Publications => "publications",
        };
        write!(f, "{name}")
    }
}

/// Per-section complaints collected while normalizing a workbook.
/// Ephemeral: produced and consumed within one normalizer call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    complaints: BTreeMap<Section, Vec<String>>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, section: Section, complaint: impl Into<String>) {
        self.complaints
            .entry(section)
            .or_default()
            .push(complaint.into());
    }

    pub fn is_clean(&self) -> bool {
        self.complaints.is_empty()
    }

    pub fn section(&self, section: Section) -> &[String] {
        self.complaints
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn sections(&self) -> impl Iterator<Item = (Section, &[String])> {
        self.complaints
            .iter()
            .map(|(section, complaints)| (*section, complaints.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_split_on_first_space() {
        let author = Author::from_full_name("Cyril Pernet");
        assert_eq!(author.given_name, "Cyril");
        assert_eq!(author.family_name, "Pernet");

        let compound = Author::from_full_name("Gitte Moos Knudsen");
        assert_eq!(compound.given_name, "Gitte");
        assert_eq!(compound.family_name, "Moos Knudsen");
    }

    #[test]
    fn empty_fields_are_omitted() {
        let record = DatasetRecord::new();
        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object["type"], "dataset");
    }

    #[test]
    fn display_block_skips_empty_lists() {
        let mut block = DisplayBlock::new("Dataset Metadata");
        block.insert_list("bids_datatypes", Vec::new());
        assert!(block.is_empty());
        block.insert_list("bids_datatypes", vec!["anat".to_string()]);
        assert!(!block.is_empty());
    }

    #[test]
    fn report_tracks_sections() {
        let mut report = ValidationReport::new();
        assert!(report.is_clean());
        report.add(Section::Authors, "sheet missing");
        assert!(!report.is_clean());
        assert_eq!(report.section(Section::Authors).len(), 1);
        assert!(report.section(Section::Funding).is_empty());
    }
}
