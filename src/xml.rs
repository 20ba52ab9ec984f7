use std::io::{Cursor, Write as _};
use std::path::Path;

use chrono::{DateTime, Datelike, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::CatalogError;
use crate::record::DatasetRecord;

const CROSSREF_NS: &str = "http://www.crossref.org/schema/5.3.0";
const CROSSREF_VERSION: &str = "5.3.0";
const SCHEMA_LOCATION: &str =
    "http://www.crossref.org/schema/5.3.0 https://www.crossref.org/schemas/crossref5.3.0.xsd";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const JATS_NS: &str = "http://www.ncbi.nlm.nih.gov/JATS1";
const FUNDREF_NS: &str = "http://www.crossref.org/fundref.xsd";
const ACCESS_NS: &str = "http://www.crossref.org/AccessIndicators.xsd";
const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

/// Registration-batch settings threaded through each serialization call
/// rather than held as process-wide state.
#[derive(Debug, Clone)]
pub struct XmlConfig {
    pub batch_id: String,
    pub depositor_name: String,
    pub depositor_email: String,
    pub registrant: String,
    pub collection_title: String,
    pub indent_width: usize,
}

impl Default for XmlConfig {
    fn default() -> Self {
        Self {
            batch_id: "Neurobiology Research Unit".to_string(),
            depositor_name: "PublicNeuro".to_string(),
            depositor_email: "publicneuro@nru.dk".to_string(),
            registrant: "Neurobiology Research Unit, Rigshospitalet, Denmark".to_string(),
            collection_title: "PublicNeuro Datasets".to_string(),
            indent_width: 4,
        }
    }
}

/// Render a Crossref 5.3.0 `doi_batch` registration document for one
/// dataset record. Absent optional fields omit their element entirely.
pub fn doi_batch_string(
    record: &DatasetRecord,
    config: &XmlConfig,
    now: DateTime<Utc>,
) -> Result<String, CatalogError> {
    let mut writer = Writer::new_with_indent(
        Cursor::new(Vec::new()),
        b' ',
        config.indent_width,
    );
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut root = BytesStart::new("doi_batch");
    root.push_attribute(("xmlns:xsi", XSI_NS));
    root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
    root.push_attribute(("xmlns", CROSSREF_NS));
    root.push_attribute(("xmlns:jats", JATS_NS));
    root.push_attribute(("xmlns:fr", FUNDREF_NS));
    root.push_attribute(("xmlns:ai", ACCESS_NS));
    root.push_attribute(("xmlns:mml", MATHML_NS));
    root.push_attribute(("version", CROSSREF_VERSION));
    writer.write_event(Event::Start(root)).map_err(xml_err)?;

    write_head(&mut writer, config, now)?;
    write_body(&mut writer, record, config, now)?;

    writer
        .write_event(Event::End(BytesEnd::new("doi_batch")))
        .map_err(xml_err)?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|err| CatalogError::XmlWrite(err.to_string()))
}

/// Write the registration document to disk.
pub fn write_doi_batch(
    record: &DatasetRecord,
    config: &XmlConfig,
    path: &Path,
) -> Result<(), CatalogError> {
    let document = doi_batch_string(record, config, Utc::now())?;
    let mut file = std::fs::File::create(path)
        .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;
    file.write_all(document.as_bytes())
        .map_err(|err| CatalogError::Filesystem(format!("{}: {err}", path.display())))?;
    Ok(())
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn write_head(
    writer: &mut XmlWriter,
    config: &XmlConfig,
    now: DateTime<Utc>,
) -> Result<(), CatalogError> {
    start(writer, "head")?;
    text_element(writer, "doi_batch_id", &config.batch_id)?;
    // Batch timestamps carry day resolution: YYYYMMDD plus eight zeros.
    text_element(
        writer,
        "timestamp",
        &format!("{}00000000", now.format("%Y%m%d")),
    )?;
    start(writer, "depositor")?;
    text_element(writer, "depositor_name", &config.depositor_name)?;
    text_element(writer, "email_address", &config.depositor_email)?;
    end(writer, "depositor")?;
    text_element(writer, "registrant", &config.registrant)?;
    end(writer, "head")
}

fn write_body(
    writer: &mut XmlWriter,
    record: &DatasetRecord,
    config: &XmlConfig,
    now: DateTime<Utc>,
) -> Result<(), CatalogError> {
    start(writer, "body")?;
    start(writer, "database")?;

    let mut database_metadata = BytesStart::new("database_metadata");
    database_metadata.push_attribute(("language", "en"));
    writer
        .write_event(Event::Start(database_metadata))
        .map_err(xml_err)?;
    start(writer, "titles")?;
    text_element(writer, "title", &config.collection_title)?;
    if let Some(dataset_id) = &record.dataset_id {
        text_element(writer, "subtitle", dataset_id)?;
    }
    end(writer, "titles")?;
    end(writer, "database_metadata")?;

    let mut dataset = BytesStart::new("dataset");
    dataset.push_attribute(("dataset_type", "record"));
    writer.write_event(Event::Start(dataset)).map_err(xml_err)?;

    if !record.authors.is_empty() {
        start(writer, "contributors")?;
        for (index, author) in record.authors.iter().enumerate() {
            let mut person = BytesStart::new("person_name");
            person.push_attribute((
                "sequence",
                if index == 0 { "first" } else { "additional" },
            ));
            person.push_attribute(("contributor_role", "author"));
            writer.write_event(Event::Start(person)).map_err(xml_err)?;
            text_element(writer, "given_name", &author.given_name)?;
            text_element(writer, "surname", &author.family_name)?;
            end(writer, "person_name")?;
        }
        end(writer, "contributors")?;
    }

    if let Some(name) = &record.name {
        start(writer, "titles")?;
        text_element(writer, "title", &format!("{name} Data"))?;
        end(writer, "titles")?;
    }

    start(writer, "database_date")?;
    start(writer, "publication_date")?;
    text_element(writer, "month", &format!("{:02}", now.month()))?;
    text_element(writer, "day", &format!("{:02}", now.day()))?;
    text_element(writer, "year", &now.year().to_string())?;
    end(writer, "publication_date")?;
    end(writer, "database_date")?;

    if let Some(description) = &record.description {
        let mut element = BytesStart::new("description");
        element.push_attribute(("language", "en"));
        writer.write_event(Event::Start(element)).map_err(xml_err)?;
        writer
            .write_event(Event::Text(BytesText::new(description)))
            .map_err(xml_err)?;
        end(writer, "description")?;
    }

    if record.doi.is_some() || record.download_url.is_some() {
        start(writer, "doi_data")?;
        if let Some(doi) = &record.doi {
            text_element(writer, "doi", &doi.as_identifier())?;
        }
        if let Some(url) = &record.download_url {
            text_element(writer, "resource", url)?;
        }
        end(writer, "doi_data")?;
    }

    end(writer, "dataset")?;
    end(writer, "database")?;
    end(writer, "body")
}

fn start(writer: &mut XmlWriter, name: &str) -> Result<(), CatalogError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<(), CatalogError> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), CatalogError> {
    start(writer, name)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    end(writer, name)
}

fn xml_err(err: impl std::fmt::Display) -> CatalogError {
    CatalogError::XmlWrite(err.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::{DatasetVersion, Doi};
    use crate::record::Author;

    fn sample_record() -> DatasetRecord {
        let mut record = DatasetRecord::new();
        record.name = Some("Visual Cortex".to_string());
        record.description = Some("A 7T fMRI study.".to_string());
        record.dataset_id = Some("PN000011 Visual Cortex".to_string());
        record.dataset_version = Some("1".parse::<DatasetVersion>().unwrap());
        record.doi = Some("VMIF5895".parse::<Doi>().unwrap());
        record.download_url = Some(
            "https://datacatalog.publicneuro.eu/dataset/PN000011%20Visual%20Cortex/V1".to_string(),
        );
        record.authors = vec![
            Author::from_full_name("Cyril Pernet"),
            Author::from_full_name("Gitte Moos Knudsen"),
        ];
        record
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap()
    }

    #[test]
    fn batch_carries_fixed_schema_and_timestamp() {
        let document =
            doi_batch_string(&sample_record(), &XmlConfig::default(), fixed_now()).unwrap();
        assert!(document.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(document.contains("version=\"5.3.0\""));
        assert!(document.contains("<timestamp>2025030900000000</timestamp>"));
        assert!(document.contains("<month>03</month>"));
        assert!(document.contains("<day>09</day>"));
        assert!(document.contains("<year>2025</year>"));
    }

    #[test]
    fn first_author_sequence_is_first() {
        let document =
            doi_batch_string(&sample_record(), &XmlConfig::default(), fixed_now()).unwrap();
        let first = document.find("sequence=\"first\"").unwrap();
        let additional = document.find("sequence=\"additional\"").unwrap();
        assert!(first < additional);
        assert!(document.contains("<surname>Moos Knudsen</surname>"));
    }

    #[test]
    fn doi_is_bare_identifier_and_resource_is_url() {
        let document =
            doi_batch_string(&sample_record(), &XmlConfig::default(), fixed_now()).unwrap();
        assert!(document.contains("<doi>10.70883/VMIF5895</doi>"));
        assert!(document.contains(
            "<resource>https://datacatalog.publicneuro.eu/dataset/PN000011%20Visual%20Cortex/V1</resource>"
        ));
    }

    #[test]
    fn absent_fields_omit_elements() {
        let mut record = sample_record();
        record.description = None;
        record.authors = Vec::new();
        record.doi = None;
        record.download_url = None;
        let document = doi_batch_string(&record, &XmlConfig::default(), fixed_now()).unwrap();
        assert!(!document.contains("<description"));
        assert!(!document.contains("<contributors>"));
        assert!(!document.contains("<doi_data>"));
    }

    #[test]
    fn output_is_deterministic() {
        let record = sample_record();
        let config = XmlConfig::default();
        let first = doi_batch_string(&record, &config, fixed_now()).unwrap();
        let second = doi_batch_string(&record, &config, fixed_now()).unwrap();
        assert_eq!(first, second);
    }
}
