use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::jsonl::SourceAttribution;
use crate::xml::XmlConfig;

/// On-disk settings file. Every field is optional; absent fields fall
/// back to the PublicnEUro defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub depositor_name: Option<String>,
    #[serde(default)]
    pub depositor_email: Option<String>,
    #[serde(default)]
    pub registrant: Option<String>,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub collection_title: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub catalog_tool: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub xml: XmlConfig,
    pub attribution: SourceAttribution,
    pub catalog_tool: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `pn-cat.json` (or an explicit path). An explicit path must
    /// exist; the default path is optional and silently falls back to
    /// built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("pn-cat.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CatalogError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let defaults = XmlConfig::default();

        let xml = XmlConfig {
            batch_id: config.batch_id.unwrap_or(defaults.batch_id),
            depositor_name: config.depositor_name.unwrap_or(defaults.depositor_name),
            depositor_email: config.depositor_email.unwrap_or(defaults.depositor_email),
            registrant: config.registrant.unwrap_or(defaults.registrant),
            collection_title: config.collection_title.unwrap_or(defaults.collection_title),
            indent_width: defaults.indent_width,
        };
        let attribution = SourceAttribution {
            source_name: config
                .source_name
                .unwrap_or_else(|| "PublicnEUro".to_string()),
            agent_name: config
                .agent_name
                .unwrap_or_else(|| "PublicnEUro Pipeline".to_string()),
        };
        let catalog_tool = config.catalog_tool.unwrap_or_else(|| "datalad".to_string());

        Ok(ResolvedConfig {
            schema_version,
            xml,
            attribution,
            catalog_tool,
        })
    }
}
