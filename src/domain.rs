use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Default DOI prefix for records registered by this tool.
pub const DOI_PREFIX: &str = "10.70883";

/// Dataset version, always rendered as `V<digits...>`.
///
/// Parsing strips every leading non-digit character and re-prefixes a
/// single `V`, so `"1"`, `"V1"` and `"VV1"` all normalize to `V1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetVersion(String);

impl DatasetVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetVersion {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits_on = trimmed.trim_start_matches(|ch: char| !ch.is_ascii_digit());
        if digits_on.is_empty() {
            return Err(CatalogError::InvalidVersion(value.to_string()));
        }
        Ok(Self(format!("V{digits_on}")))
    }
}

impl TryFrom<String> for DatasetVersion {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetVersion> for String {
    fn from(value: DatasetVersion) -> Self {
        value.0
    }
}

/// A DOI under the catalog's registration prefix.
///
/// Accepts the bare suffix, the `10.70883/SUFFIX` identifier, or either
/// `doi.org`/`dx.doi.org` URL form, and keeps prefix and suffix apart so
/// emitters can pick the shape they need.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Doi {
    prefix: String,
    suffix: String,
}

impl Doi {
    /// The bare registration identifier, e.g. `10.70883/VMIF5895`.
    pub fn as_identifier(&self) -> String {
        format!("{}/{}", self.prefix, self.suffix)
    }

    /// The canonical resolver URL, e.g. `https://doi.org/10.70883/VMIF5895`.
    pub fn to_url(&self) -> String {
        format!("https://doi.org/{}/{}", self.prefix, self.suffix)
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

impl FromStr for Doi {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidDoi(value.to_string()));
        }

        let without_scheme = trimmed
            .strip_prefix("https://doi.org/")
            .or_else(|| trimmed.strip_prefix("http://doi.org/"))
            .or_else(|| trimmed.strip_prefix("https://dx.doi.org/"))
            .or_else(|| trimmed.strip_prefix("http://dx.doi.org/"))
            .unwrap_or(trimmed);

        let (prefix, suffix) = match without_scheme.split_once('/') {
            Some((prefix, suffix)) => (prefix.to_string(), suffix.to_string()),
            None => (DOI_PREFIX.to_string(), without_scheme.to_string()),
        };

        let prefix_valid = prefix.starts_with("10.")
            && prefix[3..].chars().all(|ch| ch.is_ascii_digit())
            && prefix.len() > 3;
        let suffix_valid = !suffix.is_empty() && !suffix.chars().any(char::is_whitespace);
        if !prefix_valid || !suffix_valid {
            return Err(CatalogError::InvalidDoi(value.to_string()));
        }
        Ok(Self { prefix, suffix })
    }
}

impl Serialize for Doi {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_url())
    }
}

impl<'de> Deserialize<'de> for Doi {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Closed set of BIDS dataset types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidsDatasetType {
    Raw,
    Derivatives,
}

impl fmt::Display for BidsDatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidsDatasetType::Raw => write!(f, "raw"),
            BidsDatasetType::Derivatives => write!(f, "derivatives"),
        }
    }
}

impl FromStr for BidsDatasetType {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "raw" => Ok(BidsDatasetType::Raw),
            "derivatives" => Ok(BidsDatasetType::Derivatives),
            _ => Err(CatalogError::InvalidBidsDatasetType(value.to_string())),
        }
    }
}

/// Normalized lookup key for a located dataset: `<directory>_<version>`
/// with spaces, dashes and colons removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DatasetKey(String);

impl DatasetKey {
    pub fn new(directory: &str, version: &str) -> Self {
        let raw = format!("{directory}_{version}");
        Self(
            raw.chars()
                .filter(|ch| !matches!(ch, ' ' | '-' | ':'))
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Split a raw cell into tokens: comma-separated when a comma is present
/// (multi-word phrases survive), whitespace-separated otherwise.
pub fn parse_token_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.contains(',') {
        trimmed
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        trimmed.split_whitespace().map(str::to_string).collect()
    }
}

/// Keyword cells follow the same comma-else-whitespace rule.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    parse_token_list(raw)
}
