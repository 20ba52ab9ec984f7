use assert_matches::assert_matches;

use pn_catalog_manager::domain::{
    BidsDatasetType, DatasetVersion, Doi, parse_keywords,
};
use pn_catalog_manager::error::CatalogError;

#[test]
fn version_normalization_is_idempotent() {
    for raw in ["1", "V1", "v1", "version 2", "VV3"] {
        let once: DatasetVersion = raw.parse().unwrap();
        let twice: DatasetVersion = once.as_str().parse().unwrap();
        assert_eq!(once, twice, "normalizing {raw:?} twice diverged");
        assert!(once.as_str().starts_with('V'));
        assert!(!once.as_str().starts_with("VV"));
    }
}

#[test]
fn version_without_digits_is_rejected() {
    let err = "draft".parse::<DatasetVersion>().unwrap_err();
    assert_matches!(err, CatalogError::InvalidVersion(_));
}

#[test]
fn keywords_with_commas_yield_comma_count_plus_one_tokens() {
    let raw = "PET, resting state, 5-HT, brain";
    let tokens = parse_keywords(raw);
    let commas = raw.matches(',').count();
    assert_eq!(tokens.len(), commas + 1);
    assert!(tokens.contains(&"resting state".to_string()));
}

#[test]
fn keywords_without_commas_split_per_whitespace_run() {
    let raw = "PET fMRI EEG";
    let tokens = parse_keywords(raw);
    assert_eq!(tokens, vec!["PET", "fMRI", "EEG"]);
}

#[test]
fn doi_accepts_url_and_bare_forms() {
    let from_url: Doi = "https://doi.org/10.70883/VMIF5895".parse().unwrap();
    let from_identifier: Doi = "10.70883/VMIF5895".parse().unwrap();
    let from_suffix: Doi = "VMIF5895".parse().unwrap();
    assert_eq!(from_url, from_identifier);
    assert_eq!(from_url, from_suffix);
    assert_eq!(from_url.to_url(), "https://doi.org/10.70883/VMIF5895");
    assert_eq!(from_url.as_identifier(), "10.70883/VMIF5895");
}

#[test]
fn bids_dataset_type_is_a_closed_set() {
    assert_eq!(
        "raw".parse::<BidsDatasetType>().unwrap(),
        BidsDatasetType::Raw
    );
    let err = "preprocessed".parse::<BidsDatasetType>().unwrap_err();
    assert_matches!(err, CatalogError::InvalidBidsDatasetType(_));
}
