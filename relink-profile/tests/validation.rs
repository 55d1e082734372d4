//! Fatal-tier validation: the YAML probe and the checks that short-circuit
//! preprocessing.

mod common;

use common::{header, to_yaml, FLAG_LBR};
use relink_binary::BinaryContext;
use relink_profile::{is_yaml, ProfileDocument, ProfileError, ProfileReader, ReaderOptions};
use tempfile::TempDir;

#[test]
fn test_is_yaml_probe() {
    let dir = TempDir::new().unwrap();

    let yaml = dir.path().join("profile.yaml");
    std::fs::write(&yaml, "---\nheader:\n  profile-version: 1\n").unwrap();
    assert!(is_yaml(&yaml).unwrap());

    let raw = dir.path().join("profile.fdata");
    std::fs::write(&raw, "1 main 10 1 main 20 0 100\n").unwrap();
    assert!(!is_yaml(&raw).unwrap());

    assert!(is_yaml(dir.path().join("missing.yaml")).is_err());
}

fn preprocess(text: &str) -> Result<(), ProfileError> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("profile.yaml");
    std::fs::write(&path, text).unwrap();
    let mut ctx = BinaryContext::new();
    let mut reader = ProfileReader::new(&path, ReaderOptions::default());
    reader.preprocess_profile(&mut ctx).map(|_| ())
}

#[test]
fn test_preprocess_accepts_valid_document() {
    let doc = ProfileDocument {
        header: header(FLAG_LBR),
        functions: Vec::new(),
    };
    assert!(preprocess(&to_yaml(&doc)).is_ok());
}

#[test]
fn test_preprocess_rejects_unsupported_version() {
    let mut doc = ProfileDocument {
        header: header(FLAG_LBR),
        functions: Vec::new(),
    };
    doc.header.version = 2;
    assert!(matches!(
        preprocess(&to_yaml(&doc)),
        Err(ProfileError::UnsupportedVersion(2))
    ));
}

#[test]
fn test_preprocess_rejects_multiple_events() {
    let mut doc = ProfileDocument {
        header: header(FLAG_LBR),
        functions: Vec::new(),
    };
    doc.header.event_names = "cycles,branches".to_string();
    assert!(matches!(
        preprocess(&to_yaml(&doc)),
        Err(ProfileError::MultipleEvents(_))
    ));
}

#[test]
fn test_preprocess_rejects_malformed_yaml() {
    assert!(matches!(
        preprocess("---\nheader: [unclosed\n"),
        Err(ProfileError::Yaml(_))
    ));
}

#[test]
fn test_preprocess_propagates_open_failure() {
    let mut ctx = BinaryContext::new();
    let mut reader = ProfileReader::new("/nonexistent/profile.yaml", ReaderOptions::default());
    assert!(matches!(
        reader.preprocess_profile(&mut ctx),
        Err(ProfileError::Io(_))
    ));
}
