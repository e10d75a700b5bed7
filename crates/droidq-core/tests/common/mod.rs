//! Shared test helpers for droidq-core integration tests.

use std::path::PathBuf;

use droidq_core::extract::Conditions;
use droidq_core::hierarchy::Hierarchy;

/// Path of a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Reads a fixture file to a string.
pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

/// Parses the Settings home screen dump (9 nodes).
pub fn settings_hierarchy() -> Hierarchy {
    Hierarchy::parse(&fixture("settings_dump.xml")).unwrap()
}

/// Builds a condition set from `(attribute, pattern)` pairs.
pub fn conditions(pairs: &[(&str, &str)]) -> Conditions {
    pairs
        .iter()
        .map(|(name, pattern)| (name.to_string(), pattern.to_string()))
        .collect()
}
