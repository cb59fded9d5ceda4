use std::path::Path;

use serde::{Deserialize, Serialize};

/// Media type fragment shared by every OOXML document type
/// (word-processing, spreadsheet, presentation and their templates).
const OOXML_MARKER: &str = "openxmlformats-officedocument";

/// How a file has to be fed to the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Scanned as-is.
    Plain,
    /// Zip container, scanned member by member.
    OfficeContainer,
}

/// Classify a path by its name alone. File content is never touched.
pub fn classify(path: &Path) -> ContentKind {
    let office = mime_guess::from_path(path)
        .iter()
        .any(|mime| mime.essence_str().contains(OOXML_MARKER));

    if office {
        ContentKind::OfficeContainer
    } else {
        ContentKind::Plain
    }
}
