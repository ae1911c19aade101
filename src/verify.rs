//! Encoding checks for exported CSV files

use std::path::Path;

use crate::error::Result;
use crate::export::UTF8_BOM;

/// What a spreadsheet tool will make of an export file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingReport {
    pub has_bom: bool,
    /// At least one character in U+0590..=U+05FF
    pub has_hebrew: bool,
    pub valid_utf8: bool,
}

impl EncodingReport {
    /// A file is correctly encoded when it carries the byte-order mark
    pub fn is_ok(&self) -> bool {
        self.has_bom
    }
}

/// Inspect the file at `path`; a missing or unreadable file is an error
pub async fn verify_export(path: &Path) -> Result<EncodingReport> {
    let bytes = tokio::fs::read(path).await?;
    Ok(inspect(&bytes))
}

pub fn inspect(bytes: &[u8]) -> EncodingReport {
    let has_bom = bytes.starts_with(UTF8_BOM);
    let text = std::str::from_utf8(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes));

    EncodingReport {
        has_bom,
        has_hebrew: text.map(contains_hebrew).unwrap_or(false),
        valid_utf8: text.is_ok(),
    }
}

fn contains_hebrew(text: &str) -> bool {
    text.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c))
}
