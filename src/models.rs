use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::query::SearchCriteria;

/// Maximum number of characters kept from a message body
pub const BODY_EXCERPT_CHARS: usize = 500;

/// One Gmail message flattened to the fields the export cares about
///
/// String fields are empty, never absent, when the source header is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    pub thread_id: String,
    /// Raw `Date` header, not parsed
    pub date: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    /// First plain-text body part, at most [`BODY_EXCERPT_CHARS`] characters
    pub body: String,
    pub labels: Vec<String>,
}

/// Arguments of a search-and-export run, as received from the CLI or a tool call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExportRequest {
    /// Gmail label to filter by (e.g. 'Research_Data')
    #[serde(default)]
    pub label: Option<String>,
    /// Start date in YYYY-MM-DD format
    #[serde(default)]
    pub start_date: Option<String>,
    /// End date in YYYY-MM-DD format
    #[serde(default)]
    pub end_date: Option<String>,
    /// Output CSV filename (auto-generated if not provided)
    #[serde(default)]
    pub output_filename: Option<String>,
    /// Maximum number of emails to retrieve (default: 100)
    #[serde(default)]
    pub max_results: Option<u32>,
}

impl ExportRequest {
    /// Validated search criteria; `default_max_results` applies when the
    /// request leaves the limit out
    pub fn criteria(&self, default_max_results: u32) -> Result<SearchCriteria> {
        SearchCriteria::from_parts(
            self.label.as_deref(),
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            Some(self.max_results.unwrap_or(default_max_results)),
        )
    }
}

/// Summary of a search-and-export run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    pub count: usize,
    pub message: String,
    /// Absent when nothing matched and no file was written
    pub output_file: Option<PathBuf>,
}

impl ExportResult {
    pub fn exported(count: usize, output_file: PathBuf) -> Self {
        Self {
            success: true,
            count,
            message: format!("Successfully exported {} emails", count),
            output_file: Some(output_file),
        }
    }

    pub fn no_results() -> Self {
        Self {
            success: true,
            count: 0,
            message: "No emails found matching criteria".to_string(),
            output_file: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            message: message.into(),
            output_file: None,
        }
    }
}
