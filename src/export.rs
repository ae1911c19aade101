//! CSV export with a UTF-8 byte-order mark and unconditional quoting

use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{GmailError, Result};
use crate::models::EmailRecord;

/// UTF-8 byte-order mark; spreadsheet tools need it to detect the encoding
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Column order of every export file
pub const CSV_HEADER: [&str; 5] = ["date", "from", "to", "subject", "body"];

const CSV_EXTENSION: &str = "csv";

/// Writes [`EmailRecord`]s to CSV files under a fixed output directory
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path a file named `filename` would be written to
    pub fn resolve(&self, filename: &str) -> PathBuf {
        self.output_dir.join(with_csv_extension(filename))
    }

    /// Write `records` to `filename` inside the output directory, creating the
    /// directory if needed, and return the written path
    pub async fn export(&self, records: &[EmailRecord], filename: &str) -> Result<PathBuf> {
        let path = self.resolve(filename);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = render_csv(records)?;
        tokio::fs::write(&path, contents).await?;

        info!("Exported {} emails to {}", records.len(), path.display());
        Ok(path)
    }
}

/// Serialize records to the export byte format: BOM, header, one row per
/// record in input order, every field quoted, CRLF line endings
pub fn render_csv(records: &[EmailRecord]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::CRLF)
        .from_writer(UTF8_BOM.to_vec());

    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.write_record([
            &record.date,
            &record.from,
            &record.to,
            &record.subject,
            &record.body,
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| GmailError::IoError(e.into_error()))
}

fn with_csv_extension(filename: &str) -> String {
    let has_extension = Path::new(filename)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(CSV_EXTENSION))
        .unwrap_or(false);

    if has_extension {
        filename.to_string()
    } else {
        format!("{}.{}", filename, CSV_EXTENSION)
    }
}
