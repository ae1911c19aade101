//! Search-and-export orchestration shared by the CLI and the MCP server

use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::config::default_max_results;
use crate::error::Result;
use crate::export::CsvExporter;
use crate::extractor::EmailExtractor;
use crate::models::{ExportRequest, ExportResult};

/// Timestamp layout used in generated export filenames
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Default export filename: `[<label>_]emails_<YYYYMMDD_HHMMSS>.csv`
pub fn default_filename(label: Option<&str>, now: NaiveDateTime) -> String {
    let label_part = match label.filter(|l| !l.is_empty()) {
        Some(label) => format!("{}_", label),
        None => String::new(),
    };
    format!(
        "{}emails_{}.csv",
        label_part,
        now.format(FILENAME_TIMESTAMP_FORMAT)
    )
}

pub struct ExportService {
    extractor: EmailExtractor,
    exporter: CsvExporter,
    default_max_results: u32,
}

impl ExportService {
    pub fn new(extractor: EmailExtractor, exporter: CsvExporter) -> Self {
        Self {
            extractor,
            exporter,
            default_max_results: default_max_results(),
        }
    }

    /// Limit used for requests that do not set `max_results`
    pub fn with_default_max_results(mut self, max_results: u32) -> Self {
        self.default_max_results = max_results;
        self
    }

    /// Search the mailbox and write the matches to a CSV file
    ///
    /// Nothing is written when the search comes back empty.
    pub async fn search_and_export(&self, request: &ExportRequest) -> Result<ExportResult> {
        self.search_and_export_at(request, Local::now().naive_local())
            .await
    }

    /// [`Self::search_and_export`] with an explicit clock for the generated filename
    pub async fn search_and_export_at(
        &self,
        request: &ExportRequest,
        now: NaiveDateTime,
    ) -> Result<ExportResult> {
        let criteria = request.criteria(self.default_max_results)?;
        let filename = match request.output_filename.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_filename(criteria.label.as_deref(), now),
        };

        let records = self.extractor.search(&criteria).await?;
        if records.is_empty() {
            info!("No emails matched; skipping export");
            return Ok(ExportResult::no_results());
        }

        let path = self.exporter.export(&records, &filename).await?;
        Ok(ExportResult::exported(records.len(), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, MockCredentialSource};
    use crate::client::{MailProvider, MockMailProvider, MockProviderFactory};
    use crate::error::GmailError;
    use chrono::NaiveDate;
    use google_gmail1::api::{Message, MessagePart, MessagePartHeader};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 20)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap()
    }

    fn service(provider: MockMailProvider, output_dir: &std::path::Path) -> ExportService {
        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_obtain_credential()
            .returning(|| Ok(Credential::new("tok", None, None)));

        let provider: Arc<dyn MailProvider> = Arc::new(provider);
        let mut factory = MockProviderFactory::new();
        factory
            .expect_connect()
            .returning(move |_| Ok(Arc::clone(&provider)));

        ExportService::new(
            EmailExtractor::new(Arc::new(credentials), Arc::new(factory)),
            CsvExporter::new(output_dir),
        )
    }

    fn provider_with(ids: &'static [&'static str]) -> MockMailProvider {
        let mut provider = MockMailProvider::new();
        provider
            .expect_list_message_ids()
            .returning(move |_, _| Ok(ids.iter().map(|s| s.to_string()).collect()));
        provider.expect_get_message().returning(|id| {
            Ok(Message {
                id: Some(id.to_string()),
                payload: Some(MessagePart {
                    headers: Some(vec![MessagePartHeader {
                        name: Some("Subject".to_string()),
                        value: Some(format!("Subject {}", id)),
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            })
        });
        provider
    }

    #[test]
    fn test_default_filename() {
        assert_eq!(
            default_filename(Some("Research_Data"), fixed_now()),
            "Research_Data_emails_20251020_143005.csv"
        );
        assert_eq!(default_filename(None, fixed_now()), "emails_20251020_143005.csv");
        assert_eq!(default_filename(Some(""), fixed_now()), "emails_20251020_143005.csv");
    }

    #[tokio::test]
    async fn test_exports_with_generated_filename() {
        let temp = TempDir::new().unwrap();
        let service = service(provider_with(&["m1", "m2"]), temp.path());
        let request = ExportRequest {
            label: Some("Research_Data".to_string()),
            ..Default::default()
        };

        let result = service
            .search_and_export_at(&request, fixed_now())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.count, 2);
        assert_eq!(result.message, "Successfully exported 2 emails");
        let path = result.output_file.unwrap();
        assert_eq!(
            path,
            temp.path().join("Research_Data_emails_20251020_143005.csv")
        );
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_explicit_filename_gets_extension() {
        let temp = TempDir::new().unwrap();
        let service = service(provider_with(&["m1"]), temp.path());
        let request = ExportRequest {
            output_filename: Some("weekly".to_string()),
            ..Default::default()
        };

        let result = service.search_and_export(&request).await.unwrap();
        assert_eq!(result.output_file, Some(temp.path().join("weekly.csv")));
    }

    #[tokio::test]
    async fn test_no_results_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let service = service(provider_with(&[]), temp.path());

        let result = service
            .search_and_export(&ExportRequest::default())
            .await
            .unwrap();

        assert_eq!(result, ExportResult::no_results());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_configured_default_limit_applies() {
        let temp = TempDir::new().unwrap();
        let mut provider = MockMailProvider::new();
        provider
            .expect_list_message_ids()
            .withf(|_, max| *max == 7)
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        let service = service(provider, temp.path()).with_default_max_results(7);

        let result = service
            .search_and_export(&ExportRequest::default())
            .await
            .unwrap();
        assert_eq!(result.count, 0);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_searching() {
        let temp = TempDir::new().unwrap();
        let mut provider = MockMailProvider::new();
        provider.expect_list_message_ids().never();
        let service = service(provider, temp.path());

        let request = ExportRequest {
            start_date: Some("yesterday".to_string()),
            ..Default::default()
        };
        let err = service.search_and_export(&request).await.unwrap_err();
        assert!(matches!(err, GmailError::InvalidInput(_)));
    }
}
