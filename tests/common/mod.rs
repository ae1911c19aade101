//! Common test utilities and fixtures

#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use gmail_export::auth::{Credential, CredentialSource};
use gmail_export::client::GmailConnector;
use gmail_export::error::Result;
use gmail_export::export::CsvExporter;
use gmail_export::extractor::EmailExtractor;
use gmail_export::service::ExportService;
use mockall::mock;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const MESSAGES_PATH: &str = "/gmail/v1/users/me/messages";

// Mock implementation of CredentialSource for testing
mock! {
    pub Credentials {}

    #[async_trait::async_trait]
    impl CredentialSource for Credentials {
        async fn obtain_credential(&self) -> Result<Credential>;
    }
}

/// Credential source that always hands out the same unexpiring token
pub fn static_credentials(token: &'static str) -> Arc<MockCredentials> {
    let mut credentials = MockCredentials::new();
    credentials
        .expect_obtain_credential()
        .returning(move || Ok(Credential::new(token, None, None)));
    Arc::new(credentials)
}

/// Base64url body payload as Gmail sends it
///
/// Fixture texts are kept to a multiple of three bytes so the encoding has no
/// padding and decodes the same with or without padding support.
pub fn encode_body(text: &str) -> String {
    assert_eq!(
        text.len() % 3,
        0,
        "fixture body {:?} must be a multiple of 3 bytes",
        text
    );
    URL_SAFE.encode(text.as_bytes())
}

fn headers(date: &str, from: &str, to: &str, subject: &str) -> Value {
    json!([
        {"name": "Date", "value": date},
        {"name": "From", "value": from},
        {"name": "To", "value": to},
        {"name": "Subject", "value": subject},
        {"name": "Content-Type", "value": "multipart/alternative"}
    ])
}

/// Create mock Gmail API message response (JSON) with HTML and plain parts
pub fn multipart_message(id: &str, date: &str, from: &str, subject: &str, body: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("thread_{}", id),
        "labelIds": ["INBOX", "Label_42"],
        "snippet": "Email snippet...",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": headers(date, from, "researcher@example.com", subject),
            "parts": [
                {
                    "partId": "0",
                    "mimeType": "text/html",
                    "body": {"size": 15, "data": encode_body("<p>שלום</p>")}
                },
                {
                    "partId": "1",
                    "mimeType": "text/plain",
                    "body": {"size": body.len(), "data": encode_body(body)}
                }
            ]
        }
    })
}

/// Create mock Gmail API message response (JSON) with a single plain body
pub fn simple_message(id: &str, date: &str, from: &str, subject: &str, body: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("thread_{}", id),
        "labelIds": ["INBOX"],
        "payload": {
            "mimeType": "text/plain",
            "headers": headers(date, from, "researcher@example.com", subject),
            "body": {"size": body.len(), "data": encode_body(body)}
        }
    })
}

/// Create mock Gmail API list response (JSON)
pub fn list_response(ids: &[&str]) -> Value {
    let messages: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "threadId": format!("thread_{}", id)}))
        .collect();
    json!({"messages": messages, "resultSizeEstimate": ids.len()})
}

/// Serve a listing for `query` on the mock Gmail API
pub async fn mount_listing(server: &MockServer, query: &str, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .and(query_param("q", query))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_response(ids)))
        .expect(1)
        .mount(server)
        .await;
}

/// Serve one full-format message on the mock Gmail API
pub async fn mount_message(server: &MockServer, message: Value) {
    let id = message["id"].as_str().unwrap_or_default().to_string();
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", MESSAGES_PATH, id)))
        .and(query_param("format", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message))
        .mount(server)
        .await;
}

/// Answer a message fetch with a Gmail error status
pub async fn mount_message_error(server: &MockServer, id: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", MESSAGES_PATH, id)))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "error": {"code": status, "message": "Requested entity was not found."}
        })))
        .mount(server)
        .await;
}

/// Export service talking to `server` instead of Gmail, writing to `output_dir`
pub fn service(server: &MockServer, output_dir: &Path) -> ExportService {
    let extractor = EmailExtractor::new(
        static_credentials("test-access-token"),
        Arc::new(GmailConnector::with_base_url(format!("{}/", server.uri()))),
    );
    ExportService::new(extractor, CsvExporter::new(output_dir))
}

/// Rows of an export file, BOM stripped, header row included
pub fn read_csv_rows(bytes: &[u8]) -> Vec<Vec<String>> {
    let content = bytes
        .strip_prefix(gmail_export::export::UTF8_BOM)
        .expect("export must start with the UTF-8 BOM");
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(content)
        .records()
        .map(|row| row.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_body_is_unpadded_base64url() {
        assert_eq!(encode_body("שלום!"), "16nXnNeV150h");
        assert_eq!(encode_body("<p>שלום</p>"), "PHA-16nXnNeV1508L3A-");
    }

    #[test]
    fn test_multipart_message_shape() {
        let message = multipart_message("m1", "date", "from", "subject", "Reminder: upload data");
        assert_eq!(message["payload"]["parts"][1]["mimeType"], "text/plain");
        assert_eq!(message["threadId"], "thread_m1");
    }
}
