use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Error types for the Gmail export system
#[derive(Error, Debug)]
pub enum GmailError {
    /// Missing or invalid configuration (e.g. no credentials file)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Neither the cached token nor the consent flow produced a credential
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Caller supplied an unusable argument (bad date, zero max results, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl GmailError {
    /// Whether the error originated from the mail provider rather than from
    /// local configuration, authentication or the filesystem
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            GmailError::ApiError(_)
                | GmailError::RateLimitExceeded(_)
                | GmailError::NetworkError(_)
                | GmailError::ServerError { .. }
                | GmailError::MessageNotFound(_)
                | GmailError::BadRequest(_)
                | GmailError::Forbidden(_)
        )
    }

    /// Classify a non-success HTTP status from the Gmail API
    fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            429 => GmailError::RateLimitExceeded(message),
            404 => GmailError::MessageNotFound(message),
            400 => GmailError::BadRequest(message),
            401 => GmailError::AuthError(message),
            403 => GmailError::Forbidden(message),
            500..=599 => GmailError::ServerError {
                status: status_code,
                message,
            },
            _ => GmailError::ApiError(message),
        }
    }
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // Non-success response without a JSON error body
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let message = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                );
                GmailError::from_status(status.as_u16(), message)
            }
            // Non-success response carrying Google's `{"error": {...}}` body
            google_gmail1::Error::BadRequest(ref body) => {
                let code = body["error"]["code"].as_u64().unwrap_or(400) as u16;
                let message = match body["error"]["message"].as_str() {
                    Some(text) => format!("HTTP {}: {}", code, text),
                    None => format!("HTTP {}: {}", code, body),
                };
                GmailError::from_status(code, message)
            }
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}
