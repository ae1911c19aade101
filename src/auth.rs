//! OAuth2 credential lifecycle for the Gmail API
//!
//! [`CredentialManager`] owns the token file and decides, on every request for
//! a credential, whether the cached token can be reused, must be refreshed, or
//! whether the interactive consent flow has to run again.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use google_gmail1::{hyper_rustls, hyper_util};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{GmailError, Result};

/// Read-only access is all the export needs
pub const READONLY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

/// Tokens expiring within this window are treated as already expired
const EXPIRY_SKEW_SECS: i64 = 60;

/// HTTPS connector shared by the Gmail hub and the OAuth token endpoint
pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Provider-issued access/refresh token pair with expiry
///
/// Field names follow the `token.json` layout written by Google's own client
/// libraries so existing token files keep working.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "token", alias = "access_token")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry,
            scopes: READONLY_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// A token without an expiry is assumed valid until the provider rejects it
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) < expiry,
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Persisted credential storage on disk
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached credential; a missing or unreadable file yields `None`
    pub async fn load(&self) -> Option<Credential> {
        if !self.path.exists() {
            tracing::debug!("No token file at {:?}", self.path);
            return None;
        }

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read token file {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<Credential>(&content) {
            Ok(credential) => {
                tracing::info!("Loaded existing credentials from {:?}", self.path);
                Some(credential)
            }
            Err(e) => {
                tracing::warn!("Failed to parse token file {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Overwrite the token file with the given credential
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(credential)?;
        tokio::fs::write(&self.path, json).await?;
        secure_token_file(&self.path).await?;
        tracing::info!("Saved credentials to {:?}", self.path);
        Ok(())
    }

    pub async fn remove(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_file(&self.path).await?;
        Ok(true)
    }
}

/// Anything that can hand out a currently valid credential
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn obtain_credential(&self) -> Result<Credential>;
}

/// Exchanges a refresh token for a fresh access token
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential>;
}

/// Interactive, human-in-the-loop authorization
///
/// Implementations may block for as long as the user takes; no timeout is
/// applied here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn authorize(&self) -> Result<Credential>;
}

/// Token lifecycle manager: load, validate, refresh, re-authorize, persist
///
/// The in-memory credential sits behind an async mutex held across the whole
/// resolution, so concurrent callers never race a refresh or a token file
/// write.
pub struct CredentialManager {
    token_file: TokenFile,
    endpoint: Arc<dyn TokenEndpoint>,
    consent: Arc<dyn ConsentFlow>,
    current: Mutex<Option<Credential>>,
}

impl CredentialManager {
    pub fn new(
        token_file: TokenFile,
        endpoint: Arc<dyn TokenEndpoint>,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        Self {
            token_file,
            endpoint,
            consent,
            current: Mutex::new(None),
        }
    }

    pub fn token_file(&self) -> &TokenFile {
        &self.token_file
    }

    /// Drop the in-memory credential and the token file
    pub async fn forget(&self) -> Result<()> {
        self.current.lock().await.take();
        if self.token_file.remove().await? {
            tracing::info!("Removed cached token {:?}", self.token_file.path());
        }
        Ok(())
    }

    async fn resolve(&self) -> Result<Credential> {
        let stored = self.token_file.load().await;

        let mut refreshed = None;
        if let Some(credential) = stored {
            if credential.is_valid() {
                return Ok(credential);
            }

            match credential.refresh_token.as_deref() {
                Some(refresh_token) if credential.can_refresh() => {
                    match self.endpoint.refresh(refresh_token).await {
                        Ok(mut fresh) => {
                            if fresh.refresh_token.is_none() {
                                fresh.refresh_token = credential.refresh_token.clone();
                            }
                            tracing::info!("Refreshed expired credentials");
                            refreshed = Some(fresh);
                        }
                        Err(e) => tracing::warn!("Failed to refresh token: {}", e),
                    }
                }
                _ => tracing::info!("Cached token expired and cannot be refreshed"),
            }
        }

        let credential = match refreshed {
            Some(credential) => credential,
            None => {
                tracing::info!("Starting OAuth consent flow");
                self.consent.authorize().await.map_err(|e| match e {
                    GmailError::AuthError(_) => e,
                    other => GmailError::AuthError(other.to_string()),
                })?
            }
        };

        if let Err(e) = self.token_file.save(&credential).await {
            tracing::warn!(
                "Failed to persist credentials to {:?}: {}",
                self.token_file.path(),
                e
            );
        }

        Ok(credential)
    }
}

#[async_trait]
impl CredentialSource for CredentialManager {
    async fn obtain_credential(&self) -> Result<Credential> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref().filter(|c| c.is_valid()) {
            return Ok(credential.clone());
        }

        let credential = self.resolve().await?;
        *current = Some(credential.clone());
        Ok(credential)
    }
}

#[cfg(not(windows))]
pub fn crypto_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::aws_lc_rs::default_provider()
}

#[cfg(windows)]
pub fn crypto_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::ring::default_provider()
}

/// Build the HTTPS connector used for every outbound request
pub fn https_connector() -> Result<HttpsConnector> {
    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(crypto_provider())
        .map_err(|e| GmailError::AuthError(format!("Failed to configure TLS: {}", e)))?
        .https_or_http()
        .enable_http1()
        .build())
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the profile directory ACLs
#[cfg(not(unix))]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
