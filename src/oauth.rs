//! OAuth2 installed-application flow against Google's endpoints
//!
//! [`OAuthClient`] talks to the token endpoint (code exchange and refresh);
//! [`InstalledFlow`] drives the one-time consent: a loopback listener catches
//! the browser redirect, and when no listener can be started the code is read
//! from the terminal instead.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use google_gmail1::hyper_util;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use url::Url;
use yup_oauth2::ApplicationSecret;

use crate::auth::{
    https_connector, ConsentFlow, Credential, CredentialManager, HttpsConnector, TokenEndpoint,
    TokenFile, READONLY_SCOPES,
};
use crate::browser::{present_consent_url, ConsentLauncher};
use crate::config::{Config, ConsentMode};
use crate::error::{GmailError, Result};

/// Redirect target for the copy/paste flow when the client secret lists none
const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

const SUCCESS_PAGE: &str = "<html><body><h2>Authorization complete.</h2>\
<p>You may close this window and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h2>Authorization failed.</h2>\
<p>Return to the terminal for details.</p></body></html>";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, now: DateTime<Utc>) -> Credential {
        let expiry = self.expires_in.map(|secs| now + Duration::seconds(secs));
        Credential::new(self.access_token, self.refresh_token, expiry)
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for the provider's OAuth2 authorization and token endpoints
pub struct OAuthClient {
    secret: ApplicationSecret,
    http: hyper_util::client::legacy::Client<HttpsConnector, Full<Bytes>>,
}

impl OAuthClient {
    pub fn new(secret: ApplicationSecret) -> Result<Self> {
        let http = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
            .build(https_connector()?);
        Ok(Self { secret, http })
    }

    /// Read a client secret JSON downloaded from Google Cloud Console
    pub async fn from_secret_file(path: &Path) -> Result<Self> {
        let secret = yup_oauth2::read_application_secret(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read credentials: {}", e)))?;
        Self::new(secret)
    }

    pub fn client_id(&self) -> &str {
        &self.secret.client_id
    }

    /// Consent page URL requesting offline (refreshable) read-only access
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url> {
        let scope = READONLY_SCOPES.join(" ");
        Url::parse_with_params(
            &self.secret.auth_uri,
            &[
                ("client_id", self.secret.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| GmailError::ConfigError(format!("Invalid auth_uri in credentials: {}", e)))
    }

    /// Redirect URI registered for the copy/paste flow
    pub fn console_redirect_uri(&self) -> String {
        self.secret
            .redirect_uris
            .iter()
            .find(|uri| !uri.starts_with("http://localhost") && !uri.starts_with("http://127.0.0.1"))
            .cloned()
            .unwrap_or_else(|| OOB_REDIRECT_URI.to_string())
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Credential> {
        self.token_request(&[
            ("code", code),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<Credential> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let request = hyper::Request::post(self.secret.token_uri.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| GmailError::AuthError(format!("Invalid token request: {}", e)))?;

        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| GmailError::NetworkError(format!("Token endpoint unreachable: {}", e)))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| GmailError::NetworkError(format!("Failed to read token response: {}", e)))?
            .to_bytes();

        if !status.is_success() {
            let detail = serde_json::from_slice::<TokenErrorResponse>(&bytes)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {}", e.error, description),
                    None => e.error,
                })
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(GmailError::AuthError(format!(
                "Token endpoint returned HTTP {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&bytes)?;
        Ok(token.into_credential(Utc::now()))
    }
}

#[async_trait]
impl TokenEndpoint for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}

/// Whether the console fallback may read an authorization code from stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleInput {
    /// The process owns the terminal
    Stdin,
    /// stdin carries another protocol, such as the MCP stdio transport
    Unavailable,
}

/// Interactive consent for desktop ("installed") OAuth clients
pub struct InstalledFlow {
    oauth: Arc<OAuthClient>,
    launcher: Arc<dyn ConsentLauncher>,
    mode: ConsentMode,
    console: ConsoleInput,
}

impl InstalledFlow {
    pub fn new(
        oauth: Arc<OAuthClient>,
        launcher: Arc<dyn ConsentLauncher>,
        mode: ConsentMode,
    ) -> Self {
        Self {
            oauth,
            launcher,
            mode,
            console: ConsoleInput::Stdin,
        }
    }

    pub fn with_console(mut self, console: ConsoleInput) -> Self {
        self.console = console;
        self
    }

    async fn authorize_with_redirect(&self, listener: TcpListener) -> Result<Credential> {
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let state = uuid::Uuid::new_v4().to_string();
        let url = self.oauth.authorization_url(&redirect_uri, &state)?;

        present_consent_url(self.launcher.as_ref(), url.as_str());

        let code = wait_for_redirect(&listener, &state).await?;
        tracing::info!("Received authorization code via browser redirect");
        self.oauth.exchange_code(&code, &redirect_uri).await
    }

    async fn authorize_with_console<R>(&self, input: &mut R) -> Result<Credential>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let redirect_uri = self.oauth.console_redirect_uri();
        let state = uuid::Uuid::new_v4().to_string();
        let url = self.oauth.authorization_url(&redirect_uri, &state)?;

        present_consent_url(self.launcher.as_ref(), url.as_str());
        eprint!("Enter the authorization code: ");

        let mut line = String::new();
        input.read_line(&mut line).await?;
        let code = line.trim();
        if code.is_empty() {
            return Err(GmailError::AuthError(
                "No authorization code entered".to_string(),
            ));
        }

        tracing::info!("Received authorization code via console");
        self.oauth.exchange_code(code, &redirect_uri).await
    }
}

#[async_trait]
impl ConsentFlow for InstalledFlow {
    async fn authorize(&self) -> Result<Credential> {
        if self.mode == ConsentMode::Browser {
            match TcpListener::bind(("127.0.0.1", 0)).await {
                Ok(listener) => return self.authorize_with_redirect(listener).await,
                Err(e) => tracing::warn!(
                    "Could not start redirect listener ({}); falling back to console authorization",
                    e
                ),
            }
        }

        if self.console == ConsoleInput::Unavailable {
            return Err(GmailError::AuthError(
                "Console authorization is not possible here; run `gmail-export auth` first"
                    .to_string(),
            ));
        }

        let mut stdin = BufReader::new(tokio::io::stdin());
        self.authorize_with_console(&mut stdin).await
    }
}

/// Accept loopback connections until one carries the authorization code
async fn wait_for_redirect(listener: &TcpListener, expected_state: &str) -> Result<String> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!("Redirect listener connection from {}", peer);
        if let Some(code) = handle_redirect(stream, expected_state).await? {
            return Ok(code);
        }
    }
}

async fn handle_redirect(stream: TcpStream, expected_state: &str) -> Result<Option<String>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain the remaining request headers
    loop {
        let mut header = String::new();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header.trim().is_empty() {
            break;
        }
    }

    let outcome = parse_redirect(&request_line, expected_state);
    let (status, page) = match &outcome {
        Ok(Some(_)) => ("200 OK", SUCCESS_PAGE),
        Ok(None) => ("404 Not Found", ""),
        Err(_) => ("400 Bad Request", FAILURE_PAGE),
    };

    let mut stream = reader.into_inner();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        page.len(),
        page
    );
    stream.write_all(response.as_bytes()).await?;
    let _ = stream.shutdown().await;

    outcome
}

/// Extract the authorization code from a redirect request line
///
/// `Ok(None)` means an unrelated request (favicon and the like).
fn parse_redirect(request_line: &str, expected_state: &str) -> Result<Option<String>> {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return Ok(None);
    };
    let Ok(url) = Url::parse("http://127.0.0.1/").and_then(|base| base.join(target)) else {
        return Ok(None);
    };

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        return Err(GmailError::AuthError(format!(
            "Authorization was not granted: {}",
            error
        )));
    }

    let Some(code) = params.get("code") else {
        return Ok(None);
    };

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(GmailError::AuthError(
            "Authorization response state mismatch".to_string(),
        ));
    }

    Ok(Some(code.clone()))
}

/// Wire the production credential manager from configuration
///
/// Fails with a configuration error when no client secret file can be found.
pub async fn credential_manager(
    config: &Config,
    launcher: Arc<dyn ConsentLauncher>,
    console: ConsoleInput,
) -> Result<CredentialManager> {
    let secret_path = config.resolve_credentials_path()?;
    tracing::debug!("Using OAuth client secret {:?}", secret_path);

    let oauth = Arc::new(OAuthClient::from_secret_file(&secret_path).await?);
    let consent = Arc::new(
        InstalledFlow::new(Arc::clone(&oauth), launcher, config.gmail.consent_mode)
            .with_console(console),
    );

    Ok(CredentialManager::new(
        TokenFile::new(&config.gmail.token_path),
        oauth,
        consent,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::PrintOnly;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn secret(token_uri: &str) -> ApplicationSecret {
        ApplicationSecret {
            client_id: "client-123".to_string(),
            client_secret: "shh".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: token_uri.to_string(),
            redirect_uris: vec!["http://localhost".to_string()],
            ..Default::default()
        }
    }

    async fn token_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3599,
                "refresh_token": "1//refresh",
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;
        server
    }

    /// Plays the browser: follows the consent URL's redirect with a code
    struct RedirectingBrowser {
        code: &'static str,
    }

    impl ConsentLauncher for RedirectingBrowser {
        fn launch(&self, url: &str) -> std::io::Result<()> {
            let consent = Url::parse(url).expect("consent url");
            let params: HashMap<String, String> = consent.query_pairs().into_owned().collect();
            let redirect = Url::parse(&params["redirect_uri"]).expect("redirect uri");
            let state = params["state"].clone();
            let code = self.code;

            tokio::spawn(async move {
                let addr = format!(
                    "{}:{}",
                    redirect.host_str().unwrap(),
                    redirect.port().unwrap()
                );
                // An unrelated request first, as browsers do
                let mut favicon = TcpStream::connect(&addr).await.unwrap();
                favicon
                    .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: x\r\n\r\n")
                    .await
                    .unwrap();
                let mut sink = Vec::new();
                favicon.read_to_end(&mut sink).await.unwrap();

                let mut stream = TcpStream::connect(&addr).await.unwrap();
                let request = format!(
                    "GET /?state={}&code={}&scope=gmail.readonly HTTP/1.1\r\nHost: x\r\n\r\n",
                    state, code
                );
                stream.write_all(request.as_bytes()).await.unwrap();
                let mut response = String::new();
                stream.read_to_string(&mut response).await.unwrap();
                assert!(response.starts_with("HTTP/1.1 200 OK"));
            });
            Ok(())
        }
    }

    #[test]
    fn test_authorization_url_parameters() {
        let client = OAuthClient::new(secret("https://oauth2.googleapis.com/token")).unwrap();
        let url = client
            .authorization_url("http://127.0.0.1:8765/", "state-1")
            .unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:8765/");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "https://www.googleapis.com/auth/gmail.readonly");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["state"], "state-1");
    }

    #[test]
    fn test_console_redirect_uri() {
        let client = OAuthClient::new(secret("https://oauth2.googleapis.com/token")).unwrap();
        assert_eq!(client.console_redirect_uri(), OOB_REDIRECT_URI);

        let mut with_oob = secret("https://oauth2.googleapis.com/token");
        with_oob.redirect_uris = vec![
            "http://localhost".to_string(),
            "urn:ietf:wg:oauth:2.0:oob".to_string(),
        ];
        let client = OAuthClient::new(with_oob).unwrap();
        assert_eq!(client.console_redirect_uri(), "urn:ietf:wg:oauth:2.0:oob");
    }

    #[test]
    fn test_parse_redirect() {
        assert_eq!(
            parse_redirect("GET /?code=abc&state=s1 HTTP/1.1\r\n", "s1").unwrap(),
            Some("abc".to_string())
        );
        assert_eq!(
            parse_redirect("GET /favicon.ico HTTP/1.1\r\n", "s1").unwrap(),
            None
        );
        assert_eq!(parse_redirect("", "s1").unwrap(), None);
        assert!(matches!(
            parse_redirect("GET /?code=abc&state=other HTTP/1.1", "s1"),
            Err(GmailError::AuthError(_))
        ));
        assert!(matches!(
            parse_redirect("GET /?error=access_denied&state=s1 HTTP/1.1", "s1"),
            Err(GmailError::AuthError(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=1%2F%2Fold"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.refreshed",
                "expires_in": 3600,
                "scope": "https://www.googleapis.com/auth/gmail.readonly",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OAuthClient::new(secret(&format!("{}/token", server.uri()))).unwrap();
        let credential = client.refresh("1//old").await.unwrap();

        assert_eq!(credential.access_token, "ya29.refreshed");
        assert_eq!(credential.refresh_token, None);
        assert!(credential.is_valid());
    }

    #[tokio::test]
    async fn test_refresh_rejected_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(secret(&format!("{}/token", server.uri()))).unwrap();
        let err = client.refresh("revoked").await.unwrap_err();

        assert!(matches!(err, GmailError::AuthError(_)));
        assert!(err.to_string().contains("invalid_grant"));
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[tokio::test]
    async fn test_browser_redirect_flow() {
        let server = token_server().await;
        let oauth = Arc::new(OAuthClient::new(secret(&format!("{}/token", server.uri()))).unwrap());
        let flow = InstalledFlow::new(
            oauth,
            Arc::new(RedirectingBrowser { code: "the-code" }),
            ConsentMode::Browser,
        );

        let credential = flow.authorize().await.unwrap();
        assert_eq!(credential.access_token, "ya29.fresh");
        assert_eq!(credential.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[tokio::test]
    async fn test_console_flow_reads_code() {
        let server = token_server().await;
        let oauth = Arc::new(OAuthClient::new(secret(&format!("{}/token", server.uri()))).unwrap());
        let flow = InstalledFlow::new(oauth, Arc::new(PrintOnly), ConsentMode::Console);

        let mut input = BufReader::new(&b"  the-code  \n"[..]);
        let credential = flow.authorize_with_console(&mut input).await.unwrap();
        assert_eq!(credential.access_token, "ya29.fresh");
    }

    #[tokio::test]
    async fn test_console_flow_empty_code() {
        let oauth = Arc::new(OAuthClient::new(secret("http://127.0.0.1:9/token")).unwrap());
        let flow = InstalledFlow::new(oauth, Arc::new(PrintOnly), ConsentMode::Console);

        let mut input = BufReader::new(&b"\n"[..]);
        let err = flow.authorize_with_console(&mut input).await.unwrap_err();
        assert!(matches!(err, GmailError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_console_fallback_refused_without_stdin() {
        let oauth = Arc::new(OAuthClient::new(secret("http://127.0.0.1:9/token")).unwrap());
        let flow = InstalledFlow::new(oauth, Arc::new(PrintOnly), ConsentMode::Console)
            .with_console(ConsoleInput::Unavailable);

        let err = flow.authorize().await.unwrap_err();
        assert!(matches!(err, GmailError::AuthError(_)));
        assert!(err.to_string().contains("gmail-export auth"));
    }

    #[tokio::test]
    async fn test_credential_manager_requires_secret_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.gmail.credentials_dir = dir.path().to_path_buf();

        let result = credential_manager(&config, Arc::new(PrintOnly), ConsoleInput::Stdin).await;
        assert!(matches!(result, Err(GmailError::ConfigError(_))));
    }
}
