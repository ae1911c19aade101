//! Gmail API access behind a mockable provider trait

use async_trait::async_trait;
use google_gmail1::{api::Message, hyper_util, Gmail};
use std::sync::Arc;
use tracing::debug;

use crate::auth::{https_connector, Credential, HttpsConnector, READONLY_SCOPES};
use crate::error::Result;

/// Largest page the Gmail `messages.list` endpoint will return
pub const MAX_PAGE_SIZE: u32 = 500;

/// Read-only mailbox operations the extractor needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// IDs of messages matching `query` (all messages when `None`), newest
    /// first, at most `max_results` of them
    async fn list_message_ids(&self, query: Option<String>, max_results: u32)
        -> Result<Vec<String>>;

    /// Full-format message including headers and decoded body parts
    async fn get_message(&self, id: &str) -> Result<Message>;
}

/// Builds a [`MailProvider`] bound to one access token
#[cfg_attr(test, mockall::automock)]
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, credential: &Credential) -> Result<Arc<dyn MailProvider>>;
}

/// [`MailProvider`] backed by the Gmail REST API for the authenticated user
pub struct GmailProvider {
    hub: Gmail<HttpsConnector>,
}

impl GmailProvider {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
            .build(https_connector()?);

        Ok(Self {
            hub: Gmail::new(client, access_token.into()),
        })
    }

    /// Point the hub at another API root, e.g. a local mock server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.hub.base_url(base_url.into());
        self
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    async fn list_message_ids(
        &self,
        query: Option<String>,
        max_results: u32,
    ) -> Result<Vec<String>> {
        let limit = max_results as usize;
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = (limit - all_ids.len()) as u32;
            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .max_results(remaining.min(MAX_PAGE_SIZE));

            if let Some(q) = query.as_deref() {
                call = call.q(q);
            }
            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = call.add_scope(READONLY_SCOPES[0]).doit().await?;

            all_ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );
            debug!("Listed {} message IDs so far", all_ids.len());

            page_token = response.next_page_token;
            if page_token.is_none() || all_ids.len() >= limit {
                break;
            }
        }

        all_ids.truncate(limit);
        Ok(all_ids)
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .add_scope(READONLY_SCOPES[0])
            .doit()
            .await?;
        Ok(message)
    }
}

/// Connects [`GmailProvider`]s to the real Gmail API
#[derive(Debug, Default, Clone)]
pub struct GmailConnector {
    base_url: Option<String>,
}

impl GmailConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
        }
    }
}

impl ProviderFactory for GmailConnector {
    fn connect(&self, credential: &Credential) -> Result<Arc<dyn MailProvider>> {
        let mut provider = GmailProvider::new(credential.access_token.clone())?;
        if let Some(base_url) = &self.base_url {
            provider = provider.with_base_url(base_url.clone());
        }
        Ok(Arc::new(provider))
    }
}
