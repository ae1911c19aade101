//! Extraction pipeline: credential → provider → list → fetch → normalize

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::CredentialSource;
use crate::client::{MailProvider, ProviderFactory};
use crate::error::{GmailError, Result};
use crate::models::EmailRecord;
use crate::normalize::normalize;
use crate::query::{build_query, SearchCriteria};

/// Runs searches against the mailbox of the authorized user
///
/// The provider client is built on first use and reused for as long as the
/// credential source keeps returning the same access token.
pub struct EmailExtractor {
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn ProviderFactory>,
    provider: Mutex<Option<(String, Arc<dyn MailProvider>)>>,
}

impl EmailExtractor {
    pub fn new(credentials: Arc<dyn CredentialSource>, connector: Arc<dyn ProviderFactory>) -> Self {
        Self {
            credentials,
            connector,
            provider: Mutex::new(None),
        }
    }

    async fn provider(&self) -> Result<Arc<dyn MailProvider>> {
        let credential = self.credentials.obtain_credential().await?;

        let mut cached = self.provider.lock().await;
        if let Some((token, provider)) = cached.as_ref() {
            if *token == credential.access_token {
                return Ok(Arc::clone(provider));
            }
            debug!("Access token changed, reconnecting provider");
        }

        let provider = self.connector.connect(&credential)?;
        *cached = Some((credential.access_token, Arc::clone(&provider)));
        Ok(provider)
    }

    /// Drop the cached client and build a new one from a fresh credential
    async fn reconnect(&self) -> Result<Arc<dyn MailProvider>> {
        self.provider.lock().await.take();
        self.provider().await
    }

    /// Fetch and normalize every message matching `criteria`
    ///
    /// A failed listing aborts the search. A message that cannot be fetched
    /// is logged and left out; the rest keep the provider's order. The first
    /// rejected access token during a search triggers one reconnect with a
    /// fresh credential before the message is retried.
    pub async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<EmailRecord>> {
        let mut provider = self.provider().await?;
        let query = build_query(criteria);

        info!(
            "Searching emails with query: {}",
            query.as_deref().unwrap_or("<all messages>")
        );

        let ids = provider
            .list_message_ids(query, criteria.max_results())
            .await?;
        info!("Found {} messages", ids.len());

        let mut records = Vec::with_capacity(ids.len());
        let mut reconnected = false;
        for id in &ids {
            let fetched = match provider.get_message(id).await {
                Err(GmailError::AuthError(e)) if !reconnected => {
                    warn!("Access token rejected while fetching {} ({}); reconnecting", id, e);
                    reconnected = true;
                    provider = self.reconnect().await?;
                    provider.get_message(id).await
                }
                other => other,
            };

            match fetched {
                Ok(message) => {
                    let record = normalize(&message);
                    debug!("Fetched message {}: {}", id, record.subject);
                    records.push(record);
                }
                Err(e) => warn!("Skipping message {}: {}", id, e),
            }
        }

        if records.len() < ids.len() {
            warn!(
                "Fetched {} of {} messages; {} skipped",
                records.len(),
                ids.len(),
                ids.len() - records.len()
            );
        }

        Ok(records)
    }
}
