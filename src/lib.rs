//! Gmail Export
//!
//! Searches a Gmail mailbox by label and date range and exports the matching
//! messages to CSV files that open cleanly in spreadsheet tools, Hebrew and
//! other non-Latin text included.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with a cached, refreshable token
//! - **Search**: Gmail query construction and paginated, read-only listing
//! - **Normalization**: Headers and plain-text body excerpt per message
//! - **Export**: BOM-prefixed, fully quoted CSV
//! - **MCP**: The `search_and_export_emails` tool over stdio
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_export::{cli, config::Config, models::ExportRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load("config.toml".as_ref()).await?;
//!     config.apply_env();
//!
//!     let service = cli::build_service(&config).await?;
//!     let result = service
//!         .search_and_export(&ExportRequest {
//!             label: Some("Research_Data".to_string()),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     println!("{}", result.message);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - Credentials, token file and credential lifecycle
//! - [`oauth`] - OAuth2 token endpoint and consent flow
//! - [`browser`] - Opening the consent page
//! - [`client`] - Gmail API provider behind a mockable trait
//! - [`query`] - Search criteria and Gmail query strings
//! - [`normalize`] - Gmail message to [`models::EmailRecord`]
//! - [`extractor`] - Search pipeline
//! - [`export`] - CSV writer
//! - [`service`] - Search-and-export orchestration
//! - [`server`] - MCP tool server
//! - [`verify`] - Export file encoding checks
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod auth;
pub mod browser;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod extractor;
pub mod models;
pub mod normalize;
pub mod oauth;
pub mod query;
pub mod server;
pub mod service;
pub mod verify;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

// Core data models
pub use models::{EmailRecord, ExportRequest, ExportResult};

pub use config::Config;
pub use query::{build_query, SearchCriteria};

// Provider and credential seams
pub use auth::{Credential, CredentialManager, CredentialSource};
pub use client::{GmailConnector, MailProvider, ProviderFactory};

pub use export::CsvExporter;
pub use extractor::EmailExtractor;
pub use server::GmailExportServer;
pub use service::ExportService;

// CLI types (for binary usage)
pub use cli::{Cli, Commands};
