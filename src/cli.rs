//! Command-line interface

use clap::{Args, Parser, Subcommand};
use rmcp::{transport::stdio, ServiceExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::auth::CredentialSource;
use crate::browser::SystemBrowser;
use crate::client::GmailConnector;
use crate::config::Config;
use crate::error::Result;
use crate::export::CsvExporter;
use crate::extractor::EmailExtractor;
use crate::models::{ExportRequest, ExportResult};
use crate::oauth::{credential_manager, ConsoleInput};
use crate::server::GmailExportServer;
use crate::service::ExportService;
use crate::verify::EncodingReport;

const RULE_WIDTH: usize = 60;

#[derive(Parser, Debug)]
#[command(name = "gmail-export")]
#[command(version)]
#[command(about = "Export Gmail messages to UTF-8 CSV files", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 client secret file (overrides config and environment)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Path to token cache file (overrides config and environment)
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Directory CSV files are written to (overrides config and environment)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Apply command-line overrides on top of file and environment settings
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(path) = &self.credentials {
            config.gmail.credentials_path = Some(path.clone());
        }
        if let Some(path) = &self.token_cache {
            config.gmail.token_path = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search Gmail and export the matching emails to CSV
    Fetch(FetchArgs),

    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Serve the search_and_export_emails tool over MCP stdio
    Serve,

    /// Check that a CSV export carries the UTF-8 BOM
    Verify {
        /// CSV file to verify
        file: PathBuf,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Gmail label to filter by
    #[arg(long)]
    pub label: Option<String>,

    /// Start date in YYYY-MM-DD format
    #[arg(long)]
    pub start_date: Option<String>,

    /// End date in YYYY-MM-DD format
    #[arg(long)]
    pub end_date: Option<String>,

    /// Output CSV filename
    #[arg(long)]
    pub output: Option<String>,

    /// Maximum number of emails to retrieve (default: 100)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_results: Option<u32>,
}

impl From<FetchArgs> for ExportRequest {
    fn from(args: FetchArgs) -> Self {
        Self {
            label: args.label,
            start_date: args.start_date,
            end_date: args.end_date,
            output_filename: args.output,
            max_results: args.max_results,
        }
    }
}

/// Wire credential manager, Gmail connector and exporter from configuration
pub async fn build_service(config: &Config) -> Result<ExportService> {
    service_with_console(config, ConsoleInput::Stdin).await
}

async fn service_with_console(config: &Config, console: ConsoleInput) -> Result<ExportService> {
    let credentials = credential_manager(config, Arc::new(SystemBrowser), console).await?;
    let extractor = EmailExtractor::new(Arc::new(credentials), Arc::new(GmailConnector::new()));
    let exporter = CsvExporter::new(&config.export.output_dir);

    Ok(ExportService::new(extractor, exporter).with_default_max_results(config.export.max_results))
}

/// Run one search-and-export; every failure is folded into the result
pub async fn fetch(config: &Config, args: FetchArgs) -> ExportResult {
    let request = ExportRequest::from(args);
    let outcome = match build_service(config).await {
        Ok(service) => service.search_and_export(&request).await,
        Err(e) => Err(e),
    };

    outcome.unwrap_or_else(|e| {
        if e.is_provider_error() {
            tracing::error!("Gmail API request failed: {}", e);
        } else {
            tracing::error!("Export failed: {}", e);
        }
        ExportResult::failed(e.to_string())
    })
}

/// Run the credential lifecycle and return where the token is cached
pub async fn authenticate(config: &Config, force: bool) -> Result<PathBuf> {
    let manager = credential_manager(config, Arc::new(SystemBrowser), ConsoleInput::Stdin).await?;
    if force {
        manager.forget().await?;
    }

    manager.obtain_credential().await?;
    Ok(manager.token_file().path().to_path_buf())
}

/// Serve the MCP tool on stdin/stdout until the client disconnects
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    // stdin is the MCP transport
    let service = service_with_console(config, ConsoleInput::Unavailable).await?;
    info!(
        "Starting Gmail export MCP server (output directory {:?})",
        config.export.output_dir
    );

    let server = GmailExportServer::new(Arc::new(service))
        .serve(stdio())
        .await?;
    server.waiting().await?;
    Ok(())
}

/// Write an example configuration, refusing to clobber an existing file
pub async fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {:?}. Use --force to overwrite",
            output
        );
    }
    Config::create_example(output).await?;
    Ok(())
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Fixed-format summary block printed after `fetch`
pub fn render_summary(result: &ExportResult) -> String {
    let mut lines = vec![
        String::new(),
        rule(),
        "EMAIL EXTRACTION RESULTS".to_string(),
        rule(),
        format!(
            "Status: {}",
            if result.success { "SUCCESS" } else { "FAILED" }
        ),
        format!("Emails found: {}", result.count),
        format!("Message: {}", result.message),
    ];
    if let Some(path) = &result.output_file {
        lines.push(format!("Output file: {}", path.display()));
    }
    lines.push(rule());
    lines.join("\n") + "\n"
}

/// Report block printed by `verify`
pub fn render_verification(file: &Path, report: &EncodingReport) -> String {
    let mut lines = vec![
        String::new(),
        rule(),
        "CSV ENCODING VERIFICATION".to_string(),
        rule(),
        format!("File: {}", file.display()),
        String::new(),
        format!(
            "UTF-8 BOM: {}",
            if report.has_bom { "Present" } else { "Missing" }
        ),
        format!(
            "Hebrew characters: {}",
            if report.has_hebrew { "Detected" } else { "None found" }
        ),
    ];
    if !report.valid_utf8 {
        lines.push("Warning: content is not valid UTF-8".to_string());
    }
    lines.push(String::new());
    lines.push(rule());
    lines.push(if report.is_ok() {
        "File is properly encoded for Excel/Hebrew support".to_string()
    } else {
        "Warning: File may not display correctly in Excel".to_string()
    });
    lines.push(rule());
    lines.join("\n") + "\n"
}
