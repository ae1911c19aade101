use anyhow::Result;
use clap::Parser;
use gmail_export::auth::crypto_provider;
use gmail_export::cli::{self, Cli, Commands};
use gmail_export::config::Config;
use gmail_export::verify::verify_export;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nFor help, run: gmail-export --help");
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    crypto_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_export=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_export=info,warn"))
    };

    // stdout belongs to the MCP transport when serving
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    if let Commands::InitConfig { output, force } = &cli.command {
        cli::init_config(output, *force).await?;
        println!("Created example configuration file at: {:?}", output);
        println!("\nPlease edit this file to customize your settings.");
        println!("Key settings to review:");
        println!("  - gmail.credentials_dir / credentials_pattern: where the OAuth client secret lives");
        println!("  - gmail.token_path: where the authorized token is cached");
        println!("  - export.output_dir: where CSV files are written");
        return Ok(0);
    }

    let mut config = Config::load(&cli.config).await?;
    config.apply_env();
    cli.apply_overrides(&mut config);
    config.validate()?;

    if config.assistant.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; AI features disabled");
    }

    match cli.command {
        Commands::Fetch(args) => {
            let result = cli::fetch(&config, args).await;
            println!("{}", cli::render_summary(&result));
            Ok(if result.success { 0 } else { 1 })
        }

        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            let token_path = cli::authenticate(&config, force).await?;
            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", token_path);
            Ok(0)
        }

        Commands::Serve => {
            cli::serve(&config).await?;
            Ok(0)
        }

        Commands::Verify { file } => {
            let report = verify_export(&file).await?;
            println!("{}", cli::render_verification(&file, &report));
            Ok(if report.is_ok() { 0 } else { 1 })
        }

        Commands::InitConfig { .. } => Ok(0),
    }
}
