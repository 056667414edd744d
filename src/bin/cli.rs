//! Notice mailer CLI
//!
//! Polls the configured notice boards once and mails new articles.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use notice_mailer::{
    error::Result,
    models::Config,
    notify::{DisabledNotifier, EmailNotifier, Notifier},
    pipeline,
    storage::SqliteLedger,
    utils::http::{HttpFetcher, TlsPolicyMap},
};

/// JBNU notice mailer
#[derive(Parser, Debug)]
#[command(
    name = "notice-mailer",
    version,
    about = "Mails a digest of new JBNU notice board articles"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every source once
    Run {
        /// Record current articles as seen without sending mail
        #[arg(long)]
        seed: bool,
    },

    /// Validate configuration
    Validate,

    /// Show ledger record counts per source
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Ok(path) = dotenv {
        log::debug!("Loaded environment from {}", path.display());
    }

    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env()?;
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run { seed } => {
            if seed {
                config.seed_mode = true;
            }
            config.validate()?;
            pipeline::ensure_sources(&config)?;

            let ledger = SqliteLedger::open(&config.ledger.path, &config.ledger.legacy_source)?;
            let fetcher =
                HttpFetcher::new(&config.crawler, TlsPolicyMap::from_config(&config.crawler.tls))?;
            let notifier: Box<dyn Notifier> = if config.seed_mode {
                log::info!("Seed mode: articles are recorded without sending mail");
                Box::new(DisabledNotifier)
            } else {
                Box::new(EmailNotifier::new(&config.mail)?)
            };

            let outcomes = pipeline::run_all(&config, &fetcher, &ledger, notifier.as_ref()).await?;
            for (key, outcome) in &outcomes {
                log::info!("[{key}] {outcome}");
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            for source in &config.sources {
                let status = if source.is_configured() {
                    format!("{} listing URL(s)", source.list_urls.len())
                } else {
                    "not configured".to_string()
                };
                log::info!("[{}] {}", source.key, status);
            }
            if let Err(e) = pipeline::ensure_sources(&config) {
                log::warn!("{}", e);
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            let path = Path::new(&config.ledger.path);
            log::info!("Ledger: {}", path.display());

            if !path.exists() {
                log::info!("No ledger found yet.");
                return Ok(());
            }

            let ledger = SqliteLedger::open(path, &config.ledger.legacy_source)?;
            let counts = ledger.source_counts()?;
            if counts.is_empty() {
                log::info!("Ledger is empty.");
            }
            for (source, count) in counts {
                log::info!("[{}] {} seen article(s)", source, count);
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
