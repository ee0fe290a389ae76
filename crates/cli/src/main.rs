mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dmm_core::{load_config, validate_config, Config, SanitizedConfig};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "dmm", version, about = "Torrent scraping and debrid library management")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "DMM_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every configured source and save the results
    #[command(subcommand)]
    Scrape(ScrapeCommand),

    /// Check instant availability on every configured provider
    Check {
        /// Check the result set stored under this key and save it back
        #[arg(long, conflicts_with = "hashes")]
        key: Option<String>,

        /// Clear existing availability flags before applying the new ones
        #[arg(long)]
        recheck: bool,

        /// Info hashes to check
        hashes: Vec<String>,
    },

    /// Refresh and list a provider library
    Library {
        /// Provider (`rd` or `ad`)
        provider: String,
    },

    /// Add a torrent to a provider library and select its files
    Add {
        /// Provider (`rd` or `ad`)
        provider: String,

        /// Info hash
        hash: String,

        /// The hash is known to be instantly available
        #[arg(long)]
        instant: bool,
    },

    /// Delete a torrent from a provider library
    Delete {
        /// Provider id, e.g. `rd:ABC123`
        provider_id: String,
    },

    /// List Real-Debrid download links
    Downloads {
        /// Delete the download with this id instead of listing
        #[arg(long)]
        delete: Option<String>,
    },

    /// Print the effective configuration with credentials redacted
    Config,
}

#[derive(Subcommand)]
enum ScrapeCommand {
    /// Scrape a movie
    Movie {
        #[command(flatten)]
        title: TitleArgs,
    },

    /// Scrape one season of a show
    Show {
        #[command(flatten)]
        title: TitleArgs,

        #[arg(long)]
        season: u32,

        /// Episodes to search for individually (repeatable)
        #[arg(long = "episode")]
        episodes: Vec<u32>,
    },
}

#[derive(Args)]
struct TitleArgs {
    /// Display title
    title: String,

    /// Stable identity used in store keys; defaults to the media id
    #[arg(long)]
    id: Option<String>,

    #[arg(long)]
    year: Option<u16>,

    #[arg(long)]
    original_title: Option<String>,

    #[arg(long)]
    alternative_title: Option<String>,

    /// Release or air date (YYYY-MM-DD)
    #[arg(long)]
    air_date: Option<String>,

    /// Overwrite stored results instead of merging
    #[arg(long)]
    replace: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    info!(version = VERSION, "Loading configuration from {:?}", cli.config);
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Database path: {:?}", config.database.path);

    let outcome = dispatch(cli.command, &config).await;

    if cli.metrics {
        eprintln!("{}", dmm_core::metrics::gather());
    }
    outcome
}

async fn dispatch(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Scrape(ScrapeCommand::Movie { title }) => {
            commands::scrape(config, title.into_request(None, Vec::new())).await
        }
        Command::Scrape(ScrapeCommand::Show {
            title,
            season,
            episodes,
        }) => commands::scrape(config, title.into_request(Some(season), episodes)).await,
        Command::Check {
            key,
            recheck,
            hashes,
        } => commands::check(config, key, hashes, recheck).await,
        Command::Library { provider } => commands::library(config, &provider).await,
        Command::Add {
            provider,
            hash,
            instant,
        } => commands::add(config, &provider, &hash, instant).await,
        Command::Delete { provider_id } => commands::delete(config, &provider_id).await,
        Command::Downloads { delete } => commands::downloads(config, delete).await,
        Command::Config => commands::print_json(&SanitizedConfig::from(config)),
    }
}

impl TitleArgs {
    fn into_request(self, season: Option<u32>, episodes: Vec<u32>) -> commands::ScrapeRequest {
        commands::ScrapeRequest {
            identity: self.id,
            metadata: dmm_core::TitleMetadata {
                title: self.title,
                original_title: self.original_title,
                alternative_title: self.alternative_title,
                year: self.year,
                air_date: self.air_date,
            },
            season,
            episodes,
            replace_existing: self.replace,
        }
    }
}
