mod api;
mod cli;
mod config;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::cli::ExportKind;
use crate::config::Config;
use crate::models::Sport;
use crate::services::FeedKind;
use crate::utils::parse_format_list;

#[derive(Parser)]
#[command(name = "scorecast")]
#[command(about = "Live cricket and football scores, results and commentary")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Show the live-matches feed
    Live {
        #[arg(short, long)]
        sport: Option<Sport>,
    },
    /// Show the featured matches strip
    Hero,
    /// List recent results
    Results {
        /// Comma-separated formats, e.g. "odi,test"
        #[arg(short, long)]
        format: Option<String>,
        #[arg(short, long)]
        sport: Option<Sport>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show ball-by-ball commentary for a match
    #[command(group(ArgGroup::new("target").required(true).args(["match_id", "team"])))]
    Commentary {
        #[arg(short, long)]
        match_id: Option<String>,
        /// Find the match in the live feed by team name
        #[arg(short, long)]
        team: Option<String>,
        #[arg(long)]
        in_house: bool,
        /// Keep polling until interrupted
        #[arg(short, long)]
        watch: bool,
    },
    /// Poll a feed and print every update
    Watch {
        #[arg(short, long, default_value = "live")]
        feed: FeedKind,
    },
    /// Export recent results to a file
    Export {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value = "csv")]
        kind: ExportKind,
        #[arg(short, long)]
        format: Option<String>,
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scorecast=info")),
        )
        .init();

    let config = Config::from_env()?;
    let cli = Cli::parse();
    let formats = |raw: Option<String>| raw.as_deref().map(parse_format_list).unwrap_or_default();

    match cli.command {
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting scorecast API server on port {}", port);
            api::serve(port, config).await?;
        }
        Some(Commands::Live { sport }) => {
            cli::show_feed(&config, FeedKind::Live, sport).await?;
        }
        Some(Commands::Hero) => {
            cli::show_feed(&config, FeedKind::Hero, None).await?;
        }
        Some(Commands::Results { format, sport, limit }) => {
            cli::show_results(&config, formats(format), sport, limit).await?;
        }
        Some(Commands::Commentary { match_id, team, in_house, watch }) => {
            cli::show_commentary(&config, match_id, team, in_house, watch).await?;
        }
        Some(Commands::Watch { feed }) => {
            cli::watch_feed(&config, feed).await?;
        }
        Some(Commands::Export { output, kind, format, limit }) => {
            tracing::info!("Exporting results to {}", output.display());
            cli::export_results(&config, &output, kind, formats(format), limit).await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting scorecast API server on port 3000");
            api::serve(3000, config).await?;
        }
    }

    Ok(())
}
