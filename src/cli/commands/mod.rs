//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod blacklist;
mod proxies;
mod scrape;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use partyfetch::config::{Config, ConfigOverrides};
use partyfetch::http_client::resolve_user_agent;
use partyfetch::proxy::ProxyPool;

#[derive(Parser)]
#[command(name = "partyfetch")]
#[command(about = "Archive media attachments from creator post histories")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "PARTYFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Download new attachments for configured creators
    Scrape {
        /// Only scrape creators whose username or user id matches
        creators: Vec<String>,
        /// Concurrent downloads per creator (1-10)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// Stop after this many posts per creator (0 = unlimited)
        #[arg(short = 'n', long)]
        max_posts: Option<usize>,
        /// Output directory template (supports %username%)
        #[arg(short, long)]
        output_dir: Option<String>,
        /// Disable progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Inspect or edit the blacklist of a download directory
    Blacklist {
        #[command(subcommand)]
        command: BlacklistCommands,
    },

    /// Show configured proxies and their availability
    Proxies,
}

#[derive(Subcommand)]
enum BlacklistCommands {
    /// List blacklisted files
    List {
        /// Creator download directory containing blacklist.json
        dir: PathBuf,
    },
    /// Remove one entry, or every entry when no path is given
    Clear {
        /// Creator download directory containing blacklist.json
        dir: PathBuf,
        /// Remote path of the entry to remove
        #[arg(long)]
        path: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Scrape {
            creators,
            concurrency,
            max_posts,
            output_dir,
            no_progress,
        } => {
            let overrides = ConfigOverrides {
                max_concurrent_downloads: concurrency,
                max_posts,
                output_dir,
            };
            scrape::cmd_scrape(config_path, &creators, &overrides, !no_progress).await
        }
        Commands::Blacklist { command } => match command {
            BlacklistCommands::List { dir } => blacklist::cmd_blacklist_list(&dir).await,
            BlacklistCommands::Clear { dir, path } => {
                blacklist::cmd_blacklist_clear(&dir, path.as_deref()).await
            }
        },
        Commands::Proxies => proxies::cmd_proxies(config_path).await,
    }
}

/// Proxy pool shared by every creator in a run.
fn build_proxy_pool(config: &Config) -> anyhow::Result<Arc<ProxyPool>> {
    let user_agent = resolve_user_agent(config.user_agent.as_deref());
    let pool = ProxyPool::from_settings(
        &config.proxies,
        &user_agent,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    Ok(Arc::new(pool))
}
