//! CLI for the idlefetch background prefetcher.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use idlefetch_core::config;
use idlefetch_core::StorePreference;

use commands::{run_checksum, run_fetch, run_locate, run_purge};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "idlefetch")]
#[command(about = "idlefetch: download large resources in the background while the network is idle", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Prefetch one or more URLs, resuming from any stored content.
    Fetch(FetchArgs),

    /// Print the file:// handle of stored content for a cache key.
    Locate {
        /// Cache key (defaults to the last URL path segment when fetching).
        key: String,
    },

    /// Delete fragment-table content stored for a cache key.
    Purge {
        /// Cache key.
        key: String,
    },

    /// SHA-256 of stored content (by cache key) or of a file.
    Checksum {
        /// File path or cache key.
        target: String,

        /// Expected digest, hex; exit with an error on mismatch.
        #[arg(long, value_name = "HEX")]
        expect: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// HTTP/HTTPS URLs to prefetch.
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Queue priority; higher runs first.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub priority: i32,

    /// Cache key (single URL only).
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,

    /// Expected SHA-256 of the complete resource, hex (single URL only).
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Fixed chunk size in bytes instead of the adaptive size.
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// Idle gap required before each chunk, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub min_idle_ms: Option<u64>,

    /// Run up to N prefetches at once (default from config).
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Storage backend: streaming or fragments.
    #[arg(long, value_name = "STORE")]
    pub store: Option<StorePreference>,

    /// Allow prefetching on cellular connections.
    #[arg(long)]
    pub allow_cellular: bool,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch(args) => run_fetch(&cfg, args).await?,
            CliCommand::Locate { key } => run_locate(&cfg, &key).await?,
            CliCommand::Purge { key } => run_purge(&cfg, &key).await?,
            CliCommand::Checksum { target, expect } => {
                run_checksum(&cfg, &target, expect.as_deref()).await?
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
