#![forbid(unsafe_code)]

//! Command-line entry point with two modes: `cli` copies playlists through
//! terminal prompts, `server` runs the web front end.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use playlists_copy::cli;
use playlists_copy::config::{RuntimeOverrides, resolve_settings};
use playlists_copy::logging::init_logging;
use playlists_copy::server::{self, AppState};
use playlists_copy::youtube::{OAuthConfig, YouTubeClientFactory};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "playlists-copy", version, about = "Copies public playlists into one.")]
struct Args {
    /// Directory holding config.toml and the cached token.
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Config file to read instead of <config-dir>/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON credential file from Google Cloud Console.
    #[arg(short = 'c', long, global = true)]
    credential: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy playlists through terminal prompts.
    Cli,
    /// Run the web server.
    Server {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (host, port) = match &args.command {
        Command::Server { host, port } => (host.clone(), *port),
        Command::Cli => (None, None),
    };
    let settings = resolve_settings(RuntimeOverrides {
        config_dir: args.config_dir,
        config_file: args.config,
        credential: args.credential,
        host,
        port,
        log_level: args.log_level,
    })?;
    init_logging(&settings.log_level)?;

    let oauth = OAuthConfig::load(&settings.credential).with_context(|| {
        format!("loading credential file {}", settings.credential.display())
    })?;

    match args.command {
        Command::Cli => {
            let mut input = io::stdin().lock();
            let mut output = io::stdout();
            let copied = cli::run(&settings.config_dir, oauth, &mut input, &mut output)
                .await
                .inspect_err(|err| error!(error = %err, "copy failed"))
                .context("copying playlists")?;
            info!(copied, "all videos inserted");
        }
        Command::Server { .. } => {
            let addr = settings.socket_addr()?;
            let state = AppState::new(
                Arc::new(oauth.clone()),
                Arc::new(YouTubeClientFactory::new(oauth)),
            );
            server::run(addr, state).await?;
        }
    }

    Ok(())
}
