//! `vr180` -- command-line client for the VR180 conversion service.
//!
//! Signs in, uploads videos for conversion, follows their jobs live
//! until the converted video is ready and downloads the result.
//!
//! # Environment variables
//!
//! | Variable                        | Default                      |
//! |---------------------------------|------------------------------|
//! | `VR180_API_URL`                 | `http://localhost:8000/api/` |
//! | `VR180_WS_URL`                  | `ws://localhost:8000/ws/`    |
//! | `VR180_REQUEST_TIMEOUT_SECS`    | `60`                         |
//! | `VR180_SESSION_FILE`            | `$HOME/.vr180/session.json`  |
//! | `VR180_LIVE_RECONNECT_ATTEMPTS` | `5`                          |
//! | `RUST_LOG`                      | `vr180_cli=info,...`         |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vr180_client::{ApiClient, ClientConfig, Session};

mod commands;
mod render;

/// VR180 video conversion client
#[derive(Parser, Debug)]
#[command(name = "vr180")]
#[command(about = "Convert videos to VR180 and follow the conversion live", long_about = None)]
struct Args {
    /// REST API base URL (overrides VR180_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// WebSocket base URL (overrides VR180_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "VR180_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(short, long)]
        nick_name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "VR180_PASSWORD", hide_env_values = true)]
        password: String,
        /// Must repeat the password
        #[arg(long)]
        confirm_password: String,
    },

    /// Sign out and forget the session
    Logout,

    /// Show the signed-in user and their library counts
    Whoami,

    /// List conversion jobs
    Jobs {
        /// Print the jobs as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload a video and start converting it
    Upload {
        file: PathBuf,

        /// Return once the job is created instead of following it
        #[arg(long)]
        no_watch: bool,
    },

    /// Follow every running job until it finishes
    Watch,

    /// Show library counts
    Stats,

    /// Print the link to a converted video
    Open { job_id: String },

    /// Save a converted video to disk
    Download {
        job_id: String,

        /// Destination file (defaults to the output's file name)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vr180_cli=info,vr180_client=info,vr180_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::from_env().context("Invalid configuration")?;
    if let Some(url) = &args.api_url {
        config.set_api_url(url)?;
    }
    if let Some(url) = &args.ws_url {
        config.set_ws_url(url)?;
    }

    tracing::debug!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        session_file = %config.session_file.display(),
        "Configuration loaded",
    );

    let session = Session::file(config.session_file.clone());
    let api = ApiClient::new(Arc::new(config), session)?;

    match args.command {
        Command::Login { email, password } => commands::login(&api, email, password).await,
        Command::Register {
            nick_name,
            email,
            password,
            confirm_password,
        } => commands::register(&api, nick_name, email, password, confirm_password).await,
        Command::Logout => commands::logout(&api).await,
        Command::Whoami => commands::whoami(&api).await,
        Command::Jobs { json } => commands::jobs(&api, json).await,
        Command::Upload { file, no_watch } => commands::upload(api, &file, !no_watch).await,
        Command::Watch => commands::watch(api).await,
        Command::Stats => commands::stats(&api).await,
        Command::Open { job_id } => commands::open(&api, &job_id).await,
        Command::Download { job_id, out } => commands::download(&api, &job_id, out).await,
    }
}
