//! DiceLog command-line front end.

mod prompt;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dicelog::dice::{ROLL_COMMAND, STATS_COMMAND};
use dicelog::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::prompt::TerminalPrompt;

const DEFAULT_SERVER_CONFIG: &str = "server.toml";
const DEFAULT_CLIENT_CONFIG: &str = "client.toml";

#[derive(Parser)]
#[command(name = "dicelog")]
#[command(about = "Session-authenticated dice logging server and client")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server until interrupted
    Server {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_SERVER_CONFIG)]
        config: PathBuf,
    },

    /// Send a roll (if given) and an all-time statistics request
    Client {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_CLIENT_CONFIG)]
        config: PathBuf,

        /// Dice notation to roll, e.g. `3 1d20+6 attack`
        roll: Vec<String>,
    },

    /// Create an identity in the server database
    NewUser {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_SERVER_CONFIG)]
        config: PathBuf,
    },

    /// Change the password of an existing identity
    Passwd {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_SERVER_CONFIG)]
        config: PathBuf,

        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose picks debug over info.
    let fallback = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .ok();

    match cli.command {
        Command::Server { config } => run_server(&config).await,
        Command::Client { config, roll } => run_client(&config, roll.join(" ")).await,
        Command::NewUser { config } => new_user(&config),
        Command::Passwd { config, username } => passwd(&config, &username),
    }
}

fn load_server_config(path: &Path) -> Result<ServerConfig> {
    ServerConfig::load_or_default(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Authenticator over the configured database, for the admin commands.
fn open_authenticator(path: &Path) -> Result<SessionAuthenticator<SqliteStore>> {
    let config = load_server_config(path)?;
    let store = SqliteStore::open(&config.database_file).with_context(|| {
        format!("failed to open database {}", config.database_file.display())
    })?;
    Ok(SessionAuthenticator::new(
        Arc::new(store),
        config.session_config(),
    ))
}

async fn run_server(path: &Path) -> Result<()> {
    let config = load_server_config(path)?;
    info!(bind = %config.bind_addr, database = %config.database_file.display(), "starting server");

    let server = DicelogServer::from_config(&config)
        .await
        .context("failed to start server")?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!(error = %e, "server stopped");
            }
            result.map_err(Into::into)
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
    }
}

async fn run_client(path: &Path, roll: String) -> Result<()> {
    let config = ClientConfig::load_or_default(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    let mut client = Client::connect(&config, TerminalPrompt)
        .await
        .with_context(|| format!("failed to connect to {}", config.server_addr))?;

    let now = chrono::Utc::now();
    let base_id = now.timestamp_millis().unsigned_abs();
    let command = |offset: u64, command_id: u64, data: &str| DiscordCommand {
        interaction_id: base_id + offset,
        interaction_type: 0,
        command_id,
        interaction_data: data.to_owned(),
        channel_id: 0,
        channel_name: "cli".into(),
        user_id: 0,
        username: config.username.clone(),
        user_discriminator: String::new(),
        user_display_name: config.username.clone(),
        timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    if !roll.is_empty() {
        let response = client.send_command(&command(0, ROLL_COMMAND, &roll)).await?;
        print_response(&response);
    }
    if client.is_connected() {
        let response = client
            .send_command(&command(1, STATS_COMMAND, "all;all"))
            .await?;
        print_response(&response);
    }

    client.close_session().await?;
    Ok(())
}

fn print_response(response: &DiscordResponse) {
    match (&response.is_authenticated, &response.command_response) {
        (Some(true), Some(text)) => println!("{text}"),
        (_, Some(text)) => eprintln!("{text}"),
        (_, None) => eprintln!("(empty response)"),
    }
}

fn new_user(path: &Path) -> Result<()> {
    let auth = open_authenticator(path)?;

    let username = prompt::read_line("Username: ")?;
    let password = prompt::read_new_password()?;
    let id = auth
        .provision_identity(&username, &password)
        .with_context(|| format!("failed to create {username}"))?;

    println!("Created {username} ({id})");
    Ok(())
}

fn passwd(path: &Path, username: &str) -> Result<()> {
    let auth = open_authenticator(path)?;
    let id = auth
        .identity_id(username)
        .with_context(|| format!("no identity named {username}"))?;

    let password = prompt::read_new_password()?;
    auth.change_password(id, &password)
        .with_context(|| format!("failed to change the password of {username}"))?;

    println!("Password changed for {username}");
    Ok(())
}
