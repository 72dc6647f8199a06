//! unigate - a command-line front-end for the university portal.
//!
//! Logs in against the portal API, keeps the session in the configured
//! credential store, and issues authenticated requests with transparent
//! token refresh.

use std::io;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use unigate_core::{
    ApiError, AuthRequest, Config, CredentialStore, RegistrationForm, Role, SessionClient,
    SessionClientBuilder,
};

type Client = SessionClient<Box<dyn CredentialStore>>;

#[derive(Parser)]
#[command(name = "unigate", version, about = "University portal from the command line")]
struct Cli {
    /// Override the API base URL for this invocation
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the portal API is reachable
    Ping,
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create a new account (does not log in)
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        /// student, lecturer or admin
        #[arg(short, long, default_value = "student", value_parser = parse_role)]
        role: Role,
    },
    /// Show the logged-in user
    Whoami,
    /// Show dashboard counters for the logged-in user
    Stats,
    /// GET an API path and print the JSON response
    Get { path: String },
    /// POST a JSON body to an API path and print the JSON response
    Post {
        path: String,
        #[arg(short, long)]
        data: String,
    },
    /// Clear the stored session
    Logout,
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::parse(s).ok_or_else(|| format!("unknown role '{}'", s))
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load config")?;
    if let Some(url) = cli.api_url {
        config.base_url = url;
    }
    info!(base_url = %config.base_url, store = ?config.store, "unigate starting");

    let store = config.open_store()?;
    let client: Client = SessionClientBuilder::from_config(&config)
        .build(store)
        .context("Failed to create API client")?;

    run(cli.command, &client, &mut config).await.map_err(explain)
}

async fn run(command: Command, client: &Client, config: &mut Config) -> Result<()> {
    match command {
        Command::Ping => {
            if !client.check_connectivity().await {
                bail!("Cannot reach {}", client.base_url());
            }
            println!("Server reachable at {}", client.base_url());
        }
        Command::Login { username } => {
            let username = match username.or_else(|| config.last_username.clone()) {
                Some(username) => username,
                None => prompt("Username: ")?,
            };
            let password = rpassword::prompt_password(format!("Password for {}: ", username))
                .context("Failed to read password")?;

            let envelope = client.login(&username, &password).await?;

            config.last_username = Some(username);
            if let Err(e) = config.save() {
                tracing::warn!(error = %e, "Failed to save config");
            }
            println!("Logged in as {} ({})", envelope.user.username, envelope.user.role);
        }
        Command::Register { username, email, role } => {
            let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
            let confirm = rpassword::prompt_password("Confirm password: ")
                .context("Failed to read password")?;
            if password != confirm {
                bail!("Passwords do not match");
            }

            let form = RegistrationForm::new(username, email, password).with_role(role);
            client.register(&form).await?;
            println!("Account {} created. Log in with `unigate login -u {}`.", form.username, form.username);
        }
        Command::Whoami => match client.session()? {
            Some(session) => match session.user {
                Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
                None => println!("Logged in (no cached profile)"),
            },
            None => bail!(ApiError::AuthRequired),
        },
        Command::Stats => {
            let stats = client.dashboard_stats().await?;
            for name in stats.names() {
                println!("{:<20} {}", name, stats.count(name));
            }
        }
        Command::Get { path } => {
            let body: Value = client.request(&AuthRequest::get(path)).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Post { path, data } => {
            let payload: Value = serde_json::from_str(&data).context("--data must be valid JSON")?;
            let body: Value = client.request(&AuthRequest::post(path, payload)).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Logout => {
            client.logout();
            println!("Logged out");
        }
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No input given");
    }
    Ok(value)
}

/// Point the user at `login` when the session is gone
fn explain(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<ApiError>() {
        Some(api) if api.requires_login() => err.context("Run `unigate login` to start a new session"),
        _ => err,
    }
}
