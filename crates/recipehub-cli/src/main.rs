//! RecipeHub CLI - sign in to RecipeHub and call its API from a terminal.
//!
//! This is the presentation layer over `recipehub-core`: it prompts for
//! input, prints results, and turns session errors into messages. All
//! session state lives in the core crate.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Method;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recipehub_core::api::{default_checks, run_checks};
use recipehub_core::config::{api_base_for_host, API_URL_ENV};
use recipehub_core::{
    ApiError, Config, LoginRequest, SessionInfo, SessionManager, SignupRequest, TokenClaims,
};

/// How often `watch` checks whether the session is still alive
const WATCH_POLL_SECS: u64 = 1;

#[derive(Debug, Parser)]
#[command(name = "recipehub", version, about = "Sign in to RecipeHub and call its API")]
struct Cli {
    /// API base URL (overrides the config file)
    #[arg(long, env = API_URL_ENV, global = true)]
    api_url: Option<String>,

    /// Host running the API on its standard port (e.g. 192.168.1.20)
    #[arg(long, global = true, conflicts_with = "api_url")]
    api_host: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Prompted for when omitted
        #[arg(long, env = "RECIPEHUB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "RECIPEHUB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show who is logged in
    Whoami {
        /// Print the token claims as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep the stored session fresh until interrupted
    Watch,
    /// Send an authenticated request and print the response
    Call {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Endpoint path such as /api/kitchen/post/
        path: String,
        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },
    /// Check which backend endpoints respond
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Log file path has no file name"))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(p) => Ok(p),
        None => rpassword::prompt_password("Password: ").context("Failed to read password"),
    }
}

fn describe(session: &SessionInfo) -> String {
    let who = match (&session.username, &session.user_id) {
        (Some(name), Some(id)) => format!("{} (user {})", name, id),
        (None, Some(id)) => format!("user {}", id),
        _ => "unknown user".to_string(),
    };
    match session.expires_at {
        Some(at) => format!("{}, access token valid until {}", who, at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => who,
    }
}

fn describe_claims(claims: &TokenClaims) -> String {
    let who = format!("{} (user {})", claims.display_name(), claims.user_id);
    if claims.is_expired() {
        return format!("{}, access token expired (refreshed on next `watch` or `call`)", who);
    }
    match claims.minutes_until_expiry() {
        Some(minutes) => format!("{}, access token expires in {} min", who, minutes),
        None => who,
    }
}

fn whoami(session: &SessionManager, json: bool) -> Result<()> {
    if !session.is_authenticated() {
        println!("Not logged in");
        return Ok(());
    }
    match session.credentials().current_claims() {
        Some(claims) if json => println!("{}", serde_json::to_string_pretty(&claims)?),
        Some(claims) => println!("{}", describe_claims(&claims)),
        None => println!("Logged in, but the access token could not be read"),
    }
    Ok(())
}

/// Turn session errors into something a person can act on
fn user_message(error: &ApiError) -> String {
    match error {
        ApiError::Unauthorized => "Session expired. Please run `recipehub login` again.".to_string(),
        ApiError::Network(_) => format!("Network error. Please try again. ({})", error),
        _ => error.to_string(),
    }
}

async fn login(
    session: &SessionManager,
    config: &mut Config,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = password_or_prompt(password)?;

    let info = session
        .login(&LoginRequest::new(email.clone(), password))
        .await
        .map_err(|e| anyhow::anyhow!(user_message(&e)))?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    println!("Login successful! Signed in as {}", describe(&info));
    Ok(())
}

async fn watch(session: &SessionManager) -> Result<()> {
    let info = session
        .resume()
        .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `recipehub login` first."))?;
    println!(
        "Keeping session fresh for {} (every {}s, Ctrl-C to stop)",
        describe(&info),
        session.refresh_interval().as_secs()
    );

    let mut poll = tokio::time::interval(Duration::from_secs(WATCH_POLL_SECS));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                session.stop_refresh();
                println!("Stopped.");
                return Ok(());
            }
            _ = poll.tick() => {
                if !session.is_refreshing() {
                    anyhow::bail!("Session expired. Please run `recipehub login` again.");
                }
            }
        }
    }
}

async fn call(session: &SessionManager, method: &str, path: &str, data: Option<String>) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;
    let body = data
        .map(|d| serde_json::from_str::<serde_json::Value>(&d))
        .transpose()
        .context("--data is not valid JSON")?;

    let response = session
        .call(method, path, body.as_ref())
        .await
        .map_err(|e| anyhow::anyhow!(user_message(&e)))?;

    eprintln!("{}", response.status);
    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", response.body),
    }
    if !response.is_success() {
        anyhow::bail!("Request failed with status {}", response.status);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref())?;

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = Some(url);
    } else if let Some(host) = cli.api_host {
        config.api_base_url = Some(api_base_for_host("http", &host));
    }
    let session = config.build_session()?;
    info!(api = %session.api().base_url(), "RecipeHub CLI starting");

    match cli.command {
        Command::Login { email, password } => login(&session, &mut config, email, password).await?,
        Command::Signup { username, email, password } => {
            let password = password_or_prompt(password)?;
            session
                .register(&SignupRequest::new(username, email, password))
                .await
                .map_err(|e| anyhow::anyhow!(user_message(&e)))?;
            println!("Account created successfully! Run `recipehub login` to sign in.");
        }
        Command::Logout => {
            session.logout();
            println!("Logged out successfully");
        }
        Command::Whoami { json } => whoami(&session, json)?,
        Command::Watch => watch(&session).await?,
        Command::Call { method, path, data } => call(&session, &method, &path, data).await?,
        Command::Verify { json } => {
            let report = run_checks(session.api(), session.credentials(), &default_checks()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
    }

    Ok(())
}
