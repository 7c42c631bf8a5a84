//! authgate - command-line front end for the authgate access layer.
//!
//! Plays the UI side of the gateway: prints notifications to stderr, tells
//! the user to sign in again when the session ends, and exposes a few
//! commands for logging in and issuing authenticated requests.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use authgate_core::config::APP_NAME;
use authgate_core::{
    AuthApi, FileStorage, Gateway, GatewayConfig, KeyValueStorage, KeyringStorage, Notification,
    OutboundRequest, Severity,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Directory for log files; logs go to stderr when unset
const LOG_DIR_ENV: &str = "AUTHGATE_LOG_DIR";

/// Set to `keyring` to keep the token in the OS keychain instead of a file
const STORAGE_ENV: &str = "AUTHGATE_STORAGE";

const USAGE: &str = "\
Usage: authgate <command>

Commands:
  login <email>     Sign in (prompts for password) and store the access token
  logout            Forget the stored access token
  me                Show the signed-in user's profile
  token             Show whether an access token is stored
  get <path>        Send an authenticated GET and print the response
  config            Show the effective configuration
  config save       Write the effective configuration to the config file";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "authgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn open_storage() -> Result<Arc<dyn KeyValueStorage>> {
    match std::env::var(STORAGE_ENV).as_deref() {
        Ok("keyring") => Ok(Arc::new(KeyringStorage::new(APP_NAME))),
        _ => {
            let storage = FileStorage::in_data_dir(APP_NAME)
                .context("Could not find a data directory for token storage")?;
            Ok(Arc::new(storage))
        }
    }
}

fn print_notification(n: Notification) {
    let label = match n.severity {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
    };
    eprintln!("[{}] {}: {}", label, n.title, n.description);
}

fn prompt_sign_in() {
    eprintln!("Session expired. Run `authgate login <email>` to sign in again.");
}

fn build_gateway(config: GatewayConfig) -> Result<Gateway> {
    let gateway = Gateway::builder(config)
        .storage(open_storage()?)
        .notifier(Arc::new(print_notification))
        .session_hook(Arc::new(prompt_sign_in))
        .build()?;
    Ok(gateway)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = GatewayConfig::load()?;
    info!(api_url = %config.api_url(), command = %command, "authgate starting");

    match command.as_str() {
        "login" => {
            let email = args.get(1).context("login requires an email")?;
            let password = rpassword::prompt_password("Password: ")?;
            let api = AuthApi::new(build_gateway(config)?);
            let login = api.login(email, &password).await?;
            println!("Signed in as {}", login.user.email);
        }
        "logout" => {
            AuthApi::new(build_gateway(config)?).logout();
            println!("Signed out");
        }
        "me" => {
            let profile = AuthApi::new(build_gateway(config)?).get_me().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        "token" => {
            let gateway = build_gateway(config)?;
            let api = AuthApi::new(gateway.clone());
            match (gateway.get_token(), api.cached_user()) {
                (Some(_), Some(user)) => println!("Access token stored for {}", user.email),
                (Some(_), None) => println!("Access token stored"),
                (None, _) => println!("No access token stored"),
            }
        }
        "get" => {
            let path = args.get(1).context("get requires a path")?;
            let gateway = build_gateway(config)?;
            let response = gateway.send(OutboundRequest::get(path.as_str())).await?;
            println!("{}", serde_json::to_string_pretty(&response.into_value())?);
        }
        "config" => match args.get(1).map(String::as_str) {
            None => println!("{}", serde_json::to_string_pretty(&config)?),
            Some("save") => {
                let path = config.save()?;
                println!("Configuration written to {}", path.display());
            }
            Some(other) => bail!("Unknown config command: {}\n\n{}", other, USAGE),
        },
        "help" | "--help" | "-h" => println!("{}", USAGE),
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }

    Ok(())
}
