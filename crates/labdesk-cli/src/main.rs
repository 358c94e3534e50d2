//! labdesk - command line front end for the laboratory records backend.
//!
//! Patient lookup, work-orders (bilans), result entry, period listings and
//! reference-data administration, on top of `labdesk-core`.

mod commands;
mod render;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use labdesk_core::{ApiError, AuthError, Config, LabClient, SessionStore};

use commands::Cli;

/// Exit code when the user has to log in again
const EXIT_LOGIN_REQUIRED: u8 = 2;

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
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.api_url.clone() {
        config.api_base_url = url;
    }
    debug!(api = %config.api_base_url, "Configuration loaded");

    let store = Arc::new(SessionStore::persistent(config.cache_dir()?));
    let client = LabClient::from_config(&config, store)?;

    info!("labdesk starting");
    commands::dispatch(cli.command, &client, &mut config).await
}

/// Print an error the way the user needs to see it and pick an exit code
fn report(err: &anyhow::Error) -> ExitCode {
    let login_required = err.chain().any(|cause| {
        cause
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::requires_login)
            || matches!(cause.downcast_ref::<AuthError>(), Some(AuthError::Api(e)) if e.requires_login())
    });

    if login_required {
        eprintln!("{}", err);
        eprintln!("Run `labdesk login` to start a new session.");
        return ExitCode::from(EXIT_LOGIN_REQUIRED);
    }

    let unreachable = err.chain().any(|cause| {
        matches!(cause.downcast_ref::<ApiError>(), Some(ApiError::Network(_)))
            || matches!(cause.downcast_ref::<AuthError>(), Some(AuthError::Network(_)))
    });
    if unreachable {
        eprintln!("Error: server unavailable, try again later ({:#})", err);
    } else {
        eprintln!("Error: {:#}", err);
    }
    ExitCode::FAILURE
}
