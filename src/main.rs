mod app;
mod auth;
mod config;
mod live;
mod logging;
mod monitor_paths;
mod structured_logger;

use anyhow::Result;
use app::cli::{Cli, Command};
use auth::{FileCredentialStore, SessionClient, UreqTransport};
use clap::Parser;
use config::MonitorConfig;
use std::sync::Arc;

/// Short git revision the binary was built from, sent in the User-Agent.
pub(crate) const BUILD_SHA: &str = env!("SHIFT_MONITOR_GIT_SHA");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging();

    let config = MonitorConfig::load(cli.config.as_deref())?;
    tracing::debug!(api = %config.api_base_url, feed = %config.feed_url, "Configuration loaded");

    let credentials = FileCredentialStore::open_default()?;
    tracing::debug!(path = %credentials.path().display(), "Credential store opened");
    let client = SessionClient::new(
        Arc::new(UreqTransport::new(
            &config.api_base_url,
            config.request_timeout(),
        )),
        Arc::new(credentials),
    );

    match cli.command {
        Command::Login { username, password } => app::login(&client, &username, password).await,
        Command::Logout => {
            app::logout(&client);
            Ok(())
        }
        Command::Watch => app::run_watch(&config).await,
        Command::Request { method, path, data } => {
            app::run_request(&client, method, &path, data.as_deref()).await
        }
    }
}
