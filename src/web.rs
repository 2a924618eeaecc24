#![cfg(not(tarpaulin_include))]

use sheetboard::app;
use sheetboard::config::{self, Config};

/// Main entry point for the dashboard web server
///
/// Loads `.env`, initializes logging (`RUST_LOG`, default `info`), reads the
/// configuration from the environment and serves the dashboard until the
/// process is stopped.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env may set RUST_LOG, so load it before the logger
    let dotenv = config::load_dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenv {
        Ok(Some(path)) => log::info!("loaded environment from {}", path.display()),
        Ok(None) => {}
        Err(e) => log::warn!("ignoring unreadable .env file: {}", e),
    }

    let config = Config::from_env()?;
    app::run(config).await
}
