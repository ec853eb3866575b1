use std::time::Duration;

use dotenvy::dotenv;
use tracing::info;

mod config;
mod db;
mod error;
mod handlers;
mod llm;
mod models;
mod server;
mod state;
mod story;
#[cfg(test)]
mod test_support;
mod utils;

use config::Config;
use utils::http::build_http_client;
use utils::logging::init_logging;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::load()?;
    let _logging_guards = init_logging(&config);

    info!(
        "Starting story weaver (provider: {}, bind: {})",
        config.provider.as_str(),
        config.bind_addr
    );

    let http = build_http_client(CONNECT_TIMEOUT)?;
    let state = server::build_state(&config, http).await?;
    server::serve(&config, state).await
}
