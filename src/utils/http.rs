use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

/// Builds the one outbound client shared by every capability. Per-call
/// timeouts are set on each request.
pub fn build_http_client(connect_timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("story_weaver/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
