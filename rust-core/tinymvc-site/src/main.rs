//! tinymvc demo site
//!
//! Usage: `tinymvc-site [CONFIG_DIR]` (defaults to `./config`).

use std::path::PathBuf;
use tinymvc_core::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize JSON tracing, honouring `RUST_LOG`
fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tinymvc=info".parse()?))
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config_dir = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from("config"), PathBuf::from);

    let app = tinymvc_site::build_app(&config_dir).await?;
    info!(
        app = %app.config().app.name,
        url = %app.config().app.url,
        config = %config_dir.display(),
        "Starting"
    );

    Server::from_app(app)?.serve().await?;
    info!("Server stopped");
    Ok(())
}
