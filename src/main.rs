use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vaultgate::api;
use vaultgate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vaultgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        rp_id = %config.rp_id,
        origin = %config.origin,
        "Starting approval server"
    );

    api::serve(config).await
}
