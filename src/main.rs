//! Angler Game Server
//!
//! Real-time fishing minigame server.
//! Loads the catalog, then serves WebSocket sessions until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use angler::{
    VERSION,
    config::ServerConfig,
    game::InMemoryPlayerServices,
    network::server::{load_catalog, GameServer},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let default_level = if cfg!(feature = "debug-tracing") { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    let config = ServerConfig::from_env();
    info!("Angler Server v{}", VERSION);
    info!(
        "Bite check every {:?}, fight tick every {:?}, bite window {:?}",
        config.engine.bite_check_interval, config.engine.fight_tick_interval, config.engine.bite_window
    );

    let catalog = load_catalog(&config).context("failed to load catalog")?;

    // Profiles live in memory; every new player starts with the starter kit.
    let services = Arc::new(InMemoryPlayerServices::default());
    let profiles = services.clone();

    let server = Arc::new(
        GameServer::new(config, Arc::new(catalog), services).on_connect(move |player| {
            if profiles.create_profile(player) {
                info!(player = %player, "Created starter profile");
            }
        }),
    );

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_server.shutdown(),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await.context("server failed")?;
    info!("Server stopped");
    Ok(())
}
