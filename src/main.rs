use anyhow::Context;
use dotenvy::dotenv;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use slotserver::core::shared::utils::redact_database_url;
use slotserver::scheduling::MemoryStore;
use slotserver::{run_server, AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    match config.database.url.clone() {
        #[cfg(feature = "postgres")]
        Some(url) => {
            use slotserver::core::shared::utils::create_conn;
            use slotserver::scheduling::PgStore;

            info!("Connecting to {}", redact_database_url(&url));
            let pool = create_conn(&url, config.database.pool_size)
                .context("Failed to create database pool")?;
            let store = PgStore::new(pool);
            store
                .run_migrations()
                .context("Failed to create scheduling tables")?;
            run_server(AppState::new(Arc::new(store), config), addr).await?;
        }
        #[cfg(not(feature = "postgres"))]
        Some(url) => {
            warn!(
                "Database {} configured but postgres support is not compiled in; \
                 using in-memory store",
                redact_database_url(&url)
            );
            run_server(AppState::new(Arc::new(MemoryStore::new()), config), addr).await?;
        }
        None => {
            warn!("No database configured; bookings are kept in memory only");
            run_server(AppState::new(Arc::new(MemoryStore::new()), config), addr).await?;
        }
    }

    info!("Server stopped");
    Ok(())
}
