use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use dbus_interface::{GateService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("condogated starting");

    let config = config::Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        ml_service = config.ml_base_url.as_deref().unwrap_or("disabled"),
        threshold = config.similarity_threshold,
        "configuration loaded"
    );

    let session_bus = config.session_bus;
    let engine = engine::spawn_engine(config).await?;

    let builder = if session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, GateService::new(engine.clone()))?
        .build()
        .await?;

    tracing::info!(
        bus = if session_bus { "session" } else { "system" },
        name = BUS_NAME,
        "condogated ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("condogated shutting down");
    engine.shutdown().await;

    Ok(())
}
