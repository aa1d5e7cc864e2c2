use sea_orm_migration::MigratorTrait;
use tracing_subscriber::prelude::*;

use roost_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = EngineConfig::from_env();

    // Ensure the workspace root exists early so sweeps and starts are stable.
    std::fs::create_dir_all(&cfg.workspace_root)?;

    // Persist agent logs next to the workspaces and keep stdout logs for
    // docker/dev.
    let log_dir = cfg
        .workspace_root
        .parent()
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("./data/logs"));
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "roost-agent.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
    let _file_guard = file_guard;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://roost.db?mode=rwc".to_string());
    let db = roost_db::connect(&database_url).await?;
    roost_migration::Migrator::up(&db, None).await?;

    let engine = Engine::new(cfg, roost_db::BotStore::new(db));
    engine.sweep_stale_workspaces().await;

    tracing::info!("roost-agent ready");

    // The HTTP/WebSocket collaborator drives the engine from here; the
    // daemon itself only has to stay alive until asked to shut down.
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    Ok(())
}
