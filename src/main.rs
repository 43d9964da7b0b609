//! Skilldock - Entry Point
//!
//! Runs the skill admin API over the configured data directory.

use skilldock::{Config, MetadataCache, SqliteSkillRepository};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Skilldock v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let repo: Arc<dyn skilldock::SkillRepository> =
        Arc::new(SqliteSkillRepository::open(&config.db_path)?);
    let cache = Arc::new(MetadataCache::new());
    let store = Arc::new(skilldock::SkillStore::new(
        config.data_dir.clone(),
        repo.clone(),
        cache.clone(),
    )?);

    // Prime the cache so the first turn sees the full catalog
    if let Err(e) = cache.rebuild(repo.as_ref(), &config.data_dir).await {
        tracing::warn!("Initial cache rebuild failed: {}", e);
    }

    let state = Arc::new(skilldock::api::SkillApiState { store, repo, cache });
    let app = axum::Router::new()
        .nest("/api/skills", skilldock::api::skills_router(state))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Admin API listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
