use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use gallery_backend::config::{self, Vendor};
use gallery_backend::db::{self, DbPool};
use gallery_backend::search::SearchEngine;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gallery_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Gallery backend built at {}", env!("BUILD_TIME"));

    // Load configuration / 加载配置
    let app_config = config::load_config().map_err(anyhow::Error::msg)?;
    tracing::info!("Server will listen on {}:{}", app_config.server.host, app_config.server.port);

    // Create data directory if not exists / 创建数据目录
    if app_config.database.vendor == Vendor::Sqlite {
        let data_dir = app_config.get_data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)?;
            tracing::info!("Created data directory: {:?}", data_dir);
        }
    }

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| app_config.get_database_url());

    let db = DbPool::connect(
        app_config.database.vendor,
        &database_url,
        app_config.database.max_connections,
    )
    .await?;
    tracing::info!("Connected to {:?} database", db.kind());

    db::run_migrations(&db).await?;

    let engine = SearchEngine::new(db, app_config.site.clone());
    let state = Arc::new(AppState::new(engine));

    let app = Router::new()
        .route("/api/health", get(api::server::health_check))
        .route("/api/library", get(api::library::library))
        .route("/api/library/items", post(api::library::items))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let bind_addr = app_config.get_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
