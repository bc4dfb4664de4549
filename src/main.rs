//! Reqflow server - two-stage email approval workflow for requisitions

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reqflow::config::AppConfig;
use reqflow::notify::HttpMailer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reqflow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::parse();

    // Database connection
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    // Run migrations (creates the sheet tables and seeds the header row)
    sqlx::migrate!("./migrations").run(&pool).await?;

    let mailer = Arc::new(HttpMailer::new(
        config.mailer_url.clone(),
        config.mail_from.clone(),
    ));
    let state = reqflow::AppState::new(&config, pool, mailer).await?;

    // Build router
    let app = reqflow::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
