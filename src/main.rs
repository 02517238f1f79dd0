use std::net::SocketAddr;

use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use comment_server::{constants, create_router, CommentServices};

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://extend_comment.db?mode=rwc".to_string());

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to create database pool.");

    sqlx::migrate!()
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations.");

    let base_url = std::env::var("PUBLIC_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    let default_items_per_page = std::env::var("DEFAULT_ITEMS_PER_PAGE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(constants::DEFAULT_ITEMS_PER_PAGE);

    let app = create_router(
        db_pool,
        CommentServices::default(),
        base_url,
        default_items_per_page,
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!(%addr, "comment server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address.");
    axum::serve(listener, app)
        .await
        .expect("Server error.");
}
