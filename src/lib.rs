pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;

use api::create_api_router;
use axum::{Router, http::HeaderName};
use db::Database;
use jwt::{JwtConfig, JwtError};
use rate_limit::{CustomerLimiter, IpLimiters};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Header carrying the client IP when running behind a proxy
    pub ip_header: Option<HeaderName>,
    /// Per-IP token buckets
    pub ip_limiters: Arc<IpLimiters>,
    /// Per-customer fixed-window counters
    pub customer_limiter: Arc<CustomerLimiter>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, JwtError> {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret)?);

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        config.ip_limiters.clone(),
        config.ip_header.clone(),
        config.customer_limiter.clone(),
    );

    Ok(Router::new().nest("/api", api_router))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    cleanup::run_cleanup(
        &config.db,
        &config.ip_limiters,
        &config.customer_limiter,
    )
    .await;
    cleanup::spawn_cleanup_scheduler(
        config.db.clone(),
        config.ip_limiters.clone(),
        config.customer_limiter.clone(),
    );
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
