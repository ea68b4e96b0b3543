//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::rate_limit::{CustomerLimiter, CustomerLimits, IpLimiters, IpLimits, WindowRule};
use axum::http::HeaderName;
use clap::Parser;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "revgate",
    about = "Customer authentication and rate limiting for the revenue API"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "revgate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Trusted proxy header carrying the client IP (e.g. "x-forwarded-for").
    /// Without it the socket address is used
    #[arg(long, env = "IP_HEADER", value_parser = parse_header_name)]
    pub ip_header: Option<HeaderName>,

    /// Requests per minute per client IP across all API routes
    #[arg(long, env = "IP_REQUESTS_PER_MINUTE", default_value = "120")]
    pub ip_requests_per_minute: NonZeroU32,

    /// Requests per minute per client IP on credential-issuing routes
    #[arg(long, env = "CREDENTIAL_REQUESTS_PER_MINUTE", default_value = "10")]
    pub credential_requests_per_minute: NonZeroU32,

    /// Read requests allowed per customer per window
    #[arg(long, env = "READ_LIMIT", default_value = "100")]
    pub read_limit: u32,

    /// Length of the read window in seconds
    #[arg(long, env = "READ_WINDOW_SECS", default_value = "900", value_parser = clap::value_parser!(u64).range(1..))]
    pub read_window_secs: u64,

    /// Write requests allowed per customer per window
    #[arg(long, env = "WRITE_LIMIT", default_value = "30")]
    pub write_limit: u32,

    /// Length of the write window in seconds
    #[arg(long, env = "WRITE_WINDOW_SECS", default_value = "900", value_parser = clap::value_parser!(u64).range(1..))]
    pub write_window_secs: u64,

    /// Create a customer with this company name on startup and print its ID
    #[arg(long, value_name = "COMPANY")]
    pub create_customer: Option<String>,
}

fn parse_header_name(s: &str) -> Result<HeaderName, String> {
    HeaderName::try_from(s).map_err(|e| format!("Invalid header name '{}': {}", s, e))
}

/// Initialize logging in the requested format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    check_secret_length(secret)
}

fn check_secret_length(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Handle the --create-customer flag: create the customer and print its ID.
pub async fn handle_create_customer(db: &Database, company_name: &str) -> Option<String> {
    let company_name = company_name.trim();
    if company_name.is_empty() {
        error!("--create-customer needs a non-empty company name");
        return None;
    }

    let id = Uuid::new_v4().to_string();
    match db.customers().create(&id, company_name, None).await {
        Ok(()) => {
            info!(customer_id = %id, "Customer created");
            println!();
            println!("Customer created: {}", company_name);
            println!("Customer ID: {}", id);
            println!();
            Some(id)
        }
        Err(e) => {
            error!(error = %e, "Failed to create customer");
            None
        }
    }
}

/// Per-customer window rules from the parsed arguments.
pub fn customer_limits(args: &Args) -> CustomerLimits {
    CustomerLimits {
        read: WindowRule::new(args.read_limit, Duration::from_secs(args.read_window_secs)),
        write: WindowRule::new(
            args.write_limit,
            Duration::from_secs(args.write_window_secs),
        ),
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    let ip_limits = IpLimits {
        global_per_minute: args.ip_requests_per_minute,
        credential_per_minute: args.credential_requests_per_minute,
    };

    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        ip_header: args.ip_header.clone(),
        ip_limiters: Arc::new(IpLimiters::new(ip_limits)),
        customer_limiter: Arc::new(CustomerLimiter::new(customer_limits(args))),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["revgate"]).unwrap();
        assert_eq!(args.port, 3000);
        assert!(args.ip_header.is_none());
        assert_eq!(customer_limits(&args), CustomerLimits::default());
    }

    #[test]
    fn test_limit_overrides() {
        let args = Args::try_parse_from([
            "revgate",
            "--read-limit",
            "5",
            "--write-window-secs",
            "60",
            "--ip-header",
            "x-forwarded-for",
        ])
        .unwrap();

        let limits = customer_limits(&args);
        assert_eq!(limits.read.ceiling, 5);
        assert_eq!(limits.write.window, Duration::from_secs(60));
        assert_eq!(args.ip_header.unwrap().as_str(), "x-forwarded-for");
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(Args::try_parse_from(["revgate", "--read-window-secs", "0"]).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(check_secret_length("short".to_string()).is_none());
        assert!(check_secret_length("x".repeat(32)).is_some());
    }

    #[tokio::test]
    async fn test_create_customer() {
        let db = Database::open(":memory:").await.unwrap();
        let id = handle_create_customer(&db, "  Acme Corp ").await.unwrap();

        let customer = db.customers().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(customer.company_name, "Acme Corp");
        assert!(handle_create_customer(&db, "   ").await.is_none());
    }
}
