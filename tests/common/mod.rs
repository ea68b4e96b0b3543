//! Shared helpers for driving the router in-process.

#![allow(dead_code)]

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderName, Request, Response},
};
use revgate::{
    ServerConfig, create_app,
    db::Database,
    jwt::{JwtConfig, TokenType},
    rate_limit::{CustomerLimiter, CustomerLimits, IpLimiters, IpLimits, WindowRule},
};
use serde_json::Value;
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"integration-test-secret-at-least-32-bytes";

/// Client IP the helpers put in `X-Forwarded-For`.
pub const CLIENT_IP: &str = "203.0.113.10";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub jwt: JwtConfig,
}

impl TestApp {
    /// App with default per-customer limits and generous IP limits.
    pub async fn new() -> Self {
        Self::with_limits(CustomerLimits::default(), IpLimits {
            global_per_minute: NonZeroU32::new(10_000).unwrap(),
            credential_per_minute: NonZeroU32::new(10_000).unwrap(),
        })
        .await
    }

    /// App with a small read ceiling, for limiter tests.
    pub async fn with_read_ceiling(ceiling: u32) -> Self {
        let limits = CustomerLimits {
            read: WindowRule::new(ceiling, Duration::from_secs(900)),
            ..CustomerLimits::default()
        };
        Self::with_limits(limits, IpLimits {
            global_per_minute: NonZeroU32::new(10_000).unwrap(),
            credential_per_minute: NonZeroU32::new(10_000).unwrap(),
        })
        .await
    }

    pub async fn with_limits(customer_limits: CustomerLimits, ip_limits: IpLimits) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let config = ServerConfig {
            db: db.clone(),
            jwt_secret: JWT_SECRET.to_vec(),
            ip_header: Some(HeaderName::from_static("x-forwarded-for")),
            ip_limiters: Arc::new(IpLimiters::new(ip_limits)),
            customer_limiter: Arc::new(CustomerLimiter::new(customer_limits)),
        };
        let router = create_app(&config).expect("Failed to create app");
        let jwt = JwtConfig::new(JWT_SECRET).expect("Failed to create JWT config");

        Self { router, db, jwt }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Create a customer directly in the store and return its ID.
    pub async fn seed_customer(&self, company_name: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .customers()
            .create(&id, company_name, None)
            .await
            .expect("Failed to seed customer");
        id
    }

    pub fn access_token(&self, customer_id: &str) -> String {
        self.jwt.issue(customer_id, TokenType::Access).unwrap().token
    }

    pub fn refresh_token(&self, customer_id: &str) -> String {
        self.jwt.issue(customer_id, TokenType::Refresh).unwrap().token
    }

    /// Issue an API key and record it the same way the API-key endpoint does.
    pub async fn api_key(&self, customer_id: &str) -> (String, String) {
        let key = self.jwt.issue(customer_id, TokenType::ApiKey).unwrap();
        self.db
            .api_keys()
            .create(
                &key.jti,
                customer_id,
                Some("test key"),
                key.issued_at,
                key.expires_at,
            )
            .await
            .unwrap();
        (key.token, key.jti)
    }
}

pub fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
}

pub fn delete(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// A correctly signed token whose `exp` is already in the past.
pub fn expired_token(customer_id: &str, token_type: TokenType) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = revgate::jwt::Claims {
        sub: customer_id.to_string(),
        token_type,
        jti: uuid::Uuid::new_v4().to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET),
    )
    .unwrap()
}
