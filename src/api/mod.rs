mod auth;
mod customers;
mod error;

use axum::{Router, http::HeaderName, middleware};
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::{CustomerLimiter, IpLimitState, IpLimiters, IpScope, rate_limit_ip};

pub use auth::AuthState;
pub use customers::CustomersState;
pub use error::{ApiError, ResultExt, json_body, retry_after_secs, validate_customer_id};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    ip_limiters: Arc<IpLimiters>,
    ip_header: Option<HeaderName>,
    customer_limiter: Arc<CustomerLimiter>,
) -> Router {
    let credential_limit = IpLimitState {
        limiters: ip_limiters.clone(),
        ip_header: ip_header.clone(),
        scope: IpScope::Credential,
    };

    let global_limit = IpLimitState {
        limiters: ip_limiters,
        ip_header,
        scope: IpScope::Global,
    };

    let auth_state = auth::AuthState {
        db: db.clone(),
        jwt: jwt.clone(),
    };

    let customers_state = customers::CustomersState { db, jwt };

    Router::new()
        .nest(
            "/auth",
            auth::router(
                auth_state,
                credential_limit.clone(),
                customer_limiter.clone(),
            ),
        )
        .nest(
            "/customers",
            customers::router(customers_state, credential_limit, customer_limiter),
        )
        .layer(middleware::from_fn_with_state(global_limit, rate_limit_ip))
}
