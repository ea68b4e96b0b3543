//! Middleware applying the per-customer window to authenticated routes.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::window::{CustomerLimiter, RouteClass};
use crate::api::ApiError;
use crate::auth::AuthenticatedIdentity;

#[derive(Clone)]
pub struct CustomerLimitState {
    pub limiter: Arc<CustomerLimiter>,
    pub class: RouteClass,
}

/// Count the request against the authenticated customer's window.
///
/// Must run after authentication; a request without an identity is rejected.
pub async fn rate_limit_customer(
    State(state): State<CustomerLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(customer_id) = request
        .extensions()
        .get::<AuthenticatedIdentity>()
        .map(|identity| identity.customer_id.clone())
    else {
        error!("Customer rate limit reached without an authenticated identity");
        return ApiError::unauthorized("Authentication required").into_response();
    };

    match state.limiter.check(&customer_id, state.class) {
        Ok(admitted) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(admitted.ceiling));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(admitted.remaining));
            response
        }
        Err(exceeded) => {
            debug!(
                customer_id = %customer_id,
                class = exceeded.class.as_str(),
                "Customer rate limit exceeded"
            );
            ApiError::too_many_requests(
                format!(
                    "Rate limit exceeded: {} {} requests per window",
                    exceeded.ceiling,
                    exceeded.class.as_str()
                ),
                exceeded.retry_after,
            )
            .with_details(serde_json::json!({ "routeClass": exceeded.class }))
            .into_response()
        }
    }
}
