//! Per-IP token-bucket limiting in front of every API route.

use axum::{
    extract::{Request, State},
    http::HeaderName,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
};
use std::{num::NonZeroU32, sync::Arc};
use tracing::debug;

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const DEFAULT_GLOBAL_PER_MINUTE: NonZeroU32 = NonZeroU32::new(120).unwrap();
const DEFAULT_CREDENTIAL_PER_MINUTE: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// Requests per minute allowed from a single client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpLimits {
    /// Every `/api` route
    pub global_per_minute: NonZeroU32,
    /// Credential-issuing routes (token, refresh, API key, signup)
    pub credential_per_minute: NonZeroU32,
}

impl Default for IpLimits {
    fn default() -> Self {
        Self {
            global_per_minute: DEFAULT_GLOBAL_PER_MINUTE,
            credential_per_minute: DEFAULT_CREDENTIAL_PER_MINUTE,
        }
    }
}

/// The keyed limiters built from `IpLimits`.
pub struct IpLimiters {
    pub global: IpLimiter,
    pub credential: IpLimiter,
}

impl IpLimiters {
    pub fn new(limits: IpLimits) -> Self {
        Self {
            global: RateLimiter::keyed(Quota::per_minute(limits.global_per_minute)),
            credential: RateLimiter::keyed(Quota::per_minute(limits.credential_per_minute)),
        }
    }

    /// Forget IPs whose buckets have fully refilled.
    pub fn retain_recent(&self) {
        self.global.retain_recent();
        self.credential.retain_recent();
        self.global.shrink_to_fit();
        self.credential.shrink_to_fit();
    }
}

/// Which limiter a middleware instance consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpScope {
    Global,
    Credential,
}

/// State for the IP limiting middleware.
#[derive(Clone)]
pub struct IpLimitState {
    pub limiters: Arc<IpLimiters>,
    pub ip_header: Option<HeaderName>,
    pub scope: IpScope,
}

impl IpLimitState {
    fn limiter(&self) -> &IpLimiter {
        match self.scope {
            IpScope::Global => &self.limiters.global,
            IpScope::Credential => &self.limiters.credential,
        }
    }
}

/// Middleware rejecting clients that exceed their per-IP quota.
pub async fn rate_limit_ip(
    State(state): State<IpLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(
        request.headers(),
        request.extensions(),
        state.ip_header.as_ref(),
    ) {
        Ok(ip) => ip,
        Err(reason) => {
            debug!(reason, "Rejecting request without client IP");
            return ApiError::forbidden("Unable to determine client IP").into_response();
        }
    };

    match state.limiter().check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(not_until) => {
            let retry_after = not_until.wait_time_from(DefaultClock::default().now());
            debug!(ip = %ip, scope = ?state.scope, "IP rate limit exceeded");
            let message = match state.scope {
                IpScope::Global => "Too many requests. Please try again later.",
                IpScope::Credential => {
                    "Too many credential requests. Please wait before trying again."
                }
            };
            ApiError::too_many_requests(message, retry_after).into_response()
        }
    }
}
