//! Rate limiting.
//!
//! Two layers: a per-IP token bucket in front of every API route, and a
//! per-customer fixed window applied after authentication.

mod customer;
mod ip;
mod window;

pub use customer::{CustomerLimitState, rate_limit_customer};
pub use ip::{IpLimitState, IpLimiter, IpLimiters, IpLimits, IpScope, rate_limit_ip};
pub use window::{
    Admitted, CustomerLimiter, CustomerLimits, RateLimitExceeded, RouteClass, WindowRule,
};
