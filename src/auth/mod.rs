//! Customer authentication.
//!
//! A request may present a bearer access token, an API key, or the legacy
//! `X-Access-Token` header. Methods are tried in that order and the first one
//! that verifies produces the request's `AuthenticatedIdentity`. The
//! customer-context guard then restricts the identity to its own records.

mod errors;
mod extractors;
mod guard;
mod ip;
mod method;
mod state;
mod types;

pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Authenticated, authenticate, require_auth};
pub use guard::{CustomerPath, enforce_customer_context, ensure_same_customer};
pub use ip::extract_client_ip;
pub use method::{ACCESS_TOKEN_HEADER, API_KEY_HEADER, AuthMethod};
pub use state::HasAuthBackend;
pub use types::{AuthenticatedIdentity, Permission};
