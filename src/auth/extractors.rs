//! Multi-method authentication: middleware and extractor.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::errors::{ApiAuthError, AuthErrorKind};
use super::method::AuthMethod;
use super::state::HasAuthBackend;
use super::types::AuthenticatedIdentity;

/// Try each method in `AuthMethod::ORDER` and return the first identity that verifies.
///
/// If every presented credential fails, the reason of the first failure is
/// returned; if none is presented, `Missing`. Storage errors end the chain.
pub async fn authenticate<S>(
    headers: &HeaderMap,
    state: &S,
) -> Result<AuthenticatedIdentity, AuthErrorKind>
where
    S: HasAuthBackend + Sync,
{
    let mut first_failure = None;

    for method in AuthMethod::ORDER {
        let Some(credential) = method.credential(headers) else {
            continue;
        };

        let result = match credential {
            Ok(credential) => method.verify(credential, state).await,
            Err(kind) => Err(kind),
        };

        match result {
            Ok(identity) => return Ok(identity),
            Err(AuthErrorKind::DatabaseError) => return Err(AuthErrorKind::DatabaseError),
            Err(kind) => {
                debug!(method = method.as_str(), reason = kind.reason(), "Credential rejected");
                first_failure.get_or_insert(kind);
            }
        }
    }

    Err(first_failure.unwrap_or(AuthErrorKind::Missing))
}

/// Middleware that authenticates the request and attaches the identity to its extensions.
pub async fn require_auth<S>(
    State(state): State<S>,
    mut request: Request,
    next: Next,
) -> Response
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    match authenticate(request.headers(), &state).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(kind) => ApiAuthError(kind).into_response(),
    }
}

/// Extractor for the identity attached by `require_auth`.
pub struct Authenticated(pub AuthenticatedIdentity);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .map(Authenticated)
            .ok_or(ApiAuthError(AuthErrorKind::Missing))
    }
}
