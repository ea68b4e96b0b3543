//! Customer-context guard: a customer may only touch its own data.

use axum::{
    extract::{Path, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use super::errors::{ApiAuthError, AuthErrorKind};
use super::types::AuthenticatedIdentity;
use crate::api::ApiError;

const ACCESS_DENIED: &str = "Access denied: you can only access your own customer data";

/// Reject unless the identity's customer is exactly `target_customer_id`.
pub fn ensure_same_customer(
    identity: &AuthenticatedIdentity,
    target_customer_id: &str,
) -> Result<(), ApiError> {
    if identity.customer_id == target_customer_id {
        return Ok(());
    }
    warn!(
        customer_id = %identity.customer_id,
        target = %target_customer_id,
        "Cross-customer access denied"
    );
    Err(ApiError::forbidden(ACCESS_DENIED))
}

#[derive(Deserialize)]
pub struct CustomerPath {
    customer_id: String,
}

/// Middleware comparing the `{customer_id}` path segment with the authenticated identity.
pub async fn enforce_customer_context(
    Path(path): Path<CustomerPath>,
    request: Request,
    next: Next,
) -> Response {
    let Some(identity) = request.extensions().get::<AuthenticatedIdentity>() else {
        return ApiAuthError(AuthErrorKind::Missing).into_response();
    };

    if let Err(e) = ensure_same_customer(identity, &path.customer_id) {
        return e.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use crate::jwt::{Claims, TokenType};
    use axum::http::StatusCode;

    fn identity(customer_id: &str) -> AuthenticatedIdentity {
        AuthenticatedIdentity {
            customer_id: customer_id.to_string(),
            method: AuthMethod::Bearer,
            claims: Claims {
                sub: customer_id.to_string(),
                token_type: TokenType::Access,
                jti: "jti".to_string(),
                iat: 0,
                exp: u64::MAX,
            },
        }
    }

    #[test]
    fn test_same_customer_allowed() {
        assert!(ensure_same_customer(&identity("a"), "a").is_ok());
    }

    #[test]
    fn test_other_customer_forbidden() {
        let err = ensure_same_customer(&identity("a"), "b").unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_no_prefix_or_case_matching() {
        let id = "0b9e3a55-2f55-4c38-9a5e-4b3c9a1d7e21";
        assert!(ensure_same_customer(&identity(id), &id[..8]).is_err());
        assert!(ensure_same_customer(&identity(id), &id.to_uppercase()).is_err());
    }
}
