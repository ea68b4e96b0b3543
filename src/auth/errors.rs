//! Authentication error types.

use axum::response::{IntoResponse, Response};

use crate::api::ApiError;
use crate::jwt::Rejection;

/// Why authentication failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No credential presented
    Missing,
    /// Credential presented but past its expiry
    Expired,
    /// Credential could not be parsed
    Malformed,
    /// Bad signature or wrong credential type
    Invalid,
    /// API key revoked or unknown to the store
    Revoked,
    DatabaseError,
}

impl AuthErrorKind {
    /// Reason code returned in `details.reason`.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthErrorKind::Missing => "missing",
            AuthErrorKind::Expired => "expired",
            AuthErrorKind::Malformed => "malformed",
            AuthErrorKind::Invalid => "invalid",
            AuthErrorKind::Revoked => "revoked",
            AuthErrorKind::DatabaseError => "unavailable",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthErrorKind::Missing => "Authentication required",
            AuthErrorKind::Expired => "Credential has expired",
            AuthErrorKind::Malformed => "Malformed credential",
            AuthErrorKind::Invalid => "Invalid credential",
            AuthErrorKind::Revoked => "Credential has been revoked",
            AuthErrorKind::DatabaseError => "Database error",
        }
    }
}

impl From<Rejection> for AuthErrorKind {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Expired => AuthErrorKind::Expired,
            Rejection::Malformed => AuthErrorKind::Malformed,
            Rejection::BadSignature | Rejection::WrongType { .. } => AuthErrorKind::Invalid,
        }
    }
}

/// Authentication rejection rendered as the standard error envelope.
#[derive(Debug)]
pub struct ApiAuthError(pub AuthErrorKind);

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self(kind)
    }
}

impl From<ApiAuthError> for ApiError {
    fn from(err: ApiAuthError) -> Self {
        let kind = err.0;
        let base = if kind == AuthErrorKind::DatabaseError {
            ApiError::internal(kind.message())
        } else {
            ApiError::unauthorized(kind.message())
        };
        base.with_details(serde_json::json!({ "reason": kind.reason() }))
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::TokenType;
    use axum::http::StatusCode;

    #[test]
    fn test_rejection_mapping() {
        assert_eq!(AuthErrorKind::from(Rejection::Expired), AuthErrorKind::Expired);
        assert_eq!(
            AuthErrorKind::from(Rejection::Malformed),
            AuthErrorKind::Malformed
        );
        assert_eq!(
            AuthErrorKind::from(Rejection::WrongType {
                expected: TokenType::Access,
                found: TokenType::Refresh,
            }),
            AuthErrorKind::Invalid
        );
    }

    #[test]
    fn test_status_codes() {
        let err = ApiError::from(ApiAuthError(AuthErrorKind::Missing));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = ApiError::from(ApiAuthError(AuthErrorKind::DatabaseError));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
