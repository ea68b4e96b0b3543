//! Credential sources, tried in a fixed order.

use axum::http::{HeaderMap, header};
use serde::Serialize;
use tracing::error;

use super::errors::AuthErrorKind;
use super::state::HasAuthBackend;
use super::types::AuthenticatedIdentity;
use crate::db::unix_now;
use crate::jwt::TokenType;

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Legacy header carrying a bare access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// One way of presenting a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// `Authorization: Bearer <access token>`
    Bearer,
    /// `X-API-Key: <api key>`
    ApiKey,
    /// `X-Access-Token: <access token>`
    #[serde(rename = "access_token")]
    AccessTokenHeader,
}

impl AuthMethod {
    /// Order in which methods are attempted. First success wins.
    pub const ORDER: [AuthMethod; 3] = [
        AuthMethod::Bearer,
        AuthMethod::ApiKey,
        AuthMethod::AccessTokenHeader,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Bearer => "bearer",
            AuthMethod::ApiKey => "api_key",
            AuthMethod::AccessTokenHeader => "access_token",
        }
    }

    /// The credential this method would use, if the request presents one.
    /// A present but unusable header yields `Some(Err(..))`.
    pub fn credential<'a>(&self, headers: &'a HeaderMap) -> Option<Result<&'a str, AuthErrorKind>> {
        match self {
            AuthMethod::Bearer => headers.get(header::AUTHORIZATION).map(|value| {
                value
                    .to_str()
                    .ok()
                    .and_then(parse_bearer)
                    .ok_or(AuthErrorKind::Malformed)
            }),
            AuthMethod::ApiKey => header_credential(headers, API_KEY_HEADER),
            AuthMethod::AccessTokenHeader => header_credential(headers, ACCESS_TOKEN_HEADER),
        }
    }

    /// Verify a credential presented through this method.
    pub async fn verify<S>(
        &self,
        credential: &str,
        state: &S,
    ) -> Result<AuthenticatedIdentity, AuthErrorKind>
    where
        S: HasAuthBackend + Sync,
    {
        let expected = match self {
            AuthMethod::Bearer | AuthMethod::AccessTokenHeader => TokenType::Access,
            AuthMethod::ApiKey => TokenType::ApiKey,
        };

        let claims = state
            .jwt()
            .verify_as(credential, expected)
            .into_result()
            .map_err(AuthErrorKind::from)?;

        if *self == AuthMethod::ApiKey {
            let keys = state.db().api_keys();
            let record = keys
                .get(&claims.jti)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to look up API key");
                    AuthErrorKind::DatabaseError
                })?
                .ok_or(AuthErrorKind::Revoked)?;

            if record.is_revoked() || record.customer_id != claims.sub {
                return Err(AuthErrorKind::Revoked);
            }
            if record.is_expired_at(unix_now()) {
                return Err(AuthErrorKind::Expired);
            }

            if let Err(e) = keys.touch(&record.key_id).await {
                tracing::warn!(error = %e, "Failed to record API key use");
            }
        }

        Ok(AuthenticatedIdentity {
            customer_id: claims.sub.clone(),
            method: *self,
            claims,
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

fn header_credential<'a>(
    headers: &'a HeaderMap,
    name: &str,
) -> Option<Result<&'a str, AuthErrorKind>> {
    headers.get(name).map(|value| {
        value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthErrorKind::Malformed)
    })
}
