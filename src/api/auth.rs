//! Credential endpoints.
//!
//! - POST `/token` - Issue an access + refresh token pair for a customer
//! - POST `/refresh` - Exchange a refresh token for a new access token
//! - GET `/verify` - Check a bearer token and return its claims
//! - POST `/api-key` - Issue a long-lived API key for a customer
//! - GET `/api-keys` - List the caller's API keys
//! - DELETE `/api-key/{key_id}` - Revoke one of the caller's API keys
//! - GET `/permissions`, GET `/validate` - Describe the authenticated caller
//! - GET `/status` - Service descriptor, no authentication

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ApiError, ResultExt, json_body, validate_customer_id};
use crate::auth::{AuthMethod, Authenticated, Permission, ensure_same_customer, require_auth};
use crate::db::{ApiKeyRecord, Database};
use crate::impl_has_auth_backend;
use crate::jwt::{JwtConfig, JwtError, Rejection, TokenType, Verification};
use crate::rate_limit::{
    CustomerLimitState, CustomerLimiter, IpLimitState, RouteClass, rate_limit_customer,
    rate_limit_ip,
};

/// Version embedded at compile time from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

const MAX_KEY_NAME_LENGTH: usize = 100;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(
    state: AuthState,
    credential_limit: IpLimitState,
    customer_limiter: Arc<CustomerLimiter>,
) -> Router {
    let issue_router = Router::new()
        .route("/token", post(issue_token))
        .route("/refresh", post(refresh_token))
        .route("/api-key", post(issue_api_key))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(
            credential_limit,
            rate_limit_ip,
        ));

    let public_router = Router::new()
        .route("/verify", get(verify_token))
        .route("/status", get(status))
        .with_state(state.clone());

    let read_router = Router::new()
        .route("/permissions", get(permissions))
        .route("/validate", get(validate))
        .route("/api-keys", get(list_api_keys))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(
            CustomerLimitState {
                limiter: customer_limiter.clone(),
                class: RouteClass::Read,
            },
            rate_limit_customer,
        ));

    let write_router = Router::new()
        .route("/api-key/{key_id}", delete(revoke_api_key))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(
            CustomerLimitState {
                limiter: customer_limiter,
                class: RouteClass::Write,
            },
            rate_limit_customer,
        ));

    let protected_router = read_router
        .merge(write_router)
        .route_layer(middleware::from_fn_with_state(
            state,
            require_auth::<AuthState>,
        ));

    Router::new()
        .merge(issue_router)
        .merge(public_router)
        .merge(protected_router)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerIdRequest {
    #[serde(default)]
    customer_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenPairResponse {
    success: bool,
    customer_id: String,
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: &'static str,
    refresh_expires_in: &'static str,
}

/// Look up the customer named in a request body, enforcing 400/404 semantics.
async fn require_known_customer(
    db: &Database,
    customer_id: Option<&str>,
) -> Result<String, ApiError> {
    let customer_id = customer_id.unwrap_or("").trim();
    validate_customer_id(customer_id)?;

    let exists = db
        .customers()
        .exists(customer_id)
        .await
        .db_err("Failed to look up customer")?;

    if !exists {
        return Err(ApiError::not_found("Customer not found"));
    }
    Ok(customer_id.to_string())
}

fn token_err(e: JwtError) -> ApiError {
    error!(error = %e, "Failed to issue token");
    ApiError::internal("Failed to generate token")
}

/// Issue an access + refresh token pair.
async fn issue_token(
    State(state): State<AuthState>,
    payload: Result<Json<CustomerIdRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;
    let customer_id = require_known_customer(&state.db, payload.customer_id.as_deref()).await?;

    let access = state
        .jwt
        .issue(&customer_id, TokenType::Access)
        .map_err(token_err)?;
    let refresh = state
        .jwt
        .issue(&customer_id, TokenType::Refresh)
        .map_err(token_err)?;

    info!(customer_id = %customer_id, "Issued token pair");

    Ok(Json(TokenPairResponse {
        success: true,
        customer_id,
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "Bearer",
        expires_in: TokenType::Access.expires_in(),
        refresh_expires_in: TokenType::Refresh.expires_in(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    success: bool,
    customer_id: String,
    access_token: String,
    token_type: &'static str,
    expires_in: &'static str,
}

fn rejection_error(rejection: Rejection) -> ApiError {
    ApiError::unauthorized(rejection.message()).with_details(serde_json::json!({
        "reason": rejection.reason(),
        "expired": rejection.is_expired(),
    }))
}

/// Exchange a refresh token for a new access token.
async fn refresh_token(
    State(state): State<AuthState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;
    let refresh_token = payload
        .refresh_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("refreshToken is required"))?;

    let access = state.jwt.refresh(refresh_token).map_err(|e| match e {
        JwtError::InvalidCredential(rejection) => rejection_error(rejection),
        other => token_err(other),
    })?;

    // The customer may have been deleted since the refresh token was issued.
    let exists = state
        .db
        .customers()
        .exists(&access.customer_id)
        .await
        .db_err("Failed to look up customer")?;
    if !exists {
        return Err(ApiError::unauthorized("Customer no longer exists"));
    }

    Ok(Json(AccessTokenResponse {
        success: true,
        customer_id: access.customer_id,
        access_token: access.token,
        token_type: "Bearer",
        expires_in: TokenType::Access.expires_in(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyFailureResponse {
    success: bool,
    valid: bool,
    expired: bool,
    error: &'static str,
    details: serde_json::Value,
}

/// Verify the bearer token in the Authorization header.
///
/// Returns 400 if the header is absent or not a bearer credential, 401 with
/// `valid: false` if the token does not verify.
async fn verify_token(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let token = match AuthMethod::Bearer.credential(&headers) {
        Some(Ok(token)) => token,
        Some(Err(_)) => {
            return ApiError::bad_request("Authorization header must be 'Bearer <token>'")
                .into_response();
        }
        None => {
            return ApiError::bad_request("Authorization header is required").into_response();
        }
    };

    match state.jwt.verify(token) {
        Verification::Valid(claims) => Json(serde_json::json!({
            "success": true,
            "valid": true,
            "customerId": claims.sub,
            "tokenType": claims.token_type,
            "expiresAt": claims.exp,
            "claims": claims,
        }))
        .into_response(),
        Verification::Rejected(rejection) => (
            StatusCode::UNAUTHORIZED,
            Json(VerifyFailureResponse {
                success: false,
                valid: false,
                expired: rejection.is_expired(),
                error: rejection.message(),
                details: serde_json::json!({ "reason": rejection.reason() }),
            }),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyRequest {
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyResponse {
    success: bool,
    customer_id: String,
    api_key: String,
    key_id: String,
    name: Option<String>,
    expires_in: &'static str,
    expires_at: u64,
}

/// Issue a new API key and record it for revocation.
async fn issue_api_key(
    State(state): State<AuthState>,
    payload: Result<Json<ApiKeyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;
    let customer_id = require_known_customer(&state.db, payload.customer_id.as_deref()).await?;

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    if name.as_ref().is_some_and(|n| n.len() > MAX_KEY_NAME_LENGTH) {
        return Err(ApiError::bad_request(format!(
            "name cannot be longer than {} characters",
            MAX_KEY_NAME_LENGTH
        )));
    }

    let key = state
        .jwt
        .issue(&customer_id, TokenType::ApiKey)
        .map_err(token_err)?;

    state
        .db
        .api_keys()
        .create(
            &key.jti,
            &customer_id,
            name.as_deref(),
            key.issued_at,
            key.expires_at,
        )
        .await
        .db_err("Failed to store API key")?;

    info!(customer_id = %customer_id, key_id = %key.jti, "Issued API key");

    Ok(Json(ApiKeyResponse {
        success: true,
        customer_id,
        api_key: key.token,
        key_id: key.jti,
        name,
        expires_in: TokenType::ApiKey.expires_in(),
        expires_at: key.expires_at,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyInfo {
    key_id: String,
    name: Option<String>,
    issued_at: i64,
    expires_at: i64,
    revoked: bool,
    last_used_at: Option<i64>,
}

impl From<ApiKeyRecord> for ApiKeyInfo {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            revoked: record.is_revoked(),
            key_id: record.key_id,
            name: record.name,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
        }
    }
}

/// List the caller's unexpired API keys.
async fn list_api_keys(
    State(state): State<AuthState>,
    Authenticated(identity): Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let keys = state
        .db
        .api_keys()
        .list_by_customer(&identity.customer_id)
        .await
        .db_err("Failed to list API keys")?;

    let api_keys: Vec<ApiKeyInfo> = keys.into_iter().map(ApiKeyInfo::from).collect();
    Ok(Json(serde_json::json!({ "success": true, "apiKeys": api_keys })))
}

/// Revoke one of the caller's API keys.
async fn revoke_api_key(
    State(state): State<AuthState>,
    Authenticated(identity): Authenticated,
    Path(key_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !identity.has_permission(Permission::ApiKeysManage) {
        return Err(ApiError::forbidden("API keys cannot be managed with an API key"));
    }

    let key = state
        .db
        .api_keys()
        .get(&key_id)
        .await
        .db_err("Failed to get API key")?
        .ok_or_else(|| ApiError::not_found("API key not found"))?;

    ensure_same_customer(&identity, &key.customer_id)?;

    let revoked = state
        .db
        .api_keys()
        .revoke(&key_id)
        .await
        .db_err("Failed to revoke API key")?;

    if revoked {
        info!(customer_id = %identity.customer_id, key_id = %key_id, "Revoked API key");
    }

    Ok(Json(serde_json::json!({ "success": true, "revoked": revoked })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PermissionsResponse {
    success: bool,
    customer_id: String,
    method: AuthMethod,
    permissions: &'static [Permission],
}

async fn permissions(Authenticated(identity): Authenticated) -> Json<PermissionsResponse> {
    Json(PermissionsResponse {
        success: true,
        permissions: identity.permissions(),
        customer_id: identity.customer_id,
        method: identity.method,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    success: bool,
    valid: bool,
    customer_id: String,
    method: AuthMethod,
    token_type: TokenType,
    expires_at: u64,
}

async fn validate(Authenticated(identity): Authenticated) -> Json<ValidateResponse> {
    Json(ValidateResponse {
        success: true,
        valid: true,
        customer_id: identity.customer_id,
        method: identity.method,
        token_type: identity.claims.token_type,
        expires_at: identity.claims.exp,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    success: bool,
    service: &'static str,
    version: &'static str,
    auth_methods: [AuthMethod; 3],
    endpoints: &'static [&'static str],
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        service: "revgate",
        version: VERSION,
        auth_methods: AuthMethod::ORDER,
        endpoints: &[
            "POST /api/auth/token",
            "POST /api/auth/refresh",
            "GET /api/auth/verify",
            "POST /api/auth/api-key",
            "GET /api/auth/api-keys",
            "DELETE /api/auth/api-key/{keyId}",
            "GET /api/auth/permissions",
            "GET /api/auth/validate",
            "GET /api/auth/status",
            "POST /api/customers",
            "GET /api/customers/{customerId}",
            "PATCH /api/customers/{customerId}",
            "DELETE /api/customers/{customerId}",
        ],
    })
}
