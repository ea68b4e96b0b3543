use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt, json_body};
use crate::auth::{Authenticated, enforce_customer_context, require_auth};
use crate::db::{CustomerUpdate, Database};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{
    CustomerLimitState, CustomerLimiter, IpLimitState, RouteClass, rate_limit_customer,
    rate_limit_ip,
};

const MAX_COMPANY_NAME_LENGTH: usize = 200;
const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Clone)]
pub struct CustomersState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(CustomersState);

pub fn router(
    state: CustomersState,
    credential_limit: IpLimitState,
    customer_limiter: Arc<CustomerLimiter>,
) -> Router {
    let create_router = Router::new()
        .route("/", post(create_customer))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(
            credential_limit,
            rate_limit_ip,
        ));

    let read_router = Router::new()
        .route("/{customer_id}", get(get_customer))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(
            CustomerLimitState {
                limiter: customer_limiter.clone(),
                class: RouteClass::Read,
            },
            rate_limit_customer,
        ));

    let write_router = Router::new()
        .route(
            "/{customer_id}",
            patch(update_customer).delete(delete_customer),
        )
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(
            CustomerLimitState {
                limiter: customer_limiter,
                class: RouteClass::Write,
            },
            rate_limit_customer,
        ));

    // Layers run outermost first: authenticate, then guard, then the window.
    let scoped_router = read_router
        .merge(write_router)
        .route_layer(middleware::from_fn(enforce_customer_context))
        .route_layer(middleware::from_fn_with_state(
            state,
            require_auth::<CustomersState>,
        ));

    Router::new().merge(create_router).merge(scoped_router)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerRequest {
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    contact_email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCustomerRequest {
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    contact_email: Option<String>,
}

fn validate_company_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("companyName cannot be empty"));
    }
    if name.chars().count() > MAX_COMPANY_NAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "companyName cannot be longer than {} characters",
            MAX_COMPANY_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed || email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::bad_request("contactEmail is not a valid email address"));
    }
    Ok(email.to_string())
}

async fn create_customer(
    State(state): State<CustomersState>,
    payload: Result<Json<CreateCustomerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;

    let company_name = validate_company_name(payload.company_name.as_deref().unwrap_or(""))?;
    let contact_email = payload
        .contact_email
        .as_deref()
        .map(validate_email)
        .transpose()?;

    let id = uuid::Uuid::new_v4().to_string();

    state
        .db
        .customers()
        .create(&id, &company_name, contact_email.as_deref())
        .await
        .db_err("Failed to create customer")?;

    let customer = state
        .db
        .customers()
        .get_by_id(&id)
        .await
        .db_err("Failed to load customer")?
        .ok_or_else(|| ApiError::internal("Customer vanished after creation"))?;

    info!(customer_id = %id, "Created customer");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "customer": customer })),
    ))
}

async fn get_customer(
    State(state): State<CustomersState>,
    Path(customer_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let customer = state
        .db
        .customers()
        .get_by_id(&customer_id)
        .await
        .db_err("Failed to get customer")?
        .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    Ok(Json(serde_json::json!({ "success": true, "customer": customer })))
}

async fn update_customer(
    State(state): State<CustomersState>,
    Path(customer_id): Path<String>,
    payload: Result<Json<UpdateCustomerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;

    let update = CustomerUpdate {
        company_name: payload
            .company_name
            .as_deref()
            .map(validate_company_name)
            .transpose()?,
        contact_email: payload
            .contact_email
            .as_deref()
            .map(validate_email)
            .transpose()?,
    };

    if update.company_name.is_none() && update.contact_email.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let customer = state
        .db
        .customers()
        .update(&customer_id, &update)
        .await
        .db_err("Failed to update customer")?
        .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    Ok(Json(serde_json::json!({ "success": true, "customer": customer })))
}

async fn delete_customer(
    State(state): State<CustomersState>,
    Authenticated(identity): Authenticated,
    Path(customer_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .customers()
        .delete(&customer_id)
        .await
        .db_err("Failed to delete customer")?;

    if !deleted {
        return Err(ApiError::not_found("Customer not found"));
    }

    info!(customer_id = %identity.customer_id, method = identity.method.as_str(), "Deleted customer");
    Ok(StatusCode::NO_CONTENT)
}
