//! Tests for the customer endpoints, the customer-context guard and rate limiting.
//!
//! Tests cover:
//! - Customer signup, read, update and delete
//! - Cross-customer access is refused with 403
//! - Per-customer window limits, including concurrent requests
//! - Per-IP limits on credential routes

mod common;

use std::num::NonZeroU32;

use axum::{body::Body, http::StatusCode};
use common::{TestApp, bearer, body_json, delete, get, json_request};
use futures::future::join_all;
use revgate::rate_limit::{CustomerLimits, IpLimits};
use serde_json::json;

#[tokio::test]
async fn test_create_customer() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/api/customers",
            json!({ "companyName": "  Acme Corp ", "contactEmail": "ops@acme.test" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["customer"]["companyName"], "Acme Corp");
    assert_eq!(body["customer"]["contactEmail"], "ops@acme.test");

    let id = body["customer"]["id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
    assert!(app.db.customers().exists(id).await.unwrap());
}

#[tokio::test]
async fn test_create_customer_validation() {
    let app = TestApp::new().await;

    for body in [
        json!({}),
        json!({ "companyName": "   " }),
        json!({ "companyName": "Acme", "contactEmail": "nope" }),
    ] {
        let response = app
            .send(json_request("POST", "/api/customers", body.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body_json(response).await["success"], false);
    }
}

#[tokio::test]
async fn test_get_own_customer() {
    let app = TestApp::new().await;
    let customer_id = app.seed_customer("Acme").await;

    let response = app
        .send(
            get(&format!("/api/customers/{}", customer_id))
                .header("authorization", bearer(&app.access_token(&customer_id)))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");

    let body = body_json(response).await;
    assert_eq!(body["customer"]["id"], customer_id);
    assert_eq!(body["customer"]["companyName"], "Acme");
}

#[tokio::test]
async fn test_get_customer_requires_auth() {
    let app = TestApp::new().await;
    let customer_id = app.seed_customer("Acme").await;

    let response = app
        .send(
            get(&format!("/api/customers/{}", customer_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cross_customer_access_forbidden() {
    let app = TestApp::new().await;
    let customer_a = app.seed_customer("Acme").await;
    let customer_b = app.seed_customer("Globex").await;
    let token_a = app.access_token(&customer_a);

    let response = app
        .send(
            get(&format!("/api/customers/{}", customer_b))
                .header("authorization", bearer(&token_a))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Access denied: you can only access your own customer data"
    );

    // Writes are refused the same way and leave the record alone
    let response = app
        .send(json_request_with_auth(
            "PATCH",
            &format!("/api/customers/{}", customer_b),
            &token_a,
            json!({ "companyName": "Hijacked" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(
            delete(&format!("/api/customers/{}", customer_b))
                .header("authorization", bearer(&token_a))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let stored = app.db.customers().get_by_id(&customer_b).await.unwrap().unwrap();
    assert_eq!(stored.company_name, "Globex");
}

#[tokio::test]
async fn test_api_key_identity_is_guarded() {
    let app = TestApp::new().await;
    let customer_a = app.seed_customer("Acme").await;
    let customer_b = app.seed_customer("Globex").await;
    let (api_key, _) = app.api_key(&customer_a).await;

    let response = app
        .send(
            get(&format!("/api/customers/{}", customer_a))
                .header("x-api-key", &api_key)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(
            get(&format!("/api/customers/{}", customer_b))
                .header("x-api-key", &api_key)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_update_customer() {
    let app = TestApp::new().await;
    let customer_id = app.seed_customer("Acme").await;
    let token = app.access_token(&customer_id);
    let uri = format!("/api/customers/{}", customer_id);

    let response = app
        .send(json_request_with_auth(
            "PATCH",
            &uri,
            &token,
            json!({ "contactEmail": "billing@acme.test" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["customer"]["companyName"], "Acme");
    assert_eq!(body["customer"]["contactEmail"], "billing@acme.test");

    let response = app
        .send(json_request_with_auth("PATCH", &uri, &token, json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_customer() {
    let app = TestApp::new().await;
    let customer_id = app.seed_customer("Acme").await;
    let (_, key_id) = app.api_key(&customer_id).await;
    let token = app.access_token(&customer_id);
    let uri = format!("/api/customers/{}", customer_id);

    let response = app
        .send(
            delete(&uri)
                .header("authorization", bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!app.db.customers().exists(&customer_id).await.unwrap());
    assert!(app.db.api_keys().get(&key_id).await.unwrap().is_none());

    // The token still verifies, but there is nothing left to read
    let response = app
        .send(
            get(&uri)
                .header("authorization", bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_read_limit_returns_429() {
    let app = TestApp::with_read_ceiling(3).await;
    let customer_id = app.seed_customer("Acme").await;
    let token = app.access_token(&customer_id);
    let uri = format!("/api/customers/{}", customer_id);

    for remaining in ["2", "1", "0"] {
        let response = app
            .send(
                get(&uri)
                    .header("authorization", bearer(&token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
    }

    let response = app
        .send(
            get(&uri)
                .header("authorization", bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 900);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["details"]["routeClass"], "read");
    assert_eq!(body["details"]["retryAfter"], retry_after);
}

#[tokio::test]
async fn test_limit_is_per_customer_and_class() {
    let app = TestApp::with_read_ceiling(1).await;
    let customer_a = app.seed_customer("Acme").await;
    let customer_b = app.seed_customer("Globex").await;
    let token_a = app.access_token(&customer_a);
    let uri_a = format!("/api/customers/{}", customer_a);

    let send_read = |token: String, uri: String| {
        let app = &app;
        async move {
            app.send(
                get(&uri)
                    .header("authorization", bearer(&token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .status()
        }
    };

    assert_eq!(send_read(token_a.clone(), uri_a.clone()).await, StatusCode::OK);
    assert_eq!(
        send_read(token_a.clone(), uri_a.clone()).await,
        StatusCode::TOO_MANY_REQUESTS
    );

    // Another customer has its own window
    assert_eq!(
        send_read(
            app.access_token(&customer_b),
            format!("/api/customers/{}", customer_b)
        )
        .await,
        StatusCode::OK
    );

    // Writes are counted separately from reads
    let response = app
        .send(json_request_with_auth(
            "PATCH",
            &uri_a,
            &token_a,
            json!({ "companyName": "Acme Two" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_requests_respect_ceiling() {
    let app = TestApp::with_read_ceiling(5).await;
    let customer_id = app.seed_customer("Acme").await;
    let token = app.access_token(&customer_id);
    let uri = format!("/api/customers/{}", customer_id);

    let requests = (0..20).map(|_| {
        app.send(
            get(&uri)
                .header("authorization", bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
    });
    let statuses: Vec<StatusCode> = join_all(requests)
        .await
        .into_iter()
        .map(|response| response.status())
        .collect();

    let admitted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let limited = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(admitted, 5);
    assert_eq!(limited, 15);
}

#[tokio::test]
async fn test_rejected_auth_does_not_consume_window() {
    let app = TestApp::with_read_ceiling(1).await;
    let customer_id = app.seed_customer("Acme").await;
    let uri = format!("/api/customers/{}", customer_id);

    for _ in 0..3 {
        let response = app
            .send(
                get(&uri)
                    .header("authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .send(
            get(&uri)
                .header("authorization", bearer(&app.access_token(&customer_id)))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_credential_routes_limited_per_ip() {
    let app = TestApp::with_limits(
        CustomerLimits::default(),
        IpLimits {
            global_per_minute: NonZeroU32::new(100).unwrap(),
            credential_per_minute: NonZeroU32::new(2).unwrap(),
        },
    )
    .await;

    for _ in 0..2 {
        let response = app
            .send(json_request(
                "POST",
                "/api/customers",
                json!({ "companyName": "Acme" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/token",
            json!({ "customerId": uuid::Uuid::new_v4().to_string() }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Non-credential routes are still open
    let response = app
        .send(get("/api/auth/status").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_without_client_ip_rejected() {
    let app = TestApp::new().await;

    let response = app
        .send(
            axum::http::Request::builder()
                .uri("/api/auth/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

fn json_request_with_auth(
    method: &str,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> axum::http::Request<Body> {
    let mut request = json_request(method, uri, body);
    request.headers_mut().insert(
        "authorization",
        bearer(token).parse().unwrap(),
    );
    request
}
