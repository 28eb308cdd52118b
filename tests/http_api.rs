use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use entitlements::admission::AdmissionPolicy;
use entitlements::billing::{InMemoryEntitlementStore, Plan, SubscriptionService};
use entitlements::contracts::{CredentialCodec, PermissionSet};
use entitlements::identity::{
    AccountService, CredentialIssuer, InMemoryUserRepository, UserRepository,
};
use entitlements::AppServices;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

struct TestApp {
    router: Router,
    internal: Router,
    users: Arc<InMemoryUserRepository>,
    codec: Arc<CredentialCodec>,
    pro: Plan,
    legacy: Plan,
}

fn test_app() -> TestApp {
    let store = Arc::new(InMemoryEntitlementStore::new());
    store.add_plan(
        "Free",
        0,
        PermissionSet::empty()
            .with("storage_quota_gb", 5)
            .with("max_upload_size_mb", 512),
        true,
    );
    let pro = store.add_plan(
        "Pro",
        999,
        PermissionSet::empty()
            .with("storage_quota_gb", 100)
            .with("max_upload_size_mb", 2048),
        true,
    );
    let legacy = store.add_plan("Legacy", 499, PermissionSet::empty(), false);

    let subscriptions = Arc::new(SubscriptionService::new(store, "Free", None));
    let codec = Arc::new(CredentialCodec::new("router-secret"));
    let issuer = CredentialIssuer::new(
        codec.clone(),
        subscriptions.clone(),
        Duration::hours(72),
        StdDuration::from_secs(1),
    );
    let users = Arc::new(InMemoryUserRepository::new());
    let accounts = Arc::new(AccountService::new(
        users.clone(),
        subscriptions.clone(),
        issuer,
        "Free",
        StdDuration::from_secs(1),
    ));
    let services = AppServices {
        accounts,
        subscriptions,
        codec: codec.clone(),
        admission: AdmissionPolicy::new("max_upload_size_mb"),
    };
    TestApp {
        router: services.router(),
        internal: services.internal_router(),
        users,
        codec,
        pro,
        legacy,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, value)
}

async fn register_and_login(app: &Router, email: &str) -> (i64, String) {
    let (status, _, user) = send(
        app,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({"email": email, "password": "long enough"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _, login) = send(
        app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"email": email, "password": "long enough"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        user["id"].as_i64().unwrap(),
        login["token"].as_str().unwrap().to_string(),
    )
}

fn upload(size_mb: u64) -> Option<Value> {
    Some(json!({ "size_bytes": size_mb * 1024 * 1024 }))
}

// key: http-api-tests -> routes, extractor, error bodies
#[tokio::test]
async fn root_responds_ok() {
    let app = test_app();
    let response = app
        .router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    assert_eq!(body, "Entitlements API".as_bytes());
}

#[tokio::test]
async fn register_hides_password_hash() {
    let app = test_app();
    let (status, _, user) = send(
        &app.router,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({"email": "alice@example.com", "password": "long enough"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["email"], "alice@example.com");
    assert_eq!(user["role"], "USER");
    assert!(user.get("password_hash").is_none());

    let (status, _, body) = send(
        &app.router,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({"email": "alice@example.com", "password": "long enough"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn login_sets_cookie_and_cookie_authenticates() {
    let app = test_app();
    register_and_login(&app.router, "bob@example.com").await;
    let (status, headers, body) = send(
        &app.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"email": "bob@example.com", "password": "long enough"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["expires_at"].is_string());
    let cookie = headers
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("auth_token="));
    assert!(cookie.contains("HttpOnly"));

    let pair = cookie.split(';').next().unwrap().to_string();
    let request = Request::builder()
        .uri("/api/v1/users/me")
        .header(header::COOKIE, pair)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_login_is_generic() {
    let app = test_app();
    register_and_login(&app.router, "carol@example.com").await;
    for (email, password) in [
        ("carol@example.com", "wrong password"),
        ("nobody@example.com", "long enough"),
    ] {
        let (status, _, body) = send(
            &app.router,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"email": email, "password": password})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_credentials");
        assert_eq!(body["message"], "invalid email or password");
    }
}

#[tokio::test]
async fn protected_routes_require_credentials() {
    let app = test_app();
    for (method, uri) in [
        ("GET", "/api/v1/users/me"),
        ("GET", "/api/v1/subscriptions/me"),
    ] {
        let (status, _, body) = send(&app.router, method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }
    let (status, _, _) = send(
        &app.router,
        "GET",
        "/api/v1/users/me",
        Some("not-a-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upgrade_takes_effect_on_next_login() {
    let app = test_app();
    let (_, token) = register_and_login(&app.router, "dave@example.com").await;

    let (status, _, details) =
        send(&app.router, "GET", "/api/v1/subscriptions/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["plan_name"], "Free");
    assert_eq!(details["status"], "ACTIVE");

    let (status, _, _) = send(
        &app.router,
        "POST",
        "/api/v1/uploads/admission",
        Some(&token),
        upload(512),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, body) = send(
        &app.router,
        "POST",
        "/api/v1/uploads/admission",
        Some(&token),
        upload(600),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _, change) = send(
        &app.router,
        "PUT",
        "/api/v1/subscriptions/me",
        Some(&token),
        Some(json!({"planId": app.pro.id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["plan"]["name"], "Pro");
    assert_eq!(change["subscription"]["plan_id"], app.pro.id);

    // The old credential still carries the Free snapshot.
    let (status, _, _) = send(
        &app.router,
        "POST",
        "/api/v1/uploads/admission",
        Some(&token),
        upload(600),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, login) = send(
        &app.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"email": "dave@example.com", "password": "long enough"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = login["token"].as_str().unwrap();
    let (status, _, _) = send(
        &app.router,
        "POST",
        "/api/v1/uploads/admission",
        Some(fresh),
        upload(600),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn inactive_and_unknown_plans_are_rejected() {
    let app = test_app();
    let (_, token) = register_and_login(&app.router, "erin@example.com").await;

    let (status, _, body) = send(
        &app.router,
        "PUT",
        "/api/v1/subscriptions/me",
        Some(&token),
        Some(json!({"planId": app.legacy.id})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _, body) = send(
        &app.router,
        "PUT",
        "/api/v1/subscriptions/me",
        Some(&token),
        Some(json!({"planId": 424242})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn catalog_lists_active_plans_by_price() {
    let app = test_app();
    let (status, _, plans) = send(&app.router, "GET", "/api/v1/plans", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = plans
        .as_array()
        .unwrap()
        .iter()
        .map(|plan| plan["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Free", "Pro"]);
}

#[tokio::test]
async fn internal_endpoints_serve_sibling_boundaries() {
    let app = test_app();
    let (user_id, _) = register_and_login(&app.router, "frank@example.com").await;

    let (status, _, perms) = send(
        &app.internal,
        "GET",
        &format!("/internal/v1/permissions/{user_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(perms["version"], 1);
    assert_eq!(perms["capabilities"]["storage_quota_gb"], 5);

    let (status, _, perms) =
        send(&app.internal, "GET", "/internal/v1/permissions/9999", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(perms["capabilities"], json!({}));

    let (status, _, details) = send(
        &app.internal,
        "GET",
        &format!("/internal/v1/users/{user_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["email"], "frank@example.com");

    let (status, _, _) = send(&app.internal, "GET", "/internal/v1/users/9999", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(
        &app.internal,
        "POST",
        "/internal/v1/subscriptions",
        None,
        Some(json!({"userId": user_id, "planName": "Free"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _, created) = send(
        &app.internal,
        "POST",
        "/internal/v1/subscriptions",
        None,
        Some(json!({"userId": 9999, "planName": "Pro"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["plan_id"], app.pro.id);
}

#[tokio::test]
async fn internal_routes_are_not_served_publicly() {
    let app = test_app();
    let (user_id, _) = register_and_login(&app.router, "gina@example.com").await;
    for (method, uri, body) in [
        ("GET", format!("/internal/v1/users/{user_id}"), None),
        ("GET", format!("/internal/v1/permissions/{user_id}"), None),
        (
            "POST",
            "/internal/v1/subscriptions".to_string(),
            Some(json!({"userId": 9999, "planName": "Pro"})),
        ),
    ] {
        let (status, _, _) = send(&app.router, method, &uri, None, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
    }

    let (status, _, _) = send(&app.internal, "GET", "/api/v1/plans", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn promote_to_admin(app: &TestApp, user_id: i64, email: &str) {
    app.users
        .update(user_id, email, "ADMIN")
        .await
        .unwrap()
        .unwrap();
}

async fn login(app: &Router, email: &str) -> String {
    let (status, _, body) = send(
        app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"email": email, "password": "long enough"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
    let app = test_app();
    let (user_id, user_token) = register_and_login(&app.router, "henry@example.com").await;

    let (status, _, _) = send(&app.router, "GET", "/api/v1/admin/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(
        &app.router,
        "GET",
        "/api/v1/admin/users",
        Some(&user_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _, _) = send(
        &app.router,
        "PUT",
        &format!("/api/v1/admin/users/{user_id}"),
        Some(&user_token),
        Some(json!({"email": "henry@example.com", "role": "ADMIN"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    promote_to_admin(&app, user_id, "henry@example.com").await;
    // Old credential still carries USER.
    let (status, _, _) = send(
        &app.router,
        "GET",
        "/api/v1/admin/users",
        Some(&user_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin_token = login(&app.router, "henry@example.com").await;
    register_and_login(&app.router, "iris@example.com").await;
    let (status, _, users) = send(
        &app.router,
        "GET",
        "/api/v1/admin/users",
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<(&str, &str)> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|user| (user["email"].as_str().unwrap(), user["role"].as_str().unwrap()))
        .collect();
    assert_eq!(
        listed,
        vec![("henry@example.com", "ADMIN"), ("iris@example.com", "USER")]
    );
    assert!(users[0].get("password_hash").is_none());
}

#[tokio::test]
async fn admin_role_change_reaches_the_next_credential() {
    let app = test_app();
    let (admin_id, _) = register_and_login(&app.router, "jane@example.com").await;
    promote_to_admin(&app, admin_id, "jane@example.com").await;
    let admin_token = login(&app.router, "jane@example.com").await;
    let (user_id, _) = register_and_login(&app.router, "kyle@example.com").await;

    let (status, _, updated) = send(
        &app.router,
        "PUT",
        &format!("/api/v1/admin/users/{user_id}"),
        Some(&admin_token),
        Some(json!({"email": "kyle@example.org", "role": "ADMIN"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["email"], "kyle@example.org");
    assert_eq!(updated["role"], "ADMIN");

    // The old email no longer logs in; the new one carries the new role.
    let (status, _, _) = send(
        &app.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"email": "kyle@example.com", "password": "long enough"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let token = login(&app.router, "kyle@example.org").await;
    let claims = app.codec.verify(&token).unwrap();
    assert_eq!(claims.user_id, user_id);
    assert_eq!(claims.role.as_deref(), Some("ADMIN"));
    assert_eq!(claims.perms.numeric("storage_quota_gb"), Some(5));

    let (status, _, _) = send(
        &app.router,
        "GET",
        "/api/v1/admin/users",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_update_validates_input() {
    let app = test_app();
    let (admin_id, _) = register_and_login(&app.router, "lena@example.com").await;
    promote_to_admin(&app, admin_id, "lena@example.com").await;
    let admin_token = login(&app.router, "lena@example.com").await;
    let (user_id, _) = register_and_login(&app.router, "mike@example.com").await;

    for body in [
        json!({"email": "mike@example.com", "role": "OWNER"}),
        json!({"email": "mike@example.com", "role": "admin"}),
        json!({"email": "not-an-email", "role": "USER"}),
    ] {
        let (status, _, error) = send(
            &app.router,
            "PUT",
            &format!("/api/v1/admin/users/{user_id}"),
            Some(&admin_token),
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(error["error"], "bad_request");
    }

    let (status, _, error) = send(
        &app.router,
        "PUT",
        "/api/v1/admin/users/9999",
        Some(&admin_token),
        Some(json!({"email": "ghost@example.com", "role": "USER"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "not_found");

    let (status, _, error) = send(
        &app.router,
        "PUT",
        &format!("/api/v1/admin/users/{user_id}"),
        Some(&admin_token),
        Some(json!({"email": "lena@example.com", "role": "USER"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "conflict");

    let still = app.users.find_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(still.email, "mike@example.com");
    assert_eq!(still.role, "USER");
}
