use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use tower::ServiceExt;
use traindesk::config::Config;

/// Seeded by the initial migration
const ADMIN_EMAIL: &str = "admin@traindesk.local";
const ADMIN_PASSWORD: &str = "password";

async fn spawn_app() -> Router {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // One pooled connection: every query must see the same in-memory database
    config.general.max_db_connections = 1;
    config.server.secure_cookies = false;

    let state = traindesk::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    traindesk::api::router(state).await
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("id="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(app: &Router, email: &str, password: &str) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "first_name": "Ana",
                "last_name": "Lee",
                "email": email,
                "password": password,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn login(app: &Router, email: &str, password: &str) -> Response<Body> {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_register_and_login_flow() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "first_name": "Ana",
                "last_name": "Lee",
                "email": "ana@x.com",
                "password": "password1",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["email"], "ana@x.com");
    assert!(body["data"]["user"].get("password_hash").is_none());

    let response = login(&app, "ana@x.com", "password1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("login should set a session cookie");
    let body = body_json(response).await;
    assert_eq!(body["message"], "Login successful");

    // The session cookie unlocks the authenticated area
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["user"]["email"], "ana@x.com");

    // Without it the same endpoint answers 401
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registration_validation_errors() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "first_name": "A",
                "last_name": "Lee",
                "email": "broken",
                "password": "short",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Validation failed");
    assert_eq!(
        body["errors"]["first_name"][0],
        "First name must be at least 2 characters"
    );
    assert_eq!(body["errors"]["email"][0], "Please enter a valid email address");
}

#[tokio::test]
async fn test_duplicate_email_registration() {
    let app = spawn_app().await;
    register(&app, "ana@x.com", "password1").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "first_name": "Ana",
                "last_name": "Lee",
                "email": "ana@x.com",
                "password": "password1",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errors"]["email"][0], "Email already exists");
}

#[tokio::test]
async fn test_no_account_enumeration_on_login() {
    let app = spawn_app().await;
    register(&app, "ana@x.com", "password1").await;

    let unknown = body_json(login(&app, "ghost@x.com", "password1").await).await;
    let wrong = body_json(login(&app, "ana@x.com", "not-it").await).await;

    assert_eq!(unknown["message"], wrong["message"]);
    assert_eq!(wrong["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_lockout_after_repeated_failures() {
    let app = spawn_app().await;
    register(&app, "ana@x.com", "password1").await;

    for _ in 0..5 {
        let response = login(&app, "ana@x.com", "wrong").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid email or password");
    }

    // Correct password, but the account is locked now
    let response = login(&app, "ana@x.com", "password1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(
        body["message"],
        "Account is temporarily locked due to too many failed login attempts. Please try again later."
    );
}

#[tokio::test]
async fn test_csrf_round_trip() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/csrf")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("csrf issue should set a session cookie");
    let body = body_json(response).await;
    let token = body["data"]["csrf_token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 64);

    // A mutated token is rejected before anything else runs
    let mut bad_request = json_request(
        "POST",
        "/api/auth/login",
        serde_json::json!({
            "email": "ana@x.com",
            "password": "password1",
            "csrf_token": format!("{}x", &token[..token.len() - 1]),
        }),
    );
    bad_request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    let response = app.clone().oneshot(bad_request).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid CSRF token");

    // The exact token passes the check (and fails later on credentials)
    let mut good_request = json_request(
        "POST",
        "/api/auth/login",
        serde_json::json!({
            "email": "ana@x.com",
            "password": "password1",
            "csrf_token": token,
        }),
    );
    good_request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    let response = app.clone().oneshot(good_request).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_password_reset_endpoints_do_not_enumerate() {
    let app = spawn_app().await;
    register(&app, "ana@x.com", "password1").await;

    let known = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/forgot-password",
            serde_json::json!({ "email": "ana@x.com" }),
        ))
        .await
        .unwrap();
    let unknown = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/forgot-password",
            serde_json::json!({ "email": "ghost@x.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);

    let known = body_json(known).await;
    let unknown = body_json(unknown).await;
    assert_eq!(known["message"], unknown["message"]);

    // A made-up token never works
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/reset-password",
            serde_json::json!({ "token": "0".repeat(64), "password": "password2!" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid or expired reset token.");
}

#[tokio::test]
async fn test_dashboard_requires_login() {
    let app = spawn_app().await;

    for uri in [
        "/api/dashboard/overview",
        "/api/dashboard/courses",
        "/api/dashboard/certificates",
        "/api/dashboard/profile",
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_dashboard_overview_and_profile_update() {
    let app = spawn_app().await;
    register(&app, "ana@x.com", "password1").await;
    let response = login(&app, "ana@x.com", "password1").await;
    let cookie = session_cookie(&response).unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/dashboard/overview")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["stats"]["total_courses"], 0);
    // Registration and login both show up in the activity feed
    let actions: Vec<&str> = body["data"]["recent_activity"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["action"].as_str())
        .collect();
    assert!(actions.contains(&"login"));
    assert!(actions.contains(&"register"));

    let mut request = json_request(
        "PUT",
        "/api/dashboard/profile",
        serde_json::json!({ "company": "Acme <Quality> Ltd" }),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/dashboard/profile")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    // Stored sanitized
    assert_eq!(
        body["data"]["profile"]["company"],
        "Acme &lt;Quality&gt; Ltd"
    );
}

#[tokio::test]
async fn test_change_password_flow() {
    let app = spawn_app().await;
    register(&app, "ana@x.com", "password1").await;
    let response = login(&app, "ana@x.com", "password1").await;
    let cookie = session_cookie(&response).unwrap();

    let mut request = json_request(
        "PUT",
        "/api/dashboard/password",
        serde_json::json!({
            "current_password": "password1",
            "new_password": "password2!",
            "confirm_password": "password-mismatch",
        }),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "New password confirmation does not match");

    let mut request = json_request(
        "PUT",
        "/api/dashboard/password",
        serde_json::json!({
            "current_password": "password1",
            "new_password": "password2!",
            "confirm_password": "password2!",
        }),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(&app, "ana@x.com", "password2!").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_invalidates_the_session() {
    let app = spawn_app().await;
    register(&app, "ana@x.com", "password1").await;
    let response = login(&app, "ana@x.com", "password1").await;
    let cookie = session_cookie(&response).unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_gate() {
    let app = spawn_app().await;

    // Unauthenticated
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/activity")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Regular learner
    register(&app, "ana@x.com", "password1").await;
    let response = login(&app, "ana@x.com", "password1").await;
    let cookie = session_cookie(&response).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/activity")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Seeded admin
    let response = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/activity")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_newsletter_subscription_lifecycle() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/newsletter/subscribe",
            serde_json::json!({ "email": "lead@x.com", "name": "Lead" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second subscription is refused while active
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/newsletter/subscribe",
            serde_json::json!({ "email": "lead@x.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(
        body["message"],
        "This email address is already subscribed to our newsletter"
    );

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/newsletter/unsubscribe",
            serde_json::json!({ "email": "lead@x.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Re-subscription reactivates the dormant row
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/newsletter/subscribe",
            serde_json::json!({ "email": "lead@x.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["message"],
        "Welcome back! Your newsletter subscription has been reactivated."
    );
}

#[tokio::test]
async fn test_newsletter_honeypot() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/newsletter/subscribe",
            serde_json::json!({ "email": "bot@x.com", "website": "https://spam.example" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Spam detected");
}

#[tokio::test]
async fn test_contact_submission_validation() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/contact",
            serde_json::json!({
                "name": "Ana",
                "email": "ana@x.com",
                "message": "too short",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Message must be at least 10 characters long");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/contact",
            serde_json::json!({
                "name": "Ana",
                "email": "ana@x.com",
                "message": "I would like a quote for ISO 9001 training.",
                "type": "quote",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_contact_throttles_repeat_submissions() {
    let app = spawn_app().await;

    let submit = |app: &Router| {
        let mut request = json_request(
            "POST",
            "/api/contact",
            serde_json::json!({
                "name": "Ana",
                "email": "ana@x.com",
                "message": "I would like a quote for ISO 9001 training.",
            }),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        app.clone().oneshot(request)
    };

    let response = submit(&app).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = submit(&app).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let app = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
