use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;
use tower_sessions::cookie::{Cookie, SameSite};

use super::{ApiError, ApiResponse, AppState};
use crate::services::{ClientInfo, Registration, SanitizedUser};
use crate::validation::{self, SanitizeKind, sanitize};

pub(crate) const USER_ID_KEY: &str = "user_id";
pub(crate) const USER_ROLE_KEY: &str = "user_role";
pub(crate) const DB_SESSION_KEY: &str = "session_id";

const REMEMBER_COOKIE: &str = "remember_token";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
    pub csrf_token: Option<String>,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
    pub csrf_token: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
    pub csrf_token: Option<String>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: SanitizedUser,
}

#[derive(Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Gate for the authenticated area. The browser session must name a user and
/// a backing `user_sessions` row that has not lapsed; expiry is evaluated
/// lazily here, so a stale row answers exactly like a signed-out client.
pub async fn require_login(
    State(state): State<Arc<AppState>>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = session_user_id(&session).await?;

    let db_session_id = session
        .get::<String>(DB_SESSION_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let valid = state
        .store()
        .get_valid_session(&db_session_id)
        .await
        .map_err(|e| ApiError::internal(format!("Session lookup failed: {e}")))?
        .is_some();

    if !valid {
        session.flush().await.ok();
        return Err(ApiError::Unauthorized("Session expired".to_string()));
    }

    tracing::Span::current().record("user_id", user_id);
    Ok(next.run(request).await)
}

/// Admin gate, layered on top of `require_login`.
pub async fn require_admin(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let role = session
        .get::<String>(USER_ROLE_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    if role.as_deref() != Some("admin") {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /auth/csrf
/// Issue (or replay) the per-session CSRF token for form embedding
pub async fn csrf(session: Session) -> Result<Json<ApiResponse<CsrfResponse>>, ApiError> {
    let token = validation::csrf_token(&session)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to issue CSRF token: {e}")))?;

    Ok(Json(ApiResponse::success(
        "CSRF token issued",
        CsrfResponse { csrf_token: token },
    )))
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_csrf(&session, payload.csrf_token.as_deref()).await?;

    let client = client_info(&headers);
    let user = state
        .auth
        .register(
            Registration {
                first_name: payload.first_name,
                last_name: payload.last_name,
                email: sanitize(&payload.email, SanitizeKind::Email),
                password: payload.password,
                phone: payload.phone,
                company: payload.company,
                position: payload.position,
            },
            &client,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Registration successful. Please check your email for verification.",
            UserResponse { user },
        )),
    ))
}

/// POST /auth/login
/// Authenticate with email and password, establishes the browser session
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    check_csrf(&session, payload.csrf_token.as_deref()).await?;

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let email = sanitize(&payload.email, SanitizeKind::Email);
    if !validation::is_valid_email(&email) {
        return Err(ApiError::validation("Please enter a valid email address"));
    }

    let client = client_info(&headers);
    let outcome = state
        .auth
        .login(&email, &payload.password, payload.remember_me, &client)
        .await?;

    session
        .insert(USER_ID_KEY, outcome.user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;
    session
        .insert(USER_ROLE_KEY, &outcome.user.role)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;
    session
        .insert(DB_SESSION_KEY, &outcome.session_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    let (secure_cookies, remember_days) = {
        let config = state.config().read().await;
        (
            config.server.secure_cookies,
            config.security.remember_me_days,
        )
    };

    let mut response = Json(ApiResponse::success(
        "Login successful",
        UserResponse { user: outcome.user },
    ))
    .into_response();

    if let Some(token) = outcome.remember_token {
        let cookie = Cookie::build((REMEMBER_COOKIE, token))
            .path("/")
            .max_age(time::Duration::days(remember_days as i64))
            .http_only(true)
            .secure(secure_cookies)
            .same_site(SameSite::Lax)
            .build();
        append_cookie(&mut response, &cookie)?;
    }

    Ok(response)
}

/// POST /auth/logout
/// No-op when not signed in; otherwise tears down both session layers
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user_id = session
        .get::<i32>(USER_ID_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
    let db_session_id = session
        .get::<String>(DB_SESSION_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    if let (Some(user_id), Some(db_session_id)) = (user_id, db_session_id) {
        let client = client_info(&headers);
        state.auth.logout(user_id, &db_session_id, &client).await?;
    }

    session.flush().await.ok();

    let mut response =
        Json(ApiResponse::<()>::message("Logged out successfully")).into_response();

    // Expire the remember-me cookie whether or not one was set
    let expired = Cookie::build((REMEMBER_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .http_only(true)
        .build();
    append_cookie(&mut response, &expired)?;

    Ok(response)
}

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user_id = session_user_id(&session).await?;
    let user = state.auth.current_user(user_id).await?;

    Ok(Json(ApiResponse::success(
        "OK",
        UserResponse { user },
    )))
}

/// POST /auth/forgot-password
/// Same envelope whether or not the account exists
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    check_csrf(&session, payload.csrf_token.as_deref()).await?;

    if payload.email.is_empty() {
        return Err(ApiError::validation("Email address is required"));
    }

    let email = sanitize(&payload.email, SanitizeKind::Email);
    if !validation::is_valid_email(&email) {
        return Err(ApiError::validation("Please enter a valid email address"));
    }

    let client = client_info(&headers);
    state.auth.request_password_reset(&email, &client).await?;

    Ok(Json(ApiResponse::message(
        "If an account with that email exists, a reset link has been sent.",
    )))
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    check_csrf(&session, payload.csrf_token.as_deref()).await?;

    if payload.token.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Token and password are required"));
    }

    let client = client_info(&headers);
    state
        .auth
        .reset_password(&payload.token, &payload.password, &client)
        .await?;

    Ok(Json(ApiResponse::message(
        "Password has been reset successfully. You can now login with your new password.",
    )))
}

// ============================================================================
// Helpers
// ============================================================================

/// Get the signed-in user's id from the session, 401 when absent
pub(crate) async fn session_user_id(session: &Session) -> Result<i32, ApiError> {
    session
        .get::<i32>(USER_ID_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
}

/// Form submissions carry a `csrf_token`; when present it must match the
/// session's token. API clients authenticating per-request may omit it.
pub(crate) async fn check_csrf(session: &Session, token: Option<&str>) -> Result<(), ApiError> {
    if let Some(token) = token
        && !validation::verify_csrf(session, token).await
    {
        return Err(ApiError::validation("Invalid CSRF token"));
    }
    Ok(())
}

/// Snapshot of the caller for sessions and audit entries.
pub(crate) fn client_info(headers: &HeaderMap) -> ClientInfo {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ClientInfo {
        ip_address,
        user_agent,
    }
}

fn append_cookie(response: &mut Response, cookie: &Cookie<'_>) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| ApiError::internal(format!("Invalid cookie header: {e}")))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}
