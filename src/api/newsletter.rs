use axum::{Json, extract::State, http::HeaderMap};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::{check_csrf, client_info};
use super::{ApiError, ApiResponse, AppState};
use crate::validation::{self, SanitizeKind, sanitize};

#[derive(Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
    pub name: Option<String>,
    pub source: Option<String>,
    /// Honeypot field; bots fill it, browsers leave it empty
    pub website: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(Deserialize)]
pub struct UnsubscribeRequest {
    #[serde(default)]
    pub email: String,
}

/// POST /newsletter/subscribe
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<SubscribeRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    check_csrf(&session, payload.csrf_token.as_deref()).await?;

    if payload.email.is_empty() {
        return Err(ApiError::validation("Email address is required"));
    }

    if payload.website.as_deref().is_some_and(|w| !w.is_empty()) {
        return Err(ApiError::validation("Spam detected"));
    }

    let email = sanitize(&payload.email, SanitizeKind::Email);
    if !validation::is_valid_email(&email) {
        return Err(ApiError::validation("Please enter a valid email address"));
    }

    let name = payload.name.map(|n| sanitize(&n, SanitizeKind::Text));
    let source = payload
        .source
        .map(|s| sanitize(&s, SanitizeKind::Text))
        .unwrap_or_else(|| "website".to_string());
    let client = client_info(&headers);

    let existing = state
        .store()
        .newsletter_repo()
        .get_by_email(&email)
        .await
        .map_err(|e| ApiError::internal(format!("Subscriber lookup failed: {e}")))?;

    if let Some(subscriber) = existing {
        if subscriber.status == "active" {
            return Err(ApiError::validation(
                "This email address is already subscribed to our newsletter",
            ));
        }

        state
            .store()
            .newsletter_repo()
            .reactivate(subscriber, name.as_deref(), &source, client.ip_address.as_deref())
            .await
            .map_err(|e| ApiError::internal(format!("Failed to reactivate: {e}")))?;

        return Ok(Json(ApiResponse::message(
            "Welcome back! Your newsletter subscription has been reactivated.",
        )));
    }

    state
        .store()
        .newsletter_repo()
        .subscribe(&email, name.as_deref(), &source, client.ip_address.as_deref())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to subscribe: {e}")))?;

    Ok(Json(ApiResponse::message(
        "Thank you for subscribing! You will receive our latest updates and insights.",
    )))
}

/// POST /newsletter/unsubscribe
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UnsubscribeRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if payload.email.is_empty() {
        return Err(ApiError::validation("Email address is required"));
    }

    let email = sanitize(&payload.email, SanitizeKind::Email);
    let removed = state
        .store()
        .newsletter_repo()
        .unsubscribe(&email)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to unsubscribe: {e}")))?;

    if !removed {
        return Err(ApiError::validation(
            "Email address not found in our newsletter list",
        ));
    }

    Ok(Json(ApiResponse::message(
        "You have been unsubscribed from our newsletter.",
    )))
}
