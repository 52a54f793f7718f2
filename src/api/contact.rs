use axum::{Json, extract::State, http::HeaderMap};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::{check_csrf, client_info};
use super::{ApiError, ApiResponse, AppState};
use crate::db::NewSubmission;
use crate::validation::{self, SanitizeKind, sanitize};

const ALLOWED_TYPES: [&str; 4] = ["general", "quote", "support", "training"];

const MESSAGE_MIN: usize = 10;
const MESSAGE_MAX: usize = 5000;

#[derive(Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type")]
    pub inquiry_type: Option<String>,
    /// Honeypot field
    pub website: Option<String>,
    pub csrf_token: Option<String>,
}

/// POST /contact
pub async fn submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<ContactRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    check_csrf(&session, payload.csrf_token.as_deref()).await?;

    for (value, field) in [
        (&payload.name, "Name"),
        (&payload.email, "Email"),
        (&payload.message, "Message"),
    ] {
        if value.is_empty() {
            return Err(ApiError::validation(format!("{field} is required")));
        }
    }

    if payload.website.as_deref().is_some_and(|w| !w.is_empty()) {
        return Err(ApiError::validation("Spam detected"));
    }

    let email = sanitize(&payload.email, SanitizeKind::Email);
    if !validation::is_valid_email(&email) {
        return Err(ApiError::validation("Please enter a valid email address"));
    }

    let message = sanitize(&payload.message, SanitizeKind::Text);
    if message.chars().count() < MESSAGE_MIN {
        return Err(ApiError::validation(format!(
            "Message must be at least {MESSAGE_MIN} characters long"
        )));
    }
    if message.chars().count() > MESSAGE_MAX {
        return Err(ApiError::validation(format!(
            "Message cannot exceed {MESSAGE_MAX} characters"
        )));
    }

    // Unknown types degrade to "general" instead of failing the submission
    let inquiry_type = payload
        .inquiry_type
        .map(|t| sanitize(&t, SanitizeKind::Text))
        .filter(|t| ALLOWED_TYPES.contains(&t.as_str()))
        .unwrap_or_else(|| "general".to_string());

    let client = client_info(&headers);

    if let Some(ip) = &client.ip_address {
        let throttle_seconds = state.config().read().await.security.contact_throttle_seconds;
        let recent = state
            .store()
            .contact_repo()
            .has_recent_from_ip(ip, throttle_seconds)
            .await
            .map_err(|e| ApiError::internal(format!("Throttle check failed: {e}")))?;

        if recent {
            return Err(ApiError::TooManyRequests(
                "Please wait a few minutes before submitting another message".to_string(),
            ));
        }
    }

    state
        .store()
        .contact_repo()
        .insert(NewSubmission {
            name: sanitize(&payload.name, SanitizeKind::Text),
            email,
            phone: payload.phone.map(|p| sanitize(&p, SanitizeKind::Text)),
            company: payload.company.map(|c| sanitize(&c, SanitizeKind::Text)),
            subject: payload.subject.map(|s| sanitize(&s, SanitizeKind::Text)),
            message,
            inquiry_type,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
        })
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save submission: {e}")))?;

    Ok(Json(ApiResponse::message(
        "Thank you for your message! We will get back to you soon.",
    )))
}
