//! Domain service for authentication and account lifecycle.
//!
//! Owns login with brute-force lockout bookkeeping, registration, logout,
//! password reset and password change. Handlers stay thin: they translate
//! HTTP requests into these calls and serialize the outcome.

use serde::Serialize;
use thiserror::Error;

use crate::entities::users;
use crate::validation::FieldErrors;

/// Errors specific to authentication operations. User-facing variants carry
/// their exact response message in `Display`; the same text is returned for
/// a wrong password and an unknown email so accounts cannot be enumerated.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(
        "Account is temporarily locked due to too many failed login attempts. Please try again later."
    )]
    AccountLocked,

    #[error("Your account is inactive. Please contact support.")]
    AccountInactive,

    #[error("Validation failed")]
    Invalid(FieldErrors),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid or expired reset token.")]
    InvalidResetToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// User record with every security-sensitive column stripped.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUser {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub profile_image: Option<String>,
    pub role: String,
    pub status: String,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<users::Model> for SanitizedUser {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            phone: model.phone,
            company: model.company,
            position: model.position,
            profile_image: model.profile_image,
            role: model.role,
            status: model.status,
            last_login: model.last_login,
            created_at: model.created_at,
        }
    }
}

/// Request-scoped client snapshot recorded on sessions and audit entries.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Successful login: the sanitized user, the server-side session row id and,
/// when requested, the plaintext remember-me token for the cookie. Only its
/// hash is persisted.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: SanitizedUser,
    pub session_id: String,
    pub remember_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials against the lockout state machine.
    ///
    /// # Errors
    ///
    /// [`AuthError::AccountLocked`] while the lock window is open,
    /// [`AuthError::InvalidCredentials`] for a wrong password or unknown
    /// email (same message for both), [`AuthError::AccountInactive`] for a
    /// disabled account.
    async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError>;

    /// Creates an account after field validation. No row is written when any
    /// rule fails.
    async fn register(
        &self,
        data: Registration,
        client: &ClientInfo,
    ) -> Result<SanitizedUser, AuthError>;

    /// Deletes the server-side session row and records the logout.
    async fn logout(
        &self,
        user_id: i32,
        session_id: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError>;

    /// Issues a reset token when the account exists. Success is reported
    /// either way so the endpoint cannot be used to enumerate accounts.
    async fn request_password_reset(
        &self,
        email: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError>;

    /// Consumes a single-use reset token.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidResetToken`] when the token is unknown, expired
    /// or belongs to an inactive account.
    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError>;

    /// Changes a signed-in user's password.
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] if the current password is wrong or the new
    /// one violates policy.
    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError>;

    /// Sanitized record for the signed-in user.
    async fn current_user(&self, user_id: i32) -> Result<SanitizedUser, AuthError>;
}
