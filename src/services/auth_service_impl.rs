//! `SeaORM` implementation of the `AuthService` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::config::SecurityConfig;
use crate::db::repositories::is_future;
use crate::db::repositories::user::{hash_password_blocking, verify_password_blocking};
use crate::db::{ActivityEntry, NewUser, Store};
use crate::services::auth_service::{
    AuthError, AuthService, ClientInfo, LoginOutcome, Registration, SanitizedUser,
};
use crate::validation::{Rule, Validator, random_hex};

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }

    fn activity<'a>(
        action: &'a str,
        description: &'a str,
        client: &'a ClientInfo,
    ) -> ActivityEntry<'a> {
        ActivityEntry {
            action,
            description: Some(description),
            ip_address: client.ip_address.as_deref(),
            user_agent: client.user_agent.as_deref(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError> {
        let user = self.store.get_user_by_email(email).await?;

        // Lock check comes first: a locked account answers with the lockout
        // message even for the correct password, and never counts the
        // attempt against the window.
        if let Some(user) = &user
            && user.locked_until.as_deref().is_some_and(is_future)
        {
            return Err(AuthError::AccountLocked);
        }

        // Unknown email: there is no row to count against, and the response
        // must be byte-identical to the wrong-password case.
        let Some(user) = user else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password_blocking(password, &user.password_hash).await? {
            self.store
                .record_failed_attempt(
                    email,
                    self.security.max_login_attempts,
                    self.security.lockout_seconds,
                )
                .await?;
            return Err(AuthError::InvalidCredentials);
        }

        if user.status != "active" {
            return Err(AuthError::AccountInactive);
        }

        // Counters and lock clear unconditionally, whatever their prior state.
        self.store.reset_login_attempts(user.id).await?;
        self.store.update_last_login(user.id).await?;

        let session = self
            .store
            .create_session(
                user.id,
                client.ip_address.clone(),
                client.user_agent.clone(),
                self.security.session_lifetime_seconds,
            )
            .await?;

        let remember_token = if remember_me {
            let token = random_hex::<32>();
            let token_hash = hash_password_blocking(&token, &self.security).await?;
            self.store
                .set_remember_token(user.id, Some(token_hash))
                .await?;
            Some(token)
        } else {
            None
        };

        self.store
            .record_activity(user.id, Self::activity("login", "User logged in", client))
            .await?;

        Ok(LoginOutcome {
            user: SanitizedUser::from(user),
            session_id: session.id,
            remember_token,
        })
    }

    async fn register(
        &self,
        data: Registration,
        client: &ClientInfo,
    ) -> Result<SanitizedUser, AuthError> {
        let rules: Vec<(&str, Vec<Rule>)> = vec![
            ("first_name", vec![Rule::Required, Rule::Min(2), Rule::Max(50)]),
            ("last_name", vec![Rule::Required, Rule::Min(2), Rule::Max(50)]),
            (
                "email",
                vec![
                    Rule::Required,
                    Rule::Email,
                    Rule::Unique {
                        table: "users",
                        column: "email",
                        ignore_id: None,
                    },
                ],
            ),
            (
                "password",
                vec![Rule::Required, Rule::Min(self.security.password_min_length)],
            ),
            ("phone", vec![Rule::Max(20)]),
            ("company", vec![Rule::Max(100)]),
            ("position", vec![Rule::Max(100)]),
        ];

        let mut fields = BTreeMap::new();
        fields.insert("first_name".to_string(), data.first_name.clone());
        fields.insert("last_name".to_string(), data.last_name.clone());
        fields.insert("email".to_string(), data.email.clone());
        fields.insert("password".to_string(), data.password.clone());
        if let Some(phone) = &data.phone {
            fields.insert("phone".to_string(), phone.clone());
        }
        if let Some(company) = &data.company {
            fields.insert("company".to_string(), company.clone());
        }
        if let Some(position) = &data.position {
            fields.insert("position".to_string(), position.clone());
        }

        let validation = Validator::new(&self.store).validate(&fields, &rules).await?;
        if !validation.valid {
            return Err(AuthError::Invalid(validation.errors));
        }

        let password_hash = hash_password_blocking(&data.password, &self.security).await?;

        let user = self
            .store
            .insert_user(NewUser {
                first_name: data.first_name,
                last_name: data.last_name,
                email: data.email,
                password_hash,
                phone: data.phone,
                company: data.company,
                position: data.position,
                // Issued but never sent; email verification stays stubbed.
                verification_token: random_hex::<32>(),
                role: "user".to_string(),
            })
            .await?;

        let mut entry = Self::activity("register", "User registered", client);
        entry.entity_type = Some("user");
        entry.entity_id = Some(user.id);
        self.store.record_activity(user.id, entry).await?;

        Ok(SanitizedUser::from(user))
    }

    async fn logout(
        &self,
        user_id: i32,
        session_id: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        self.store.delete_session(session_id).await?;

        self.store
            .record_activity(user_id, Self::activity("logout", "User logged out", client))
            .await?;

        Ok(())
    }

    async fn request_password_reset(
        &self,
        email: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        // Same success envelope whether or not the account exists.
        let Some(user) = self.store.get_user_by_email(email).await? else {
            return Ok(());
        };

        let token = random_hex::<32>();
        let expires_at =
            (Utc::now() + Duration::seconds(self.security.reset_token_seconds as i64)).to_rfc3339();

        self.store.set_reset_token(user.id, &token, &expires_at).await?;

        let mut entry =
            Self::activity("password_reset_request", "Password reset requested", client);
        entry.entity_type = Some("user");
        entry.entity_id = Some(user.id);
        self.store.record_activity(user.id, entry).await?;

        Ok(())
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        let user = self
            .store
            .get_user_by_reset_token(token)
            .await?
            .filter(|u| u.reset_expires.as_deref().is_some_and(is_future))
            .filter(|u| u.status == "active")
            .ok_or(AuthError::InvalidResetToken)?;

        if new_password.chars().count() < self.security.password_min_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters long.",
                self.security.password_min_length
            )));
        }

        let password_hash = hash_password_blocking(new_password, &self.security).await?;
        // Burns the token: a second use falls into the lookup failure above.
        self.store.update_user_password(user.id, &password_hash).await?;

        let mut entry = Self::activity("password_reset", "Password was reset", client);
        entry.entity_type = Some("user");
        entry.entity_id = Some(user.id);
        self.store.record_activity(user.id, entry).await?;

        Ok(())
    }

    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        if new_password.chars().count() < self.security.password_min_length {
            return Err(AuthError::Validation(format!(
                "New password must be at least {} characters long",
                self.security.password_min_length
            )));
        }

        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        let user = self
            .store
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password_blocking(current_password, &user.password_hash).await? {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let password_hash = hash_password_blocking(new_password, &self.security).await?;
        self.store.update_user_password(user.id, &password_hash).await?;

        let mut entry = Self::activity("password_change", "Password changed", client);
        entry.entity_type = Some("user");
        entry.entity_id = Some(user.id);
        self.store.record_activity(user.id, entry).await?;

        Ok(())
    }

    async fn current_user(&self, user_id: i32) -> Result<SanitizedUser, AuthError> {
        let user = self
            .store
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(SanitizedUser::from(user))
    }
}
