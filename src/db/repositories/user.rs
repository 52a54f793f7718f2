use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::users;

/// Column subset a profile update may touch.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.phone.is_none()
            && self.company.is_none()
            && self.position.is_none()
    }
}

/// Insert payload for registration. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub verification_token: String,
    pub role: String,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")
    }

    pub async fn email_exists(&self, email: &str, ignore_id: Option<i32>) -> Result<bool> {
        let mut query = users::Entity::find().filter(users::Column::Email.eq(email));
        if let Some(id) = ignore_id {
            query = query.filter(users::Column::Id.ne(id));
        }

        let count = query
            .count(&self.conn)
            .await
            .context("Failed to check email existence")?;
        Ok(count > 0)
    }

    pub async fn insert(&self, user: NewUser) -> Result<users::Model> {
        let now = Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            first_name: Set(user.first_name),
            last_name: Set(user.last_name),
            email: Set(user.email),
            password_hash: Set(user.password_hash),
            phone: Set(user.phone),
            company: Set(user.company),
            position: Set(user.position),
            role: Set(user.role),
            status: Set("active".to_string()),
            login_attempts: Set(0),
            verification_token: Set(Some(user.verification_token)),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")
    }

    /// Counts one failed login against the account, atomically.
    ///
    /// The increment runs as a single `UPDATE ... SET login_attempts =
    /// login_attempts + 1` inside a transaction, so two concurrent failures
    /// never collapse into one. Once the count reaches `max_attempts` the
    /// lock window is (re)armed. Returns the new count, or `None` when no
    /// row matches the email.
    pub async fn record_failed_attempt(
        &self,
        email: &str,
        max_attempts: i32,
        lockout_seconds: u64,
    ) -> Result<Option<i32>> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to open attempt transaction")?;

        users::Entity::update_many()
            .col_expr(
                users::Column::LoginAttempts,
                Expr::col(users::Column::LoginAttempts).add(1),
            )
            .filter(users::Column::Email.eq(email))
            .exec(&txn)
            .await
            .context("Failed to increment login attempts")?;

        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&txn)
            .await
            .context("Failed to re-read user after increment")?;

        let Some(user) = user else {
            txn.rollback().await.ok();
            return Ok(None);
        };

        let attempts = user.login_attempts;
        if attempts >= max_attempts {
            let locked_until =
                (Utc::now() + Duration::seconds(lockout_seconds as i64)).to_rfc3339();

            let mut active: users::ActiveModel = user.into();
            active.locked_until = Set(Some(locked_until));
            active.updated_at = Set(Utc::now().to_rfc3339());
            active
                .update(&txn)
                .await
                .context("Failed to arm lockout window")?;
        }

        txn.commit()
            .await
            .context("Failed to commit attempt transaction")?;
        Ok(Some(attempts))
    }

    /// Unconditional reset on successful authentication.
    pub async fn reset_login_attempts(&self, user_id: i32) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::LoginAttempts, Expr::value(0))
            .col_expr(users::Column::LockedUntil, Expr::value(Option::<String>::None))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to reset login attempts")?;
        Ok(())
    }

    pub async fn update_last_login(&self, user_id: i32) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::LastLogin, Expr::value(Utc::now().to_rfc3339()))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to stamp last login")?;
        Ok(())
    }

    pub async fn set_remember_token(&self, user_id: i32, token_hash: Option<String>) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::RememberToken, Expr::value(token_hash))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to update remember token")?;
        Ok(())
    }

    pub async fn set_reset_token(
        &self,
        user_id: i32,
        token: &str,
        expires_at: &str,
    ) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::ResetToken, Expr::value(token))
            .col_expr(users::Column::ResetExpires, Expr::value(expires_at))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to store reset token")?;
        Ok(())
    }

    pub async fn get_by_reset_token(&self, token: &str) -> Result<Option<users::Model>> {
        users::Entity::find()
            .filter(users::Column::ResetToken.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query user by reset token")
    }

    /// Rehashes the password and burns the reset token in one write.
    pub async fn update_password(&self, user_id: i32, password_hash: &str) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::ResetToken, Expr::value(Option::<String>::None))
            .col_expr(users::Column::ResetExpires, Expr::value(Option::<String>::None))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    pub async fn update_profile(&self, user_id: i32, update: ProfileUpdate) -> Result<()> {
        let user = self
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {user_id}"))?;

        let mut active: users::ActiveModel = user.into();
        if let Some(first_name) = update.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = update.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(phone) = update.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(company) = update.company {
            active.company = Set(Some(company));
        }
        if let Some(position) = update.position {
            active.position = Set(Some(position));
        }
        active.updated_at = Set(Utc::now().to_rfc3339());

        active
            .update(&self.conn)
            .await
            .context("Failed to update profile")?;
        Ok(())
    }

    pub async fn set_profile_image(&self, user_id: i32, path: &str) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::ProfileImage, Expr::value(path))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to update profile image")?;
        Ok(())
    }
}

/// Hash a password using Argon2id with the configured cost parameters.
/// Note: call from `spawn_blocking`; Argon2 is CPU-intensive and would
/// stall the async runtime if run directly.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

pub async fn hash_password_blocking(password: &str, config: &SecurityConfig) -> Result<String> {
    let password = password.to_string();
    let config = config.clone();

    task::spawn_blocking(move || hash_password(&password, &config))
        .await
        .context("Password hashing task panicked")?
}

pub async fn verify_password_blocking(password: &str, password_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();

    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

        let argon2 = Argon2::default();
        Ok::<bool, anyhow::Error>(
            argon2
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok(),
        )
    })
    .await
    .context("Password verification task panicked")?
}
