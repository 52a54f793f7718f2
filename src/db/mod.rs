use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::entities::{activity_logs, course_enrollments, courses, user_certificates, user_sessions, users};
use crate::validation::ExistsProbe;

pub mod migrator;
pub mod repositories;

pub use repositories::activity::ActivityEntry;
pub use repositories::contact::NewSubmission;
pub use repositories::enrollment::EnrollmentStats;
pub use repositories::is_future;
pub use repositories::user::{NewUser, ProfileUpdate};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn session_repo(&self) -> repositories::session::SessionRepository {
        repositories::session::SessionRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn activity_repo(&self) -> repositories::activity::ActivityRepository {
        repositories::activity::ActivityRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn newsletter_repo(&self) -> repositories::newsletter::NewsletterRepository {
        repositories::newsletter::NewsletterRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn contact_repo(&self) -> repositories::contact::ContactRepository {
        repositories::contact::ContactRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn enrollment_repo(&self) -> repositories::enrollment::EnrollmentRepository {
        repositories::enrollment::EnrollmentRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn insert_user(&self, user: NewUser) -> Result<users::Model> {
        self.user_repo().insert(user).await
    }

    pub async fn record_failed_attempt(
        &self,
        email: &str,
        max_attempts: i32,
        lockout_seconds: u64,
    ) -> Result<Option<i32>> {
        self.user_repo()
            .record_failed_attempt(email, max_attempts, lockout_seconds)
            .await
    }

    pub async fn reset_login_attempts(&self, user_id: i32) -> Result<()> {
        self.user_repo().reset_login_attempts(user_id).await
    }

    pub async fn update_last_login(&self, user_id: i32) -> Result<()> {
        self.user_repo().update_last_login(user_id).await
    }

    pub async fn set_remember_token(&self, user_id: i32, token_hash: Option<String>) -> Result<()> {
        self.user_repo().set_remember_token(user_id, token_hash).await
    }

    pub async fn set_reset_token(&self, user_id: i32, token: &str, expires_at: &str) -> Result<()> {
        self.user_repo().set_reset_token(user_id, token, expires_at).await
    }

    pub async fn get_user_by_reset_token(&self, token: &str) -> Result<Option<users::Model>> {
        self.user_repo().get_by_reset_token(token).await
    }

    pub async fn update_user_password(&self, user_id: i32, password_hash: &str) -> Result<()> {
        self.user_repo().update_password(user_id, password_hash).await
    }

    pub async fn update_user_profile(&self, user_id: i32, update: ProfileUpdate) -> Result<()> {
        self.user_repo().update_profile(user_id, update).await
    }

    pub async fn set_user_profile_image(&self, user_id: i32, path: &str) -> Result<()> {
        self.user_repo().set_profile_image(user_id, path).await
    }

    // ========== Sessions ==========

    pub async fn create_session(
        &self,
        user_id: i32,
        ip_address: Option<String>,
        user_agent: Option<String>,
        lifetime_seconds: u64,
    ) -> Result<user_sessions::Model> {
        self.session_repo()
            .create(user_id, ip_address, user_agent, lifetime_seconds)
            .await
    }

    pub async fn get_valid_session(&self, id: &str) -> Result<Option<user_sessions::Model>> {
        self.session_repo().get_valid(id).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        self.session_repo().delete(id).await
    }

    pub async fn delete_expired_sessions(&self) -> Result<u64> {
        self.session_repo().delete_expired().await
    }

    // ========== Activity ==========

    pub async fn record_activity(&self, user_id: i32, entry: ActivityEntry<'_>) -> Result<()> {
        self.activity_repo().record(user_id, entry).await
    }

    pub async fn recent_activity_for_user(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<activity_logs::Model>> {
        self.activity_repo().recent_for_user(user_id, limit).await
    }

    pub async fn recent_activity(&self, limit: u64) -> Result<Vec<activity_logs::Model>> {
        self.activity_repo().recent(limit).await
    }

    // ========== Dashboard reads ==========

    pub async fn enrollment_stats(&self, user_id: i32) -> Result<EnrollmentStats> {
        self.enrollment_repo().stats(user_id).await
    }

    pub async fn active_enrollments(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<(course_enrollments::Model, Option<courses::Model>)>> {
        self.enrollment_repo().active_with_courses(user_id, limit).await
    }

    pub async fn enrollment_page(
        &self,
        user_id: i32,
        status: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<(course_enrollments::Model, Option<courses::Model>)>, u64)> {
        self.enrollment_repo()
            .page_with_courses(user_id, status, page, per_page)
            .await
    }

    pub async fn certificates(
        &self,
        user_id: i32,
    ) -> Result<Vec<(user_certificates::Model, Option<courses::Model>)>> {
        self.enrollment_repo().certificates_with_courses(user_id).await
    }
}

/// Existence checks for the validator's `Unique`/`Exists` rules. The table
/// and column names form a closed set; anything else is a programming error
/// surfaced as a storage fault, never end-user input.
#[async_trait]
impl ExistsProbe for Store {
    async fn exists(
        &self,
        table: &str,
        column: &str,
        value: &str,
        ignore_id: Option<i32>,
    ) -> Result<bool> {
        match (table, column) {
            ("users", "email") => self.user_repo().email_exists(value, ignore_id).await,
            ("newsletter_subscribers", "email") => {
                Ok(self.newsletter_repo().get_by_email(value).await?.is_some())
            }
            _ => anyhow::bail!("No existence probe for {table}.{column}"),
        }
    }
}
