use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::user_sessions;
use crate::validation::random_hex;

pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Creates a fresh session row with a 128-hex-char id.
    pub async fn create(
        &self,
        user_id: i32,
        ip_address: Option<String>,
        user_agent: Option<String>,
        lifetime_seconds: u64,
    ) -> Result<user_sessions::Model> {
        let now = Utc::now();
        let expires_at = (now + Duration::seconds(lifetime_seconds as i64)).to_rfc3339();

        let active = user_sessions::ActiveModel {
            id: Set(random_hex::<64>()),
            user_id: Set(user_id),
            ip_address: Set(ip_address),
            user_agent: Set(user_agent),
            expires_at: Set(expires_at),
            created_at: Set(now.to_rfc3339()),
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert session")
    }

    /// Fetches a session only while it is unexpired. Expiry is evaluated
    /// lazily here; rows are physically removed by the sweeper or on logout.
    pub async fn get_valid(&self, id: &str) -> Result<Option<user_sessions::Model>> {
        let session = user_sessions::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query session")?;

        Ok(session.filter(|s| super::is_future(&s.expires_at)))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        user_sessions::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    pub async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();

        let result = user_sessions::Entity::delete_many()
            .filter(user_sessions::Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to delete expired sessions")?;

        Ok(result.rows_affected)
    }
}
