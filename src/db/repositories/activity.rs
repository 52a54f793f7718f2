use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entities::activity_logs;

/// Append-only audit trail. The auth core only ever writes here; reads
/// serve the dashboard and the admin activity view.
pub struct ActivityRepository {
    conn: DatabaseConnection,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityEntry<'a> {
    pub action: &'a str,
    pub entity_type: Option<&'a str>,
    pub entity_id: Option<i32>,
    pub description: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

impl ActivityRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn record(&self, user_id: i32, entry: ActivityEntry<'_>) -> Result<()> {
        let active = activity_logs::ActiveModel {
            user_id: Set(user_id),
            action: Set(entry.action.to_string()),
            entity_type: Set(entry.entity_type.map(str::to_string)),
            entity_id: Set(entry.entity_id),
            description: Set(entry.description.map(str::to_string)),
            ip_address: Set(entry.ip_address.map(str::to_string)),
            user_agent: Set(entry.user_agent.map(str::to_string)),
            created_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert activity log")?;
        Ok(())
    }

    pub async fn recent_for_user(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<activity_logs::Model>> {
        activity_logs::Entity::find()
            .filter(activity_logs::Column::UserId.eq(user_id))
            .order_by_desc(activity_logs::Column::CreatedAt)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query user activity")
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<activity_logs::Model>> {
        activity_logs::Entity::find()
            .order_by_desc(activity_logs::Column::CreatedAt)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query recent activity")
    }
}
