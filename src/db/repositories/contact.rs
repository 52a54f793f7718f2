use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};

use crate::entities::contact_submissions;

pub struct ContactRepository {
    conn: DatabaseConnection,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub inquiry_type: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ContactRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, submission: NewSubmission) -> Result<i32> {
        let active = contact_submissions::ActiveModel {
            name: Set(submission.name),
            email: Set(submission.email),
            phone: Set(submission.phone),
            company: Set(submission.company),
            subject: Set(submission.subject),
            message: Set(submission.message),
            inquiry_type: Set(submission.inquiry_type),
            status: Set("new".to_string()),
            ip_address: Set(submission.ip_address),
            user_agent: Set(submission.user_agent),
            created_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let inserted = active
            .insert(&self.conn)
            .await
            .context("Failed to insert contact submission")?;
        Ok(inserted.id)
    }

    /// Throttle probe: anything from this IP inside the window?
    pub async fn has_recent_from_ip(&self, ip_address: &str, window_seconds: u64) -> Result<bool> {
        let cutoff = (Utc::now() - Duration::seconds(window_seconds as i64)).to_rfc3339();

        let count = contact_submissions::Entity::find()
            .filter(contact_submissions::Column::IpAddress.eq(ip_address))
            .filter(contact_submissions::Column::CreatedAt.gt(cutoff))
            .count(&self.conn)
            .await
            .context("Failed to check recent submissions")?;

        Ok(count > 0)
    }
}
