use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::newsletter_subscribers;

pub struct NewsletterRepository {
    conn: DatabaseConnection,
}

impl NewsletterRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_email(
        &self,
        email: &str,
    ) -> Result<Option<newsletter_subscribers::Model>> {
        newsletter_subscribers::Entity::find()
            .filter(newsletter_subscribers::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query subscriber")
    }

    pub async fn subscribe(
        &self,
        email: &str,
        name: Option<&str>,
        source: &str,
        ip_address: Option<&str>,
    ) -> Result<()> {
        let active = newsletter_subscribers::ActiveModel {
            email: Set(email.to_string()),
            name: Set(name.map(str::to_string)),
            status: Set("active".to_string()),
            source: Set(source.to_string()),
            ip_address: Set(ip_address.map(str::to_string)),
            subscription_date: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert subscriber")?;
        Ok(())
    }

    /// Flips an unsubscribed row back to active and refreshes the snapshot.
    pub async fn reactivate(
        &self,
        subscriber: newsletter_subscribers::Model,
        name: Option<&str>,
        source: &str,
        ip_address: Option<&str>,
    ) -> Result<()> {
        let mut active: newsletter_subscribers::ActiveModel = subscriber.into();
        active.status = Set("active".to_string());
        active.name = Set(name.map(str::to_string));
        active.source = Set(source.to_string());
        active.ip_address = Set(ip_address.map(str::to_string));
        active.subscription_date = Set(Utc::now().to_rfc3339());
        active.unsubscription_date = Set(None);

        active
            .update(&self.conn)
            .await
            .context("Failed to reactivate subscriber")?;
        Ok(())
    }

    /// Returns false when the email was never subscribed or already inactive.
    pub async fn unsubscribe(&self, email: &str) -> Result<bool> {
        let Some(subscriber) = self.get_by_email(email).await? else {
            return Ok(false);
        };

        if subscriber.status != "active" {
            return Ok(false);
        }

        let mut active: newsletter_subscribers::ActiveModel = subscriber.into();
        active.status = Set("unsubscribed".to_string());
        active.unsubscription_date = Set(Some(Utc::now().to_rfc3339()));

        active
            .update(&self.conn)
            .await
            .context("Failed to unsubscribe")?;
        Ok(true)
    }
}
