//! Background purge of expired session rows.
//!
//! Expiry is always enforced lazily at check time; the sweeper only keeps
//! the `user_sessions` table from accumulating dead rows.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SweeperConfig;
use crate::db::Store;

pub struct SessionSweeper {
    store: Store,
    config: SweeperConfig,
    running: Arc<RwLock<bool>>,
}

impl SessionSweeper {
    #[must_use]
    pub fn new(store: Store, config: SweeperConfig) -> Self {
        Self {
            store,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Session sweeper is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;

        let mut sched = JobScheduler::new().await?;

        let store = self.store.clone();
        let job = Job::new_async(self.config.cron_expression.as_str(), move |_uuid, _lock| {
            let store = store.clone();
            Box::pin(async move {
                match store.delete_expired_sessions().await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "Swept expired sessions"),
                    Err(e) => error!("Session sweep failed: {}", e),
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!(
            "Session sweeper running with cron: {}",
            self.config.cron_expression
        );

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }
}
