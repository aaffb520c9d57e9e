use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::engine::StageEngine;
use crate::error::StageError;

pub struct SchedulerConfig {
    pub interval_minutes: u64,
    pub daemon: bool,
}

impl SchedulerConfig {
    pub fn new(interval_minutes: u64, daemon: bool) -> Self {
        Self {
            interval_minutes,
            daemon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceResult {
    Expired,
    Kept,
    /// Another operation was running; the next tick tries again.
    Skipped,
}

/// One maintenance pass: expire a stale stage and stamp the metadata.
pub async fn run_maintenance(engine: &StageEngine) -> crate::error::Result<MaintenanceResult> {
    let result = match engine.expire_if_stale().await {
        Ok(true) => MaintenanceResult::Expired,
        Ok(false) => MaintenanceResult::Kept,
        Err(StageError::Busy { state }) => {
            info!("⏭️  Maintenance skipped, engine is {}", state);
            return Ok(MaintenanceResult::Skipped);
        }
        Err(e) => return Err(e),
    };

    engine.metadata().record_maintenance().await?;
    Ok(result)
}

pub async fn start_scheduler(engine: Arc<StageEngine>, config: SchedulerConfig) -> Result<()> {
    let mut scheduler = JobScheduler::new().await?;

    info!("⏰ Maintenance every {} minutes", config.interval_minutes);

    match run_maintenance(&engine).await {
        Ok(result) => info!("✅ Initial maintenance: {:?}", result),
        Err(e) => error!("❌ Initial maintenance failed: {}", e),
    }

    let interval = Duration::from_secs(config.interval_minutes * 60);
    let job = Job::new_repeated_async(interval, move |_uuid, _l| {
        let engine = engine.clone();
        Box::pin(async move {
            info!("🔄 Scheduled maintenance triggered");
            match run_maintenance(&engine).await {
                Ok(result) => info!("✅ Scheduled maintenance completed: {:?}", result),
                Err(e) => error!("❌ Scheduled maintenance failed: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    if config.daemon {
        info!("🔄 Running as daemon. Press Ctrl+C to stop.");
    } else {
        info!("⏰ Scheduler started. Keeping process alive...");
    }
    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down scheduler...");

    scheduler.shutdown().await?;
    Ok(())
}
