// Cron trigger for the refresh job

use std::sync::Arc;

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::refresher::{EpisodeRefresher, TickOutcome};
use crate::services::jellyfin::MediaLibrary;

/// Run one tick, logging instead of propagating a failed scan
pub async fn run_tick<L>(refresher: &EpisodeRefresher<L>)
where
    L: MediaLibrary + ?Sized,
{
    match refresher.tick().await {
        Ok(TickOutcome::Completed(report)) if report.cancelled => {
            info!("Scan stopped early for shutdown");
        }
        Ok(_) => {}
        Err(e) => tracing::error!("Episode scan failed: {:#}", e),
    }
}

/// Initialize and start the job scheduler.
///
/// The returned scheduler must be kept alive; the cron expression is
/// evaluated in `tz`.
pub async fn start_scheduler<L>(
    cron: &str,
    tz: Tz,
    refresher: Arc<EpisodeRefresher<L>>,
) -> anyhow::Result<JobScheduler>
where
    L: MediaLibrary + ?Sized + 'static,
{
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async_tz(cron, tz, move |_uuid, _l| {
        let refresher = refresher.clone();
        Box::pin(async move {
            run_tick(refresher.as_ref()).await;
        })
    })?;
    scheduler.add(job).await?;

    scheduler.start().await?;

    info!("Running cronjob {} ({})", cron, tz);
    Ok(scheduler)
}
