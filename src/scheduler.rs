use std::sync::Arc;

use anyhow::Context as _;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::global::Global;

#[tracing::instrument(name = "Scheduler", skip_all)]
pub async fn run(global: Arc<Global>) -> anyhow::Result<()> {
    if !global.config.scheduler.enabled {
        tracing::info!("scheduled refresh is disabled");
        // Park forever so tokio::select doesn't exit
        std::future::pending::<()>().await;
        return Ok(());
    }

    let cron = global.config.scheduler.cron.clone();
    let sched = JobScheduler::new().await.context("failed to create job scheduler")?;

    let job_global = global.clone();
    let job = Job::new_async(cron.as_str(), move |_, _| {
        let global = job_global.clone();
        Box::pin(async move {
            scheduled_refresh(&global).await;
        })
    })
    .with_context(|| format!("invalid refresh schedule {cron:?}"))?;

    sched.add(job).await.context("failed to add refresh job")?;
    sched.start().await.context("failed to start scheduler")?;

    tracing::info!(%cron, "scheduled news refresh");

    std::future::pending::<()>().await;
    Ok(())
}

/// Forced refresh; failures are logged and go no further.
pub async fn scheduled_refresh(global: &Global) {
    tracing::info!("running scheduled news refresh");

    match global.news.get(true).await {
        Ok(payload) => tracing::info!(
            last_updated = %payload.last_updated,
            succeeded = payload.stats.feeds_succeeded,
            failed = payload.stats.feeds_failed,
            "scheduled refresh complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduled refresh failed"),
    }
}
