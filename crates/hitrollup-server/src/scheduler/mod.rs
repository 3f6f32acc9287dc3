use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use hitrollup_metadata::SiteStore;

use crate::state::AppState;
use crate::tasks::TaskError;

pub mod drain;
pub mod maintenance;
pub mod reindex;
pub mod renew;
pub mod stats;

const SESSIONS_EVERY: Duration = Duration::from_secs(60);
const EXPORTS_EVERY: Duration = Duration::from_secs(3600);
const RENEW_EVERY: Duration = Duration::from_secs(2 * 3600);
const DAILY: Duration = Duration::from_secs(24 * 3600);

/// Run `job` every `period` until shutdown begins. Failures are logged and the
/// loop keeps going.
async fn run_every<F, Fut>(state: Arc<AppState>, task: &'static str, period: Duration, mut job: F)
where
    F: FnMut(Arc<AppState>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let period = period.max(Duration::from_millis(100));
    info!(module = "cron", task, period_ms = period.as_millis() as u64, "Task scheduled");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if state.is_shutting_down() {
            break;
        }
        if let Err(err) = job(Arc::clone(&state)).await {
            error!(module = "cron", task, error = %err, "Scheduled task failed");
        }
    }
}

/// Log failures reported by side tasks until the pool is dropped.
pub async fn run_task_error_loop(mut errors: mpsc::UnboundedReceiver<TaskError>) {
    while let Some(TaskError { name, error }) = errors.recv().await {
        error!(module = "renew", task = %name, error = %error, "Background task failed");
    }
}

/// Spawn the drain cycle and every maintenance task.
pub fn spawn_all(state: &Arc<AppState>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(errors) = state.tasks.take_errors() {
        handles.push(tokio::spawn(run_task_error_loop(errors)));
    }

    let drain_every = state.config.drain_interval();
    handles.push(tokio::spawn(run_every(
        Arc::clone(state),
        "drain",
        drain_every,
        |state| async move {
            // Per-site failures were already logged inside the cycle.
            state.drain_once().await?;
            Ok(())
        },
    )));

    handles.push(tokio::spawn(run_every(
        Arc::clone(state),
        "sessions",
        SESSIONS_EVERY,
        |state| async move {
            maintenance::sessions(state.buffer.as_ref()).await;
            Ok(())
        },
    )));

    let sweep_every = state.caches.sweep_interval();
    handles.push(tokio::spawn(run_every(
        Arc::clone(state),
        "cache_sweep",
        sweep_every,
        |state| async move {
            maintenance::sweep_caches(&state.caches);
            Ok(())
        },
    )));

    handles.push(tokio::spawn(run_every(
        Arc::clone(state),
        "data_retention",
        DAILY,
        |state| async move {
            maintenance::data_retention(state.db.as_ref()).await?;
            Ok(())
        },
    )));

    handles.push(tokio::spawn(run_every(
        Arc::clone(state),
        "vacuum_deleted",
        DAILY,
        |state| async move {
            let grace = chrono::Duration::days(i64::from(state.config.vacuum_after_days));
            maintenance::vacuum_deleted(state.db.as_ref(), grace).await?;
            Ok(())
        },
    )));

    handles.push(tokio::spawn(run_every(
        Arc::clone(state),
        "old_exports",
        EXPORTS_EVERY,
        |state| async move {
            let dir = PathBuf::from(&state.config.export_dir);
            maintenance::old_exports(&dir, state.config.export_max_age()).await?;
            Ok(())
        },
    )));

    handles.push(tokio::spawn(run_every(
        Arc::clone(state),
        "renew_certs",
        RENEW_EVERY,
        |state| async move {
            let sites: Arc<dyn SiteStore> = state.db.clone();
            renew::renew_certs(
                sites,
                Arc::clone(&state.renewer),
                &state.tasks,
                state.is_shutting_down(),
            )
            .await?;
            Ok(())
        },
    )));

    handles
}
