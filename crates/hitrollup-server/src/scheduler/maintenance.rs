use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info};

use hitrollup_core::buffer::EventBuffer;
use hitrollup_core::cache::StatsCaches;
use hitrollup_metadata::SiteStore;

/// File name prefix of generated exports.
pub const EXPORT_PREFIX: &str = "hitrollup-export-";

/// Evict idle sessions, then rotate the session salt.
pub async fn sessions(buffer: &dyn EventBuffer) -> usize {
    let evicted = buffer.evict_expired_sessions().await;
    buffer.rotate_session_salt().await;
    evicted
}

pub fn sweep_caches(caches: &StatsCaches) -> usize {
    let removed = caches.sweep_expired();
    if removed > 0 {
        debug!(removed, "Swept expired cache entries");
    }
    removed
}

/// Apply each active site's retention horizon to its raw hits and aggregates.
///
/// A failing site is logged and skipped. Returns the number of rows removed.
pub async fn data_retention(sites: &dyn SiteStore) -> Result<usize> {
    let mut removed = 0;
    for site in sites.list_sites().await? {
        if !site.is_active() || site.data_retention_days <= 0 {
            continue;
        }
        match sites
            .delete_older_than(site.id, site.data_retention_days)
            .await
        {
            Ok(n) => {
                if n > 0 {
                    info!(module = "cron", site_id = site.id, removed = n, "Retention applied");
                }
                removed += n;
            }
            Err(e) => {
                error!(module = "cron", site_id = site.id, error = %e, "Retention failed");
            }
        }
    }
    Ok(removed)
}

/// Delete sites that were soft-deleted more than `grace` ago, with all their
/// data. A failing site is logged and skipped.
pub async fn vacuum_deleted(sites: &dyn SiteStore, grace: chrono::Duration) -> Result<usize> {
    let mut vacuumed = 0;
    for site in sites.list_soft_deleted_before(Utc::now() - grace).await? {
        match sites.vacuum_site(site.id).await {
            Ok(()) => {
                info!(module = "vacuum", site_id = site.id, code = %site.code, "Site vacuumed");
                vacuumed += 1;
            }
            Err(e) => {
                error!(module = "vacuum", site_id = site.id, error = %e, "Vacuum failed");
            }
        }
    }
    Ok(vacuumed)
}

/// Remove export files in `dir` older than `max_age`.
///
/// Only files named `hitrollup-export-*` are considered. A missing directory
/// is not an error. Per-file failures are logged and skipped.
pub async fn old_exports(dir: &Path, max_age: Duration) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_name().to_string_lossy().starts_with(EXPORT_PREFIX) {
            continue;
        }
        let path = entry.path();
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                error!(module = "cron", path = %path.display(), error = %e, "Stat export failed");
                continue;
            }
        };
        // Clock skew can put mtime in the future; treat that as fresh.
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(module = "cron", path = %path.display(), "Removed old export");
                removed += 1;
            }
            Err(e) => {
                error!(module = "cron", path = %path.display(), error = %e, "Remove export failed");
            }
        }
    }
    Ok(removed)
}
