use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use hitrollup_core::buffer::EventBuffer;
use hitrollup_core::cache::StatsCaches;
use hitrollup_core::error::{DrainErrors, StatsError};
use hitrollup_core::stats::StatsBackend;
use hitrollup_metadata::SiteStore;

use super::stats::{group_by_site, update_stats};

/// Wall-clock time the last drain cycle completed, for liveness checks.
#[derive(Debug, Default)]
pub struct LastDrain(RwLock<Option<DateTime<Utc>>>);

impl LastDrain {
    pub fn record(&self, at: DateTime<Utc>) {
        *self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(at);
    }

    pub fn get(&self) -> Option<DateTime<Utc>> {
        *self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub hits: usize,
    pub sites: usize,
}

/// One drain cycle: empty the buffer, store the raw hits, then aggregate each
/// site's batch.
///
/// When the raw hits cannot be stored the batch goes back into the buffer and
/// the cycle ends with the storage error, without recording `last_drain`.
/// A failing site does not stop the others; every per-site failure is logged
/// and returned together in [`StatsError::Drain`]. The cycle counts as
/// completed (and `last_drain` is updated) once every site was attempted,
/// whether or not some of them failed.
pub async fn persist_and_stat(
    buffer: &dyn EventBuffer,
    stats: &dyn StatsBackend,
    sites: &dyn SiteStore,
    caches: &StatsCaches,
    last_drain: &LastDrain,
) -> Result<DrainSummary, StatsError> {
    let hits = buffer.drain().await?;
    let mut summary = DrainSummary {
        hits: hits.len(),
        sites: 0,
    };
    if hits.is_empty() {
        last_drain.record(Utc::now());
        return Ok(summary);
    }

    if let Err(e) = stats.insert_hits(&hits).await {
        error!(hits = hits.len(), error = %e, "Persisting drained hits failed, requeued");
        buffer.restore(hits).await;
        return Err(StatsError::Storage(e));
    }

    let mut failures = DrainErrors::default();
    for (site_id, batch) in group_by_site(&hits) {
        let site = match sites.get_site(site_id).await {
            Ok(Some(site)) => site,
            Ok(None) => {
                error!(site_id, "Hits for unknown site");
                failures.push(StatsError::UnknownSite(site_id));
                continue;
            }
            Err(e) => {
                error!(site_id, error = %e, "Site lookup failed");
                failures.push(StatsError::Storage(e.context(format!("load site {site_id}"))));
                continue;
            }
        };
        if !site.is_active() {
            debug!(site_id, "Skipping hits for inactive site");
            continue;
        }

        match update_stats(stats, sites, caches, &site, &batch).await {
            Ok(()) => summary.sites += 1,
            Err(e) => {
                error!(site_id, error = %e, "Stats update failed");
                failures.push(e);
            }
        }
    }

    last_drain.record(Utc::now());
    info!(
        hits = summary.hits,
        sites = summary.sites,
        failed = failures.len(),
        "Drain cycle finished"
    );
    failures.into_result().map(|()| summary)
}
