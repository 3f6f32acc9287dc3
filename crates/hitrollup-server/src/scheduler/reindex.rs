use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use hitrollup_core::cache::StatsCaches;
use hitrollup_core::dimension::{Dimension, ReindexTarget};
use hitrollup_core::error::StatsError;
use hitrollup_core::hit::Hit;
use hitrollup_core::stats::StatsBackend;
use hitrollup_metadata::{SiteSnapshot, SiteStore};

use super::stats::{group_by_site, update_stats};

/// Recompute the selected dimensions from a batch of raw hits.
///
/// Sites are resolved from `snapshot` only. A hit for a site the snapshot does
/// not know aborts the run; sites that are not active are skipped. The first
/// dimension error aborts the run.
pub async fn reindex_stats(
    stats: &dyn StatsBackend,
    sites: &dyn SiteStore,
    caches: &StatsCaches,
    snapshot: &SiteSnapshot,
    hits: &[Hit],
    targets: &[ReindexTarget],
) -> Result<(), StatsError> {
    for (site_id, batch) in group_by_site(hits) {
        let site = snapshot.resolve(site_id)?;
        if !site.is_active() {
            debug!(site_id, "Skipping inactive site");
            continue;
        }

        for target in targets {
            match target {
                ReindexTarget::All => update_stats(stats, sites, caches, site, &batch).await?,
                ReindexTarget::One(dimension) => stats
                    .update_dimension(*dimension, site_id, &batch, caches)
                    .await
                    .map_err(|source| StatsError::Dimension {
                        site_id,
                        dimension: *dimension,
                        source,
                    })?,
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexSummary {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub days: usize,
    pub hits: usize,
    pub cleared_rows: usize,
}

/// Rebuild the targeted dimensions for `since..=until` from raw hits.
///
/// Existing rows of every targeted dimension inside the range are deleted for
/// each active site and the caches are flushed before the raw hits are
/// replayed one day at a time. `since` defaults to the day of the oldest raw
/// hit and `until` to today.
pub async fn run_reindex(
    stats: &dyn StatsBackend,
    sites: &dyn SiteStore,
    caches: &StatsCaches,
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
    targets: &[ReindexTarget],
) -> Result<ReindexSummary, StatsError> {
    let targets = normalize_targets(targets);
    let mut summary = ReindexSummary::default();
    if targets.is_empty() {
        return Ok(summary);
    }

    let until = until.unwrap_or_else(|| Utc::now().date_naive());
    let since = match since {
        Some(since) => since,
        None => match stats.first_hit_at().await? {
            Some(first) => first.date_naive(),
            None => {
                info!("No raw hits stored; nothing to reindex");
                return Ok(summary);
            }
        },
    };
    if since > until {
        return Err(StatsError::Storage(anyhow::anyhow!(
            "reindex range starts after it ends: {since} > {until}"
        )));
    }
    summary.since = Some(since);
    summary.until = Some(until);

    let snapshot = SiteSnapshot::load(sites).await?;
    let dimensions: Vec<Dimension> = targets.iter().flat_map(|t| t.dimensions()).collect();
    for site in snapshot.iter().filter(|s| s.is_active()) {
        for dimension in &dimensions {
            summary.cleared_rows += stats
                .clear_dimension(*dimension, site.id, since, until)
                .await
                .map_err(|source| StatsError::Dimension {
                    site_id: site.id,
                    dimension: *dimension,
                    source,
                })?;
        }
    }
    caches.reset();

    let mut day = since;
    while day <= until {
        let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
        let hits = stats.list_hits(start, start + Duration::days(1)).await?;
        if !hits.is_empty() {
            reindex_stats(stats, sites, caches, &snapshot, &hits, &targets).await?;
            summary.hits += hits.len();
        }
        summary.days += 1;
        debug!(%day, hits = hits.len(), "Reindexed day");
        day += Duration::days(1);
    }

    info!(
        %since,
        %until,
        days = summary.days,
        hits = summary.hits,
        cleared_rows = summary.cleared_rows,
        targets = ?targets,
        "Reindex finished"
    );
    Ok(summary)
}

/// `all` subsumes every named dimension; duplicates would count hits twice.
fn normalize_targets(targets: &[ReindexTarget]) -> Vec<ReindexTarget> {
    if targets.contains(&ReindexTarget::All) {
        return vec![ReindexTarget::All];
    }
    let mut unique = Vec::new();
    for target in targets {
        if !unique.contains(target) {
            unique.push(*target);
        }
    }
    unique
}
