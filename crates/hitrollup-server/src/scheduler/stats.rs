use std::collections::HashMap;

use tracing::{debug, info};

use hitrollup_core::cache::StatsCaches;
use hitrollup_core::dimension::Dimension;
use hitrollup_core::error::StatsError;
use hitrollup_core::hit::Hit;
use hitrollup_core::stats::StatsBackend;
use hitrollup_metadata::{Site, SiteStore};

/// Run every dimension for one site's batch, in pipeline order.
///
/// Each dimension commits on its own; the first failure stops the run and is
/// returned with the site and dimension attached, leaving earlier dimensions
/// committed. Once all succeed the site's `received_data` flag is set if it
/// was not already.
pub async fn update_stats(
    stats: &dyn StatsBackend,
    sites: &dyn SiteStore,
    caches: &StatsCaches,
    site: &Site,
    hits: &[Hit],
) -> Result<(), StatsError> {
    for dimension in Dimension::ALL {
        stats
            .update_dimension(dimension, site.id, hits, caches)
            .await
            .map_err(|source| StatsError::Dimension {
                site_id: site.id,
                dimension,
                source,
            })?;
    }

    if !site.received_data {
        sites
            .mark_received_data(site.id)
            .await
            .map_err(|source| StatsError::ReceivedData {
                site_id: site.id,
                source,
            })?;
        info!(site_id = site.id, "Site received its first data");
    }
    debug!(site_id = site.id, hits = hits.len(), "Stats updated");
    Ok(())
}

/// Split hits into per-site batches, dropping bots.
///
/// Batches come back in the order each site first appears, and every batch
/// keeps the relative order of its hits.
pub fn group_by_site(hits: &[Hit]) -> Vec<(i64, Vec<Hit>)> {
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut grouped: Vec<(i64, Vec<Hit>)> = Vec::new();
    for hit in hits.iter().filter(|h| !h.is_bot()) {
        match index.get(&hit.site_id) {
            Some(&idx) => grouped[idx].1.push(hit.clone()),
            None => {
                index.insert(hit.site_id, grouped.len());
                grouped.push((hit.site_id, vec![hit.clone()]));
            }
        }
    }
    grouped
}
