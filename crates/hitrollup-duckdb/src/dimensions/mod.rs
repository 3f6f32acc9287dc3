//! Writers for the aggregate tables.
//!
//! One module per table shape. Each writer runs a whole batch in a single
//! transaction and returns the number of rows it upserted.

mod day_counts;
mod hit_counts;
mod hit_stats;
mod ref_counts;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use tracing::debug;

use hitrollup_core::cache::StatsCaches;
use hitrollup_core::dimension::Dimension;
use hitrollup_core::hit::{Hit, DAY_FORMAT};

use crate::schema::{bucket_column, BucketColumn};
use crate::DuckDbBackend;

pub(crate) async fn update_dimension_inner(
    db: &DuckDbBackend,
    dimension: Dimension,
    site_id: i64,
    hits: &[Hit],
    caches: &StatsCaches,
) -> Result<()> {
    if let Some(stray) = hits.iter().find(|h| h.site_id != site_id) {
        bail!(
            "batch for site {site_id} contains a hit for site {}",
            stray.site_id
        );
    }
    if hits.is_empty() {
        return Ok(());
    }

    let rows = match dimension {
        Dimension::HitCounts => {
            hit_counts::update_hit_counts_inner(db, hits, &caches.hit_counts).await?
        }
        Dimension::RefCounts => {
            ref_counts::update_ref_counts_inner(db, hits, &caches.ref_counts).await?
        }
        Dimension::HitStats => hit_stats::update_hit_stats_inner(db, hits).await?,
        Dimension::BrowserStats
        | Dimension::SystemStats
        | Dimension::LocationStats
        | Dimension::SizeStats => day_counts::update_day_counts_inner(db, dimension, hits).await?,
    };
    debug!(site_id, %dimension, hits = hits.len(), rows, "Dimension updated");
    Ok(())
}

pub(crate) async fn clear_dimension_inner(
    db: &DuckDbBackend,
    dimension: Dimension,
    site_id: i64,
    since: NaiveDate,
    until: NaiveDate,
) -> Result<usize> {
    let table = dimension.as_str();
    let bucket = match bucket_column(dimension) {
        BucketColumn::Hour => "CAST(hour AS DATE)",
        BucketColumn::Day => "day",
    };
    let conn = db.conn.lock().await;
    let removed = conn.execute(
        &format!(
            "DELETE FROM {table} \
             WHERE site_id = ?1 AND {bucket} BETWEEN CAST(?2 AS DATE) AND CAST(?3 AS DATE)"
        ),
        duckdb::params![
            site_id,
            since.format(DAY_FORMAT).to_string(),
            until.format(DAY_FORMAT).to_string(),
        ],
    )?;
    debug!(site_id, %dimension, %since, %until, removed, "Dimension cleared");
    Ok(removed)
}
