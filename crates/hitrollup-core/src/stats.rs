//! Storage interface for raw hits and aggregate dimensions.

use chrono::{DateTime, NaiveDate, Utc};

use crate::cache::StatsCaches;
use crate::dimension::Dimension;
use crate::hit::Hit;

#[async_trait::async_trait]
pub trait StatsBackend: Send + Sync + 'static {
    /// Persist drained hits to the raw `hits` table in one transaction.
    async fn insert_hits(&self, hits: &[Hit]) -> anyhow::Result<()>;

    /// Raw hits with `since <= created_at < until`, oldest first.
    async fn list_hits(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Hit>>;

    /// Timestamp of the oldest stored raw hit, `None` when there are none.
    async fn first_hit_at(&self) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Merge a site-scoped batch into one dimension.
    ///
    /// Runs in a single transaction: either every row touched by the batch is
    /// written or none is. Baselines are read through `caches` where the
    /// dimension has one.
    async fn update_dimension(
        &self,
        dimension: Dimension,
        site_id: i64,
        hits: &[Hit],
        caches: &StatsCaches,
    ) -> anyhow::Result<()>;

    /// Delete every row of `dimension` for `site_id` whose bucket falls on a
    /// day in `since..=until`. Returns the number of rows removed.
    async fn clear_dimension(
        &self,
        dimension: Dimension,
        site_id: i64,
        since: NaiveDate,
        until: NaiveDate,
    ) -> anyhow::Result<usize>;
}
