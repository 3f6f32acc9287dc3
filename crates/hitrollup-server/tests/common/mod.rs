#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use hitrollup_core::cache::StatsCaches;
use hitrollup_core::config::{Config, UpsertDialect};
use hitrollup_core::dimension::Dimension;
use hitrollup_core::hit::Hit;
use hitrollup_core::stats::StatsBackend;
use hitrollup_duckdb::DuckDbBackend;

pub fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/hitrollup-test".to_string(),
        duckdb_memory_limit: "1GB".to_string(),
        upsert_dialect: UpsertDialect::OnConflict,
        drain_interval_ms: 10_000,
        cache_ttl_secs: 3600,
        cache_sweep_secs: 300,
        session_ttl_secs: 8 * 3600,
        export_dir: "/tmp/hitrollup-test-exports".to_string(),
        export_max_age_hours: 24,
        vacuum_after_days: 7,
        renew_workers: 2,
        admin_token: Some("s3cret".to_string()),
    }
}

pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0)
        .single()
        .expect("valid time")
}

pub fn day(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date")
}

pub fn pageview(site_id: i64, path: &str, when: DateTime<Utc>) -> Hit {
    let mut h = Hit::pageview(site_id, path, when);
    h.first_visit = true;
    h.browser = "Firefox".to_string();
    h.location = "DE".to_string();
    h
}

pub async fn count(db: &DuckDbBackend, sql: &str) -> i64 {
    let conn = db.conn_for_test().await;
    conn.query_row(sql, [], |row| row.get(0)).expect("count")
}

/// `(hour, total, total_unique)` of every `hit_counts` row of `site_id`.
pub async fn hit_counts(db: &DuckDbBackend, site_id: i64) -> Vec<(String, i64, i64)> {
    let conn = db.conn_for_test().await;
    let mut stmt = conn
        .prepare(
            "SELECT strftime(hour, '%Y-%m-%d %H:%M:%S'), total, total_unique \
             FROM hit_counts WHERE site_id = ?1 ORDER BY hour, path",
        )
        .expect("prepare");
    let rows = stmt
        .query_map(hitrollup_duckdb::duckdb::params![site_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .expect("query");
    rows.map(|r| r.expect("row")).collect()
}

/// Storage that fails one dimension of one site and delegates everything else.
pub struct FailingStats {
    pub inner: Arc<DuckDbBackend>,
    pub site_id: i64,
    pub dimension: Dimension,
    /// Fail every raw hit insert.
    pub fail_inserts: bool,
}

#[async_trait]
impl StatsBackend for FailingStats {
    async fn insert_hits(&self, hits: &[Hit]) -> anyhow::Result<()> {
        if self.fail_inserts {
            anyhow::bail!("disk full");
        }
        self.inner.insert_hits(hits).await
    }

    async fn list_hits(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Hit>> {
        self.inner.list_hits(since, until).await
    }

    async fn first_hit_at(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.inner.first_hit_at().await
    }

    async fn update_dimension(
        &self,
        dimension: Dimension,
        site_id: i64,
        hits: &[Hit],
        caches: &StatsCaches,
    ) -> anyhow::Result<()> {
        if site_id == self.site_id && dimension == self.dimension {
            anyhow::bail!("injected failure");
        }
        StatsBackend::update_dimension(self.inner.as_ref(), dimension, site_id, hits, caches).await
    }

    async fn clear_dimension(
        &self,
        dimension: Dimension,
        site_id: i64,
        since: NaiveDate,
        until: NaiveDate,
    ) -> anyhow::Result<usize> {
        StatsBackend::clear_dimension(self.inner.as_ref(), dimension, site_id, since, until).await
    }
}
