use anyhow::Result;
use chrono::{DateTime, Utc};

use hitrollup_core::hit::{Hit, RefScheme};

use crate::backend::timestamp_param;
use crate::DuckDbBackend;

const HIT_COLUMNS: &str = "site_id, path, title, event, bot, first_visit, \
     browser, browser_version, system, system_version, location, \
     referrer, ref_scheme, width, session, created_at";

impl DuckDbBackend {
    /// Insert a batch of drained hits in a single transaction.
    ///
    /// Returns immediately (no-op) if `hits` is empty.
    pub async fn insert_hits(&self, hits: &[Hit]) -> Result<()> {
        if hits.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO hits ({HIT_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ))?;
            for hit in hits {
                stmt.execute(duckdb::params![
                    hit.site_id,
                    hit.path,
                    hit.title,
                    hit.event,
                    hit.bot,
                    hit.first_visit,
                    hit.browser,
                    hit.browser_version,
                    hit.system,
                    hit.system_version,
                    hit.location,
                    hit.ref_,
                    hit.ref_scheme.map(|s| s.as_str()),
                    hit.width,
                    hit.session,
                    timestamp_param(hit.created_at),
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(count = hits.len(), "Inserted raw hits");
        Ok(())
    }

    /// Raw hits with `since <= created_at < until`, oldest first.
    pub async fn list_hits(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Hit>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT site_id, path, title, event, bot, first_visit, \
                    browser, browser_version, system, system_version, location, \
                    referrer, ref_scheme, width, session, epoch_ms(created_at) \
             FROM hits \
             WHERE created_at >= CAST(?1 AS TIMESTAMP) AND created_at < CAST(?2 AS TIMESTAMP) \
             ORDER BY created_at, site_id",
        )?;
        let rows = stmt.query_map(
            duckdb::params![timestamp_param(since), timestamp_param(until)],
            |row| {
                let ref_scheme: Option<String> = row.get(12)?;
                let created_at = utc_from_millis(15, row.get(15)?)?;
                Ok(Hit {
                    site_id: row.get(0)?,
                    path: row.get(1)?,
                    title: row.get(2)?,
                    event: row.get(3)?,
                    bot: row.get(4)?,
                    first_visit: row.get(5)?,
                    browser: row.get(6)?,
                    browser_version: row.get(7)?,
                    system: row.get(8)?,
                    system_version: row.get(9)?,
                    location: row.get(10)?,
                    ref_: row.get(11)?,
                    ref_scheme: ref_scheme.as_deref().and_then(RefScheme::parse),
                    width: row.get(13)?,
                    session: row.get(14)?,
                    created_at,
                })
            },
        )?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }

    pub async fn first_hit_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let first = conn.query_row("SELECT epoch_ms(MIN(created_at)) FROM hits", [], |row| {
            row.get::<_, Option<i64>>(0)?
                .map(|ms| utc_from_millis(0, ms))
                .transpose()
        })?;
        Ok(first)
    }
}

/// Column `idx` holds epoch milliseconds that chrono cannot represent.
fn utc_from_millis(idx: usize, ms: i64) -> duckdb::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        duckdb::Error::FromSqlConversionFailure(
            idx,
            duckdb::types::Type::BigInt,
            format!("timestamp {ms}ms is out of range").into(),
        )
    })
}
