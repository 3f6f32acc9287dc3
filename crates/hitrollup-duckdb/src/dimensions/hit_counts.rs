use anyhow::{Context, Result};
use duckdb::Connection;

use hitrollup_core::aggregate::{merge_hit_counts, HitCountRow};
use hitrollup_core::cache::{CounterEntry, TtlCache};
use hitrollup_core::config::UpsertDialect;
use hitrollup_core::hit::{BucketKey, Hit};

use crate::DuckDbBackend;

/// Merge `hits` into `hit_counts`.
///
/// Baselines are read through `cache`, falling back to the stored row. All
/// upserts share one transaction; the cache is written only after it commits,
/// so a rolled-back batch never leaves baselines that storage does not have.
pub(crate) async fn update_hit_counts_inner(
    db: &DuckDbBackend,
    hits: &[Hit],
    cache: &TtlCache<BucketKey, CounterEntry>,
) -> Result<usize> {
    let mut conn = db.conn.lock().await;
    let tx = conn.transaction()?;

    let rows = merge_hit_counts(hits, |key| match cache.get(key) {
        Some(entry) => Ok(entry),
        None => existing_hit_count(&tx, key),
    })?;
    if rows.is_empty() {
        return Ok(0);
    }

    for row in &rows {
        upsert_hit_count(&tx, db.dialect, row)
            .with_context(|| format!("upsert hit_counts {} {}", row.key.hour, row.key.path))?;
    }
    tx.commit()?;

    for row in &rows {
        cache.set(row.key.clone(), row.counter());
    }
    Ok(rows.len())
}

/// Stored `(total, total_unique)` for `key`; a missing row is a zero baseline.
fn existing_hit_count(conn: &Connection, key: &BucketKey) -> Result<CounterEntry> {
    let mut stmt = conn.prepare_cached(
        "SELECT total, total_unique FROM hit_counts \
         WHERE site_id = ?1 AND hour = CAST(?2 AS TIMESTAMP) AND path = ?3 LIMIT 1",
    )?;
    let found = stmt.query_row(duckdb::params![key.site_id, key.hour, key.path], |row| {
        Ok(CounterEntry {
            total: row.get(0)?,
            total_unique: row.get(1)?,
        })
    });
    match found {
        Ok(entry) => Ok(entry),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(CounterEntry::default()),
        Err(e) => Err(anyhow::Error::new(e).context("existing hit_counts")),
    }
}

fn stored_title(conn: &Connection, key: &BucketKey) -> Result<String> {
    let mut stmt = conn.prepare_cached(
        "SELECT title FROM hit_counts \
         WHERE site_id = ?1 AND hour = CAST(?2 AS TIMESTAMP) AND path = ?3 LIMIT 1",
    )?;
    match stmt.query_row(duckdb::params![key.site_id, key.hour, key.path], |row| {
        row.get::<_, String>(0)
    }) {
        Ok(title) => Ok(title),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn upsert_hit_count(conn: &Connection, dialect: UpsertDialect, row: &HitCountRow) -> Result<()> {
    match dialect {
        UpsertDialect::OnConflict => {
            conn.execute(
                "INSERT INTO hit_counts (site_id, path, title, event, hour, total, total_unique) \
                 VALUES (?1, ?2, ?3, ?4, CAST(?5 AS TIMESTAMP), ?6, ?7) \
                 ON CONFLICT (site_id, path, hour) DO UPDATE SET \
                     total = EXCLUDED.total, \
                     total_unique = EXCLUDED.total_unique, \
                     event = EXCLUDED.event, \
                     title = CASE WHEN EXCLUDED.title = '' THEN hit_counts.title \
                                  ELSE EXCLUDED.title END",
                duckdb::params![
                    row.key.site_id,
                    row.key.path,
                    row.title,
                    row.event,
                    row.key.hour,
                    row.total,
                    row.total_unique,
                ],
            )?;
        }
        UpsertDialect::Replace => {
            // REPLACE rewrites every column, so keep the stored title when the
            // batch did not bring a new one.
            let title = if row.title.is_empty() {
                stored_title(conn, &row.key)?
            } else {
                row.title.clone()
            };
            conn.execute(
                "INSERT OR REPLACE INTO hit_counts \
                     (site_id, path, title, event, hour, total, total_unique) \
                 VALUES (?1, ?2, ?3, ?4, CAST(?5 AS TIMESTAMP), ?6, ?7)",
                duckdb::params![
                    row.key.site_id,
                    row.key.path,
                    title,
                    row.event,
                    row.key.hour,
                    row.total,
                    row.total_unique,
                ],
            )?;
        }
    }
    Ok(())
}
